//! Gradient-directed non-maximum suppression of a response map.
//!
//! For every interior pixel the Sobel gradient of the map picks the line
//! along which the pixel must be a peak. The two samples straddling that
//! line on each side are linearly interpolated (quadrant test on the signs
//! of dX, dY and on whether |dX| > |dY|) and the pixel survives only if it
//! is at least as large as both estimates. Border rows and columns are
//! passed through untouched.
//!
//! The gradient only chooses the direction. The comparison uses the
//! response values themselves, and survivors keep their response value, so
//! the peak of a response blob (where the gradient vanishes) is what
//! remains.
//!
//! On non-negative maps the filter is idempotent: non-positive interior
//! samples are zeroed, a flat-gradient pixel is kept, a pixel dominating
//! its raw neighbours is kept without interpolation, and a final pass
//! removes survivors that have a strictly larger survivor next to them.

use crate::fixed::Sample;
use crate::image::Plane;
use crate::util::CornerMatchResult;

/// Non-maximum suppressor with fixed 3x3 Sobel kernels.
#[derive(Clone, Copy, Debug, Default)]
pub struct NonMaxSuppressor;

/// Sobel derivatives at one pixel.
#[derive(Clone, Copy, Debug)]
pub struct Gradient<T> {
    /// Derivative along columns.
    pub dx: T,
    /// Derivative along rows.
    pub dy: T,
    /// `sqrt(dx^2 + dy^2)`.
    pub magnitude: T,
}

fn positive<T: Sample>(v: T) -> bool {
    v.exceeds(T::zero())
}

fn sign<T: Sample>(v: T) -> isize {
    if T::zero().exceeds(v) {
        -1
    } else {
        1
    }
}

fn offset(index: usize, delta: isize) -> usize {
    (index as isize + delta) as usize
}

impl NonMaxSuppressor {
    /// Creates a suppressor.
    pub fn new() -> Self {
        Self
    }

    /// Sobel gradient of `map` at interior pixel `(row, col)`.
    pub fn gradient<T: Sample>(&self, map: &Plane<T>, row: usize, col: usize) -> Gradient<T> {
        let w = map.width();
        let d = map.data();
        let at = |r: usize, c: usize| d[r * w + c];
        let twice = |v: T| v + v;

        let right = at(row - 1, col + 1) + twice(at(row, col + 1)) + at(row + 1, col + 1);
        let left = at(row - 1, col - 1) + twice(at(row, col - 1)) + at(row + 1, col - 1);
        let below = at(row + 1, col - 1) + twice(at(row + 1, col)) + at(row + 1, col + 1);
        let above = at(row - 1, col - 1) + twice(at(row - 1, col)) + at(row - 1, col + 1);

        let dx = right - left;
        let dy = below - above;
        let magnitude = (dx * dx + dy * dy).sqrt();
        Gradient { dx, dy, magnitude }
    }

    /// Suppresses non-peaks of `map`, returning a new plane.
    pub fn suppress<T: Sample>(&self, map: &Plane<T>) -> CornerMatchResult<Plane<T>> {
        let width = map.width();
        let height = map.height();
        let mut out = map.clone();
        if width < 3 || height < 3 {
            return Ok(out);
        }

        for row in 1..height - 1 {
            for col in 1..width - 1 {
                if !self.is_directional_peak(map, row, col) {
                    out.set(row, col, T::zero());
                }
            }
        }

        // Drop survivors that sit next to a strictly larger survivor.
        let directional = out.clone();
        for row in 1..height - 1 {
            for col in 1..width - 1 {
                let Some(value) = directional.get(row, col) else {
                    continue;
                };
                if !positive(value) {
                    continue;
                }
                let dominated = (-1isize..=1)
                    .flat_map(|dr| (-1isize..=1).map(move |dc| (dr, dc)))
                    .filter(|&(dr, dc)| dr != 0 || dc != 0)
                    .filter_map(|(dr, dc)| directional.get(offset(row, dr), offset(col, dc)))
                    .any(|n| n.exceeds(value));
                if dominated {
                    out.set(row, col, T::zero());
                }
            }
        }

        Ok(out)
    }

    fn is_directional_peak<T: Sample>(&self, map: &Plane<T>, row: usize, col: usize) -> bool {
        let Some(value) = map.get(row, col) else {
            return false;
        };
        if !positive(value) {
            return false;
        }

        let grad = self.gradient(map, row, col);
        if !positive(grad.magnitude) {
            return true;
        }

        let sx = sign(grad.dx);
        let sy = sign(grad.dy);
        let ax = grad.dx.abs();
        let ay = grad.dy.abs();
        let sample = |dr: isize, dc: isize| {
            map.get(offset(row, dr), offset(col, dc))
                .unwrap_or_else(T::zero)
        };

        // (near, far) pairs ahead of and behind the pixel along the gradient
        let (ahead, behind, weight) = if ax.exceeds(ay) {
            (
                (sample(0, sx), sample(sy, sx)),
                (sample(0, -sx), sample(-sy, -sx)),
                ay / ax,
            )
        } else {
            (
                (sample(sy, 0), sample(sy, sx)),
                (sample(-sy, 0), sample(-sy, -sx)),
                ax / ay,
            )
        };

        let dominates = [ahead.0, ahead.1, behind.0, behind.1]
            .into_iter()
            .all(|n| value.reaches(n));
        if dominates {
            return true;
        }

        let ahead_estimate = ahead.0 + weight * (ahead.1 - ahead.0);
        let behind_estimate = behind.0 + weight * (behind.1 - behind.0);
        value.reaches(ahead_estimate) && value.reaches(behind_estimate)
    }
}

#[cfg(test)]
mod tests {
    use super::NonMaxSuppressor;
    use crate::image::Plane;

    fn plane(values: &[f32], width: usize, height: usize) -> Plane<f32> {
        Plane::from_vec(values.to_vec(), width, height).unwrap()
    }

    #[test]
    fn isolated_peak_survives_and_shoulders_are_removed() {
        #[rustfmt::skip]
        let map = plane(&[
            0.0, 0.0, 0.0, 0.0, 0.0,
            0.0, 0.2, 0.5, 0.2, 0.0,
            0.0, 0.5, 1.0, 0.5, 0.0,
            0.0, 0.2, 0.5, 0.2, 0.0,
            0.0, 0.0, 0.0, 0.0, 0.0,
        ], 5, 5);
        let out = NonMaxSuppressor::new().suppress(&map).unwrap();
        assert_eq!(out.get(2, 2), Some(1.0));
        for (row, col) in [(1, 1), (1, 2), (2, 1), (3, 3), (2, 3)] {
            assert_eq!(out.get(row, col), Some(0.0), "({row}, {col})");
        }
    }

    #[test]
    fn survivors_keep_response_values_not_gradient_magnitudes() {
        #[rustfmt::skip]
        let map = plane(&[
            0.0, 0.0, 0.0, 0.0, 0.0,
            0.0, 0.2, 0.5, 0.2, 0.0,
            0.0, 0.5, 1.0, 0.5, 0.0,
            0.0, 0.2, 0.5, 0.2, 0.0,
            0.0, 0.0, 0.0, 0.0, 0.0,
        ], 5, 5);
        let suppressor = NonMaxSuppressor::new();
        // the peak is flat, its flank is steep
        assert_eq!(suppressor.gradient(&map, 2, 2).magnitude, 0.0);
        assert!((suppressor.gradient(&map, 1, 2).magnitude - 3.0).abs() < 1e-6);

        let out = suppressor.suppress(&map).unwrap();
        assert_eq!(out.get(2, 2), Some(1.0));
        assert_eq!(out.get(1, 2), Some(0.0));
    }

    #[test]
    fn border_pixels_are_never_suppressed() {
        #[rustfmt::skip]
        let map = plane(&[
            0.1, 0.3, 0.1,
            0.3, 0.9, 0.3,
            0.1, 0.3, 0.1,
        ], 3, 3);
        let out = NonMaxSuppressor::new().suppress(&map).unwrap();
        assert_eq!(out.get(0, 1), Some(0.3));
        assert_eq!(out.get(2, 2), Some(0.1));
        assert_eq!(out.get(1, 1), Some(0.9));
    }

    #[test]
    fn negative_interior_values_are_zeroed() {
        let map = plane(&[0.0, 0.0, 0.0, 0.0, -0.5, 0.0, 0.0, 0.0, 0.0], 3, 3);
        let out = NonMaxSuppressor::new().suppress(&map).unwrap();
        assert_eq!(out.get(1, 1), Some(0.0));
    }

    #[test]
    fn ridge_keeps_its_crest() {
        // vertical ridge: the gradient is horizontal, so the crest column wins
        #[rustfmt::skip]
        let map = plane(&[
            0.1, 0.4, 0.8, 0.4, 0.1,
            0.1, 0.4, 0.8, 0.4, 0.1,
            0.1, 0.4, 0.8, 0.4, 0.1,
            0.1, 0.4, 0.8, 0.4, 0.1,
        ], 5, 4);
        let out = NonMaxSuppressor::new().suppress(&map).unwrap();
        for row in 1..3 {
            assert_eq!(out.get(row, 2), Some(0.8));
            assert_eq!(out.get(row, 1), Some(0.0));
            assert_eq!(out.get(row, 3), Some(0.0));
        }
    }
}
