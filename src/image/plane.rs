//! Numeric rasters and the separable convolution pass.

use crate::fixed::Sample;
use crate::image::ImageView;
use crate::util::alloc::{try_filled, try_with_capacity};
use crate::util::{CornerMatchError, CornerMatchResult};

/// Direction of a separable convolution pass.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum Axis {
    /// Along each row (x derivative).
    Horizontal,
    /// Along each column (y derivative).
    Vertical,
}

impl Axis {
    /// Wire encoding.
    pub fn code(self) -> u32 {
        match self {
            Axis::Horizontal => 0,
            Axis::Vertical => 1,
        }
    }

    /// Decodes the wire encoding.
    pub fn from_code(code: u32) -> Option<Self> {
        match code {
            0 => Some(Axis::Horizontal),
            1 => Some(Axis::Vertical),
            _ => None,
        }
    }
}

/// Owned row-major raster of samples.
#[derive(Clone, Debug, PartialEq)]
pub struct Plane<T> {
    width: usize,
    height: usize,
    data: Vec<T>,
}

impl<T: Sample> Plane<T> {
    /// Allocates a zero-filled plane.
    pub fn new(width: usize, height: usize) -> CornerMatchResult<Self> {
        let len = checked_len(width, height)?;
        Ok(Self {
            width,
            height,
            data: try_filled(len, T::zero())?,
        })
    }

    /// Wraps a row-major buffer of exactly `width * height` samples.
    pub fn from_vec(data: Vec<T>, width: usize, height: usize) -> CornerMatchResult<Self> {
        let len = checked_len(width, height)?;
        if data.len() != len {
            return Err(CornerMatchError::BufferTooSmall {
                needed: len,
                got: data.len(),
            });
        }
        Ok(Self {
            width,
            height,
            data,
        })
    }

    /// Converts pixels with [`Sample::from_pixel`].
    pub fn from_pixels(view: ImageView<'_, u8>) -> CornerMatchResult<Self> {
        let mut data = try_with_capacity(view.width() * view.height())?;
        for row in 0..view.height() {
            let pixels = view.row(row).ok_or(CornerMatchError::BufferTooSmall {
                needed: (row + 1) * view.stride(),
                got: view.as_slice().len(),
            })?;
            data.extend(pixels.iter().map(|&p| T::from_pixel(p)));
        }
        Self::from_vec(data, view.width(), view.height())
    }

    /// Returns the plane width.
    pub fn width(&self) -> usize {
        self.width
    }

    /// Returns the plane height.
    pub fn height(&self) -> usize {
        self.height
    }

    /// Returns the row-major samples.
    pub fn data(&self) -> &[T] {
        &self.data
    }

    /// Returns the sample at `(row, col)`.
    pub fn get(&self, row: usize, col: usize) -> Option<T> {
        if row >= self.height || col >= self.width {
            return None;
        }
        self.data.get(row * self.width + col).copied()
    }

    /// Sets the sample at `(row, col)`; out-of-range writes are ignored.
    pub fn set(&mut self, row: usize, col: usize, value: T) {
        if row < self.height && col < self.width {
            self.data[row * self.width + col] = value;
        }
    }

    /// Returns row `row`.
    pub fn row(&self, row: usize) -> &[T] {
        &self.data[row * self.width..(row + 1) * self.width]
    }

    /// Combines two equally sized planes sample by sample.
    pub fn zip_map<F>(&self, other: &Plane<T>, f: F) -> CornerMatchResult<Plane<T>>
    where
        F: Fn(T, T) -> T,
    {
        if self.width != other.width || self.height != other.height {
            return Err(CornerMatchError::InvalidInput("plane dimensions differ"));
        }
        let mut data = try_with_capacity(self.data.len())?;
        data.extend(self.data.iter().zip(&other.data).map(|(&a, &b)| f(a, b)));
        Plane::from_vec(data, self.width, self.height)
    }

    /// Copies the `height x width` region with top-left `(row, col)`.
    pub fn crop(
        &self,
        row: usize,
        col: usize,
        height: usize,
        width: usize,
    ) -> CornerMatchResult<Plane<T>> {
        if row + height > self.height || col + width > self.width {
            return Err(CornerMatchError::RoiOutOfBounds {
                x: col,
                y: row,
                width,
                height,
                img_width: self.width,
                img_height: self.height,
            });
        }
        let mut data = try_with_capacity(width * height)?;
        for r in row..row + height {
            data.extend_from_slice(&self.row(r)[col..col + width]);
        }
        Plane::from_vec(data, width, height)
    }

    /// One separable convolution pass with already mirrored `taps`.
    ///
    /// Taps are centred (index `len / 2`); samples outside the plane are
    /// replaced by the nearest edge sample.
    pub fn convolve(&self, taps: &[T], axis: Axis) -> CornerMatchResult<Plane<T>> {
        check_taps(taps)?;
        let mut out = Plane::new(self.width, self.height)?;
        let mut scratch = try_filled(taps.len(), T::zero())?;
        for (row, dst) in out.data.chunks_mut(self.width).enumerate() {
            self.convolve_row(taps, axis, row, dst, &mut scratch);
        }
        Ok(out)
    }

    /// Computes output row `row` of [`Plane::convolve`] into `dst`.
    pub(crate) fn convolve_row(
        &self,
        taps: &[T],
        axis: Axis,
        row: usize,
        dst: &mut [T],
        scratch: &mut [T],
    ) {
        let half = taps.len() / 2;
        let max_col = self.width as isize - 1;
        let max_row = self.height as isize - 1;
        for (col, out) in dst.iter_mut().enumerate() {
            for (k, slot) in scratch.iter_mut().enumerate() {
                let offset = k as isize - half as isize;
                let (r, c) = match axis {
                    Axis::Horizontal => (row, (col as isize + offset).clamp(0, max_col) as usize),
                    Axis::Vertical => ((row as isize + offset).clamp(0, max_row) as usize, col),
                };
                *slot = self.data[r * self.width + c];
            }
            *out = T::dot(scratch, taps);
        }
    }
}

pub(crate) fn check_taps<T>(taps: &[T]) -> CornerMatchResult<()> {
    if taps.is_empty() || taps.len() % 2 == 0 {
        return Err(CornerMatchError::InvalidInput(
            "kernel length must be odd and positive",
        ));
    }
    Ok(())
}

fn checked_len(width: usize, height: usize) -> CornerMatchResult<usize> {
    if width == 0 || height == 0 {
        return Err(CornerMatchError::InvalidDimensions { width, height });
    }
    width
        .checked_mul(height)
        .ok_or(CornerMatchError::InvalidDimensions { width, height })
}

#[cfg(test)]
mod tests {
    use super::{Axis, Plane};
    use crate::fixed::{Fixed, Sample};

    #[test]
    fn identity_kernel_is_a_copy() {
        let plane = Plane::from_vec(vec![1.0f32, 2.0, 3.0, 4.0, 5.0, 6.0], 3, 2).unwrap();
        let out = plane.convolve(&[0.0, 1.0, 0.0], Axis::Vertical).unwrap();
        assert_eq!(out, plane);
    }

    #[test]
    fn horizontal_pass_clamps_at_edges() {
        let plane = Plane::from_vec(vec![1.0f32, 2.0, 4.0], 3, 1).unwrap();
        let out = plane.convolve(&[0.5, 0.0, -0.5], Axis::Horizontal).unwrap();
        // left neighbour of col 0 is clamped to col 0
        assert_eq!(out.data(), &[-0.5, -1.5, -1.0]);
    }

    #[test]
    fn fixed_pass_matches_float_pass() {
        let pixels = [10u8, 200, 30, 90, 255, 0];
        let float: Plane<f32> = Plane::from_vec(
            pixels.iter().map(|&p| <f32 as Sample>::from_pixel(p)).collect(),
            3,
            2,
        )
        .unwrap();
        let fixed: Plane<Fixed> = Plane::from_vec(
            pixels.iter().map(|&p| <Fixed as Sample>::from_pixel(p)).collect(),
            3,
            2,
        )
        .unwrap();
        let taps = [0.25f32, 0.5, 0.25];
        let fixed_taps = <Fixed as Sample>::quantize_taps(&taps);
        let a = float.convolve(&taps, Axis::Horizontal).unwrap();
        let b = fixed.convolve(&fixed_taps, Axis::Horizontal).unwrap();
        for (x, y) in a.data().iter().zip(b.data()) {
            assert!((x - y.to_f32()).abs() < 1e-3);
        }
    }

    #[test]
    fn even_kernels_are_rejected() {
        let plane = Plane::<f32>::new(2, 2).unwrap();
        assert!(plane.convolve(&[0.5, 0.5], Axis::Horizontal).is_err());
    }
}
