//! Numeric sample abstraction shared by the float and fixed-point paths.

use super::{saturate, scale_uchar, shift_round, Fixed, WORKING_SCALE};
use std::cmp::Ordering;
use std::fmt::Debug;
use std::ops::{Add, Div, Mul, Neg, Sub};

/// Arithmetic needed by the detector, the backends and the matchers.
///
/// Pixels always enter through [`Sample::from_pixel`] (or the sum helpers,
/// which equal the sum of `from_pixel` values), so both implementations see
/// intensities in `[0, 1)`.
pub trait Sample:
    Copy
    + Default
    + Debug
    + PartialOrd
    + Send
    + Sync
    + 'static
    + Add<Output = Self>
    + Sub<Output = Self>
    + Mul<Output = Self>
    + Div<Output = Self>
    + Neg<Output = Self>
{
    /// Short name used in logs.
    const NAME: &'static str;

    /// Additive identity.
    fn zero() -> Self;
    /// Multiplicative identity.
    fn one() -> Self;
    /// Converts from `f32`.
    fn from_f32(value: f32) -> Self;
    /// Converts to `f32`.
    fn to_f32(self) -> f32;
    /// Maps a pixel into `[0, 1)`.
    fn from_pixel(pixel: u8) -> Self;
    /// Sum of `from_pixel` over pixels whose integer sum is `sum`.
    fn from_pixel_sum(sum: u64) -> Self;
    /// Sum of `from_pixel(p)^2` over pixels whose integer square sum is `sum`.
    fn from_pixel_sq_sum(sum: u64) -> Self;
    /// Converts an element count.
    fn from_count(count: usize) -> Self;
    /// Square root.
    fn sqrt(self) -> Self;
    /// Absolute value.
    fn abs(self) -> Self;
    /// True for values too small to divide by (including negatives).
    fn is_negligible(self) -> bool;
    /// Dot product with a widened accumulator.
    fn dot(a: &[Self], b: &[Self]) -> Self;
    /// Dot product against raw pixels (each mapped by `from_pixel`).
    fn dot_pixels(a: &[Self], pixels: &[u8]) -> Self;
    /// Quantizes kernel taps whose absolute sum is one without letting the
    /// absolute sum grow above one.
    fn quantize_taps(taps: &[f32]) -> Vec<Self>;
    /// Strict ordering; `None` only for unordered floats.
    fn exact_cmp(self, other: Self) -> Option<Ordering>;
    /// `(sxx * syy - sxy^2 - k * (sxx + syy)^2) * 2^gain_bits`.
    ///
    /// The fixed-point version keeps the products in a widened accumulator,
    /// so responses far below one Q15 unit survive the gain.
    fn harris(sxx: Self, syy: Self, sxy: Self, k: Self, gain_bits: u32) -> Self;

    /// `self > other` under [`Sample::exact_cmp`].
    fn exceeds(self, other: Self) -> bool {
        self.exact_cmp(other) == Some(Ordering::Greater)
    }

    /// `self >= other` under [`Sample::exact_cmp`].
    fn reaches(self, other: Self) -> bool {
        matches!(
            self.exact_cmp(other),
            Some(Ordering::Greater | Ordering::Equal)
        )
    }
}

impl Sample for f32 {
    const NAME: &'static str = "f32";

    fn zero() -> Self {
        0.0
    }

    fn one() -> Self {
        1.0
    }

    fn from_f32(value: f32) -> Self {
        value
    }

    fn to_f32(self) -> f32 {
        self
    }

    fn from_pixel(pixel: u8) -> Self {
        pixel as f32 / 256.0
    }

    fn from_pixel_sum(sum: u64) -> Self {
        (sum as f64 / 256.0) as f32
    }

    fn from_pixel_sq_sum(sum: u64) -> Self {
        (sum as f64 / 65536.0) as f32
    }

    fn from_count(count: usize) -> Self {
        count as f32
    }

    fn sqrt(self) -> Self {
        f32::sqrt(self)
    }

    fn abs(self) -> Self {
        f32::abs(self)
    }

    fn is_negligible(self) -> bool {
        self <= 1e-6
    }

    fn dot(a: &[Self], b: &[Self]) -> Self {
        a.iter().zip(b).map(|(x, y)| x * y).sum()
    }

    fn dot_pixels(a: &[Self], pixels: &[u8]) -> Self {
        a.iter()
            .zip(pixels)
            .map(|(x, &p)| x * Self::from_pixel(p))
            .sum()
    }

    fn quantize_taps(taps: &[f32]) -> Vec<Self> {
        taps.to_vec()
    }

    fn exact_cmp(self, other: Self) -> Option<Ordering> {
        self.partial_cmp(&other)
    }

    fn harris(sxx: Self, syy: Self, sxy: Self, k: Self, gain_bits: u32) -> Self {
        let trace = sxx + syy;
        let r = sxx * syy - sxy * sxy - k * trace * trace;
        r * (1u64 << gain_bits) as f32
    }
}

impl Sample for Fixed {
    const NAME: &'static str = "fixed";

    fn zero() -> Self {
        Fixed::ZERO
    }

    fn one() -> Self {
        Fixed::ONE
    }

    fn from_f32(value: f32) -> Self {
        Fixed::from_f32(value, WORKING_SCALE)
    }

    fn to_f32(self) -> f32 {
        Fixed::to_f32(self)
    }

    fn from_pixel(pixel: u8) -> Self {
        scale_uchar(pixel)
    }

    fn from_pixel_sum(sum: u64) -> Self {
        let wide = (sum.min(i64::MAX as u64 >> 8) as i64) << (WORKING_SCALE - 8);
        Fixed::from_raw(saturate(wide), WORKING_SCALE)
    }

    fn from_pixel_sq_sum(sum: u64) -> Self {
        // (p / 256)^2 at scale 15 is p^2 / 2, truncated once over the sum.
        let wide = (sum >> (16 - WORKING_SCALE)).min(i64::MAX as u64) as i64;
        Fixed::from_raw(saturate(wide), WORKING_SCALE)
    }

    fn from_count(count: usize) -> Self {
        Fixed::from_int(count.min(i32::MAX as usize) as i32, WORKING_SCALE)
    }

    fn sqrt(self) -> Self {
        Fixed::sqrt(self)
    }

    fn abs(self) -> Self {
        Fixed::abs(self)
    }

    fn is_negligible(self) -> bool {
        self.raw() <= 0
    }

    fn dot(a: &[Self], b: &[Self]) -> Self {
        let mut acc = 0i64;
        for (x, y) in a.iter().zip(b) {
            let x = x.rescale(WORKING_SCALE).raw() as i64;
            let y = y.rescale(WORKING_SCALE).raw() as i64;
            acc += x * y;
        }
        Fixed::from_raw(saturate(shift_round(acc, WORKING_SCALE)), WORKING_SCALE)
    }

    fn dot_pixels(a: &[Self], pixels: &[u8]) -> Self {
        let mut acc = 0i64;
        for (x, &p) in a.iter().zip(pixels) {
            let x = x.rescale(WORKING_SCALE).raw() as i64;
            acc += x * scale_uchar(p).raw() as i64;
        }
        Fixed::from_raw(saturate(shift_round(acc, WORKING_SCALE)), WORKING_SCALE)
    }

    fn quantize_taps(taps: &[f32]) -> Vec<Self> {
        let limit = 1i64 << WORKING_SCALE;
        let mut raw: Vec<i32> = taps
            .iter()
            .map(|&t| Fixed::from_f32(t, WORKING_SCALE).raw())
            .collect();
        loop {
            let total: i64 = raw.iter().map(|v| (*v as i64).abs()).sum();
            if total <= limit {
                break;
            }
            let Some(largest) = (0..raw.len()).max_by_key(|&i| raw[i].abs()) else {
                break;
            };
            raw[largest] -= raw[largest].signum();
        }
        raw.into_iter()
            .map(|v| Fixed::from_raw(v, WORKING_SCALE))
            .collect()
    }

    fn exact_cmp(self, other: Self) -> Option<Ordering> {
        Some(self.cmp_exact(other))
    }

    fn harris(sxx: Self, syy: Self, sxy: Self, k: Self, gain_bits: u32) -> Self {
        let raw = |v: Fixed| v.rescale(WORKING_SCALE).raw() as i128;
        let (a, b, c, k) = (raw(sxx), raw(syy), raw(sxy), raw(k));
        let trace = a + b;
        // both terms at 3 * WORKING_SCALE
        let det = (a * b - c * c) << WORKING_SCALE;
        let damping = k * trace * trace;
        let wide = det - damping;
        let shift = (2 * WORKING_SCALE).saturating_sub(gain_bits);
        let narrowed = wide.clamp(i64::MIN as i128, i64::MAX as i128) as i64;
        Fixed::from_raw(saturate(shift_round(narrowed, shift)), WORKING_SCALE)
    }
}

#[cfg(test)]
mod tests {
    use super::Sample;
    use crate::fixed::Fixed;

    #[test]
    fn pixel_sums_match_elementwise_conversion() {
        let pixels = [0u8, 17, 128, 255, 3];
        let sum: u64 = pixels.iter().map(|&p| p as u64).sum();
        let mut expected = Fixed::ZERO;
        for &p in &pixels {
            expected += <Fixed as Sample>::from_pixel(p);
        }
        assert_eq!(<Fixed as Sample>::from_pixel_sum(sum).raw(), expected.raw());

        let float_sum: f32 = pixels.iter().map(|&p| <f32 as Sample>::from_pixel(p)).sum();
        assert!((<f32 as Sample>::from_pixel_sum(sum) - float_sum).abs() < 1e-6);
    }

    #[test]
    fn fixed_harris_keeps_responses_below_one_unit() {
        let q = <Fixed as Sample>::from_f32;
        let (a, k) = (q(0.001), q(0.04));
        // the plain Q15 product already rounds to zero
        assert_eq!((a * a).raw(), 0);

        let fixed = <Fixed as Sample>::harris(a, a, Fixed::ZERO, k, 13);
        let float = <f32 as Sample>::harris(a.to_f32(), a.to_f32(), 0.0, k.to_f32(), 13);
        assert!(fixed.raw() > 0);
        assert!((fixed.to_f32() - float).abs() < 2.0 / 32768.0);
    }

    #[test]
    fn quantized_taps_never_exceed_unit_mass() {
        let taps = [0.2f32, 0.2, 0.2, 0.2, 0.2];
        let q = <Fixed as Sample>::quantize_taps(&taps);
        let mass: i64 = q.iter().map(|t| t.raw().abs() as i64).sum();
        assert!(mass <= 1 << 15);
        assert_eq!(q.len(), 5);
    }

    #[test]
    fn fixed_dot_matches_float_dot() {
        let a: Vec<Fixed> = [0.5f32, -0.25, 0.125]
            .iter()
            .map(|&v| <Fixed as Sample>::from_f32(v))
            .collect();
        let b: Vec<Fixed> = [0.5f32, 0.5, 0.5]
            .iter()
            .map(|&v| <Fixed as Sample>::from_f32(v))
            .collect();
        assert!((<Fixed as Sample>::dot(&a, &b).to_f32() - 0.1875).abs() < 1e-4);
    }
}
