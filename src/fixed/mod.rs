//! Q-format fixed-point arithmetic.
//!
//! A [`Fixed`] stores `real * 2^scale` in an `i32`. Every binary operation
//! rescales the right operand to the left operand's scale before combining
//! them, so values of different scales can never be mixed raw. Products and
//! quotients go through an `i64` intermediate and saturate back to `i32`.
//!
//! The pipeline works at [`WORKING_SCALE`] (15), which makes the Q15 wire
//! format a plain saturating narrowing.

mod sample;

pub use sample::Sample;

use crate::trace::trace_warn;
use std::cmp::Ordering;
use std::fmt;
use std::ops::{Add, AddAssign, Div, Mul, Neg, Sub, SubAssign};

/// Scale used by every fixed-point stage of the pipeline.
pub const WORKING_SCALE: u32 = 15;

/// Scale of the 16-bit Q15 wire format.
pub const Q15_SCALE: u32 = 15;

const MAX_SCALE: u32 = 30;

/// Scaled-integer number with an explicit Q-format exponent.
#[derive(Clone, Copy)]
pub struct Fixed {
    value: i32,
    scale: u32,
}

fn saturate(wide: i64) -> i32 {
    wide.clamp(i32::MIN as i64, i32::MAX as i64) as i32
}

/// Arithmetic right shift rounding half away from zero.
fn shift_round(wide: i64, shift: u32) -> i64 {
    if shift == 0 {
        return wide;
    }
    let half = 1i64 << (shift - 1);
    if wide >= 0 {
        (wide + half) >> shift
    } else {
        -((-wide + half) >> shift)
    }
}

fn isqrt_u64(n: u64) -> u64 {
    if n < 2 {
        return n;
    }
    let mut x = (n as f64).sqrt() as u64;
    while x.checked_mul(x).map_or(true, |sq| sq > n) {
        x -= 1;
    }
    while (x + 1).checked_mul(x + 1).is_some_and(|sq| sq <= n) {
        x += 1;
    }
    x
}

impl Fixed {
    /// Zero at the working scale.
    pub const ZERO: Fixed = Fixed::from_raw(0, WORKING_SCALE);
    /// One at the working scale.
    pub const ONE: Fixed = Fixed::from_raw(1 << WORKING_SCALE, WORKING_SCALE);

    /// Wraps a raw scaled integer.
    pub const fn from_raw(value: i32, scale: u32) -> Self {
        Self { value, scale }
    }

    /// Builds a value from an integer.
    pub fn from_int(value: i32, scale: u32) -> Self {
        Self {
            value: saturate((value as i64) << scale.min(MAX_SCALE)),
            scale: scale.min(MAX_SCALE),
        }
    }

    /// Converts a float, rounding to the nearest representable value.
    pub fn from_f32(value: f32, scale: u32) -> Self {
        let scale = scale.min(MAX_SCALE);
        let scaled = (value as f64 * (1u64 << scale) as f64).round();
        let value = if scaled.is_nan() {
            0
        } else {
            scaled.clamp(i32::MIN as f64, i32::MAX as f64) as i32
        };
        Self { value, scale }
    }

    /// Converts to `f32`.
    pub fn to_f32(self) -> f32 {
        (self.value as f64 / (1u64 << self.scale) as f64) as f32
    }

    /// Raw scaled integer.
    pub fn raw(self) -> i32 {
        self.value
    }

    /// Q-format exponent.
    pub fn scale(self) -> u32 {
        self.scale
    }

    /// Returns the same quantity at another scale.
    ///
    /// Increasing the scale saturates on overflow; decreasing it rounds.
    pub fn rescale(self, scale: u32) -> Self {
        let scale = scale.min(MAX_SCALE);
        let value = match scale.cmp(&self.scale) {
            Ordering::Equal => self.value,
            Ordering::Greater => saturate((self.value as i64) << (scale - self.scale)),
            Ordering::Less => saturate(shift_round(self.value as i64, self.scale - scale)),
        };
        Self { value, scale }
    }

    /// Decodes a Q15 word.
    pub fn from_q15(word: i16) -> Self {
        Self::from_raw(word as i32, Q15_SCALE)
    }

    /// Encodes as a Q15 word, rounding and saturating to `[-1, 1)`.
    pub fn to_q15(self) -> i16 {
        let value = self.rescale(Q15_SCALE).value;
        value.clamp(i16::MIN as i32, i16::MAX as i32) as i16
    }

    /// Encodes as a Q15 word, truncating extra fractional bits toward
    /// negative infinity instead of rounding.
    pub fn to_q15_truncated(self) -> i16 {
        let value = if self.scale > Q15_SCALE {
            self.value >> (self.scale - Q15_SCALE)
        } else {
            self.rescale(Q15_SCALE).value
        };
        value.clamp(i16::MIN as i32, i16::MAX as i32) as i16
    }

    /// Rescales `rhs` to the scale of `self`.
    fn align(self, rhs: Fixed) -> i64 {
        rhs.rescale(self.scale).value as i64
    }

    /// Both raw values at the finer of the two scales, without rounding.
    fn widen_pair(self, rhs: Fixed) -> (i64, i64) {
        let scale = self.scale.max(rhs.scale);
        (
            (self.value as i64) << (scale - self.scale),
            (rhs.value as i64) << (scale - rhs.scale),
        )
    }

    /// Exact ordering of the represented quantities, ignoring the one-unit
    /// tolerance of `==`.
    pub fn cmp_exact(self, other: Fixed) -> Ordering {
        let (a, b) = self.widen_pair(other);
        a.cmp(&b)
    }

    /// `self * self`.
    pub fn square(self) -> Self {
        self * self
    }

    /// Absolute value (saturating at `i32::MAX`).
    pub fn abs(self) -> Self {
        Self {
            value: self.value.saturating_abs(),
            scale: self.scale,
        }
    }

    /// Square root.
    ///
    /// A negative input is logged and returned unchanged.
    pub fn sqrt(self) -> Self {
        if self.value < 0 {
            trace_warn!("sqrt of negative fixed value {}; returning input", self);
            return self;
        }
        let widened = (self.value as u64) << self.scale;
        Self {
            value: saturate(isqrt_u64(widened) as i64),
            scale: self.scale,
        }
    }

    /// Returns true when the value is exactly zero.
    pub fn is_zero(self) -> bool {
        self.value == 0
    }
}

/// Maps an 8-bit pixel into `[0, 1)` at the working scale by a pure shift.
///
/// This is the single pixel-to-fixed conversion used by every stage.
pub fn scale_uchar(pixel: u8) -> Fixed {
    scale_uchar_at(pixel, WORKING_SCALE)
}

/// [`scale_uchar`] for an explicit scale.
pub fn scale_uchar_at(pixel: u8, scale: u32) -> Fixed {
    let scale = scale.min(MAX_SCALE);
    let value = if scale >= 8 {
        (pixel as i32) << (scale - 8)
    } else {
        (pixel as i32) >> (8 - scale)
    };
    Fixed::from_raw(value, scale)
}

impl Default for Fixed {
    fn default() -> Self {
        Self::ZERO
    }
}

impl fmt::Debug for Fixed {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "Fixed({} @Q{} = {})", self.value, self.scale, self.to_f32())
    }
}

impl fmt::Display for Fixed {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.to_f32())
    }
}

impl Add for Fixed {
    type Output = Fixed;

    fn add(self, rhs: Fixed) -> Fixed {
        Fixed {
            value: saturate(self.value as i64 + self.align(rhs)),
            scale: self.scale,
        }
    }
}

impl Sub for Fixed {
    type Output = Fixed;

    fn sub(self, rhs: Fixed) -> Fixed {
        Fixed {
            value: saturate(self.value as i64 - self.align(rhs)),
            scale: self.scale,
        }
    }
}

impl Mul for Fixed {
    type Output = Fixed;

    fn mul(self, rhs: Fixed) -> Fixed {
        let product = self.value as i64 * self.align(rhs);
        Fixed {
            value: saturate(shift_round(product, self.scale)),
            scale: self.scale,
        }
    }
}

impl Div for Fixed {
    type Output = Fixed;

    /// Division by zero is logged and yields the dividend unchanged.
    fn div(self, rhs: Fixed) -> Fixed {
        let divisor = self.align(rhs);
        if divisor == 0 {
            trace_warn!("fixed division of {} by zero; returning dividend", self);
            return self;
        }
        let numerator = (self.value as i64) << self.scale;
        let mut quotient = numerator / divisor;
        let remainder = numerator % divisor;
        if 2 * remainder.abs() >= divisor.abs() {
            quotient += numerator.signum() * divisor.signum();
        }
        Fixed {
            value: saturate(quotient),
            scale: self.scale,
        }
    }
}

impl Neg for Fixed {
    type Output = Fixed;

    fn neg(self) -> Fixed {
        Fixed {
            value: self.value.saturating_neg(),
            scale: self.scale,
        }
    }
}

impl AddAssign for Fixed {
    fn add_assign(&mut self, rhs: Fixed) {
        *self = *self + rhs;
    }
}

impl SubAssign for Fixed {
    fn sub_assign(&mut self, rhs: Fixed) {
        *self = *self - rhs;
    }
}

/// Equal when the values differ by at most one least-significant unit at
/// the finer of the two scales.
impl PartialEq for Fixed {
    fn eq(&self, other: &Fixed) -> bool {
        self.partial_cmp(other) == Some(Ordering::Equal)
    }
}

/// Consistent with `==`: values within one unit compare `Equal`. Use
/// [`Fixed::cmp_exact`] for a strict total order.
impl PartialOrd for Fixed {
    fn partial_cmp(&self, other: &Fixed) -> Option<Ordering> {
        let (a, b) = self.widen_pair(*other);
        if (a - b).abs() <= 1 {
            Some(Ordering::Equal)
        } else {
            Some(a.cmp(&b))
        }
    }
}

#[cfg(test)]
mod tests {
    use super::{scale_uchar, scale_uchar_at, Fixed, WORKING_SCALE};
    use std::cmp::Ordering;

    #[test]
    fn multiply_and_divide_round_trip() {
        let a = Fixed::from_f32(1.5, WORKING_SCALE);
        let b = Fixed::from_f32(-0.25, WORKING_SCALE);
        assert!(((a * b).to_f32() + 0.375).abs() < 1e-4);
        assert!(((a / b).to_f32() + 6.0).abs() < 1e-4);
    }

    #[test]
    fn divide_rounds_to_nearest() {
        let one = Fixed::from_raw(1, 0);
        let three = Fixed::from_raw(3, 0);
        let two = Fixed::from_raw(2, 0);
        assert_eq!((two / three).raw(), 1);
        assert_eq!((one / three).raw(), 0);
        assert_eq!((-two / three).raw(), -1);
    }

    #[test]
    fn operations_rescale_right_operand() {
        let a = Fixed::from_f32(0.5, 15);
        let b = Fixed::from_f32(0.25, 8);
        let sum = a + b;
        assert_eq!(sum.scale(), 15);
        assert!((sum.to_f32() - 0.75).abs() < 1e-6);

        let c = b + a;
        assert_eq!(c.scale(), 8);
        assert!((c.to_f32() - 0.75).abs() < 1e-2);
    }

    #[test]
    fn sqrt_of_square_recovers_value() {
        let x = Fixed::from_f32(3.0, WORKING_SCALE);
        assert!((x.square().sqrt().to_f32() - 3.0).abs() < 1e-3);
        let quarter = Fixed::from_f32(0.25, WORKING_SCALE);
        assert!((quarter.sqrt().to_f32() - 0.5).abs() < 1e-4);
    }

    #[test]
    fn scale_uchar_is_a_pure_shift() {
        assert_eq!(scale_uchar(0).raw(), 0);
        assert_eq!(scale_uchar(255).raw(), 255 << 7);
        assert_eq!(scale_uchar(128).to_f32(), 0.5);
        assert_eq!(scale_uchar_at(200, 4).raw(), 200 >> 4);
    }

    #[test]
    fn ordering_agrees_with_tolerant_equality() {
        let a = Fixed::from_raw(100, 15);
        let b = Fixed::from_raw(101, 15);
        assert!(a == b);
        assert!(!(a < b) && !(a > b));
        assert_eq!(a.cmp_exact(b), Ordering::Less);
        assert!(a < Fixed::from_raw(102, 15));
    }

    #[test]
    fn equality_is_symmetric_across_scales() {
        let coarse = Fixed::from_raw(1, 1);
        let fine = Fixed::from_raw(1 << 14, 15);
        let near = Fixed::from_raw((1 << 14) + 1, 15);
        let far = Fixed::from_raw((1 << 14) + 2, 15);
        assert!(coarse == fine && fine == coarse);
        assert!(coarse == near && near == coarse);
        assert!(coarse != far && far != coarse);
        assert!(coarse < far && far > coarse);
    }

    #[test]
    fn q15_truncation_differs_from_rounding() {
        let v = Fixed::from_raw(3, 17);
        assert_eq!(v.to_q15(), 1);
        assert_eq!(v.to_q15_truncated(), 0);
    }
}
