//! Precomputed patch statistics and the NCC score.

use crate::fixed::Sample;
use crate::image::{ImageView, WindowSums};
use crate::util::alloc::try_with_capacity;
use crate::util::{CornerMatchError, CornerMatchResult};

/// Mean-removed patch and its moments, computed once per descriptor.
#[derive(Clone, Debug, PartialEq)]
pub struct PatchData<T> {
    size: usize,
    average: T,
    square_sum: T,
    normalized: Vec<T>,
    normalized_sum: T,
}

impl<T> AsRef<PatchData<T>> for PatchData<T> {
    fn as_ref(&self) -> &PatchData<T> {
        self
    }
}

impl<T: Sample> PatchData<T> {
    /// Computes the statistics of a square patch.
    pub fn compute(patch: ImageView<'_, u8>) -> CornerMatchResult<Self> {
        let size = patch.width();
        if patch.height() != size {
            return Err(CornerMatchError::InvalidInput("patch must be square"));
        }
        let count = size * size;
        let sums = WindowSums::direct(patch);
        let average = T::from_pixel_sum(sums.sum) / T::from_count(count);

        let mut normalized = try_with_capacity(count)?;
        for row in 0..size {
            let pixels = patch.row(row).ok_or(CornerMatchError::BufferTooSmall {
                needed: (row + 1) * patch.stride(),
                got: patch.as_slice().len(),
            })?;
            normalized.extend(pixels.iter().map(|&p| T::from_pixel(p) - average));
        }
        let normalized_sum = normalized.iter().fold(T::zero(), |acc, &v| acc + v);
        let square_sum = T::dot(&normalized, &normalized);

        Ok(Self {
            size,
            average,
            square_sum,
            normalized,
            normalized_sum,
        })
    }

    /// Reassembles statistics received from a backend.
    pub fn from_parts(
        size: usize,
        average: T,
        square_sum: T,
        normalized: Vec<T>,
        normalized_sum: T,
    ) -> CornerMatchResult<Self> {
        if normalized.len() != size * size {
            return Err(CornerMatchError::BufferTooSmall {
                needed: size * size,
                got: normalized.len(),
            });
        }
        Ok(Self {
            size,
            average,
            square_sum,
            normalized,
            normalized_sum,
        })
    }

    /// Side length of the patch.
    pub fn size(&self) -> usize {
        self.size
    }

    /// Mean intensity.
    pub fn average(&self) -> T {
        self.average
    }

    /// Sum of squared deviations from the mean.
    pub fn square_sum(&self) -> T {
        self.square_sum
    }

    /// Row-major deviations from the mean.
    pub fn normalized(&self) -> &[T] {
        &self.normalized
    }

    /// Sum of the deviations (zero up to rounding).
    pub fn normalized_sum(&self) -> T {
        self.normalized_sum
    }

    /// True when the patch has no texture to correlate against.
    pub fn is_homogeneous(&self) -> bool {
        self.square_sum.is_negligible()
    }

    /// NCC of this patch against an equally sized window with exact sums.
    ///
    /// Homogeneous patches or windows score zero.
    pub fn score(&self, window: ImageView<'_, u8>, sums: WindowSums) -> T {
        let count = T::from_count(self.size * self.size);
        let pixel_sum = T::from_pixel_sum(sums.sum);
        let mean = pixel_sum / count;

        let mut cross = T::zero();
        for (row, taps) in self.normalized.chunks(self.size).enumerate() {
            if let Some(pixels) = window.row(row) {
                cross = cross + T::dot_pixels(taps, pixels);
            }
        }
        let numerator = cross - mean * self.normalized_sum;
        let variance = T::from_pixel_sq_sum(sums.sum_sq) - mean * pixel_sum;

        if self.square_sum.is_negligible() || variance.is_negligible() {
            return T::zero();
        }
        let denominator = (self.square_sum * variance).sqrt();
        if denominator.is_negligible() {
            return T::zero();
        }
        numerator / denominator
    }
}
