//! Derivative-of-Gaussian and Gaussian smoothing kernels.

use crate::fixed::Sample;
use crate::util::math::{gaussian, gaussian_derivative};
use crate::util::{CornerMatchError, CornerMatchResult};

/// Generates a derivative-of-Gaussian kernel, mirrored for convolution and
/// normalized to unit absolute tap sum.
pub fn derivative_kernel(sigma: f32, size: usize) -> CornerMatchResult<Vec<f32>> {
    check(sigma, size)?;
    let half = (size / 2) as isize;
    // tap k multiplies sample (x + k - half), i.e. the mirrored kernel g'(half - k)
    let taps: Vec<f32> = (0..size as isize)
        .map(|k| gaussian_derivative((half - k) as f32, sigma))
        .collect();
    normalize_abs(taps)
}

/// Generates a Gaussian smoothing kernel normalized to unit sum.
pub fn smoothing_kernel(sigma: f32, size: usize) -> CornerMatchResult<Vec<f32>> {
    check(sigma, size)?;
    let half = (size / 2) as isize;
    let taps: Vec<f32> = (0..size as isize)
        .map(|k| gaussian((half - k) as f32, sigma))
        .collect();
    normalize_abs(taps)
}

fn check(sigma: f32, size: usize) -> CornerMatchResult<()> {
    if !(sigma.is_finite() && sigma > 0.0) {
        return Err(CornerMatchError::InvalidInput("kernel sigma must be positive"));
    }
    if size == 0 || size % 2 == 0 {
        return Err(CornerMatchError::InvalidInput(
            "kernel size must be odd and positive",
        ));
    }
    Ok(())
}

fn normalize_abs(mut taps: Vec<f32>) -> CornerMatchResult<Vec<f32>> {
    let mass: f32 = taps.iter().map(|t| t.abs()).sum();
    if mass <= f32::EPSILON {
        return Err(CornerMatchError::InvalidInput("kernel has no mass"));
    }
    for tap in taps.iter_mut() {
        *tap /= mass;
    }
    Ok(taps)
}

/// Kernels of one detector, generated once and reused across frames.
#[derive(Clone, Debug)]
pub struct KernelSet<T> {
    derivative: Vec<T>,
    smoothing: Vec<T>,
}

impl<T: Sample> KernelSet<T> {
    /// Generates and quantizes both kernels.
    pub fn generate(
        derivative_sigma: f32,
        derivative_size: usize,
        smoothing_sigma: f32,
        smoothing_size: usize,
    ) -> CornerMatchResult<Self> {
        let derivative = derivative_kernel(derivative_sigma, derivative_size)?;
        let smoothing = smoothing_kernel(smoothing_sigma, smoothing_size)?;
        Ok(Self {
            derivative: T::quantize_taps(&derivative),
            smoothing: T::quantize_taps(&smoothing),
        })
    }

    /// Mirrored derivative taps.
    pub fn derivative(&self) -> &[T] {
        &self.derivative
    }

    /// Smoothing taps.
    pub fn smoothing(&self) -> &[T] {
        &self.smoothing
    }

    /// Image border consumed by one derivative pass plus one smoothing pass.
    pub fn border(&self) -> usize {
        self.derivative.len() / 2 + self.smoothing.len() / 2
    }
}
