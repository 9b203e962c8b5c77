//! Mathematical helpers for kernel generation and match bookkeeping.

/// Samples an unnormalized Gaussian `exp(-x^2 / (2 sigma^2))`.
pub(crate) fn gaussian(x: f32, sigma: f32) -> f32 {
    (-(x * x) / (2.0 * sigma * sigma)).exp()
}

/// Samples the derivative of the unnormalized Gaussian at `x`.
pub(crate) fn gaussian_derivative(x: f32, sigma: f32) -> f32 {
    -x / (sigma * sigma) * gaussian(x, sigma)
}

/// Number of items out of `total` needed to reach `percentage` percent.
///
/// Always at least one so that an empty fraction never counts as reached.
pub(crate) fn required_count(percentage: f32, total: usize) -> usize {
    let needed = (percentage / 100.0 * total as f32).ceil();
    (needed.max(1.0) as usize).min(total.max(1))
}

#[cfg(test)]
mod tests {
    use super::{gaussian, gaussian_derivative, required_count};

    #[test]
    fn gaussian_peaks_at_origin() {
        assert!((gaussian(0.0, 2.0) - 1.0).abs() < 1e-6);
        assert!(gaussian(1.0, 2.0) < 1.0);
        assert!((gaussian(-1.5, 2.0) - gaussian(1.5, 2.0)).abs() < 1e-6);
    }

    #[test]
    fn gaussian_derivative_is_odd() {
        assert_eq!(gaussian_derivative(0.0, 1.0), 0.0);
        assert!(gaussian_derivative(1.0, 1.0) < 0.0);
        assert!((gaussian_derivative(-1.0, 1.0) + gaussian_derivative(1.0, 1.0)).abs() < 1e-6);
    }

    #[test]
    fn required_count_rounds_up() {
        assert_eq!(required_count(75.0, 4), 3);
        assert_eq!(required_count(75.0, 5), 4);
        assert_eq!(required_count(100.0, 3), 3);
        assert_eq!(required_count(0.0, 3), 1);
        assert_eq!(required_count(75.0, 0), 1);
    }
}
