//! Harris corner detection.
//!
//! The detector extends the input by the combined kernel radius, takes
//! derivative-of-Gaussian gradients along rows and columns, smooths the
//! structure tensor with a separable Gaussian and evaluates the Harris
//! response `det - k * trace^2` on the original extent. The response is
//! thinned by [`NonMaxSuppressor`], min-max normalized and thresholded.
//!
//! Every convolution pass goes through the detector's [`ComputeBackend`],
//! so the same detector runs in-process or on a coprocessor.

use crate::backend::ComputeBackend;
use crate::fixed::Sample;
use crate::image::{extend_view, Axis, ImageView, Plane};
use crate::trace::{trace_event, trace_span, trace_warn};
use crate::util::alloc::try_with_capacity;
use crate::util::{CornerMatchError, CornerMatchResult};

pub mod kernels;
pub mod nms;

pub use kernels::KernelSet;
pub use nms::NonMaxSuppressor;

/// The response map carries `R * 2^RESPONSE_GAIN_BITS`. Weak corners of the
/// fixed-point path stay above one Q15 unit; suppression and min-max
/// normalization are unaffected by the gain.
pub const RESPONSE_GAIN_BITS: u32 = 13;

/// Detector parameters.
#[derive(Clone, Copy, Debug, PartialEq)]
pub struct HarrisConfig {
    /// Sigma of the derivative-of-Gaussian kernel.
    pub derivative_sigma: f32,
    /// Length of the derivative kernel (odd).
    pub derivative_size: usize,
    /// Sigma of the structure tensor smoothing kernel.
    pub smoothing_sigma: f32,
    /// Length of the smoothing kernel (odd).
    pub smoothing_size: usize,
    /// Harris sensitivity `k`.
    pub k: f32,
    /// Minimum normalized strength of an admitted corner.
    pub threshold: f32,
}

impl Default for HarrisConfig {
    fn default() -> Self {
        Self {
            derivative_sigma: 1.0,
            derivative_size: 3,
            smoothing_sigma: 2.0,
            smoothing_size: 5,
            k: 0.04,
            threshold: 0.8,
        }
    }
}

impl HarrisConfig {
    /// Checks that the kernels can be generated and the scalars are usable.
    pub fn validate(&self) -> CornerMatchResult<()> {
        for (sigma, size) in [
            (self.derivative_sigma, self.derivative_size),
            (self.smoothing_sigma, self.smoothing_size),
        ] {
            if !(sigma.is_finite() && sigma > 0.0) {
                return Err(CornerMatchError::InvalidInput("kernel sigma must be positive"));
            }
            if size == 0 || size % 2 == 0 {
                return Err(CornerMatchError::InvalidInput(
                    "kernel size must be odd and positive",
                ));
            }
        }
        if !self.k.is_finite() {
            return Err(CornerMatchError::InvalidInput("k must be finite"));
        }
        if !self.threshold.is_finite() {
            return Err(CornerMatchError::InvalidInput("threshold must be finite"));
        }
        Ok(())
    }
}

/// Detected corner in image coordinates.
#[derive(Clone, Copy, Debug, PartialEq)]
pub struct CornerPoint {
    /// Row of the corner.
    pub row: usize,
    /// Column of the corner.
    pub col: usize,
    /// Normalized response in `[0, 1]`.
    pub strength: f32,
}

/// Corners together with the suppressed response map they came from.
#[derive(Clone, Debug)]
pub struct Detection<T> {
    corners: Vec<CornerPoint>,
    response: Plane<T>,
}

impl<T> Detection<T> {
    /// Admitted corners in row-major order.
    pub fn corners(&self) -> &[CornerPoint] {
        &self.corners
    }

    /// Harris response (scaled by `2^RESPONSE_GAIN_BITS`) after non-maximum
    /// suppression.
    pub fn response(&self) -> &Plane<T> {
        &self.response
    }

    /// Splits into corners and response map.
    pub fn into_parts(self) -> (Vec<CornerPoint>, Plane<T>) {
        (self.corners, self.response)
    }
}

/// Lifecycle of a detector.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum DetectorState {
    /// Kernels not generated yet.
    Uninitialized,
    /// Kernels generated, no frame processed yet.
    KernelsReady,
    /// A frame is being processed.
    Detecting,
    /// Resting between frames.
    Idle,
}

/// Harris corner detector running its passes on backend `B`.
pub struct HarrisDetector<B: ComputeBackend> {
    config: HarrisConfig,
    backend: B,
    kernels: Option<KernelSet<B::Sample>>,
    suppressor: NonMaxSuppressor,
    state: DetectorState,
}

impl<B: ComputeBackend> HarrisDetector<B> {
    /// Creates a detector; kernels are generated on first use.
    pub fn new(config: HarrisConfig, backend: B) -> CornerMatchResult<Self> {
        config.validate()?;
        Ok(Self {
            config,
            backend,
            kernels: None,
            suppressor: NonMaxSuppressor::new(),
            state: DetectorState::Uninitialized,
        })
    }

    /// Returns the detector parameters.
    pub fn config(&self) -> &HarrisConfig {
        &self.config
    }

    /// Returns the lifecycle state.
    pub fn state(&self) -> DetectorState {
        self.state
    }

    /// Returns the backend.
    pub fn backend(&self) -> &B {
        &self.backend
    }

    /// Returns the backend mutably, e.g. to share it with a matcher.
    pub fn backend_mut(&mut self) -> &mut B {
        &mut self.backend
    }

    /// Consumes the detector and returns its backend.
    pub fn into_backend(self) -> B {
        self.backend
    }

    /// Generates the kernels. Later calls are no-ops.
    pub fn prepare(&mut self) -> CornerMatchResult<()> {
        if self.kernels.is_some() {
            return Ok(());
        }
        let kernels = KernelSet::generate(
            self.config.derivative_sigma,
            self.config.derivative_size,
            self.config.smoothing_sigma,
            self.config.smoothing_size,
        )?;
        self.kernels = Some(kernels);
        self.state = DetectorState::KernelsReady;
        Ok(())
    }

    /// Runs the full pipeline on `image`.
    pub fn try_detect(
        &mut self,
        image: ImageView<'_, u8>,
    ) -> CornerMatchResult<Detection<B::Sample>> {
        self.prepare()?;
        let _span = trace_span!(
            "harris_detect",
            backend = self.backend.name(),
            width = image.width(),
            height = image.height()
        )
        .entered();

        self.state = DetectorState::Detecting;
        let result = self.run(image);
        self.state = DetectorState::Idle;

        if let Ok(detection) = &result {
            trace_event!("harris_corners", count = detection.corners.len());
        }
        result
    }

    /// Runs the pipeline and returns the corners; any failure yields an
    /// empty list.
    pub fn detect(&mut self, image: ImageView<'_, u8>) -> Vec<CornerPoint> {
        match self.try_detect(image) {
            Ok(detection) => detection.corners,
            Err(err) => {
                trace_warn!("corner detection failed: {err}");
                Vec::new()
            }
        }
    }

    fn run(&mut self, image: ImageView<'_, u8>) -> CornerMatchResult<Detection<B::Sample>> {
        let kernels = self
            .kernels
            .as_ref()
            .ok_or(CornerMatchError::InvalidInput("detector kernels missing"))?;
        let border = kernels.border();
        let extended = extend_view(image, border)?;
        let plane = Plane::<B::Sample>::from_pixels(extended.view())?;

        let ix = self
            .backend
            .convolve(&plane, kernels.derivative(), Axis::Horizontal)?;
        let iy = self
            .backend
            .convolve(&plane, kernels.derivative(), Axis::Vertical)?;
        drop(plane);

        let ixx = ix.zip_map(&ix, |a, b| a * b)?;
        let iyy = iy.zip_map(&iy, |a, b| a * b)?;
        let ixy = ix.zip_map(&iy, |a, b| a * b)?;
        drop((ix, iy));

        let (height, width) = (image.height(), image.width());
        let smoothing = kernels.smoothing();
        let sxx = smooth(&mut self.backend, &ixx, smoothing, border, height, width)?;
        let syy = smooth(&mut self.backend, &iyy, smoothing, border, height, width)?;
        let sxy = smooth(&mut self.backend, &ixy, smoothing, border, height, width)?;

        let response = harris_response(&sxx, &syy, &sxy, B::Sample::from_f32(self.config.k))?;
        let suppressed = self.suppressor.suppress(&response)?;
        let corners = threshold_corners(&suppressed, self.config.threshold);
        Ok(Detection {
            corners,
            response: suppressed,
        })
    }
}

/// Separable Gaussian pass over a tensor component, cropped back to the
/// original extent.
fn smooth<B: ComputeBackend>(
    backend: &mut B,
    tensor: &Plane<B::Sample>,
    taps: &[B::Sample],
    border: usize,
    height: usize,
    width: usize,
) -> CornerMatchResult<Plane<B::Sample>> {
    let rows = backend.convolve(tensor, taps, Axis::Horizontal)?;
    let both = backend.convolve(&rows, taps, Axis::Vertical)?;
    both.crop(border, border, height, width)
}

/// `det - k * trace^2` per pixel with the response gain applied, negative
/// responses clamped to zero.
fn harris_response<T: Sample>(
    sxx: &Plane<T>,
    syy: &Plane<T>,
    sxy: &Plane<T>,
    k: T,
) -> CornerMatchResult<Plane<T>> {
    let mut data = try_with_capacity(sxx.data().len())?;
    for ((&a, &b), &c) in sxx.data().iter().zip(syy.data()).zip(sxy.data()) {
        let r = T::harris(a, b, c, k, RESPONSE_GAIN_BITS);
        data.push(if r.exceeds(T::zero()) { r } else { T::zero() });
    }
    Plane::from_vec(data, sxx.width(), sxx.height())
}

/// Min-max normalizes `map` and admits positive pixels at or above
/// `threshold`. A constant map has no corners.
fn threshold_corners<T: Sample>(map: &Plane<T>, threshold: f32) -> Vec<CornerPoint> {
    let data = map.data();
    let Some(&first) = data.first() else {
        return Vec::new();
    };
    let (min, max) = data.iter().fold((first, first), |(lo, hi), &v| {
        (
            if lo.exceeds(v) { v } else { lo },
            if v.exceeds(hi) { v } else { hi },
        )
    });
    if !max.exceeds(min) {
        return Vec::new();
    }
    let range = max - min;

    let mut corners = Vec::new();
    for row in 0..map.height() {
        for (col, &v) in map.row(row).iter().enumerate() {
            if !v.exceeds(T::zero()) {
                continue;
            }
            let strength = ((v - min) / range).to_f32();
            if strength >= threshold {
                corners.push(CornerPoint { row, col, strength });
            }
        }
    }
    corners
}

#[cfg(test)]
mod tests {
    use super::{threshold_corners, DetectorState, HarrisConfig, HarrisDetector};
    use crate::backend::LocalBackend;
    use crate::fixed::Fixed;
    use crate::image::{Image, Plane};

    fn square(size: usize, top: usize, side: usize) -> Image {
        let mut img = Image::filled(size, size, 20).unwrap();
        for row in top..top + side {
            for col in top..top + side {
                img.set(row, col, 230);
            }
        }
        img
    }

    #[test]
    fn square_corners_are_found() {
        let img = square(32, 10, 12);
        let mut detector =
            HarrisDetector::new(HarrisConfig::default(), LocalBackend::<f32>::new()).unwrap();
        let corners = detector.detect(img.view());
        assert!(!corners.is_empty());
        for corner in &corners {
            let near_row = corner.row.abs_diff(10) <= 2 || corner.row.abs_diff(21) <= 2;
            let near_col = corner.col.abs_diff(10) <= 2 || corner.col.abs_diff(21) <= 2;
            assert!(near_row && near_col, "{corner:?}");
            assert!(corner.strength >= 0.8);
        }
    }

    #[test]
    fn flat_image_has_no_corners() {
        let img = Image::filled(16, 16, 90).unwrap();
        let mut detector =
            HarrisDetector::new(HarrisConfig::default(), LocalBackend::<Fixed>::new()).unwrap();
        assert!(detector.detect(img.view()).is_empty());
    }

    #[test]
    fn state_moves_to_idle_after_a_frame() {
        let img = square(24, 6, 8);
        let mut detector =
            HarrisDetector::new(HarrisConfig::default(), LocalBackend::<f32>::new()).unwrap();
        assert_eq!(detector.state(), DetectorState::Uninitialized);
        detector.prepare().unwrap();
        assert_eq!(detector.state(), DetectorState::KernelsReady);
        detector.detect(img.view());
        assert_eq!(detector.state(), DetectorState::Idle);
    }

    #[test]
    fn invalid_config_is_rejected() {
        let config = HarrisConfig {
            smoothing_size: 4,
            ..HarrisConfig::default()
        };
        assert!(HarrisDetector::new(config, LocalBackend::<f32>::new()).is_err());
    }

    #[test]
    fn threshold_uses_normalized_strength() {
        let map = Plane::from_vec(vec![0.0f32, 0.5, 1.0, 0.9], 2, 2).unwrap();
        let corners = threshold_corners(&map, 0.8);
        let positions: Vec<_> = corners.iter().map(|c| (c.row, c.col)).collect();
        assert_eq!(positions, vec![(1, 0), (1, 1)]);
    }
}
