//! In-process backend.

use std::marker::PhantomData;

use crate::backend::{scan, ComputeBackend, NccQuery, Peak};
use crate::feature::PatchData;
use crate::fixed::Sample;
use crate::image::{Axis, Image, ImageView, IntegralImage, Plane};
use crate::util::CornerMatchResult;

/// Image held by a [`LocalBackend`].
#[derive(Clone, Debug)]
pub struct LocalFrame {
    image: Image,
    integral: Option<IntegralImage>,
}

impl LocalFrame {
    /// Returns the frame pixels.
    pub fn image(&self) -> &Image {
        &self.image
    }

    /// Returns the integral tables once `image_data` ran.
    pub fn integral(&self) -> Option<&IntegralImage> {
        self.integral.as_ref()
    }
}

/// Evaluates every primitive in-process with sample type `T`.
#[derive(Clone, Copy, Debug)]
pub struct LocalBackend<T> {
    parallel: bool,
    _sample: PhantomData<T>,
}

impl<T: Sample> Default for LocalBackend<T> {
    fn default() -> Self {
        Self::new()
    }
}

impl<T: Sample> LocalBackend<T> {
    /// Creates a sequential backend.
    pub fn new() -> Self {
        Self {
            parallel: false,
            _sample: PhantomData,
        }
    }

    /// Creates a backend that splits convolution and dense scans by rows.
    #[cfg(feature = "rayon")]
    pub fn parallel() -> Self {
        Self {
            parallel: true,
            _sample: PhantomData,
        }
    }

    /// Returns true when row-parallel execution is enabled.
    pub fn is_parallel(&self) -> bool {
        self.parallel
    }
}

impl<T: Sample> ComputeBackend for LocalBackend<T> {
    type Sample = T;
    type Patch = PatchData<T>;
    type Frame = LocalFrame;

    fn name(&self) -> &'static str {
        if self.parallel {
            "local-parallel"
        } else {
            "local"
        }
    }

    fn convolve(&mut self, plane: &Plane<T>, taps: &[T], axis: Axis) -> CornerMatchResult<Plane<T>> {
        #[cfg(feature = "rayon")]
        if self.parallel {
            return super::rayon::convolve_par(plane, taps, axis);
        }
        plane.convolve(taps, axis)
    }

    fn patch_stats(&mut self, patch: ImageView<'_, u8>) -> CornerMatchResult<PatchData<T>> {
        PatchData::compute(patch)
    }

    fn load_frame(&mut self, image: ImageView<'_, u8>) -> CornerMatchResult<LocalFrame> {
        Ok(LocalFrame {
            image: Image::from_view(image)?,
            integral: None,
        })
    }

    fn image_data(&mut self, frame: &mut LocalFrame) -> CornerMatchResult<()> {
        frame.integral = Some(IntegralImage::build(frame.image.view())?);
        Ok(())
    }

    fn ncc_area(
        &mut self,
        frame: &LocalFrame,
        patch: &PatchData<T>,
        query: NccQuery<'_>,
    ) -> CornerMatchResult<Option<Peak<T>>> {
        let image = frame.image.view();
        let integral = frame.integral.as_ref();
        #[cfg(feature = "rayon")]
        if self.parallel {
            if let super::WindowSet::Dense = query.windows {
                return super::rayon::dense_scan_par(image, integral, patch, query.stats);
            }
        }
        scan::best_window(image, integral, patch, query.windows, query.stats)
    }
}

#[cfg(test)]
mod tests {
    use super::LocalBackend;
    use crate::backend::{ComputeBackend, NccQuery, Window, WindowSet, WindowStats};
    use crate::fixed::Fixed;
    use crate::image::Image;
    use crate::util::CornerMatchError;

    #[test]
    fn integral_query_needs_image_data() {
        let mut backend = LocalBackend::<Fixed>::new();
        let image = Image::new((0..=255).collect(), 16, 16).unwrap();
        let patch = backend.patch_stats(image.view()).unwrap();
        let mut frame = backend.load_frame(image.view()).unwrap();
        let points = [Window::new(0, 0)];
        let query = NccQuery {
            windows: WindowSet::Points(&points),
            stats: WindowStats::Integral,
        };
        assert_eq!(
            backend.ncc_area(&frame, &patch, query).unwrap_err(),
            CornerMatchError::MissingImageData
        );

        backend.image_data(&mut frame).unwrap();
        let peak = backend.ncc_area(&frame, &patch, query).unwrap().unwrap();
        assert_eq!((peak.row, peak.col), (0, 0));
        assert!(peak.score.to_f32() > 0.99);
    }
}
