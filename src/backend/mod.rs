//! Compute backends for the numerically heavy primitives.
//!
//! Every detector and matcher is generic over a [`ComputeBackend`] chosen at
//! construction. [`LocalBackend`] evaluates the primitives in-process in
//! `f32` or [`Fixed`](crate::Fixed) arithmetic; [`OffloadBackend`] marshals
//! them to a coprocessor session. Both run the same kernels, so a
//! `LocalBackend<Fixed>` and an `OffloadBackend` produce identical outputs.

use crate::feature::PatchData;
use crate::fixed::Sample;
use crate::image::{Axis, ImageView, Plane};
use crate::util::CornerMatchResult;

mod local;
mod offload;
#[cfg(feature = "rayon")]
mod rayon;
pub(crate) mod scan;

pub use local::{LocalBackend, LocalFrame};
pub use offload::{DeviceFrame, DevicePatch, OffloadBackend};

/// Top-left corner of a correlation window.
#[derive(Clone, Copy, Debug, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub struct Window {
    /// Row of the top-left pixel.
    pub row: usize,
    /// Column of the top-left pixel.
    pub col: usize,
}

impl Window {
    /// Creates a window origin.
    pub fn new(row: usize, col: usize) -> Self {
        Self { row, col }
    }
}

/// Window positions evaluated by an NCC query.
#[derive(Clone, Copy, Debug)]
pub enum WindowSet<'a> {
    /// Only the listed positions.
    Points(&'a [Window]),
    /// Every position where the patch fits inside the frame.
    Dense,
}

/// Where the per-window mean and variance come from.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum WindowStats {
    /// Summed directly over each window.
    Direct,
    /// Looked up in the frame's integral tables (requires `image_data`).
    Integral,
}

/// One NCC area request.
#[derive(Clone, Copy, Debug)]
pub struct NccQuery<'a> {
    /// Positions to score.
    pub windows: WindowSet<'a>,
    /// Statistics source.
    pub stats: WindowStats,
}

/// Best-scoring window of a query.
#[derive(Clone, Copy, Debug, PartialEq)]
pub struct Peak<T> {
    /// Row of the window's top-left pixel.
    pub row: usize,
    /// Column of the window's top-left pixel.
    pub col: usize,
    /// NCC score in `[-1, 1]`.
    pub score: T,
}

/// Primitive operations a detector or matcher delegates.
pub trait ComputeBackend {
    /// Arithmetic of the backend.
    type Sample: Sample;
    /// Backend-resident patch statistics.
    type Patch: AsRef<PatchData<Self::Sample>>;
    /// Backend-resident image.
    type Frame;

    /// Short name used in logs.
    fn name(&self) -> &'static str;

    /// One separable convolution pass with replicated edges.
    fn convolve(
        &mut self,
        plane: &Plane<Self::Sample>,
        taps: &[Self::Sample],
        axis: Axis,
    ) -> CornerMatchResult<Plane<Self::Sample>>;

    /// Precomputes the matching statistics of a square patch.
    fn patch_stats(&mut self, patch: ImageView<'_, u8>) -> CornerMatchResult<Self::Patch>;

    /// Makes an image available to [`ComputeBackend::ncc_area`].
    fn load_frame(&mut self, image: ImageView<'_, u8>) -> CornerMatchResult<Self::Frame>;

    /// Precomputes the integral tables of a loaded frame.
    fn image_data(&mut self, frame: &mut Self::Frame) -> CornerMatchResult<()>;

    /// Scores `patch` against the queried windows of `frame` and returns
    /// the best one, or `None` when no window was evaluated.
    fn ncc_area(
        &mut self,
        frame: &Self::Frame,
        patch: &Self::Patch,
        query: NccQuery<'_>,
    ) -> CornerMatchResult<Option<Peak<Self::Sample>>>;
}
