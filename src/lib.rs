//! CornerMatch is a corner-feature image matcher built on Harris detection
//! and normalized cross-correlation.
//!
//! The crate detects Harris corners, cuts 16x16 descriptor patches around
//! them and accepts a query image when enough descriptors correlate with
//! it. Every numeric stage runs over a [`Sample`] type, either `f32` or the
//! Q15 [`Fixed`] type, and over a [`ComputeBackend`]: the in-process
//! [`LocalBackend`] (optionally parallel via the `rayon` feature) or the
//! [`OffloadBackend`], which drives a co-processor through shared memory
//! and a message protocol.
//!
//! Two matchers are provided. [`DirectMatcher`] scores only the windows
//! centred on detected corners; [`IntegralMatcher`] scores every window
//! using integral-image statistics.

pub mod backend;
pub mod detect;
pub mod feature;
pub mod fixed;
pub mod image;
pub mod lowlevel;
pub mod matcher;
pub mod offload;
mod trace;
pub mod util;

pub use backend::{ComputeBackend, LocalBackend, OffloadBackend};
pub use detect::{CornerPoint, Detection, DetectorState, HarrisConfig, HarrisDetector};
pub use feature::{
    FeatureDescriptor, FeatureGenerator, GeneratorConfig, PatchData, PATCH_SIZE,
};
pub use fixed::{Fixed, Sample};
pub use image::{Image, ImageView};
pub use matcher::{DirectMatcher, FeatureMatcher, IntegralMatcher, MatchConfig, MatchOutcome};
pub use offload::{Session, SessionState, SharedMemory};
pub use util::{CornerMatchError, CornerMatchResult, ErrorKind};
