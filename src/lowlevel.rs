//! Low-level building blocks for custom detection and matching pipelines.
//!
//! These items expose kernel generation, the suppression stage, window
//! statistics and the offload wire format for uses beyond the high-level
//! detector and matcher APIs. Most users should prefer [`HarrisDetector`],
//! [`FeatureGenerator`] and the matcher types.
//!
//! [`HarrisDetector`]: crate::HarrisDetector
//! [`FeatureGenerator`]: crate::FeatureGenerator

pub use crate::backend::{NccQuery, Peak, Window, WindowSet, WindowStats};
pub use crate::detect::kernels::{derivative_kernel, smoothing_kernel, KernelSet};
pub use crate::detect::nms::{Gradient, NonMaxSuppressor};
pub use crate::fixed::{Q15_SCALE, WORKING_SCALE};
pub use crate::image::{Axis, IntegralImage, Plane, WindowSums};
pub use crate::offload::protocol::{
    decode_q15, decode_scalar, encode_q15, encode_scalar, patch_record_len, Message, Opcode,
    Status,
};
