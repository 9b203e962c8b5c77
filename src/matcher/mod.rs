//! NCC matching of images against a descriptor library.
//!
//! Both matchers precompute [`PatchData`](crate::PatchData) for every
//! descriptor through their backend and count descriptors whose best
//! window scores at least the acceptance threshold. The image is accepted
//! once the matched count reaches `required = max(1, ceil(percentage% of
//! the library))`; evaluation stops at that descriptor. An empty library
//! never matches.
//!
//! [`DirectMatcher`] scores only the windows centred on detected corners,
//! summing window statistics directly. [`IntegralMatcher`] scores every
//! window with statistics from the frame's integral tables.

use crate::backend::{ComputeBackend, NccQuery};
use crate::feature::FeatureDescriptor;
use crate::fixed::Sample;
use crate::image::ImageView;
use crate::trace::{trace_event, trace_warn};
use crate::util::alloc::try_with_capacity;
use crate::util::math::required_count;
use crate::util::{CornerMatchError, CornerMatchResult};

mod direct;
mod integral;

pub use direct::DirectMatcher;
pub use integral::IntegralMatcher;

/// Acceptance parameters.
#[derive(Clone, Copy, Debug, PartialEq)]
pub struct MatchConfig {
    /// Percentage of the library that must match, in `(0, 100]`.
    pub percentage: f32,
    /// Minimum NCC score of a matching window.
    pub threshold: f32,
}

impl Default for MatchConfig {
    fn default() -> Self {
        Self {
            percentage: 75.0,
            threshold: 0.8,
        }
    }
}

impl MatchConfig {
    /// Checks the percentage range and the threshold.
    pub fn validate(&self) -> CornerMatchResult<()> {
        if !(self.percentage > 0.0 && self.percentage <= 100.0) {
            return Err(CornerMatchError::InvalidInput(
                "match percentage must be in (0, 100]",
            ));
        }
        if !self.threshold.is_finite() {
            return Err(CornerMatchError::InvalidInput("match threshold must be finite"));
        }
        Ok(())
    }
}

/// Verdict of one match call.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub struct MatchOutcome {
    /// True when `matched` reached `required`.
    pub accepted: bool,
    /// Descriptors that matched before evaluation stopped.
    pub matched: usize,
    /// Descriptors needed for acceptance.
    pub required: usize,
    /// Size of the library.
    pub library_len: usize,
}

/// Common contract of the matcher variants.
pub trait FeatureMatcher {
    /// Replaces the library. On error the previous library stays active.
    fn set_features(&mut self, descriptors: &[FeatureDescriptor]) -> CornerMatchResult<()>;

    /// Number of descriptors in the active library.
    fn library_len(&self) -> usize;

    /// Matches `image` against the library.
    fn try_match(&mut self, image: ImageView<'_, u8>) -> CornerMatchResult<MatchOutcome>;

    /// [`FeatureMatcher::try_match`] reduced to its verdict; failures are
    /// logged and read as no match.
    fn match_image(&mut self, image: ImageView<'_, u8>) -> bool {
        match self.try_match(image) {
            Ok(outcome) => outcome.accepted,
            Err(err) => {
                trace_warn!("matching failed: {err}");
                false
            }
        }
    }
}

/// Computes backend patch statistics for a whole library.
pub(crate) fn build_library<B: ComputeBackend>(
    backend: &mut B,
    descriptors: &[FeatureDescriptor],
) -> CornerMatchResult<Vec<B::Patch>> {
    let mut library = try_with_capacity(descriptors.len())?;
    for descriptor in descriptors {
        library.push(backend.patch_stats(descriptor.view())?);
    }
    trace_event!("library_built", count = library.len());
    Ok(library)
}

/// Counts matching descriptors, stopping once acceptance is reached.
pub(crate) fn count_matches<B: ComputeBackend>(
    backend: &mut B,
    frame: &B::Frame,
    library: &[B::Patch],
    query: NccQuery<'_>,
    config: &MatchConfig,
) -> CornerMatchResult<MatchOutcome> {
    let required = required_count(config.percentage, library.len());
    let threshold = B::Sample::from_f32(config.threshold);
    let mut outcome = MatchOutcome {
        accepted: false,
        matched: 0,
        required,
        library_len: library.len(),
    };

    for patch in library {
        let Some(peak) = backend.ncc_area(frame, patch, query)? else {
            continue;
        };
        if peak.score.reaches(threshold) {
            outcome.matched += 1;
            if outcome.matched >= required {
                outcome.accepted = true;
                break;
            }
        }
    }

    trace_event!(
        "match_outcome",
        matched = outcome.matched,
        required = outcome.required,
        accepted = outcome.accepted
    );
    Ok(outcome)
}

#[cfg(test)]
mod tests {
    use super::MatchConfig;

    #[test]
    fn config_rejects_out_of_range_percentage() {
        assert!(MatchConfig::default().validate().is_ok());
        let zero = MatchConfig {
            percentage: 0.0,
            ..MatchConfig::default()
        };
        assert!(zero.validate().is_err());
        let over = MatchConfig {
            percentage: 150.0,
            ..MatchConfig::default()
        };
        assert!(over.validate().is_err());
    }
}
