//! Full-image matcher with integral-image statistics.

use crate::backend::{ComputeBackend, NccQuery, WindowSet, WindowStats};
use crate::feature::{FeatureDescriptor, PATCH_SIZE};
use crate::image::{extend_view, ImageView};
use crate::matcher::{build_library, count_matches, FeatureMatcher, MatchConfig, MatchOutcome};
use crate::trace::trace_span;
use crate::util::CornerMatchResult;

/// Scores each descriptor against every window of the query image, taking
/// window means and variances from the frame's integral tables.
///
/// The candidate set is a superset of the corner windows the
/// [`DirectMatcher`](crate::DirectMatcher) evaluates.
pub struct IntegralMatcher<B: ComputeBackend> {
    backend: B,
    config: MatchConfig,
    library: Vec<B::Patch>,
}

impl<B: ComputeBackend> IntegralMatcher<B> {
    /// Creates a matcher with an empty library.
    pub fn new(config: MatchConfig, backend: B) -> CornerMatchResult<Self> {
        config.validate()?;
        Ok(Self {
            backend,
            config,
            library: Vec::new(),
        })
    }

    /// Returns the acceptance parameters.
    pub fn config(&self) -> &MatchConfig {
        &self.config
    }

    /// Returns the backend.
    pub fn backend(&self) -> &B {
        &self.backend
    }

    /// Returns the precomputed library.
    pub fn library(&self) -> &[B::Patch] {
        &self.library
    }
}

impl<B: ComputeBackend> FeatureMatcher for IntegralMatcher<B> {
    fn set_features(&mut self, descriptors: &[FeatureDescriptor]) -> CornerMatchResult<()> {
        let library = build_library(&mut self.backend, descriptors)?;
        self.library = library;
        Ok(())
    }

    fn library_len(&self) -> usize {
        self.library.len()
    }

    fn try_match(&mut self, image: ImageView<'_, u8>) -> CornerMatchResult<MatchOutcome> {
        let _span = trace_span!("integral_match", library = self.library.len()).entered();
        let extended = extend_view(image, PATCH_SIZE / 2)?;
        let mut frame = self.backend.load_frame(extended.view())?;
        self.backend.image_data(&mut frame)?;
        let query = NccQuery {
            windows: WindowSet::Dense,
            stats: WindowStats::Integral,
        };
        count_matches(&mut self.backend, &frame, &self.library, query, &self.config)
    }
}
