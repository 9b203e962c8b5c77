//! Corner-restricted matcher.

use crate::backend::{ComputeBackend, NccQuery, Window, WindowSet, WindowStats};
use crate::detect::{CornerPoint, HarrisConfig, HarrisDetector};
use crate::feature::{FeatureDescriptor, PATCH_SIZE};
use crate::image::{extend_view, ImageView};
use crate::matcher::{build_library, count_matches, FeatureMatcher, MatchConfig, MatchOutcome};
use crate::trace::{trace_event, trace_span};
use crate::util::alloc::{try_filled, try_with_capacity};
use crate::util::CornerMatchResult;

/// Scores each descriptor against the windows around the corners its own
/// detector finds in the query image.
///
/// A corner at `(r, c)` is the top-left of its centred window in the image
/// extended by `PATCH_SIZE / 2`. Every window overlapping that centred
/// window is a candidate, so a feature is found as long as one corner falls
/// on or near it. The candidates are a subset of the windows the
/// [`IntegralMatcher`](crate::IntegralMatcher) scans.
pub struct DirectMatcher<B: ComputeBackend> {
    detector: HarrisDetector<B>,
    config: MatchConfig,
    library: Vec<B::Patch>,
}

impl<B: ComputeBackend> DirectMatcher<B> {
    /// Creates a matcher with an empty library.
    pub fn new(harris: HarrisConfig, config: MatchConfig, backend: B) -> CornerMatchResult<Self> {
        config.validate()?;
        Ok(Self {
            detector: HarrisDetector::new(harris, backend)?,
            config,
            library: Vec::new(),
        })
    }

    /// Returns the acceptance parameters.
    pub fn config(&self) -> &MatchConfig {
        &self.config
    }

    /// Returns the detector.
    pub fn detector(&self) -> &HarrisDetector<B> {
        &self.detector
    }

    /// Returns the precomputed library.
    pub fn library(&self) -> &[B::Patch] {
        &self.library
    }
}

impl<B: ComputeBackend> FeatureMatcher for DirectMatcher<B> {
    fn set_features(&mut self, descriptors: &[FeatureDescriptor]) -> CornerMatchResult<()> {
        let library = build_library(self.detector.backend_mut(), descriptors)?;
        self.library = library;
        Ok(())
    }

    fn library_len(&self) -> usize {
        self.library.len()
    }

    fn try_match(&mut self, image: ImageView<'_, u8>) -> CornerMatchResult<MatchOutcome> {
        let _span = trace_span!("direct_match", library = self.library.len()).entered();
        let (corners, _) = self.detector.try_detect(image)?.into_parts();
        let windows = corner_windows(&corners, image.height(), image.width())?;
        trace_event!("direct_windows", corners = corners.len(), windows = windows.len());

        let extended = extend_view(image, PATCH_SIZE / 2)?;
        let backend = self.detector.backend_mut();
        let frame = backend.load_frame(extended.view())?;
        let query = NccQuery {
            windows: WindowSet::Points(&windows),
            stats: WindowStats::Direct,
        };
        count_matches(backend, &frame, &self.library, query, &self.config)
    }
}

/// Row-major, duplicate-free windows overlapping the centred window of any
/// corner. Window origins range over `0..=height` x `0..=width` in the
/// extended image.
fn corner_windows(
    corners: &[CornerPoint],
    height: usize,
    width: usize,
) -> CornerMatchResult<Vec<Window>> {
    let reach = PATCH_SIZE - 1;
    let cols = width + 1;
    let mut marked = try_filled((height + 1) * cols, false)?;
    let mut count = 0usize;
    for corner in corners {
        let rows = corner.row.saturating_sub(reach)..=(corner.row + reach).min(height);
        for row in rows {
            let span = corner.col.saturating_sub(reach)..=(corner.col + reach).min(width);
            for col in span {
                let cell = &mut marked[row * cols + col];
                if !*cell {
                    *cell = true;
                    count += 1;
                }
            }
        }
    }

    let mut windows = try_with_capacity(count)?;
    for (index, _) in marked.iter().enumerate().filter(|(_, m)| **m) {
        windows.push(Window::new(index / cols, index % cols));
    }
    Ok(windows)
}

#[cfg(test)]
mod tests {
    use super::{corner_windows, DirectMatcher};
    use crate::backend::{LocalBackend, Window};
    use crate::detect::{CornerPoint, HarrisConfig};
    use crate::feature::{FeatureDescriptor, PATCH_SIZE};
    use crate::fixed::Fixed;
    use crate::image::Image;
    use crate::matcher::{FeatureMatcher, MatchConfig};

    fn corner(row: usize, col: usize) -> CornerPoint {
        CornerPoint {
            row,
            col,
            strength: 1.0,
        }
    }

    #[test]
    fn windows_cover_the_corner_neighbourhood_once() {
        let windows = corner_windows(&[corner(20, 20), corner(21, 20)], 64, 64).unwrap();
        assert_eq!(windows.len(), 32 * 31);
        assert!(windows.windows(2).all(|w| w[0] < w[1]));
        assert_eq!(windows.first(), Some(&Window::new(5, 5)));
        assert_eq!(windows.last(), Some(&Window::new(36, 35)));
    }

    #[test]
    fn windows_are_clipped_to_the_extended_frame() {
        let windows = corner_windows(&[corner(0, 31)], 32, 32).unwrap();
        assert!(windows.iter().all(|w| w.row <= 15 && w.col >= 16 && w.col <= 32));
        assert_eq!(windows.len(), 16 * 17);
        assert!(corner_windows(&[], 32, 32).unwrap().is_empty());
    }

    #[test]
    fn pasted_patch_is_found_off_centre() {
        let pixels: Vec<u8> = (0..PATCH_SIZE * PATCH_SIZE)
            .map(|i| {
                let (r, c) = (i / PATCH_SIZE, i % PATCH_SIZE);
                ((r * r * 13 + c * c * 7 + r * c * 5) % 251) as u8
            })
            .collect();
        let patch = Image::new(pixels.clone(), PATCH_SIZE, PATCH_SIZE).unwrap();
        let mut scene = Image::filled(64, 64, 128).unwrap();
        scene.paste(patch.view(), 20, 20);

        let mut matcher = DirectMatcher::new(
            HarrisConfig::default(),
            MatchConfig::default(),
            LocalBackend::<Fixed>::new(),
        )
        .unwrap();
        matcher
            .set_features(&[FeatureDescriptor::new(pixels, 28, 28).unwrap()])
            .unwrap();
        assert!(matcher.try_match(scene.view()).unwrap().accepted);
        assert!(!matcher.match_image(Image::filled(64, 64, 0).unwrap().view()));
    }
}
