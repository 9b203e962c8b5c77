//! Feature descriptors and library building.
//!
//! A [`FeatureDescriptor`] is a 16x16 patch cut around a corner. Patches
//! are taken from the image extended by `PATCH_SIZE / 2`, so the window
//! whose top-left sits at the corner's `(row, col)` in extended
//! coordinates is centred on the corner. Matchers use the same convention.

use crate::backend::ComputeBackend;
use crate::detect::{CornerPoint, HarrisConfig, HarrisDetector};
use crate::image::{extend_view, Image, ImageView};
use crate::trace::{trace_event, trace_span};
use crate::util::alloc::{try_reserve, try_with_capacity};
use crate::util::{CornerMatchError, CornerMatchResult};

mod patch;
mod select;

pub use patch::PatchData;

/// Side length of every descriptor patch.
pub const PATCH_SIZE: usize = 16;
/// Pixels per descriptor patch.
pub const PATCH_PIXELS: usize = PATCH_SIZE * PATCH_SIZE;

/// Immutable 16x16 patch captured at a corner.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct FeatureDescriptor {
    pixels: Vec<u8>,
    row: usize,
    col: usize,
}

impl FeatureDescriptor {
    /// Wraps `PATCH_PIXELS` row-major pixels captured at `(row, col)`.
    pub fn new(pixels: Vec<u8>, row: usize, col: usize) -> CornerMatchResult<Self> {
        if pixels.len() != PATCH_PIXELS {
            return Err(CornerMatchError::BufferTooSmall {
                needed: PATCH_PIXELS,
                got: pixels.len(),
            });
        }
        Ok(Self { pixels, row, col })
    }

    /// A patch of one intensity.
    pub fn uniform(value: u8, row: usize, col: usize) -> Self {
        Self {
            pixels: vec![value; PATCH_PIXELS],
            row,
            col,
        }
    }

    /// Copies the patch centred on `(row, col)` of an image already
    /// extended by `PATCH_SIZE / 2`.
    pub fn capture(extended: ImageView<'_, u8>, row: usize, col: usize) -> CornerMatchResult<Self> {
        let pixels = extended
            .window(row, col, PATCH_SIZE, PATCH_SIZE)?
            .to_contiguous()?;
        Self::new(pixels, row, col)
    }

    /// Row of the corner the patch was captured at.
    pub fn row(&self) -> usize {
        self.row
    }

    /// Column of the corner the patch was captured at.
    pub fn col(&self) -> usize {
        self.col
    }

    /// Row-major pixels.
    pub fn pixels(&self) -> &[u8] {
        &self.pixels
    }

    /// Borrowed view of the patch.
    pub fn view(&self) -> ImageView<'_, u8> {
        // length checked at construction
        ImageView::contiguous(&self.pixels, PATCH_SIZE, PATCH_SIZE)
    }

    /// Copies the patch into an owned image.
    pub fn to_image(&self) -> CornerMatchResult<Image> {
        Image::new(self.pixels.clone(), PATCH_SIZE, PATCH_SIZE)
    }
}

/// Library building parameters.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub struct GeneratorConfig {
    /// Most descriptors kept per library.
    pub max_features: usize,
    /// Minimum Chebyshev distance between descriptor corners.
    pub min_spacing: usize,
}

impl Default for GeneratorConfig {
    fn default() -> Self {
        Self {
            max_features: 64,
            min_spacing: 8,
        }
    }
}

impl GeneratorConfig {
    /// Rejects an empty feature budget.
    pub fn validate(&self) -> CornerMatchResult<()> {
        if self.max_features == 0 {
            return Err(CornerMatchError::InvalidInput("max_features must be positive"));
        }
        Ok(())
    }
}

/// Turns detected corners into descriptors.
pub struct FeatureGenerator<B: ComputeBackend> {
    detector: HarrisDetector<B>,
    config: GeneratorConfig,
}

impl<B: ComputeBackend> FeatureGenerator<B> {
    /// Creates a generator with its own detector on `backend`.
    pub fn new(
        harris: HarrisConfig,
        config: GeneratorConfig,
        backend: B,
    ) -> CornerMatchResult<Self> {
        config.validate()?;
        Ok(Self {
            detector: HarrisDetector::new(harris, backend)?,
            config,
        })
    }

    /// Returns the generator parameters.
    pub fn config(&self) -> &GeneratorConfig {
        &self.config
    }

    /// Returns the detector.
    pub fn detector(&self) -> &HarrisDetector<B> {
        &self.detector
    }

    /// Consumes the generator and returns its backend.
    pub fn into_backend(self) -> B {
        self.detector.into_backend()
    }

    /// Builds a library from the strongest well-separated corners.
    pub fn generate(&mut self, image: ImageView<'_, u8>) -> CornerMatchResult<Vec<FeatureDescriptor>> {
        let mut library = Vec::new();
        self.extend_library(image, &mut library)?;
        Ok(library)
    }

    /// Adds descriptors for corners of `image` that are not within
    /// `min_spacing` of a descriptor already in `library`, until the
    /// library holds `max_features`. Returns the number added.
    pub fn extend_library(
        &mut self,
        image: ImageView<'_, u8>,
        library: &mut Vec<FeatureDescriptor>,
    ) -> CornerMatchResult<usize> {
        let _span = trace_span!("feature_generate", existing = library.len()).entered();
        let room = self.config.max_features.saturating_sub(library.len());
        if room == 0 {
            return Ok(0);
        }

        let (mut corners, _) = self.detector.try_detect(image)?.into_parts();
        let spacing = self.config.min_spacing;
        corners.retain(|c| {
            library.iter().all(|d| {
                c.row.abs_diff(d.row()).max(c.col.abs_diff(d.col())) >= spacing
            })
        });
        let selected: Vec<CornerPoint> = select::thin_corners(&mut corners, spacing, room);

        let extended = extend_view(image, PATCH_SIZE / 2)?;
        let mut added = try_with_capacity(selected.len())?;
        for corner in &selected {
            added.push(FeatureDescriptor::capture(extended.view(), corner.row, corner.col)?);
        }
        let count = added.len();
        try_reserve(library, count)?;
        library.extend(added);
        trace_event!("features_added", count = count, total = library.len());
        Ok(count)
    }
}

#[cfg(test)]
mod tests {
    use super::{FeatureDescriptor, FeatureGenerator, GeneratorConfig, PATCH_SIZE};
    use crate::backend::LocalBackend;
    use crate::detect::HarrisConfig;
    use crate::image::Image;

    fn squares() -> Image {
        let mut img = Image::filled(64, 64, 30).unwrap();
        for (top, left) in [(10usize, 12usize), (36, 34)] {
            for row in top..top + 14 {
                for col in left..left + 14 {
                    img.set(row, col, 220);
                }
            }
        }
        img
    }

    #[test]
    fn capture_is_centred_on_the_corner() {
        let img = Image::new((0..=255).cycle().take(40 * 40).collect(), 40, 40).unwrap();
        let extended = img.extend(PATCH_SIZE / 2).unwrap();
        let d = FeatureDescriptor::capture(extended.view(), 20, 20).unwrap();
        // pixel (8, 8) of the patch is the corner pixel itself
        assert_eq!(d.pixels()[8 * PATCH_SIZE + 8], img.get(20, 20).unwrap());
        assert_eq!(d.view().get(0, 0).copied(), img.get(12, 12));
    }

    #[test]
    fn generator_respects_budget_and_spacing() {
        let img = squares();
        let config = GeneratorConfig {
            max_features: 3,
            min_spacing: 8,
        };
        let mut generator =
            FeatureGenerator::new(HarrisConfig::default(), config, LocalBackend::<f32>::new())
                .unwrap();
        let library = generator.generate(img.view()).unwrap();
        assert!(!library.is_empty());
        assert!(library.len() <= 3);
        for (i, a) in library.iter().enumerate() {
            for b in &library[i + 1..] {
                let dist = a.row().abs_diff(b.row()).max(a.col().abs_diff(b.col()));
                assert!(dist >= 8);
            }
        }
    }

    #[test]
    fn extending_skips_known_corners() {
        let img = squares();
        let mut generator = FeatureGenerator::new(
            HarrisConfig::default(),
            GeneratorConfig::default(),
            LocalBackend::<f32>::new(),
        )
        .unwrap();
        let mut library = generator.generate(img.view()).unwrap();
        let before = library.len();
        let added = generator.extend_library(img.view(), &mut library).unwrap();
        assert_eq!(added, 0);
        assert_eq!(library.len(), before);
    }

    #[test]
    fn descriptors_must_be_full_patches() {
        assert!(FeatureDescriptor::new(vec![0; 10], 0, 0).is_err());
    }
}
