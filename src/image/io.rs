//! Convenience helpers for loading images via the `image` crate.
//!
//! Available when the `image-io` feature is enabled.

use crate::image::{Image, ImageView};
use crate::util::{CornerMatchError, CornerMatchResult};
use std::path::Path;

/// Creates a borrowed view from a grayscale image buffer.
pub fn view_from_gray_image(img: &image::GrayImage) -> CornerMatchResult<ImageView<'_, u8>> {
    ImageView::from_slice(img.as_raw(), img.width() as usize, img.height() as usize)
}

/// Loads an image from disk and converts it to an owned grayscale image.
pub fn load_gray_image<P: AsRef<Path>>(path: P) -> CornerMatchResult<Image> {
    let img = image::open(path).map_err(|err| CornerMatchError::ImageIo {
        reason: err.to_string(),
    })?;
    let gray = img.to_luma8();
    let width = gray.width() as usize;
    let height = gray.height() as usize;
    Image::new(gray.into_raw(), width, height)
}

/// Writes a grayscale image to disk, the format chosen by extension.
pub fn save_gray_image<P: AsRef<Path>>(img: &Image, path: P) -> CornerMatchResult<()> {
    let buffer =
        image::GrayImage::from_raw(img.width() as u32, img.height() as u32, img.pixels().to_vec())
            .ok_or(CornerMatchError::InvalidDimensions {
                width: img.width(),
                height: img.height(),
            })?;
    buffer.save(path).map_err(|err| CornerMatchError::ImageIo {
        reason: err.to_string(),
    })
}
