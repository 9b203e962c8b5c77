//! Owned grayscale raster.

use crate::image::ImageView;
use crate::util::alloc::try_filled;
use crate::util::{CornerMatchError, CornerMatchResult};

/// Owned contiguous grayscale image.
///
/// The pixel buffer is never shared: `clone` deep-copies and
/// [`Image::extend`] produces a new, independently owned image.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct Image {
    pixels: Vec<u8>,
    width: usize,
    height: usize,
}

impl Image {
    /// Wraps a row-major buffer of exactly `width * height` pixels.
    pub fn new(pixels: Vec<u8>, width: usize, height: usize) -> CornerMatchResult<Self> {
        if width == 0 || height == 0 {
            return Err(CornerMatchError::InvalidDimensions { width, height });
        }
        let needed = width
            .checked_mul(height)
            .ok_or(CornerMatchError::InvalidDimensions { width, height })?;
        if pixels.len() < needed {
            return Err(CornerMatchError::BufferTooSmall {
                needed,
                got: pixels.len(),
            });
        }
        if pixels.len() > needed {
            return Err(CornerMatchError::InvalidDimensions { width, height });
        }
        Ok(Self {
            pixels,
            width,
            height,
        })
    }

    /// Creates an image filled with `value`.
    pub fn filled(width: usize, height: usize, value: u8) -> CornerMatchResult<Self> {
        let len = width
            .checked_mul(height)
            .ok_or(CornerMatchError::InvalidDimensions { width, height })?;
        Self::new(try_filled(len, value)?, width, height)
    }

    /// Deep-copies a (possibly strided) view.
    pub fn from_view(view: ImageView<'_, u8>) -> CornerMatchResult<Self> {
        Self::new(view.to_contiguous()?, view.width(), view.height())
    }

    /// Returns the image width in pixels.
    pub fn width(&self) -> usize {
        self.width
    }

    /// Returns the image height in pixels.
    pub fn height(&self) -> usize {
        self.height
    }

    /// Returns the row-major pixel buffer.
    pub fn pixels(&self) -> &[u8] {
        &self.pixels
    }

    /// Returns the pixel at `(row, col)`.
    pub fn get(&self, row: usize, col: usize) -> Option<u8> {
        if row >= self.height || col >= self.width {
            return None;
        }
        self.pixels.get(row * self.width + col).copied()
    }

    /// Sets the pixel at `(row, col)`; out-of-range writes are ignored.
    pub fn set(&mut self, row: usize, col: usize, value: u8) {
        if row < self.height && col < self.width {
            self.pixels[row * self.width + col] = value;
        }
    }

    /// Copies `src` so that its top-left pixel lands on `(row, col)`,
    /// clipping whatever falls outside this image.
    pub fn paste(&mut self, src: ImageView<'_, u8>, row: usize, col: usize) {
        for r in 0..src.height() {
            let Some(src_row) = src.row(r) else { break };
            let dst_row = row + r;
            if dst_row >= self.height {
                break;
            }
            for (c, &value) in src_row.iter().enumerate() {
                self.set(dst_row, col + c, value);
            }
        }
    }

    /// Returns a borrowed view of the image.
    pub fn view(&self) -> ImageView<'_, u8> {
        ImageView {
            data: &self.pixels,
            width: self.width,
            height: self.height,
            stride: self.width,
        }
    }

    /// Returns a new image padded by `border` pixels on every side, the
    /// padding replicating the nearest edge row/column.
    ///
    /// Pixel `(r, c)` of `self` is pixel `(r + border, c + border)` of the
    /// result.
    pub fn extend(&self, border: usize) -> CornerMatchResult<Image> {
        extend_view(self.view(), border)
    }
}

/// [`Image::extend`] for a borrowed view.
pub(crate) fn extend_view(src: ImageView<'_, u8>, border: usize) -> CornerMatchResult<Image> {
    let width = src.width();
    let height = src.height();
    let out_width = border
        .checked_mul(2)
        .and_then(|b| b.checked_add(width))
        .ok_or(CornerMatchError::InvalidDimensions { width, height })?;
    let out_height = border
        .checked_mul(2)
        .and_then(|b| b.checked_add(height))
        .ok_or(CornerMatchError::InvalidDimensions { width, height })?;
    let len = out_width
        .checked_mul(out_height)
        .ok_or(CornerMatchError::InvalidDimensions {
            width: out_width,
            height: out_height,
        })?;
    let mut pixels = try_filled(len, 0u8)?;

    for out_row in 0..out_height {
        let src_row = out_row.saturating_sub(border).min(height - 1);
        let row = src.row(src_row).ok_or(CornerMatchError::BufferTooSmall {
            needed: (src_row + 1) * src.stride(),
            got: src.as_slice().len(),
        })?;
        let dst = &mut pixels[out_row * out_width..(out_row + 1) * out_width];
        dst[..border].fill(row[0]);
        dst[border..border + width].copy_from_slice(row);
        dst[border + width..].fill(row[width - 1]);
    }

    Image::new(pixels, out_width, out_height)
}

impl Image {
    /// Copies the `size x size` window with top-left `(row, col)`.
    pub fn window_copy(&self, row: usize, col: usize, size: usize) -> CornerMatchResult<Vec<u8>> {
        self.view().window(row, col, size, size)?.to_contiguous()
    }
}

#[cfg(test)]
mod tests {
    use super::Image;

    #[test]
    fn extend_replicates_edges() {
        let img = Image::new(vec![1, 2, 3, 4, 5, 6], 3, 2).unwrap();
        let ext = img.extend(1).unwrap();
        assert_eq!(ext.width(), 5);
        assert_eq!(ext.height(), 4);
        assert_eq!(
            ext.pixels(),
            &[
                1, 1, 2, 3, 3, //
                1, 1, 2, 3, 3, //
                4, 4, 5, 6, 6, //
                4, 4, 5, 6, 6,
            ]
        );
    }

    #[test]
    fn paste_clips_at_borders() {
        let mut img = Image::filled(4, 4, 0).unwrap();
        let patch = Image::filled(3, 3, 9).unwrap();
        img.paste(patch.view(), 2, 2);
        assert_eq!(img.get(2, 2), Some(9));
        assert_eq!(img.get(3, 3), Some(9));
        assert_eq!(img.get(1, 1), Some(0));
    }
}
