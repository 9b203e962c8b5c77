//! Image views, owned rasters and derived tables.
//!
//! `ImageView` is a borrowed 2D view into a 1D buffer with an explicit stride.
//! The stride counts elements between the starts of consecutive rows, so a
//! stride larger than the width represents padded rows. Window views are
//! zero-copy and retain the original stride.
//!
//! `Image` owns a contiguous `u8` raster, `Plane<T>` owns a numeric raster
//! used for convolution intermediates and `IntegralImage` holds running sums
//! for O(1) window statistics. All coordinates are `(row, col)`.

use crate::util::{CornerMatchError, CornerMatchResult};

mod integral;
#[cfg(feature = "image-io")]
pub mod io;
mod owned;
mod plane;

pub use integral::{IntegralImage, WindowSums};
pub use owned::Image;
pub(crate) use owned::extend_view;
pub use plane::{Axis, Plane};
pub(crate) use plane::check_taps;

/// Borrowed 2D image view with an explicit stride.
#[derive(Copy, Clone, Debug)]
pub struct ImageView<'a, T> {
    data: &'a [T],
    width: usize,
    height: usize,
    stride: usize,
}

impl<'a, T> ImageView<'a, T> {
    /// Creates a contiguous view with `stride == width`.
    pub fn from_slice(data: &'a [T], width: usize, height: usize) -> CornerMatchResult<Self> {
        Self::new(data, width, height, width)
    }

    /// Creates a view with an explicit stride.
    pub fn new(
        data: &'a [T],
        width: usize,
        height: usize,
        stride: usize,
    ) -> CornerMatchResult<Self> {
        let needed = required_len(width, height, stride)?;
        if data.len() < needed {
            return Err(CornerMatchError::BufferTooSmall {
                needed,
                got: data.len(),
            });
        }
        Ok(Self {
            data,
            width,
            height,
            stride,
        })
    }

    /// Contiguous view over a buffer already known to hold
    /// `width * height` elements.
    pub(crate) fn contiguous(data: &'a [T], width: usize, height: usize) -> Self {
        debug_assert!(data.len() >= width * height);
        Self {
            data,
            width,
            height,
            stride: width,
        }
    }

    /// Returns the image width in pixels.
    pub fn width(&self) -> usize {
        self.width
    }

    /// Returns the image height in pixels.
    pub fn height(&self) -> usize {
        self.height
    }

    /// Returns the stride in elements between row starts.
    pub fn stride(&self) -> usize {
        self.stride
    }

    /// Returns the backing slice including any row padding.
    pub fn as_slice(&self) -> &'a [T] {
        self.data
    }

    /// Returns the element at `(row, col)` if it is within bounds.
    pub fn get(&self, row: usize, col: usize) -> Option<&'a T> {
        if row >= self.height || col >= self.width {
            return None;
        }
        let idx = row.checked_mul(self.stride)?.checked_add(col)?;
        self.data.get(idx)
    }

    /// Returns a contiguous slice for `row` with length `width`.
    pub fn row(&self, row: usize) -> Option<&'a [T]> {
        if row >= self.height {
            return None;
        }
        let start = row.checked_mul(self.stride)?;
        let end = start.checked_add(self.width)?;
        self.data.get(start..end)
    }

    /// Returns a zero-copy view of the `height x width` window whose
    /// top-left corner is `(row, col)`.
    pub fn window(
        &self,
        row: usize,
        col: usize,
        height: usize,
        width: usize,
    ) -> CornerMatchResult<ImageView<'a, T>> {
        let out_of_bounds = CornerMatchError::RoiOutOfBounds {
            x: col,
            y: row,
            width,
            height,
            img_width: self.width,
            img_height: self.height,
        };
        if width == 0 || height == 0 {
            return Err(CornerMatchError::InvalidDimensions { width, height });
        }
        let end_col = col.checked_add(width).ok_or(out_of_bounds.clone())?;
        let end_row = row.checked_add(height).ok_or(out_of_bounds.clone())?;
        if end_col > self.width || end_row > self.height {
            return Err(out_of_bounds);
        }

        let start = row
            .checked_mul(self.stride)
            .and_then(|v| v.checked_add(col))
            .ok_or(CornerMatchError::InvalidDimensions {
                width: self.width,
                height: self.height,
            })?;
        let data = self
            .data
            .get(start..)
            .ok_or(CornerMatchError::BufferTooSmall {
                needed: start.saturating_add(1),
                got: self.data.len(),
            })?;

        ImageView::new(data, width, height, self.stride)
    }
}

impl<T: Copy> ImageView<'_, T> {
    /// Copies the view into a contiguous row-major vector.
    pub fn to_contiguous(&self) -> CornerMatchResult<Vec<T>> {
        let mut out = crate::util::alloc::try_with_capacity(self.width * self.height)?;
        for row in 0..self.height {
            let slice = self.row(row).ok_or(CornerMatchError::BufferTooSmall {
                needed: (row + 1) * self.stride,
                got: self.data.len(),
            })?;
            out.extend_from_slice(slice);
        }
        Ok(out)
    }
}

fn required_len(width: usize, height: usize, stride: usize) -> CornerMatchResult<usize> {
    if width == 0 || height == 0 {
        return Err(CornerMatchError::InvalidDimensions { width, height });
    }
    if stride < width {
        return Err(CornerMatchError::InvalidStride { width, stride });
    }
    let needed = (height - 1)
        .checked_mul(stride)
        .and_then(|v| v.checked_add(width))
        .ok_or(CornerMatchError::InvalidDimensions { width, height })?;
    Ok(needed)
}
