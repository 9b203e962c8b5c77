//! Integral images for O(1) window statistics.

use crate::image::ImageView;
use crate::util::alloc::try_filled;
use crate::util::{CornerMatchError, CornerMatchResult};

/// Exact pixel sums over a window.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq)]
pub struct WindowSums {
    /// Sum of pixel values.
    pub sum: u64,
    /// Sum of squared pixel values.
    pub sum_sq: u64,
}

impl WindowSums {
    /// Sums a window directly, O(width * height).
    pub fn direct(window: ImageView<'_, u8>) -> Self {
        let mut sums = WindowSums::default();
        for row in 0..window.height() {
            if let Some(pixels) = window.row(row) {
                for &p in pixels {
                    let v = p as u64;
                    sums.sum += v;
                    sums.sum_sq += v * v;
                }
            }
        }
        sums
    }
}

/// Running sum and running square-sum tables.
///
/// Both tables are `(height + 1) x (width + 1)` with a zero first row and
/// column, so entry `(r, c)` holds the sum over rows `< r` and columns `< c`.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct IntegralImage {
    width: usize,
    height: usize,
    sum: Vec<u64>,
    sum_sq: Vec<u64>,
}

impl IntegralImage {
    /// Builds the tables in one pass over the image.
    pub fn build(image: ImageView<'_, u8>) -> CornerMatchResult<Self> {
        let width = image.width();
        let height = image.height();
        let stride = width + 1;
        let len = stride
            .checked_mul(height + 1)
            .ok_or(CornerMatchError::InvalidDimensions { width, height })?;
        let mut sum = try_filled(len, 0u64)?;
        let mut sum_sq = try_filled(len, 0u64)?;

        for row in 0..height {
            let pixels = image.row(row).ok_or(CornerMatchError::BufferTooSmall {
                needed: (row + 1) * image.stride(),
                got: image.as_slice().len(),
            })?;
            let mut row_sum = 0u64;
            let mut row_sum_sq = 0u64;
            for (col, &p) in pixels.iter().enumerate() {
                let v = p as u64;
                row_sum += v;
                row_sum_sq += v * v;
                let idx = (row + 1) * stride + col + 1;
                sum[idx] = sum[idx - stride] + row_sum;
                sum_sq[idx] = sum_sq[idx - stride] + row_sum_sq;
            }
        }

        Ok(Self {
            width,
            height,
            sum,
            sum_sq,
        })
    }

    /// Rebuilds an integral image from raw tables.
    pub fn from_tables(
        width: usize,
        height: usize,
        sum: Vec<u64>,
        sum_sq: Vec<u64>,
    ) -> CornerMatchResult<Self> {
        let needed = (width + 1) * (height + 1);
        if sum.len() != needed || sum_sq.len() != needed {
            return Err(CornerMatchError::BufferTooSmall {
                needed,
                got: sum.len().min(sum_sq.len()),
            });
        }
        Ok(Self {
            width,
            height,
            sum,
            sum_sq,
        })
    }

    /// Width of the source image.
    pub fn width(&self) -> usize {
        self.width
    }

    /// Height of the source image.
    pub fn height(&self) -> usize {
        self.height
    }

    /// Running-sum table.
    pub fn sum_table(&self) -> &[u64] {
        &self.sum
    }

    /// Running square-sum table.
    pub fn sum_sq_table(&self) -> &[u64] {
        &self.sum_sq
    }

    /// Four-corner lookup of the `size x size` window with top-left
    /// `(row, col)`. Returns `None` when the window leaves the image.
    pub fn window_sums(&self, row: usize, col: usize, size: usize) -> Option<WindowSums> {
        if row + size > self.height || col + size > self.width {
            return None;
        }
        let stride = self.width + 1;
        let a = row * stride + col;
        let b = row * stride + col + size;
        let c = (row + size) * stride + col;
        let d = (row + size) * stride + col + size;
        Some(WindowSums {
            sum: self.sum[d] + self.sum[a] - self.sum[b] - self.sum[c],
            sum_sq: self.sum_sq[d] + self.sum_sq[a] - self.sum_sq[b] - self.sum_sq[c],
        })
    }
}
