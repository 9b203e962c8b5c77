//! Window scan shared by the local backend and the emulated firmware.

use std::cmp::Ordering;

use crate::backend::{Peak, Window, WindowSet, WindowStats};
use crate::feature::PatchData;
use crate::fixed::Sample;
use crate::image::{ImageView, IntegralImage, WindowSums};
use crate::util::{CornerMatchError, CornerMatchResult};

/// Scores one window. `None` if the window leaves the frame.
pub(crate) fn score_window<T: Sample>(
    image: ImageView<'_, u8>,
    integral: Option<&IntegralImage>,
    patch: &PatchData<T>,
    window: Window,
    stats: WindowStats,
) -> CornerMatchResult<Option<Peak<T>>> {
    let size = patch.size();
    let Ok(view) = image.window(window.row, window.col, size, size) else {
        return Ok(None);
    };
    let sums = match stats {
        WindowStats::Direct => WindowSums::direct(view),
        WindowStats::Integral => {
            let table = integral.ok_or(CornerMatchError::MissingImageData)?;
            match table.window_sums(window.row, window.col, size) {
                Some(sums) => sums,
                None => return Ok(None),
            }
        }
    };
    Ok(Some(Peak {
        row: window.row,
        col: window.col,
        score: patch.score(view, sums),
    }))
}

/// Keeps the higher score; ties go to the earlier window in row-major order.
pub(crate) fn better<T: Sample>(a: Option<Peak<T>>, b: Option<Peak<T>>) -> Option<Peak<T>> {
    match (a, b) {
        (Some(a), Some(b)) => match b.score.exact_cmp(a.score) {
            Some(Ordering::Greater) => Some(b),
            Some(Ordering::Equal) if (b.row, b.col) < (a.row, a.col) => Some(b),
            _ => Some(a),
        },
        (a, None) => a,
        (None, b) => b,
    }
}

/// Scores every window of one dense row.
pub(crate) fn best_in_row<T: Sample>(
    image: ImageView<'_, u8>,
    integral: Option<&IntegralImage>,
    patch: &PatchData<T>,
    row: usize,
    stats: WindowStats,
) -> CornerMatchResult<Option<Peak<T>>> {
    let mut best = None;
    for col in 0..=image.width().saturating_sub(patch.size()) {
        let peak = score_window(image, integral, patch, Window::new(row, col), stats)?;
        best = better(best, peak);
    }
    Ok(best)
}

/// Number of dense window rows, zero if the patch does not fit.
pub(crate) fn dense_rows(image: ImageView<'_, u8>, size: usize) -> usize {
    if image.width() < size || image.height() < size {
        0
    } else {
        image.height() - size + 1
    }
}

/// Sequential scan of a window set.
pub(crate) fn best_window<T: Sample>(
    image: ImageView<'_, u8>,
    integral: Option<&IntegralImage>,
    patch: &PatchData<T>,
    windows: WindowSet<'_>,
    stats: WindowStats,
) -> CornerMatchResult<Option<Peak<T>>> {
    if stats == WindowStats::Integral && integral.is_none() {
        return Err(CornerMatchError::MissingImageData);
    }
    let mut best = None;
    match windows {
        WindowSet::Points(points) => {
            for &window in points {
                best = better(best, score_window(image, integral, patch, window, stats)?);
            }
        }
        WindowSet::Dense => {
            for row in 0..dense_rows(image, patch.size()) {
                best = better(best, best_in_row(image, integral, patch, row, stats)?);
            }
        }
    }
    Ok(best)
}

#[cfg(test)]
mod tests {
    use super::best_window;
    use crate::backend::{Window, WindowSet, WindowStats};
    use crate::feature::PatchData;
    use crate::image::{Image, ImageView, IntegralImage};
    use crate::util::CornerMatchError;

    fn textured(width: usize, height: usize) -> Image {
        let pixels = (0..width * height)
            .map(|i| {
                let (r, c) = (i / width, i % width);
                ((r * r * 13 + c * c * 7 + r * c * 5) % 251) as u8
            })
            .collect();
        Image::new(pixels, width, height).unwrap()
    }

    #[test]
    fn dense_scan_finds_the_patch_origin() {
        let image = textured(24, 20);
        let patch = image.window_copy(5, 7, 4).unwrap();
        let patch = PatchData::<f32>::compute(ImageView::from_slice(&patch, 4, 4).unwrap()).unwrap();
        let integral = IntegralImage::build(image.view()).unwrap();

        let direct = best_window(image.view(), None, &patch, WindowSet::Dense, WindowStats::Direct)
            .unwrap()
            .unwrap();
        let fast = best_window(
            image.view(),
            Some(&integral),
            &patch,
            WindowSet::Dense,
            WindowStats::Integral,
        )
        .unwrap()
        .unwrap();
        assert_eq!((direct.row, direct.col), (5, 7));
        assert_eq!(direct, fast);
        assert!((direct.score - 1.0).abs() < 1e-4);
    }

    #[test]
    fn integral_stats_require_tables() {
        let image = textured(8, 8);
        let patch = PatchData::<f32>::compute(image.view().window(0, 0, 4, 4).unwrap()).unwrap();
        let err = best_window(
            image.view(),
            None,
            &patch,
            WindowSet::Points(&[Window::new(0, 0)]),
            WindowStats::Integral,
        )
        .unwrap_err();
        assert_eq!(err, CornerMatchError::MissingImageData);
    }

    #[test]
    fn windows_outside_the_frame_are_skipped() {
        let image = textured(8, 8);
        let patch = PatchData::<f32>::compute(image.view().window(0, 0, 4, 4).unwrap()).unwrap();
        let peak = best_window(
            image.view(),
            None,
            &patch,
            WindowSet::Points(&[Window::new(6, 6)]),
            WindowStats::Direct,
        )
        .unwrap();
        assert!(peak.is_none());
    }
}
