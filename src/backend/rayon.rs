//! Rayon row-parallel primitives (feature-gated).
//!
//! Each output row is computed by the same code as the sequential path, so
//! results are identical; only the scheduling differs.

use crate::backend::scan::{best_in_row, better, dense_rows};
use crate::backend::{Peak, WindowStats};
use crate::feature::PatchData;
use crate::fixed::Sample;
use crate::image::{check_taps, Axis, ImageView, IntegralImage, Plane};
use crate::util::alloc::try_filled;
use crate::util::{CornerMatchError, CornerMatchResult};
use rayon::prelude::*;

/// Row-parallel [`Plane::convolve`].
pub(crate) fn convolve_par<T: Sample>(
    plane: &Plane<T>,
    taps: &[T],
    axis: Axis,
) -> CornerMatchResult<Plane<T>> {
    check_taps(taps)?;
    let width = plane.width();
    let mut data = try_filled(width * plane.height(), T::zero())?;
    data.par_chunks_mut(width)
        .enumerate()
        .for_each_init(
            || vec![T::zero(); taps.len()],
            |scratch, (row, dst)| plane.convolve_row(taps, axis, row, dst, scratch),
        );
    Plane::from_vec(data, width, plane.height())
}

/// Row-parallel dense NCC scan with the sequential tie-breaking.
pub(crate) fn dense_scan_par<T: Sample>(
    image: ImageView<'_, u8>,
    integral: Option<&IntegralImage>,
    patch: &PatchData<T>,
    stats: WindowStats,
) -> CornerMatchResult<Option<Peak<T>>> {
    if stats == WindowStats::Integral && integral.is_none() {
        return Err(CornerMatchError::MissingImageData);
    }
    (0..dense_rows(image, patch.size()))
        .into_par_iter()
        .map(|row| best_in_row(image, integral, patch, row, stats))
        .try_reduce(|| None, |a, b| Ok(better(a, b)))
}
