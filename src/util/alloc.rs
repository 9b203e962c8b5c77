//! Fallible buffer allocation.
//!
//! Every intermediate buffer of the pipeline is reserved through these
//! helpers so that an allocation failure surfaces as
//! [`CornerMatchError::Allocation`] instead of aborting the process.

use crate::util::{CornerMatchError, CornerMatchResult};

/// Allocates a vector of `len` copies of `value`.
pub(crate) fn try_filled<T: Clone>(len: usize, value: T) -> CornerMatchResult<Vec<T>> {
    let mut out = try_with_capacity(len)?;
    out.resize(len, value);
    Ok(out)
}

/// Grows `vec` to hold `additional` more elements.
pub(crate) fn try_reserve<T>(vec: &mut Vec<T>, additional: usize) -> CornerMatchResult<()> {
    vec.try_reserve(additional)
        .map_err(|_| CornerMatchError::Allocation {
            bytes: additional.saturating_mul(std::mem::size_of::<T>()),
        })
}

/// Allocates an empty vector able to hold `len` elements.
pub(crate) fn try_with_capacity<T>(len: usize) -> CornerMatchResult<Vec<T>> {
    let mut out = Vec::new();
    out.try_reserve_exact(len)
        .map_err(|_| CornerMatchError::Allocation {
            bytes: len.saturating_mul(std::mem::size_of::<T>()),
        })?;
    Ok(out)
}
