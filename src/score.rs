//! Class-score normalization.
//!
//! Logits are normalized per proposal with a softmax over the class axis.
//! The row maximum is subtracted before exponentiation. NaN or infinite
//! logits are not rejected and propagate into the probabilities; callers
//! should guard against them upstream.

use crate::util::{RoiPostError, RoiPostResult};
#[cfg(feature = "rayon")]
use rayon::prelude::*;

/// Normalizes one row of logits in place.
pub fn softmax_in_place(row: &mut [f32]) {
    if row.is_empty() {
        return;
    }
    let max = row.iter().copied().fold(f32::NEG_INFINITY, f32::max);
    let mut sum = 0.0f32;
    for value in row.iter_mut() {
        *value = (*value - max).exp();
        sum += *value;
    }
    for value in row.iter_mut() {
        *value /= sum;
    }
}

fn check_rows(logits: &[f32], num_classes: usize) -> RoiPostResult<()> {
    if num_classes == 0 {
        return Err(RoiPostError::InvalidClassCount { num_classes });
    }
    if logits.len() % num_classes != 0 {
        return Err(RoiPostError::ShapeMismatch {
            what: "class logits",
            expected: logits.len() / num_classes * num_classes,
            got: logits.len(),
        });
    }
    Ok(())
}

/// Softmax over each `num_classes`-wide row of a row-major `[N, C]` buffer.
pub fn softmax_rows(logits: &[f32], num_classes: usize) -> RoiPostResult<Vec<f32>> {
    check_rows(logits, num_classes)?;
    let mut probs = logits.to_vec();
    for row in probs.chunks_exact_mut(num_classes) {
        softmax_in_place(row);
    }
    Ok(probs)
}

/// Row-parallel variant of [`softmax_rows`]; results are identical.
#[cfg(feature = "rayon")]
pub fn softmax_rows_par(logits: &[f32], num_classes: usize) -> RoiPostResult<Vec<f32>> {
    check_rows(logits, num_classes)?;
    let mut probs = logits.to_vec();
    probs
        .par_chunks_exact_mut(num_classes)
        .for_each(softmax_in_place);
    Ok(probs)
}
