//! Overlap kernels used by non-maximum suppression.
//!
//! A kernel computes the IoU of one anchor box against a contiguous slice of
//! boxes. The scalar kernel is always available; the `simd` feature adds an
//! 8-lane implementation that performs the same per-element operations, so
//! both produce identical values.

use crate::boxes::BBox;

/// Kernel trait for one-versus-many IoU evaluation.
pub trait OverlapKernel {
    /// Writes `iou(anchor, others[i])` into `out[i]`.
    ///
    /// `out` must be at least as long as `others`.
    fn iou_row(anchor: &BBox, others: &[BBox], out: &mut [f32]);
}

pub mod scalar;

#[cfg(feature = "simd")]
pub mod simd;

/// Kernel selected at compile time for the suppression loop.
#[cfg(not(feature = "simd"))]
pub type DefaultKernel = scalar::ScalarOverlap;
/// Kernel selected at compile time for the suppression loop.
#[cfg(feature = "simd")]
pub type DefaultKernel = simd::SimdOverlap;
