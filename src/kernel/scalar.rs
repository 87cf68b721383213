//! Scalar IoU kernel.

use crate::boxes::{BBox, PIXEL_OFFSET};
use crate::kernel::OverlapKernel;

/// Resolves IoU from precomputed intersection and areas.
///
/// Zero-area boxes, empty intersections and non-positive unions give 0.
#[inline]
pub(crate) fn iou_from_parts(inter: f32, area_a: f32, area_b: f32) -> f32 {
    if area_a <= 0.0 || area_b <= 0.0 || inter <= 0.0 {
        return 0.0;
    }
    let union = area_a + area_b - inter;
    if union <= 0.0 {
        return 0.0;
    }
    inter / union
}

/// Inclusive-pixel intersection area of two boxes.
#[inline]
pub(crate) fn intersection(a: &BBox, b: &BBox) -> f32 {
    let iw = (a.x2.min(b.x2) - a.x1.max(b.x1) + PIXEL_OFFSET).max(0.0);
    let ih = (a.y2.min(b.y2) - a.y1.max(b.y1) + PIXEL_OFFSET).max(0.0);
    iw * ih
}

/// IoU of two boxes under the inclusive-pixel convention.
#[inline]
pub(crate) fn iou(a: &BBox, b: &BBox) -> f32 {
    iou_from_parts(intersection(a, b), a.area(), b.area())
}

/// Portable IoU kernel.
pub struct ScalarOverlap;

impl OverlapKernel for ScalarOverlap {
    fn iou_row(anchor: &BBox, others: &[BBox], out: &mut [f32]) {
        let area_a = anchor.area();
        for (dst, other) in out.iter_mut().zip(others) {
            *dst = iou_from_parts(intersection(anchor, other), area_a, other.area());
        }
    }
}
