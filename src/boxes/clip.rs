//! Clamping boxes to image bounds.

use crate::boxes::{BBox, ImageShape};

/// Clamps every coordinate into `[0, width - 1]` / `[0, height - 1]`.
///
/// Degenerate results are returned as-is; callers decide whether to drop them.
#[inline]
pub(crate) fn clip_box(bbox: BBox, shape: ImageShape) -> BBox {
    let max_x = shape.max_x();
    let max_y = shape.max_y();
    BBox {
        x1: bbox.x1.max(0.0).min(max_x),
        y1: bbox.y1.max(0.0).min(max_y),
        x2: bbox.x2.max(0.0).min(max_x),
        y2: bbox.y2.max(0.0).min(max_y),
    }
}
