//! SIMD IoU kernel using the `wide` crate.
//!
//! Eight candidate boxes are processed per step with `f32x8`. Intersection
//! extents and areas use the same operations as the scalar kernel; the final
//! division and degenerate-case handling run per lane through
//! `iou_from_parts`, which keeps results bit-identical to `ScalarOverlap`.

use crate::boxes::{BBox, PIXEL_OFFSET};
use crate::kernel::scalar::{intersection, iou_from_parts};
use crate::kernel::OverlapKernel;
use wide::f32x8;

const LANES: usize = 8;

/// Transposes eight boxes into per-coordinate vectors.
#[inline]
fn load_boxes(chunk: &[BBox]) -> (f32x8, f32x8, f32x8, f32x8) {
    let mut x1 = [0.0f32; LANES];
    let mut y1 = [0.0f32; LANES];
    let mut x2 = [0.0f32; LANES];
    let mut y2 = [0.0f32; LANES];
    for (lane, b) in chunk.iter().enumerate().take(LANES) {
        x1[lane] = b.x1;
        y1[lane] = b.y1;
        x2[lane] = b.x2;
        y2[lane] = b.y2;
    }
    (
        f32x8::from(x1),
        f32x8::from(y1),
        f32x8::from(x2),
        f32x8::from(y2),
    )
}

/// SIMD-accelerated IoU kernel.
pub struct SimdOverlap;

impl OverlapKernel for SimdOverlap {
    fn iou_row(anchor: &BBox, others: &[BBox], out: &mut [f32]) {
        let area_a = anchor.area();
        let one = f32x8::splat(PIXEL_OFFSET);
        let zero = f32x8::ZERO;
        let ax1 = f32x8::splat(anchor.x1);
        let ay1 = f32x8::splat(anchor.y1);
        let ax2 = f32x8::splat(anchor.x2);
        let ay2 = f32x8::splat(anchor.y2);

        let simd_end = others.len() / LANES * LANES;
        let mut start = 0;
        while start < simd_end {
            let (bx1, by1, bx2, by2) = load_boxes(&others[start..start + LANES]);

            let iw = (ax2.min(bx2) - ax1.max(bx1) + one).max(zero);
            let ih = (ay2.min(by2) - ay1.max(by1) + one).max(zero);
            let inter = (iw * ih).to_array();

            let bw = (bx2 - bx1 + one).max(zero);
            let bh = (by2 - by1 + one).max(zero);
            let area_b = (bw * bh).to_array();

            for lane in 0..LANES {
                out[start + lane] = iou_from_parts(inter[lane], area_a, area_b[lane]);
            }
            start += LANES;
        }

        // Scalar remainder
        for (idx, other) in others.iter().enumerate().skip(simd_end) {
            out[idx] = iou_from_parts(intersection(anchor, other), area_a, other.area());
        }
    }
}

#[cfg(test)]
mod tests {
    use super::SimdOverlap;
    use crate::boxes::BBox;
    use crate::kernel::scalar::ScalarOverlap;
    use crate::kernel::OverlapKernel;

    #[test]
    fn simd_matches_scalar_bitwise() {
        let anchor = BBox::new(3.5, 2.25, 40.0, 31.75);
        let others: Vec<BBox> = (0..21)
            .map(|i| {
                let f = i as f32;
                BBox::new(f * 1.5, f * 0.75, f * 1.5 + 17.0 - f, f * 0.75 + 9.0)
            })
            .collect();
        let mut simd = vec![0.0f32; others.len()];
        let mut scalar = vec![0.0f32; others.len()];
        SimdOverlap::iou_row(&anchor, &others, &mut simd);
        ScalarOverlap::iou_row(&anchor, &others, &mut scalar);
        for (a, b) in simd.iter().zip(scalar.iter()) {
            assert_eq!(a.to_bits(), b.to_bits());
        }
    }
}
