#![cfg(feature = "simd")]

use rand::rngs::StdRng;
use rand::{Rng, SeedableRng};
use roipost::lowlevel::{suppress_with, OverlapKernel, ScalarOverlap, SimdOverlap};
use roipost::{BBox, Candidate};

fn random_boxes(rng: &mut StdRng, n: usize) -> Vec<BBox> {
    (0..n)
        .map(|_| {
            let x1 = rng.random_range(-20.0..300.0f32);
            let y1 = rng.random_range(-20.0..300.0f32);
            // Occasionally inverted to exercise the zero-area path.
            let w = rng.random_range(-5.0..80.0f32);
            let h = rng.random_range(-5.0..80.0f32);
            BBox::new(x1, y1, x1 + w, y1 + h)
        })
        .collect()
}

#[test]
fn iou_rows_are_bitwise_identical() {
    let mut rng = StdRng::seed_from_u64(3);
    for len in [0usize, 1, 7, 8, 9, 31, 64, 100] {
        let boxes = random_boxes(&mut rng, len + 1);
        let (anchor, others) = boxes.split_first().unwrap();
        let mut scalar = vec![0.0f32; others.len()];
        let mut simd = vec![0.0f32; others.len()];
        ScalarOverlap::iou_row(anchor, others, &mut scalar);
        SimdOverlap::iou_row(anchor, others, &mut simd);
        for (a, b) in scalar.iter().zip(simd.iter()) {
            assert_eq!(a.to_bits(), b.to_bits());
        }
    }
}

#[test]
fn suppression_agrees_across_kernels() {
    let mut rng = StdRng::seed_from_u64(29);
    for _ in 0..10 {
        let candidates: Vec<Candidate> = random_boxes(&mut rng, 150)
            .into_iter()
            .enumerate()
            .map(|(index, bbox)| Candidate {
                bbox,
                score: rng.random_range(0.0..1.0),
                index,
            })
            .collect();
        assert_eq!(
            suppress_with::<ScalarOverlap>(&candidates, 0.45),
            suppress_with::<SimdOverlap>(&candidates, 0.45)
        );
    }
}
