#![cfg(feature = "rayon")]

use rand::rngs::StdRng;
use rand::{Rng, SeedableRng};
use roipost::lowlevel::{softmax_rows, softmax_rows_par};
use roipost::{BBox, HeadOutputs, ImageProposals, ImageShape, PostProcessConfig, PostProcessor};

fn make_batch(rng: &mut StdRng, images: usize) -> Vec<ImageProposals> {
    (0..images)
        .map(|i| {
            let shape = ImageShape::new(160 + 8 * i as u32, 120).unwrap();
            let n = rng.random_range(0..60);
            let boxes = (0..n)
                .map(|_| {
                    let x1 = rng.random_range(0.0..150.0f32);
                    let y1 = rng.random_range(0.0..110.0f32);
                    BBox::new(
                        x1,
                        y1,
                        x1 + rng.random_range(4.0..50.0f32),
                        y1 + rng.random_range(4.0..50.0f32),
                    )
                })
                .collect();
            ImageProposals::new(boxes, shape)
        })
        .collect()
}

#[test]
fn parallel_matches_sequential() {
    let mut rng = StdRng::seed_from_u64(5);
    let num_classes = 5;
    let proposals = make_batch(&mut rng, 9);
    let total: usize = proposals.iter().map(ImageProposals::len).sum();
    let logits: Vec<f32> = (0..total * num_classes)
        .map(|_| rng.random_range(-4.0..4.0))
        .collect();
    let deltas: Vec<f32> = (0..total * num_classes * 4)
        .map(|_| rng.random_range(-1.5..1.5))
        .collect();
    let head = HeadOutputs::new(&logits, &deltas, num_classes);

    let base_cfg = PostProcessConfig {
        score_thresh: 0.1,
        detections_per_img: 20,
        ..PostProcessConfig::default()
    };
    let seq = PostProcessor::new(PostProcessConfig {
        parallel: false,
        ..base_cfg.clone()
    })
    .unwrap();
    let par = PostProcessor::new(PostProcessConfig {
        parallel: true,
        ..base_cfg
    })
    .unwrap();

    let seq_out = seq.process(head, &proposals).unwrap();
    let par_out = par.process(head, &proposals).unwrap();
    assert_eq!(seq_out, par_out);
}

#[test]
fn parallel_softmax_is_bitwise_identical() {
    let mut rng = StdRng::seed_from_u64(19);
    let logits: Vec<f32> = (0..7 * 301).map(|_| rng.random_range(-20.0..20.0)).collect();
    let seq = softmax_rows(&logits, 7).unwrap();
    let par = softmax_rows_par(&logits, 7).unwrap();
    assert!(seq
        .iter()
        .zip(par.iter())
        .all(|(a, b)| a.to_bits() == b.to_bits()));
}
