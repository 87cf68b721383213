use criterion::{criterion_group, criterion_main, Criterion};
use rand::rngs::StdRng;
use rand::{Rng, SeedableRng};
use roipost::{
    suppress, BBox, Candidate, HeadOutputs, ImageProposals, ImageShape, PostProcessConfig,
    PostProcessor,
};
use std::hint::black_box;

fn make_proposals(rng: &mut StdRng, n: usize, shape: ImageShape) -> ImageProposals {
    let boxes = (0..n)
        .map(|_| {
            let x1 = rng.random::<f32>() * shape.width as f32;
            let y1 = rng.random::<f32>() * shape.height as f32;
            BBox::new(
                x1,
                y1,
                x1 + 8.0 + rng.random::<f32>() * 120.0,
                y1 + 8.0 + rng.random::<f32>() * 120.0,
            )
        })
        .collect();
    ImageProposals::new(boxes, shape)
}

fn bench_postprocess(c: &mut Criterion) {
    let mut rng = StdRng::seed_from_u64(0x5eed);
    let num_classes = 81;
    let per_image = 1000;
    let images = 4;
    let shape = ImageShape::new(1333, 800).unwrap();

    let proposals: Vec<ImageProposals> = (0..images)
        .map(|_| make_proposals(&mut rng, per_image, shape))
        .collect();
    let total = per_image * images;
    let logits: Vec<f32> = (0..total * num_classes)
        .map(|_| rng.random::<f32>() * 8.0 - 6.0)
        .collect();
    let deltas: Vec<f32> = (0..total * num_classes * 4)
        .map(|_| rng.random::<f32>() * 2.0 - 1.0)
        .collect();
    let head = HeadOutputs::new(&logits, &deltas, num_classes);

    let sequential = PostProcessor::default();
    c.bench_function("postprocess_coco_4x1000", |b| {
        b.iter(|| black_box(sequential.process(head, &proposals).unwrap()));
    });

    if cfg!(feature = "rayon") {
        let parallel = PostProcessor::new(PostProcessConfig {
            parallel: true,
            ..PostProcessConfig::default()
        })
        .unwrap();
        c.bench_function("postprocess_coco_4x1000_parallel", |b| {
            b.iter(|| black_box(parallel.process(head, &proposals).unwrap()));
        });
    }

    let candidates: Vec<Candidate> = make_proposals(&mut rng, 2000, shape)
        .boxes()
        .iter()
        .enumerate()
        .map(|(index, &bbox)| Candidate {
            bbox,
            score: rng.random::<f32>(),
            index,
        })
        .collect();
    c.bench_function("suppress_2000", |b| {
        b.iter(|| black_box(suppress(&candidates, 0.5)));
    });
}

criterion_group!(benches, bench_postprocess);
criterion_main!(benches);
