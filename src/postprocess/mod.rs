//! Batch orchestration of the box-head post-processing pipeline.
//!
//! Softmax and decoding run once over the whole batch. The batch is then
//! split back into per-image slices by proposal count, and every image is
//! clipped, filtered per class and capped independently. With the `rayon`
//! feature and `parallel` set, images are processed on the rayon pool; the
//! output order always matches the input order.

use std::ops::Range;

use crate::boxes::collection::SCORES;
use crate::boxes::{BBox, BoxCollection, ImageProposals};
use crate::coder::{delta_row_width, BoxCoder};
use crate::score::softmax_rows;
use crate::select::DetectionCapper;
use crate::suppress::PerClassSuppressor;
use crate::trace::{trace_event, trace_span};
use crate::util::{RoiPostError, RoiPostResult};
#[cfg(feature = "rayon")]
use rayon::prelude::*;

mod config;

pub use config::PostProcessConfig;

/// Raw box-head outputs for a batch of proposals.
///
/// Both buffers are row-major: `class_logits` is `[N, C]` and `box_deltas`
/// is `[N, 4 * C]` or `[N, 4]` depending on the configured layout.
#[derive(Clone, Copy, Debug)]
pub struct HeadOutputs<'a> {
    /// Unnormalized class scores.
    pub class_logits: &'a [f32],
    /// Regression deltas.
    pub box_deltas: &'a [f32],
    /// Number of classes including background.
    pub num_classes: usize,
}

impl<'a> HeadOutputs<'a> {
    /// Bundles head outputs.
    pub fn new(class_logits: &'a [f32], box_deltas: &'a [f32], num_classes: usize) -> Self {
        Self {
            class_logits,
            box_deltas,
            num_classes,
        }
    }
}

/// Turns box-head outputs into per-image detections.
#[derive(Clone, Debug)]
pub struct PostProcessor {
    cfg: PostProcessConfig,
    coder: BoxCoder,
    suppressor: PerClassSuppressor,
    capper: DetectionCapper,
}

impl Default for PostProcessor {
    fn default() -> Self {
        let cfg = PostProcessConfig::default();
        Self {
            coder: BoxCoder::default(),
            suppressor: PerClassSuppressor {
                score_thresh: cfg.score_thresh,
                nms_iou: cfg.nms_iou,
            },
            capper: DetectionCapper {
                max_detections: cfg.detections_per_img,
            },
            cfg,
        }
    }
}

impl PostProcessor {
    /// Builds a processor after validating `cfg`.
    pub fn new(cfg: PostProcessConfig) -> RoiPostResult<Self> {
        cfg.validate()?;
        let coder = BoxCoder::new(cfg.coding_weights, cfg.bbox_xform_clip)?;
        Ok(Self {
            coder,
            suppressor: PerClassSuppressor {
                score_thresh: cfg.score_thresh,
                nms_iou: cfg.nms_iou,
            },
            capper: DetectionCapper {
                max_detections: cfg.detections_per_img,
            },
            cfg,
        })
    }

    /// Returns the active configuration.
    pub fn config(&self) -> &PostProcessConfig {
        &self.cfg
    }

    /// Runs the full pipeline; equivalent to `process_with(head, proposals, true)`.
    pub fn process(
        &self,
        head: HeadOutputs<'_>,
        proposals: &[ImageProposals],
    ) -> RoiPostResult<Vec<BoxCollection>> {
        self.process_with(head, proposals, true)
    }

    /// Runs the pipeline, filtering only when `final_iter` is set and
    /// filtering is not deferred by configuration.
    ///
    /// Filtered results carry `scores` and `labels`. Unfiltered results hold
    /// `N * C` clipped boxes with a `scores` field in proposal-major order and
    /// can be passed to [`PostProcessor::filter_results`] later.
    pub fn process_with(
        &self,
        head: HeadOutputs<'_>,
        proposals: &[ImageProposals],
        final_iter: bool,
    ) -> RoiPostResult<Vec<BoxCollection>> {
        let num_classes = head.num_classes;
        let total: usize = proposals.iter().map(ImageProposals::len).sum();
        self.check_inputs(head, proposals, total)?;

        let _span = trace_span!(
            "postprocess",
            images = proposals.len(),
            proposals = total,
            classes = num_classes
        )
        .entered();

        let probs = self.normalize(head.class_logits, num_classes)?;
        let references: Vec<BBox> = proposals
            .iter()
            .flat_map(|p| p.boxes().iter().copied())
            .collect();
        let decoded = self.coder.decode(
            head.box_deltas,
            &references,
            num_classes,
            self.cfg.delta_layout,
        )?;

        let mut jobs = Vec::with_capacity(proposals.len());
        let mut offset = 0;
        for image in proposals {
            let end = offset + image.len() * num_classes;
            jobs.push((image, offset..end));
            offset = end;
        }

        let filter = final_iter && !self.cfg.defer_filtering;
        let run = |(image, range): &(&ImageProposals, Range<usize>)| {
            self.process_image(
                image,
                &decoded[range.clone()],
                &probs[range.clone()],
                num_classes,
                filter,
            )
        };

        #[cfg(feature = "rayon")]
        if self.cfg.parallel {
            return jobs.par_iter().map(run).collect();
        }
        jobs.iter().map(run).collect()
    }

    /// Thresholds, suppresses and caps one image's unfiltered collection.
    ///
    /// `collection` must hold `N * num_classes` boxes in proposal-major order
    /// with a `scores` field, as produced with filtering deferred. Class 0 is
    /// treated as background and skipped.
    pub fn filter_results(
        &self,
        collection: &BoxCollection,
        num_classes: usize,
    ) -> RoiPostResult<BoxCollection> {
        if num_classes == 0 {
            return Err(RoiPostError::InvalidClassCount { num_classes });
        }
        let boxes = collection.boxes();
        let scores = collection.scores()?;
        if boxes.len() % num_classes != 0 {
            return Err(RoiPostError::ShapeMismatch {
                what: "unfiltered boxes",
                expected: boxes.len() / num_classes * num_classes,
                got: boxes.len(),
            });
        }
        let shape = collection.image_shape();
        let _span = trace_span!("filter_results", boxes = boxes.len()).entered();

        let per_class = (1..num_classes)
            .map(|class| self.suppressor.run(boxes, scores, num_classes, class, shape))
            .collect::<RoiPostResult<Vec<_>>>()?;
        let merged = if per_class.is_empty() {
            BoxCollection::empty_detections(shape)
        } else {
            BoxCollection::concat(shape, &per_class)?
        };
        let merged_len = merged.len();
        let capped = self.capper.apply(merged)?;
        let result = if self.cfg.remove_empty {
            capped.clip_to_image(true)
        } else {
            capped
        };

        trace_event!(
            "image_filtered",
            proposals = boxes.len() / num_classes,
            merged = merged_len,
            kept = result.len()
        );
        Ok(result)
    }

    fn check_inputs(
        &self,
        head: HeadOutputs<'_>,
        proposals: &[ImageProposals],
        total: usize,
    ) -> RoiPostResult<()> {
        let num_classes = head.num_classes;
        if num_classes == 0 {
            return Err(RoiPostError::InvalidClassCount { num_classes });
        }
        if head.class_logits.len() != total * num_classes {
            return Err(RoiPostError::ShapeMismatch {
                what: "class logits",
                expected: total * num_classes,
                got: head.class_logits.len(),
            });
        }
        delta_row_width(
            head.box_deltas.len(),
            total,
            num_classes,
            self.cfg.delta_layout,
        )?;
        for image in proposals {
            let shape = image.shape();
            if shape.width == 0 || shape.height == 0 {
                return Err(RoiPostError::InvalidImageShape {
                    width: shape.width,
                    height: shape.height,
                });
            }
        }
        Ok(())
    }

    fn normalize(&self, logits: &[f32], num_classes: usize) -> RoiPostResult<Vec<f32>> {
        #[cfg(feature = "rayon")]
        if self.cfg.parallel {
            return crate::score::softmax_rows_par(logits, num_classes);
        }
        softmax_rows(logits, num_classes)
    }

    fn process_image(
        &self,
        image: &ImageProposals,
        boxes: &[BBox],
        probs: &[f32],
        num_classes: usize,
        filter: bool,
    ) -> RoiPostResult<BoxCollection> {
        let shape = image.shape();
        if image.is_empty() {
            return Ok(if filter {
                BoxCollection::empty_detections(shape)
            } else {
                BoxCollection::new(Vec::new(), shape).with_real_field(SCORES, Vec::new())?
            });
        }

        let unfiltered = BoxCollection::new(boxes.to_vec(), shape)
            .with_real_field(SCORES, probs.to_vec())?
            .clip_to_image(false);
        if !filter {
            return Ok(unfiltered);
        }
        self.filter_results(&unfiltered, num_classes)
    }
}
