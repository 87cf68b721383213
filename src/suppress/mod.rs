//! Score thresholding and greedy non-maximum suppression.
//!
//! [`suppress`] is a pure function over an explicit candidate list. The
//! per-class wrapper [`PerClassSuppressor`] gathers the candidates of one
//! class from the decoded `[N, C]` layout, suppresses them and labels the
//! survivors.

use std::cmp::Ordering;

use crate::boxes::collection::{LABELS, SCORES};
use crate::boxes::{BBox, BoxCollection, ImageShape};
use crate::kernel::{DefaultKernel, OverlapKernel};
use crate::trace::trace_debug;
use crate::util::{RoiPostError, RoiPostResult};

/// A box competing in suppression.
#[derive(Clone, Copy, Debug, PartialEq)]
pub struct Candidate {
    /// Box in image coordinates.
    pub bbox: BBox,
    /// Confidence used for ordering.
    pub score: f32,
    /// Position in the caller's original list.
    pub index: usize,
}

fn candidate_cmp_desc(a: &Candidate, b: &Candidate) -> Ordering {
    b.score
        .total_cmp(&a.score)
        .then_with(|| a.index.cmp(&b.index))
}

/// Sorts candidates by descending score, ties by ascending original index.
pub fn sort_candidates_desc(candidates: &mut [Candidate]) {
    candidates.sort_by(candidate_cmp_desc);
}

/// Greedy NMS with the compile-time default overlap kernel.
///
/// Returns the `index` of every kept candidate, highest score first. A
/// candidate is dropped when its IoU with an already kept one is strictly
/// greater than `iou_threshold`.
pub fn suppress(candidates: &[Candidate], iou_threshold: f32) -> Vec<usize> {
    suppress_with::<DefaultKernel>(candidates, iou_threshold)
}

/// Greedy NMS using an explicit overlap kernel.
pub fn suppress_with<K: OverlapKernel>(
    candidates: &[Candidate],
    iou_threshold: f32,
) -> Vec<usize> {
    let mut order = candidates.to_vec();
    sort_candidates_desc(&mut order);

    let boxes: Vec<BBox> = order.iter().map(|c| c.bbox).collect();
    let n = boxes.len();
    let mut suppressed = vec![false; n];
    let mut ious = vec![0.0f32; n];
    let mut keep = Vec::new();

    for pos in 0..n {
        if suppressed[pos] {
            continue;
        }
        keep.push(order[pos].index);

        let rest = &boxes[pos + 1..];
        let row = &mut ious[..rest.len()];
        K::iou_row(&boxes[pos], rest, row);
        for (offset, &iou) in row.iter().enumerate() {
            if iou > iou_threshold {
                suppressed[pos + 1 + offset] = true;
            }
        }
    }

    keep
}

/// Runs NMS over a collection with a `scores` field.
///
/// Survivors are returned in descending score order together with all of
/// their fields.
pub fn nms_collection(
    collection: &BoxCollection,
    iou_threshold: f32,
) -> RoiPostResult<BoxCollection> {
    let scores = collection.scores()?;
    let candidates: Vec<Candidate> = collection
        .boxes()
        .iter()
        .zip(scores)
        .enumerate()
        .map(|(index, (&bbox, &score))| Candidate { bbox, score, index })
        .collect();
    let keep = suppress(&candidates, iou_threshold);
    collection.select(&keep)
}

/// Thresholds and suppresses the detections of one class.
#[derive(Clone, Copy, Debug, PartialEq)]
pub struct PerClassSuppressor {
    /// Probabilities must be strictly greater than this to be considered.
    pub score_thresh: f32,
    /// Suppression IoU threshold.
    pub nms_iou: f32,
}

impl PerClassSuppressor {
    /// Selects and suppresses class `class` from a decoded batch.
    ///
    /// `boxes` and `probs` are the per-image `[N, C]` layouts: entry
    /// `i * num_classes + class` belongs to proposal `i`. The result carries
    /// `scores` and a `labels` field filled with `class`.
    pub fn run(
        &self,
        boxes: &[BBox],
        probs: &[f32],
        num_classes: usize,
        class: usize,
        shape: ImageShape,
    ) -> RoiPostResult<BoxCollection> {
        if class >= num_classes {
            return Err(RoiPostError::IndexOutOfBounds {
                index: class,
                len: num_classes,
                context: "class",
            });
        }
        if boxes.len() != probs.len() {
            return Err(RoiPostError::ShapeMismatch {
                what: "decoded boxes",
                expected: probs.len(),
                got: boxes.len(),
            });
        }

        // Indices are positions in the filtered list, which preserves
        // proposal order and therefore the tie-break.
        let candidates: Vec<Candidate> = probs
            .iter()
            .skip(class)
            .step_by(num_classes)
            .zip(boxes.iter().skip(class).step_by(num_classes))
            .filter(|&(&score, _)| score > self.score_thresh)
            .enumerate()
            .map(|(index, (&score, &bbox))| Candidate { bbox, score, index })
            .collect();

        let kept = suppress(&candidates, self.nms_iou);
        let kept_boxes = kept.iter().map(|&k| candidates[k].bbox).collect();
        let kept_scores = kept.iter().map(|&k| candidates[k].score).collect();

        trace_debug!(
            "class_suppressed",
            class = class,
            candidates = candidates.len(),
            kept = kept.len()
        );

        BoxCollection::new(kept_boxes, shape)
            .with_real_field(SCORES, kept_scores)?
            .with_label_field(LABELS, vec![class as i64; kept.len()])
    }
}

#[cfg(test)]
mod tests {
    use super::{suppress, Candidate, PerClassSuppressor};
    use crate::boxes::{BBox, ImageShape};

    fn cand(index: usize, score: f32, bbox: BBox) -> Candidate {
        Candidate { bbox, score, index }
    }

    #[test]
    fn overlapping_lower_score_is_dropped() {
        let b = BBox::new(0.0, 0.0, 10.0, 10.0);
        let keep = suppress(&[cand(0, 0.95, b), cand(1, 0.98, b)], 0.5);
        assert_eq!(keep, vec![1]);
    }

    #[test]
    fn ties_prefer_lower_index() {
        let b = BBox::new(0.0, 0.0, 10.0, 10.0);
        let keep = suppress(&[cand(4, 0.7, b), cand(2, 0.7, b), cand(3, 0.7, b)], 0.5);
        assert_eq!(keep, vec![2]);
    }

    #[test]
    fn threshold_is_strict() {
        // IoU exactly 1/3.
        let a = BBox::new(0.0, 0.0, 9.0, 9.0);
        let b = BBox::new(5.0, 0.0, 14.0, 9.0);
        let iou = a.iou(&b);
        let keep = suppress(&[cand(0, 0.9, a), cand(1, 0.8, b)], iou);
        assert_eq!(keep, vec![0, 1]);
        let keep = suppress(&[cand(0, 0.9, a), cand(1, 0.8, b)], iou - 1e-4);
        assert_eq!(keep, vec![0]);
    }

    #[test]
    fn chained_overlaps_follow_greedy_order() {
        // a overlaps b, b overlaps c, a does not overlap c: b goes, c stays.
        let a = BBox::new(0.0, 0.0, 9.0, 9.0);
        let b = BBox::new(3.0, 0.0, 12.0, 9.0);
        let c = BBox::new(8.0, 0.0, 17.0, 9.0);
        let keep = suppress(&[cand(0, 0.9, a), cand(1, 0.8, b), cand(2, 0.7, c)], 0.3);
        assert_eq!(keep, vec![0, 2]);
    }

    #[test]
    fn inverted_boxes_are_never_suppressed() {
        let b = BBox::new(9.0, 9.0, 1.0, 1.0);
        let keep = suppress(&[cand(0, 0.9, b), cand(1, 0.8, b)], 0.0);
        assert_eq!(keep, vec![0, 1]);
    }

    #[test]
    fn thresholds_outside_unit_interval_degenerate() {
        let b = BBox::new(0.0, 0.0, 4.0, 4.0);
        let far = BBox::new(50.0, 50.0, 54.0, 54.0);
        let cands = [cand(0, 0.9, b), cand(1, 0.8, b), cand(2, 0.7, far)];
        assert_eq!(suppress(&cands, 1.0), vec![0, 1, 2]);
        assert_eq!(suppress(&cands, -0.1), vec![0]);
    }

    #[test]
    fn empty_input_keeps_nothing() {
        assert!(suppress(&[], 0.5).is_empty());
    }

    #[test]
    fn per_class_skips_low_scores_and_labels_survivors() {
        let shape = ImageShape::new(64, 64).unwrap();
        let b = BBox::new(0.0, 0.0, 10.0, 10.0);
        let other = BBox::new(30.0, 30.0, 40.0, 40.0);
        // Two classes, three proposals.
        let boxes = [b, b, b, other, b, b];
        let probs = [0.9, 0.1, 0.2, 0.8, 0.02, 0.98];
        let stage = PerClassSuppressor {
            score_thresh: 0.5,
            nms_iou: 0.5,
        };
        let out = stage.run(&boxes, &probs, 2, 1, shape).unwrap();
        assert_eq!(out.len(), 2);
        assert_eq!(out.scores().unwrap(), &[0.98, 0.8]);
        assert_eq!(out.labels().unwrap(), &[1, 1]);
        assert_eq!(out.boxes(), &[b, other]);
    }
}
