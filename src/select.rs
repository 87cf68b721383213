//! Per-image detection cap by score order statistic.

use crate::boxes::BoxCollection;
use crate::trace::trace_event;
use crate::util::RoiPostResult;

/// Returns the `k`-th smallest value (1-based), or `None` if `k` is out of range.
///
/// Uses `select_nth_unstable_by` with `total_cmp`, so the input is only
/// partially reordered and NaN sorts above every number.
pub fn kth_smallest(values: &[f32], k: usize) -> Option<f32> {
    if k == 0 || k > values.len() {
        return None;
    }
    let mut scratch = values.to_vec();
    let (_, kth, _) = scratch.select_nth_unstable_by(k - 1, f32::total_cmp);
    Some(*kth)
}

/// Limits the number of detections kept for one image.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub struct DetectionCapper {
    /// Maximum detections per image; zero or negative disables the cap.
    pub max_detections: i64,
}

impl DetectionCapper {
    /// Applies the cap to the merged survivors of every class.
    ///
    /// With `total > cap > 0`, the cutoff is the `cap`-th largest score and
    /// every detection scoring at least the cutoff is kept in its merged
    /// order. Ties at the cutoff can therefore keep more than `cap` boxes.
    pub fn apply(&self, merged: BoxCollection) -> RoiPostResult<BoxCollection> {
        let total = merged.len();
        let cap = match usize::try_from(self.max_detections) {
            Ok(cap) if cap > 0 && total > cap => cap,
            _ => return Ok(merged),
        };

        let scores = merged.scores()?;
        let Some(cutoff) = kth_smallest(scores, total - cap + 1) else {
            return Ok(merged);
        };
        let keep: Vec<usize> = scores
            .iter()
            .enumerate()
            .filter(|&(_, &score)| score >= cutoff)
            .map(|(i, _)| i)
            .collect();

        trace_event!(
            "detections_capped",
            total = total,
            cap = cap,
            kept = keep.len(),
            cutoff = cutoff
        );
        merged.select(&keep)
    }
}

#[cfg(test)]
mod tests {
    use super::{kth_smallest, DetectionCapper};
    use crate::boxes::collection::SCORES;
    use crate::boxes::{BBox, BoxCollection, ImageShape};

    fn scored(scores: &[f32]) -> BoxCollection {
        let shape = ImageShape::new(100, 100).unwrap();
        let boxes = (0..scores.len())
            .map(|i| {
                let x = i as f32 * 10.0;
                BBox::new(x, 0.0, x + 5.0, 5.0)
            })
            .collect();
        BoxCollection::new(boxes, shape)
            .with_real_field(SCORES, scores.to_vec())
            .unwrap()
    }

    #[test]
    fn kth_smallest_matches_sorted_position() {
        let values = [0.4, 0.1, 0.9, 0.3, 0.7];
        assert_eq!(kth_smallest(&values, 1), Some(0.1));
        assert_eq!(kth_smallest(&values, 3), Some(0.4));
        assert_eq!(kth_smallest(&values, 5), Some(0.9));
        assert_eq!(kth_smallest(&values, 0), None);
        assert_eq!(kth_smallest(&values, 6), None);
    }

    #[test]
    fn keeps_top_scores_in_merged_order() {
        let capped = DetectionCapper { max_detections: 3 }
            .apply(scored(&[0.5, 0.9, 0.6, 0.8, 0.7]))
            .unwrap();
        assert_eq!(capped.scores().unwrap(), &[0.9, 0.8, 0.7]);
    }

    #[test]
    fn ties_at_cutoff_are_all_kept() {
        let capped = DetectionCapper { max_detections: 2 }
            .apply(scored(&[0.9, 0.6, 0.6, 0.6, 0.1]))
            .unwrap();
        assert_eq!(capped.scores().unwrap(), &[0.9, 0.6, 0.6, 0.6]);
    }

    #[test]
    fn non_positive_cap_disables() {
        let input = scored(&[0.3, 0.2, 0.1]);
        for cap in [0, -1] {
            let out = DetectionCapper {
                max_detections: cap,
            }
            .apply(input.clone())
            .unwrap();
            assert_eq!(out, input);
        }
    }

    #[test]
    fn under_cap_is_untouched() {
        let input = scored(&[0.3, 0.2]);
        let out = DetectionCapper { max_detections: 2 }
            .apply(input.clone())
            .unwrap();
        assert_eq!(out, input);
    }
}
