//! Post-processing configuration.

use crate::coder::{CodingWeights, DeltaLayout, DEFAULT_XFORM_CLIP};
use crate::util::{RoiPostError, RoiPostResult};

/// Configuration for [`crate::PostProcessor`].
///
/// Every value is fixed when the processor is built; nothing is read from
/// ambient state at run time.
#[derive(Clone, Debug, PartialEq)]
pub struct PostProcessConfig {
    /// Class probabilities must exceed this value to become candidates.
    pub score_thresh: f32,
    /// IoU above which a lower-scoring box of the same class is suppressed.
    /// Values outside `(0, 1)` are accepted and degenerate to "suppress
    /// everything" or "suppress nothing".
    pub nms_iou: f32,
    /// Per-image detection cap; zero or negative disables it.
    pub detections_per_img: i64,
    /// Delta divisors `(wx, wy, ww, wh)`.
    pub coding_weights: CodingWeights,
    /// Upper bound on scaled size deltas before `exp`.
    pub bbox_xform_clip: f32,
    /// Per-class or shared regression deltas.
    pub delta_layout: DeltaLayout,
    /// Return decoded, clipped boxes with scores and skip NMS and the cap.
    pub defer_filtering: bool,
    /// Drop boxes left empty by clipping from filtered results.
    pub remove_empty: bool,
    /// Process images in parallel (requires the `rayon` feature).
    pub parallel: bool,
}

impl Default for PostProcessConfig {
    fn default() -> Self {
        Self {
            score_thresh: 0.05,
            nms_iou: 0.5,
            detections_per_img: 100,
            coding_weights: CodingWeights::default(),
            bbox_xform_clip: DEFAULT_XFORM_CLIP,
            delta_layout: DeltaLayout::PerClass,
            defer_filtering: false,
            remove_empty: false,
            parallel: false,
        }
    }
}

impl PostProcessConfig {
    /// Checks value ranges.
    pub fn validate(&self) -> RoiPostResult<()> {
        if !self.score_thresh.is_finite() || !(0.0..=1.0).contains(&self.score_thresh) {
            return Err(RoiPostError::InvalidConfig {
                reason: "score_thresh must be a finite value in [0, 1]",
            });
        }
        if self.nms_iou.is_nan() {
            return Err(RoiPostError::InvalidConfig {
                reason: "nms_iou must be a number",
            });
        }
        if !self.bbox_xform_clip.is_finite() {
            return Err(RoiPostError::InvalidConfig {
                reason: "bbox_xform_clip must be finite",
            });
        }
        self.coding_weights.validate()
    }
}

#[cfg(test)]
mod tests {
    use super::PostProcessConfig;
    use crate::coder::CodingWeights;
    use crate::util::RoiPostError;

    #[test]
    fn defaults_are_valid() {
        assert!(PostProcessConfig::default().validate().is_ok());
    }

    #[test]
    fn score_thresh_outside_unit_interval_is_rejected() {
        for score_thresh in [-0.1, 1.5, f32::NAN, f32::INFINITY] {
            let cfg = PostProcessConfig {
                score_thresh,
                ..PostProcessConfig::default()
            };
            assert!(matches!(
                cfg.validate(),
                Err(RoiPostError::InvalidConfig { .. })
            ));
        }
    }

    #[test]
    fn degenerate_nms_iou_is_allowed() {
        for nms_iou in [-1.0, 0.0, 1.0, 2.0] {
            let cfg = PostProcessConfig {
                nms_iou,
                ..PostProcessConfig::default()
            };
            assert!(cfg.validate().is_ok());
        }
        let cfg = PostProcessConfig {
            nms_iou: f32::NAN,
            ..PostProcessConfig::default()
        };
        assert!(cfg.validate().is_err());
    }

    #[test]
    fn bad_weights_are_rejected() {
        let cfg = PostProcessConfig {
            coding_weights: CodingWeights {
                wx: f32::INFINITY,
                ..CodingWeights::default()
            },
            ..PostProcessConfig::default()
        };
        assert!(cfg.validate().is_err());
    }
}
