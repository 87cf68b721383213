//! Decoding regression deltas into absolute boxes.
//!
//! Reference boxes use the inclusive-pixel convention (see [`crate::boxes`]):
//! width is `x2 - x1 + 1` and the center sits at `x1 + 0.5 * width`. Decoded
//! boxes are mapped back with `x2 = cx + 0.5 * w - 1`, so a zero delta
//! reproduces the reference box exactly.

use crate::boxes::{BBox, PIXEL_OFFSET};
use crate::util::{RoiPostError, RoiPostResult};

/// Default cap on `dw / ww` and `dh / wh` before exponentiation: `ln(1000 / 16)`.
pub const DEFAULT_XFORM_CLIP: f32 = 4.135_166_6;

/// Per-coordinate divisors applied to raw deltas.
#[derive(Clone, Copy, Debug, PartialEq)]
pub struct CodingWeights {
    pub wx: f32,
    pub wy: f32,
    pub ww: f32,
    pub wh: f32,
}

impl Default for CodingWeights {
    fn default() -> Self {
        Self {
            wx: 10.0,
            wy: 10.0,
            ww: 5.0,
            wh: 5.0,
        }
    }
}

impl CodingWeights {
    /// Rejects zero or non-finite weights.
    pub fn validate(&self) -> RoiPostResult<()> {
        let all = [self.wx, self.wy, self.ww, self.wh];
        if all.iter().any(|w| !w.is_finite()) {
            return Err(RoiPostError::InvalidConfig {
                reason: "coding weights must be finite",
            });
        }
        if all.iter().any(|&w| w == 0.0) {
            return Err(RoiPostError::InvalidConfig {
                reason: "coding weights must be non-zero",
            });
        }
        Ok(())
    }
}

/// How regression deltas are laid out per proposal.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq)]
pub enum DeltaLayout {
    /// One delta per class: `[N, 4 * C]`.
    #[default]
    PerClass,
    /// One delta shared by every class: `[N, 4]`.
    Shared,
}

/// Box decoder for a fixed set of weights.
#[derive(Clone, Copy, Debug, PartialEq)]
pub struct BoxCoder {
    weights: CodingWeights,
    xform_clip: f32,
}

impl Default for BoxCoder {
    fn default() -> Self {
        Self {
            weights: CodingWeights::default(),
            xform_clip: DEFAULT_XFORM_CLIP,
        }
    }
}

impl BoxCoder {
    /// Creates a decoder, validating weights and the size clamp.
    pub fn new(weights: CodingWeights, xform_clip: f32) -> RoiPostResult<Self> {
        weights.validate()?;
        if !xform_clip.is_finite() {
            return Err(RoiPostError::InvalidConfig {
                reason: "bbox_xform_clip must be finite",
            });
        }
        Ok(Self {
            weights,
            xform_clip,
        })
    }

    /// Returns the coding weights.
    pub fn weights(&self) -> CodingWeights {
        self.weights
    }

    /// Returns the clamp applied to scaled size deltas.
    pub fn xform_clip(&self) -> f32 {
        self.xform_clip
    }

    /// Applies one `(dx, dy, dw, dh)` delta to a reference box.
    #[inline]
    pub fn decode_one(&self, reference: &BBox, delta: [f32; 4]) -> BBox {
        let w = reference.x2 - reference.x1 + PIXEL_OFFSET;
        let h = reference.y2 - reference.y1 + PIXEL_OFFSET;
        let cx = reference.x1 + 0.5 * w;
        let cy = reference.y1 + 0.5 * h;

        let CodingWeights { wx, wy, ww, wh } = self.weights;
        let dx = delta[0] / wx;
        let dy = delta[1] / wy;
        let dw = (delta[2] / ww).min(self.xform_clip);
        let dh = (delta[3] / wh).min(self.xform_clip);

        let pred_cx = dx * w + cx;
        let pred_cy = dy * h + cy;
        let pred_w = dw.exp() * w;
        let pred_h = dh.exp() * h;

        BBox {
            x1: pred_cx - 0.5 * pred_w,
            y1: pred_cy - 0.5 * pred_h,
            x2: pred_cx + 0.5 * pred_w - PIXEL_OFFSET,
            y2: pred_cy + 0.5 * pred_h - PIXEL_OFFSET,
        }
    }

    /// Decodes a row-major delta buffer against `references`.
    ///
    /// Returns `references.len() * num_classes` boxes where the box for
    /// proposal `i` and class `j` sits at `i * num_classes + j`. With
    /// [`DeltaLayout::Shared`] each proposal is decoded once and the box is
    /// repeated for every class.
    pub fn decode(
        &self,
        deltas: &[f32],
        references: &[BBox],
        num_classes: usize,
        layout: DeltaLayout,
    ) -> RoiPostResult<Vec<BBox>> {
        if num_classes == 0 {
            return Err(RoiPostError::InvalidClassCount { num_classes });
        }
        let n = references.len();
        let row_width = delta_row_width(deltas.len(), n, num_classes, layout)?;

        let mut out = Vec::with_capacity(n * num_classes);
        match layout {
            DeltaLayout::PerClass => {
                for (reference, row) in references.iter().zip(deltas.chunks_exact(row_width)) {
                    for d in row.chunks_exact(4) {
                        out.push(self.decode_one(reference, [d[0], d[1], d[2], d[3]]));
                    }
                }
            }
            DeltaLayout::Shared => {
                for (reference, d) in references.iter().zip(deltas.chunks_exact(row_width)) {
                    let decoded = self.decode_one(reference, [d[0], d[1], d[2], d[3]]);
                    out.extend(std::iter::repeat(decoded).take(num_classes));
                }
            }
        }
        Ok(out)
    }
}

/// Validates the delta buffer size and returns the per-proposal row width.
pub(crate) fn delta_row_width(
    len: usize,
    num_proposals: usize,
    num_classes: usize,
    layout: DeltaLayout,
) -> RoiPostResult<usize> {
    let per_class = 4 * num_classes;
    match layout {
        DeltaLayout::PerClass if len == num_proposals * per_class => Ok(per_class),
        DeltaLayout::Shared if len == num_proposals * 4 => Ok(4),
        DeltaLayout::PerClass => Err(RoiPostError::ShapeMismatch {
            what: "box deltas",
            expected: num_proposals * per_class,
            got: len,
        }),
        DeltaLayout::Shared => Err(RoiPostError::ShapeMismatch {
            what: "box deltas",
            expected: num_proposals * 4,
            got: len,
        }),
    }
}
