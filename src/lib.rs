//! roipost turns the raw outputs of a two-stage detector's box head into
//! final per-image detections.
//!
//! The pipeline decodes regression deltas against reference boxes, applies a
//! per-proposal softmax, clips boxes to the image, runs greedy per-class NMS
//! and caps the number of detections per image by a score order statistic.
//! Parallelism over images is available with the `rayon` feature, an 8-lane
//! IoU kernel with the `simd` feature, and structured spans and events with
//! the `tracing` feature.
//!
//! ```
//! use roipost::{BBox, HeadOutputs, ImageProposals, ImageShape, PostProcessor};
//!
//! let proposals = [ImageProposals::new(
//!     vec![BBox::new(0.0, 0.0, 10.0, 10.0)],
//!     ImageShape::new(64, 48)?,
//! )];
//! let logits = [0.0, 4.0];
//! let deltas = [0.0; 8];
//! let out = PostProcessor::default().process(HeadOutputs::new(&logits, &deltas, 2), &proposals)?;
//! let detections = out[0].detections()?;
//! assert_eq!(detections.len(), 1);
//! assert_eq!(detections[0].label, 1);
//! # Ok::<(), roipost::RoiPostError>(())
//! ```

pub mod boxes;
pub mod coder;
pub mod kernel;
pub mod lowlevel;
pub mod postprocess;
pub mod score;
pub mod select;
pub mod suppress;
mod trace;
pub mod util;

pub use boxes::{BBox, BoxCollection, Detection, Field, ImageProposals, ImageShape};
pub use coder::{BoxCoder, CodingWeights, DeltaLayout};
pub use postprocess::{HeadOutputs, PostProcessConfig, PostProcessor};
pub use select::DetectionCapper;
pub use suppress::{suppress, Candidate, PerClassSuppressor};
pub use util::{RoiPostError, RoiPostResult};
