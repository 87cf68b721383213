//! Building blocks for custom post-processing pipelines.
//!
//! Most callers only need [`crate::PostProcessor`]. These re-exports cover
//! callers that aggregate boxes themselves (for example across test-time
//! augmentations) and want to reuse individual stages.

pub use crate::boxes::collection::{LABELS, SCORES};
pub use crate::boxes::PIXEL_OFFSET;
pub use crate::coder::DEFAULT_XFORM_CLIP;
pub use crate::kernel::scalar::ScalarOverlap;
#[cfg(feature = "simd")]
pub use crate::kernel::simd::SimdOverlap;
pub use crate::kernel::{DefaultKernel, OverlapKernel};
#[cfg(feature = "rayon")]
pub use crate::score::softmax_rows_par;
pub use crate::score::{softmax_in_place, softmax_rows};
pub use crate::select::kth_smallest;
pub use crate::suppress::{nms_collection, sort_candidates_desc, suppress_with};
