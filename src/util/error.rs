//! Error types for roipost.

use thiserror::Error;

/// Result alias for roipost operations.
pub type RoiPostResult<T> = std::result::Result<T, RoiPostError>;

/// Errors that can occur while post-processing detections.
#[derive(Clone, Debug, Error, PartialEq)]
pub enum RoiPostError {
    /// An input buffer does not have the length implied by the declared shape.
    #[error("shape mismatch for {what}: expected {expected}, got {got}")]
    ShapeMismatch {
        what: &'static str,
        expected: usize,
        got: usize,
    },
    /// A configuration value is outside its accepted range.
    #[error("invalid configuration: {reason}")]
    InvalidConfig { reason: &'static str },
    /// Image width or height is zero.
    #[error("invalid image shape {width}x{height}")]
    InvalidImageShape { width: u32, height: u32 },
    /// Collections from different images cannot be combined.
    #[error("image shape {got_width}x{got_height} does not match {width}x{height}")]
    ImageShapeMismatch {
        width: u32,
        height: u32,
        got_width: u32,
        got_height: u32,
    },
    /// The class axis must hold at least one class.
    #[error("invalid class count {num_classes}")]
    InvalidClassCount { num_classes: usize },
    /// A required collection field is absent.
    #[error("missing field '{name}'")]
    MissingField { name: String },
    /// A field exists with a different kind or is not shared by all parts.
    #[error("field '{name}' does not match across collections")]
    FieldMismatch { name: String },
    /// An index is outside the valid range.
    #[error("index {index} out of bounds for {context} (len {len})")]
    IndexOutOfBounds {
        index: usize,
        len: usize,
        context: &'static str,
    },
}
