//! Boxes with index-aligned per-box fields.
//!
//! A `BoxCollection` owns `N` boxes for a single image plus any number of
//! named fields, each holding exactly `N` values. Every transformation
//! (`select`, `concat`, `clip_to_image`) returns a new collection, so a stage
//! never observes another stage's edits.

use std::collections::BTreeMap;

use crate::boxes::clip::clip_box;
use crate::boxes::{BBox, ImageShape};
use crate::util::{RoiPostError, RoiPostResult};

/// Field name holding detection confidences.
pub const SCORES: &str = "scores";
/// Field name holding integer class labels.
pub const LABELS: &str = "labels";

/// Per-box values stored alongside the boxes.
#[derive(Clone, Debug, PartialEq)]
pub enum Field {
    /// Real-valued data such as scores.
    Real(Vec<f32>),
    /// Categorical data such as class labels.
    Label(Vec<i64>),
}

impl Field {
    fn len(&self) -> usize {
        match self {
            Field::Real(values) => values.len(),
            Field::Label(values) => values.len(),
        }
    }

    fn same_kind(&self, other: &Field) -> bool {
        matches!(
            (self, other),
            (Field::Real(_), Field::Real(_)) | (Field::Label(_), Field::Label(_))
        )
    }

    fn gather(&self, indices: &[usize]) -> Field {
        match self {
            Field::Real(values) => Field::Real(indices.iter().map(|&i| values[i]).collect()),
            Field::Label(values) => Field::Label(indices.iter().map(|&i| values[i]).collect()),
        }
    }

    fn extend_from(&mut self, other: &Field) {
        match (self, other) {
            (Field::Real(dst), Field::Real(src)) => dst.extend_from_slice(src),
            (Field::Label(dst), Field::Label(src)) => dst.extend_from_slice(src),
            _ => {}
        }
    }
}

/// A final detection record.
#[derive(Clone, Copy, Debug, PartialEq)]
pub struct Detection {
    /// Box in clipped image coordinates.
    pub bbox: BBox,
    /// Class probability.
    pub score: f32,
    /// Class label, never 0 (background) after filtering.
    pub label: i64,
}

/// Boxes of one image plus index-aligned fields.
#[derive(Clone, Debug, PartialEq)]
pub struct BoxCollection {
    boxes: Vec<BBox>,
    shape: ImageShape,
    fields: BTreeMap<String, Field>,
}

impl BoxCollection {
    /// Creates a collection without fields.
    pub fn new(boxes: Vec<BBox>, shape: ImageShape) -> Self {
        Self {
            boxes,
            shape,
            fields: BTreeMap::new(),
        }
    }

    /// Creates an empty collection carrying `scores` and `labels` fields.
    pub fn empty_detections(shape: ImageShape) -> Self {
        let mut fields = BTreeMap::new();
        fields.insert(SCORES.to_owned(), Field::Real(Vec::new()));
        fields.insert(LABELS.to_owned(), Field::Label(Vec::new()));
        Self {
            boxes: Vec::new(),
            shape,
            fields,
        }
    }

    /// Returns the collection with an additional field.
    ///
    /// Fails with `ShapeMismatch` if `field` does not hold one value per box.
    pub fn with_field(mut self, name: &str, field: Field) -> RoiPostResult<Self> {
        if field.len() != self.boxes.len() {
            return Err(RoiPostError::ShapeMismatch {
                what: "collection field",
                expected: self.boxes.len(),
                got: field.len(),
            });
        }
        self.fields.insert(name.to_owned(), field);
        Ok(self)
    }

    /// Shorthand for attaching a real-valued field.
    pub fn with_real_field(self, name: &str, values: Vec<f32>) -> RoiPostResult<Self> {
        self.with_field(name, Field::Real(values))
    }

    /// Shorthand for attaching a label field.
    pub fn with_label_field(self, name: &str, values: Vec<i64>) -> RoiPostResult<Self> {
        self.with_field(name, Field::Label(values))
    }

    /// Number of boxes.
    pub fn len(&self) -> usize {
        self.boxes.len()
    }

    /// True when the collection holds no boxes.
    pub fn is_empty(&self) -> bool {
        self.boxes.is_empty()
    }

    /// Returns the boxes.
    pub fn boxes(&self) -> &[BBox] {
        &self.boxes
    }

    /// Returns the image the boxes belong to.
    pub fn image_shape(&self) -> ImageShape {
        self.shape
    }

    /// Returns `true` when a field with `name` exists.
    pub fn has_field(&self, name: &str) -> bool {
        self.fields.contains_key(name)
    }

    /// Field names in sorted order.
    pub fn field_names(&self) -> impl Iterator<Item = &str> {
        self.fields.keys().map(String::as_str)
    }

    /// Returns a field by name.
    pub fn field(&self, name: &str) -> RoiPostResult<&Field> {
        self.fields
            .get(name)
            .ok_or_else(|| RoiPostError::MissingField {
                name: name.to_owned(),
            })
    }

    /// Returns a real-valued field.
    pub fn real_field(&self, name: &str) -> RoiPostResult<&[f32]> {
        match self.field(name)? {
            Field::Real(values) => Ok(values),
            Field::Label(_) => Err(RoiPostError::FieldMismatch {
                name: name.to_owned(),
            }),
        }
    }

    /// Returns a label field.
    pub fn label_field(&self, name: &str) -> RoiPostResult<&[i64]> {
        match self.field(name)? {
            Field::Label(values) => Ok(values),
            Field::Real(_) => Err(RoiPostError::FieldMismatch {
                name: name.to_owned(),
            }),
        }
    }

    /// Returns the `scores` field.
    pub fn scores(&self) -> RoiPostResult<&[f32]> {
        self.real_field(SCORES)
    }

    /// Returns the `labels` field.
    pub fn labels(&self) -> RoiPostResult<&[i64]> {
        self.label_field(LABELS)
    }

    /// Inclusive box areas.
    pub fn areas(&self) -> Vec<f32> {
        self.boxes.iter().map(BBox::area).collect()
    }

    /// Builds a new collection from the boxes at `indices`, in that order.
    pub fn select(&self, indices: &[usize]) -> RoiPostResult<Self> {
        let len = self.boxes.len();
        if let Some(&index) = indices.iter().find(|&&i| i >= len) {
            return Err(RoiPostError::IndexOutOfBounds {
                index,
                len,
                context: "box collection",
            });
        }
        Ok(Self {
            boxes: indices.iter().map(|&i| self.boxes[i]).collect(),
            shape: self.shape,
            fields: self
                .fields
                .iter()
                .map(|(name, field)| (name.clone(), field.gather(indices)))
                .collect(),
        })
    }

    /// Concatenates collections of the same image.
    ///
    /// All parts must share the image shape and carry the same field names
    /// with the same kinds. An empty `parts` slice yields an empty collection
    /// without fields.
    pub fn concat(shape: ImageShape, parts: &[BoxCollection]) -> RoiPostResult<Self> {
        let Some(first) = parts.first() else {
            return Ok(Self::new(Vec::new(), shape));
        };
        for part in parts {
            if part.shape != shape {
                return Err(RoiPostError::ImageShapeMismatch {
                    width: shape.width,
                    height: shape.height,
                    got_width: part.shape.width,
                    got_height: part.shape.height,
                });
            }
            if part.fields.len() != first.fields.len() {
                let name = first
                    .fields
                    .keys()
                    .chain(part.fields.keys())
                    .find(|name| !(first.has_field(name) && part.has_field(name)))
                    .cloned()
                    .unwrap_or_default();
                return Err(RoiPostError::FieldMismatch { name });
            }
            for (name, field) in &first.fields {
                match part.fields.get(name) {
                    Some(other) if other.same_kind(field) => {}
                    _ => return Err(RoiPostError::FieldMismatch { name: name.clone() }),
                }
            }
        }

        let total = parts.iter().map(BoxCollection::len).sum();
        let mut boxes = Vec::with_capacity(total);
        let mut fields = first.fields.clone();
        boxes.extend_from_slice(&first.boxes);
        for part in &parts[1..] {
            boxes.extend_from_slice(&part.boxes);
            for (name, field) in fields.iter_mut() {
                if let Some(src) = part.fields.get(name) {
                    field.extend_from(src);
                }
            }
        }
        Ok(Self {
            boxes,
            shape,
            fields,
        })
    }

    /// Clamps all boxes to the image bounds.
    ///
    /// With `remove_empty`, boxes that end up with `x2 <= x1` or `y2 <= y1`
    /// are dropped together with their field values.
    pub fn clip_to_image(&self, remove_empty: bool) -> Self {
        let clipped = Self {
            boxes: self
                .boxes
                .iter()
                .map(|&b| clip_box(b, self.shape))
                .collect(),
            shape: self.shape,
            fields: self.fields.clone(),
        };
        if !remove_empty {
            return clipped;
        }
        let keep: Vec<usize> = clipped
            .boxes
            .iter()
            .enumerate()
            .filter(|(_, b)| !b.is_empty())
            .map(|(i, _)| i)
            .collect();
        if keep.len() == clipped.len() {
            return clipped;
        }
        Self {
            boxes: keep.iter().map(|&i| clipped.boxes[i]).collect(),
            shape: clipped.shape,
            fields: clipped
                .fields
                .iter()
                .map(|(name, field)| (name.clone(), field.gather(&keep)))
                .collect(),
        }
    }

    /// Converts the collection into detection records.
    ///
    /// Requires `scores` and `labels` fields.
    pub fn detections(&self) -> RoiPostResult<Vec<Detection>> {
        let scores = self.scores()?;
        let labels = self.labels()?;
        Ok(self
            .boxes
            .iter()
            .zip(scores)
            .zip(labels)
            .map(|((&bbox, &score), &label)| Detection { bbox, score, label })
            .collect())
    }
}
