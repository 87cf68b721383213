//! Axis-aligned boxes and per-image containers.
//!
//! Coordinates are absolute pixels in `(x1, y1, x2, y2)` order and follow the
//! pixel-inclusive convention: a box spanning columns `x1..=x2` has width
//! `x2 - x1 + 1`. Decoding, clipping and IoU all use this convention.
//!
//! Area and emptiness are different tests:
//!
//! - [`BBox::area`] (and therefore IoU) is inclusive. A box with `x1 == x2`
//!   is one pixel wide, has positive area and takes part in suppression.
//!   Only `x2 < x1` or `y2 < y1` gives zero area.
//! - [`BBox::is_empty`] is `x2 <= x1 || y2 <= y1`. It is only consulted by
//!   `remove_empty`, which drops such slivers from the final output.
//!
//! A box clipped flat against the image edge, say `(39, 0, 39, 9)`, is thus
//! empty for `remove_empty` while still overlapping its neighbours in NMS.

use crate::util::{RoiPostError, RoiPostResult};

pub(crate) mod clip;
pub mod collection;

pub use collection::{BoxCollection, Detection, Field};

/// Offset added to coordinate differences to obtain inclusive pixel extents.
pub const PIXEL_OFFSET: f32 = 1.0;

/// Axis-aligned box in absolute pixel coordinates.
#[derive(Clone, Copy, Debug, Default, PartialEq)]
pub struct BBox {
    pub x1: f32,
    pub y1: f32,
    pub x2: f32,
    pub y2: f32,
}

impl BBox {
    /// Creates a box from corner coordinates.
    pub const fn new(x1: f32, y1: f32, x2: f32, y2: f32) -> Self {
        Self { x1, y1, x2, y2 }
    }

    /// Builds a box from a `[x1, y1, x2, y2]` slice.
    ///
    /// Returns `None` when the slice does not hold exactly four values.
    pub fn from_slice(coords: &[f32]) -> Option<Self> {
        match *coords {
            [x1, y1, x2, y2] => Some(Self { x1, y1, x2, y2 }),
            _ => None,
        }
    }

    /// Returns the coordinates as an array.
    pub fn to_array(self) -> [f32; 4] {
        [self.x1, self.y1, self.x2, self.y2]
    }

    /// Inclusive width, clamped at zero.
    #[inline]
    pub fn width(&self) -> f32 {
        (self.x2 - self.x1 + PIXEL_OFFSET).max(0.0)
    }

    /// Inclusive height, clamped at zero.
    #[inline]
    pub fn height(&self) -> f32 {
        (self.y2 - self.y1 + PIXEL_OFFSET).max(0.0)
    }

    /// Inclusive area, zero for inverted boxes.
    #[inline]
    pub fn area(&self) -> f32 {
        self.width() * self.height()
    }

    /// True when the box has no interior after clipping (`x2 <= x1` or `y2 <= y1`).
    #[inline]
    pub fn is_empty(&self) -> bool {
        self.x2 <= self.x1 || self.y2 <= self.y1
    }

    /// Intersection-over-union with another box.
    ///
    /// Returns 0 when either box has zero area, so inverted boxes never
    /// overlap anything, including themselves.
    pub fn iou(&self, other: &BBox) -> f32 {
        crate::kernel::scalar::iou(self, other)
    }
}

/// Image size in pixels.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash)]
pub struct ImageShape {
    pub width: u32,
    pub height: u32,
}

impl ImageShape {
    /// Creates an image shape, rejecting zero-sized dimensions.
    pub fn new(width: u32, height: u32) -> RoiPostResult<Self> {
        if width == 0 || height == 0 {
            return Err(RoiPostError::InvalidImageShape { width, height });
        }
        Ok(Self { width, height })
    }

    /// Largest valid x coordinate.
    pub fn max_x(&self) -> f32 {
        self.width as f32 - PIXEL_OFFSET
    }

    /// Largest valid y coordinate.
    pub fn max_y(&self) -> f32 {
        self.height as f32 - PIXEL_OFFSET
    }
}

/// Reference boxes for one image together with the image size.
#[derive(Clone, Debug)]
pub struct ImageProposals {
    boxes: Vec<BBox>,
    shape: ImageShape,
}

impl ImageProposals {
    /// Creates a per-image proposal set.
    pub fn new(boxes: Vec<BBox>, shape: ImageShape) -> Self {
        Self { boxes, shape }
    }

    /// Builds proposals from a flat row-major `[n, 4]` buffer.
    pub fn from_flat(coords: &[f32], shape: ImageShape) -> RoiPostResult<Self> {
        if coords.len() % 4 != 0 {
            return Err(RoiPostError::ShapeMismatch {
                what: "proposal coordinates",
                expected: coords.len() / 4 * 4,
                got: coords.len(),
            });
        }
        let boxes = coords
            .chunks_exact(4)
            .map(|c| BBox::new(c[0], c[1], c[2], c[3]))
            .collect();
        Ok(Self { boxes, shape })
    }

    /// Returns the reference boxes.
    pub fn boxes(&self) -> &[BBox] {
        &self.boxes
    }

    /// Returns the image shape.
    pub fn shape(&self) -> ImageShape {
        self.shape
    }

    /// Number of proposals for this image.
    pub fn len(&self) -> usize {
        self.boxes.len()
    }

    /// True when the image has no proposals.
    pub fn is_empty(&self) -> bool {
        self.boxes.is_empty()
    }
}

#[cfg(test)]
mod tests {
    use super::clip::clip_box;
    use super::{BBox, ImageProposals, ImageShape};
    use crate::util::RoiPostError;

    #[test]
    fn inclusive_extent_counts_both_edges() {
        let b = BBox::new(0.0, 0.0, 9.0, 4.0);
        assert_eq!(b.width(), 10.0);
        assert_eq!(b.height(), 5.0);
        assert_eq!(b.area(), 50.0);
    }

    #[test]
    fn inverted_box_has_zero_area() {
        let b = BBox::new(5.0, 5.0, 2.0, 8.0);
        assert_eq!(b.area(), 0.0);
        assert!(b.is_empty());
    }

    #[test]
    fn edge_sliver_is_empty_but_still_overlaps() {
        let shape = ImageShape::new(40, 10).unwrap();
        let sliver = clip_box(BBox::new(39.0, 0.0, 55.0, 9.0), shape);
        assert_eq!(sliver, BBox::new(39.0, 0.0, 39.0, 9.0));
        assert!(sliver.is_empty());
        assert_eq!(sliver.area(), 10.0);
        assert_eq!(sliver.iou(&sliver), 1.0);

        // Ten of the neighbour's hundred pixels are shared.
        let neighbour = BBox::new(30.0, 0.0, 39.0, 9.0);
        assert!((sliver.iou(&neighbour) - 0.1).abs() < 1e-6);
    }

    #[test]
    fn image_shape_rejects_zero() {
        assert_eq!(
            ImageShape::new(0, 10),
            Err(RoiPostError::InvalidImageShape {
                width: 0,
                height: 10
            })
        );
    }

    #[test]
    fn proposals_from_flat_requires_quads() {
        let shape = ImageShape::new(10, 10).unwrap();
        assert!(ImageProposals::from_flat(&[0.0; 7], shape).is_err());
        let p = ImageProposals::from_flat(&[0.0, 1.0, 2.0, 3.0], shape).unwrap();
        assert_eq!(p.boxes(), &[BBox::new(0.0, 1.0, 2.0, 3.0)]);
    }
}
