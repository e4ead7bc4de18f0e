//! Boxes, image shapes, and the overlap/regression codec.
//!
//! Boxes are stored as `(y1, x1, y2, x2)` in pixel coordinates of the
//! resized reference image. Extents use the inclusive pixel-edge convention:
//! a box spanning rows `y1..=y2` has height `y2 - y1 + 1`. Every area
//! computation in the crate (IoU, NMS, encoding) goes through that
//! convention.

pub mod codec;

use crate::util::{AnchorMatchError, AnchorMatchResult};

pub use codec::{clip, decode, encode, iou, regressions_from_flat, RegressionTarget};

/// Axis-aligned box in `(y1, x1, y2, x2)` order.
#[derive(Clone, Copy, Debug, PartialEq)]
pub struct BBox {
    y1: f32,
    x1: f32,
    y2: f32,
    x2: f32,
}

impl BBox {
    /// Creates a box, rejecting non-finite or inverted coordinates.
    pub fn new(y1: f32, x1: f32, y2: f32, x2: f32) -> AnchorMatchResult<Self> {
        let finite = y1.is_finite() && x1.is_finite() && y2.is_finite() && x2.is_finite();
        if !finite || y2 < y1 || x2 < x1 {
            return Err(AnchorMatchError::DegenerateBox {
                height: y2 - y1 + 1.0,
                width: x2 - x1 + 1.0,
            });
        }
        Ok(Self { y1, x1, y2, x2 })
    }

    /// Creates a box from `[y1, x1, y2, x2]`.
    pub fn from_array(coords: [f32; 4]) -> AnchorMatchResult<Self> {
        Self::new(coords[0], coords[1], coords[2], coords[3])
    }

    /// Builds a box whose invariants are guaranteed by the caller.
    pub(crate) const fn from_corners(y1: f32, x1: f32, y2: f32, x2: f32) -> Self {
        Self { y1, x1, y2, x2 }
    }

    pub fn y1(&self) -> f32 {
        self.y1
    }

    pub fn x1(&self) -> f32 {
        self.x1
    }

    pub fn y2(&self) -> f32 {
        self.y2
    }

    pub fn x2(&self) -> f32 {
        self.x2
    }

    /// Returns `[y1, x1, y2, x2]`.
    pub fn to_array(&self) -> [f32; 4] {
        [self.y1, self.x1, self.y2, self.x2]
    }

    /// Inclusive pixel height, `y2 - y1 + 1`.
    #[inline]
    pub fn height(&self) -> f32 {
        self.y2 - self.y1 + 1.0
    }

    /// Inclusive pixel width, `x2 - x1 + 1`.
    #[inline]
    pub fn width(&self) -> f32 {
        self.x2 - self.x1 + 1.0
    }

    /// Inclusive pixel area.
    #[inline]
    pub fn area(&self) -> f32 {
        self.height() * self.width()
    }

    /// Center as `(cy, cx)`, consistent with the regression encoding.
    #[inline]
    pub fn center(&self) -> (f32, f32) {
        (
            self.y1 + 0.5 * self.height(),
            self.x1 + 0.5 * self.width(),
        )
    }

    /// Returns true when all four coordinates are finite.
    pub fn is_finite(&self) -> bool {
        self.y1.is_finite() && self.x1.is_finite() && self.y2.is_finite() && self.x2.is_finite()
    }
}

/// Pixel shape `(height, width)` of the resized input image.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash)]
pub struct ImageShape {
    height: usize,
    width: usize,
}

impl ImageShape {
    /// Creates an image shape; both sides must be non-zero.
    pub fn new(height: usize, width: usize) -> AnchorMatchResult<Self> {
        if height == 0 || width == 0 {
            return Err(AnchorMatchError::ConfigurationMismatch {
                reason: "image shape must be non-zero",
            });
        }
        Ok(Self { height, width })
    }

    pub fn height(&self) -> usize {
        self.height
    }

    pub fn width(&self) -> usize {
        self.width
    }
}
