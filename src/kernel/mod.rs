//! Batched overlap kernels.
//!
//! Assignment needs the IoU of every anchor against each ground-truth box,
//! which is tens of thousands of evaluations per box. Anchors are therefore
//! stored column-wise in [`BoxColumns`] and a kernel fills one IoU per anchor
//! in a single tight pass. All kernels produce bit-identical results to
//! [`crate::geometry::iou`].

use crate::geometry::BBox;
use crate::util::{AnchorMatchError, AnchorMatchResult};

/// Column-major storage of box corners and inclusive areas.
#[derive(Clone, Debug, Default, PartialEq)]
pub struct BoxColumns {
    y1: Vec<f32>,
    x1: Vec<f32>,
    y2: Vec<f32>,
    x2: Vec<f32>,
    area: Vec<f32>,
}

impl BoxColumns {
    /// Splits boxes into columns, precomputing areas.
    pub fn from_boxes(boxes: &[BBox]) -> Self {
        let mut cols = Self {
            y1: Vec::with_capacity(boxes.len()),
            x1: Vec::with_capacity(boxes.len()),
            y2: Vec::with_capacity(boxes.len()),
            x2: Vec::with_capacity(boxes.len()),
            area: Vec::with_capacity(boxes.len()),
        };
        for b in boxes {
            cols.y1.push(b.y1());
            cols.x1.push(b.x1());
            cols.y2.push(b.y2());
            cols.x2.push(b.x2());
            cols.area.push(b.area());
        }
        cols
    }

    pub fn len(&self) -> usize {
        self.area.len()
    }

    pub fn is_empty(&self) -> bool {
        self.area.is_empty()
    }

    /// Borrowed view over all columns.
    pub fn view(&self) -> ColumnsView<'_> {
        ColumnsView {
            y1: &self.y1,
            x1: &self.x1,
            y2: &self.y2,
            x2: &self.x2,
            area: &self.area,
        }
    }
}

/// Borrowed slice of [`BoxColumns`], all columns of equal length.
#[derive(Clone, Copy, Debug)]
pub struct ColumnsView<'a> {
    pub(crate) y1: &'a [f32],
    pub(crate) x1: &'a [f32],
    pub(crate) y2: &'a [f32],
    pub(crate) x2: &'a [f32],
    pub(crate) area: &'a [f32],
}

impl<'a> ColumnsView<'a> {
    pub fn len(&self) -> usize {
        self.area.len()
    }

    pub fn is_empty(&self) -> bool {
        self.area.is_empty()
    }

    /// Sub-view over `start..end`; panics if the range is out of bounds.
    pub fn range(&self, start: usize, end: usize) -> ColumnsView<'a> {
        ColumnsView {
            y1: &self.y1[start..end],
            x1: &self.x1[start..end],
            y2: &self.y2[start..end],
            x2: &self.x2[start..end],
            area: &self.area[start..end],
        }
    }

    /// Center `(cy, cx)` of the box at `idx`, matching [`BBox::center`].
    pub(crate) fn center_at(&self, idx: usize) -> (f32, f32) {
        let h = self.y2[idx] - self.y1[idx] + 1.0;
        let w = self.x2[idx] - self.x1[idx] + 1.0;
        (self.y1[idx] + 0.5 * h, self.x1[idx] + 0.5 * w)
    }
}

/// Kernel trait for one-against-many overlap evaluation.
pub trait OverlapKernel {
    /// Writes `iou(anchor_i, query)` into `out[i]` for every anchor.
    ///
    /// `out.len()` must equal `anchors.len()`. A query with non-positive
    /// area yields all zeros.
    fn overlaps(anchors: ColumnsView<'_>, query: &BBox, out: &mut [f32]);
}

pub mod scalar;

#[cfg(feature = "simd")]
pub mod simd;

#[cfg(feature = "rayon")]
pub mod rayon;

#[cfg(not(feature = "simd"))]
pub(crate) use scalar::ScalarOverlap as DefaultOverlap;
#[cfg(feature = "simd")]
pub(crate) use simd::SimdOverlap as DefaultOverlap;

/// Fills `out` with overlaps using the best kernel compiled in.
///
/// `parallel` only has an effect when the `rayon` feature is enabled.
pub fn overlaps_into(
    anchors: ColumnsView<'_>,
    query: &BBox,
    out: &mut [f32],
    parallel: bool,
) -> AnchorMatchResult<()> {
    if out.len() != anchors.len() {
        return Err(AnchorMatchError::ShapeMismatch {
            expected: anchors.len(),
            got: out.len(),
            context: "overlap output",
        });
    }

    if parallel {
        overlaps_parallel(anchors, query, out);
    } else {
        <DefaultOverlap as OverlapKernel>::overlaps(anchors, query, out);
    }
    Ok(())
}

#[cfg(feature = "rayon")]
fn overlaps_parallel(anchors: ColumnsView<'_>, query: &BBox, out: &mut [f32]) {
    self::rayon::overlaps_par::<DefaultOverlap>(anchors, query, out);
}

#[cfg(not(feature = "rayon"))]
fn overlaps_parallel(anchors: ColumnsView<'_>, query: &BBox, out: &mut [f32]) {
    <DefaultOverlap as OverlapKernel>::overlaps(anchors, query, out);
}
