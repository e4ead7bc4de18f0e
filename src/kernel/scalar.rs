//! Scalar reference overlap kernel.

use crate::geometry::codec::overlap_with_areas;
use crate::geometry::BBox;
use crate::kernel::{ColumnsView, OverlapKernel};

/// Straight-line loop over the anchor columns.
pub struct ScalarOverlap;

impl OverlapKernel for ScalarOverlap {
    fn overlaps(anchors: ColumnsView<'_>, query: &BBox, out: &mut [f32]) {
        debug_assert_eq!(anchors.len(), out.len());
        let q_area = query.area();
        if q_area <= 0.0 {
            out.fill(0.0);
            return;
        }
        let q = query.to_array();

        for (idx, dst) in out.iter_mut().enumerate() {
            let a_area = anchors.area[idx];
            *dst = if a_area <= 0.0 {
                0.0
            } else {
                let a = [
                    anchors.y1[idx],
                    anchors.x1[idx],
                    anchors.y2[idx],
                    anchors.x2[idx],
                ];
                overlap_with_areas(a, a_area, q, q_area)
            };
        }
    }
}
