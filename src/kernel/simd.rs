//! SIMD overlap kernel using the `wide` crate.
//!
//! Eight anchors are processed per iteration with `f32x8`; the remainder
//! falls back to the scalar core. Operation order mirrors
//! [`crate::geometry::iou`] so both paths round identically.

use crate::geometry::codec::overlap_with_areas;
use crate::geometry::BBox;
use crate::kernel::{ColumnsView, OverlapKernel};
use wide::{f32x8, CmpGt};

const LANES: usize = 8;

#[inline]
fn load_f32x8(slice: &[f32]) -> f32x8 {
    f32x8::from([
        slice[0], slice[1], slice[2], slice[3], slice[4], slice[5], slice[6], slice[7],
    ])
}

/// Vectorized one-against-many IoU.
pub struct SimdOverlap;

impl OverlapKernel for SimdOverlap {
    fn overlaps(anchors: ColumnsView<'_>, query: &BBox, out: &mut [f32]) {
        debug_assert_eq!(anchors.len(), out.len());
        let q_area = query.area();
        if q_area <= 0.0 {
            out.fill(0.0);
            return;
        }

        let qy1 = f32x8::splat(query.y1());
        let qx1 = f32x8::splat(query.x1());
        let qy2 = f32x8::splat(query.y2());
        let qx2 = f32x8::splat(query.x2());
        let qa = f32x8::splat(q_area);
        let one = f32x8::splat(1.0);
        let zero = f32x8::ZERO;

        let n = out.len();
        let simd_end = n / LANES * LANES;
        let mut idx = 0;
        while idx < simd_end {
            let ay1 = load_f32x8(&anchors.y1[idx..]);
            let ax1 = load_f32x8(&anchors.x1[idx..]);
            let ay2 = load_f32x8(&anchors.y2[idx..]);
            let ax2 = load_f32x8(&anchors.x2[idx..]);
            let aa = load_f32x8(&anchors.area[idx..]);

            let ih = (ay2.min(qy2) - ay1.max(qy1) + one).max(zero);
            let iw = (ax2.min(qx2) - ax1.max(qx1) + one).max(zero);
            let inter = ih * iw;
            let union = aa + qa - inter;
            let ratio = aa.simd_gt(zero).blend(inter / union, zero);

            out[idx..idx + LANES].copy_from_slice(&ratio.to_array());
            idx += LANES;
        }

        let q = query.to_array();
        for i in simd_end..n {
            let a_area = anchors.area[i];
            out[i] = if a_area <= 0.0 {
                0.0
            } else {
                let a = [anchors.y1[i], anchors.x1[i], anchors.y2[i], anchors.x2[i]];
                overlap_with_areas(a, a_area, q, q_area)
            };
        }
    }
}
