//! Overlap ratio and the center/size regression transform.

use crate::geometry::{BBox, ImageShape};
use crate::util::{AnchorMatchError, AnchorMatchResult};

/// Offsets `(dy, dx, dh, dw)` mapping an anchor onto a target box.
///
/// Centers are expressed relative to the anchor size; sizes are log ratios.
#[derive(Clone, Copy, Debug, Default, PartialEq)]
pub struct RegressionTarget {
    pub dy: f32,
    pub dx: f32,
    pub dh: f32,
    pub dw: f32,
}

impl RegressionTarget {
    /// Identity transform, also used for anchors that carry no target.
    pub const ZERO: Self = Self {
        dy: 0.0,
        dx: 0.0,
        dh: 0.0,
        dw: 0.0,
    };

    pub fn new(dy: f32, dx: f32, dh: f32, dw: f32) -> Self {
        Self { dy, dx, dh, dw }
    }

    /// Returns `[dy, dx, dh, dw]`.
    pub fn to_array(&self) -> [f32; 4] {
        [self.dy, self.dx, self.dh, self.dw]
    }
}

/// Splits a flat `4 * n` regression output into per-anchor targets.
pub fn regressions_from_flat(
    values: &[f32],
    expected_anchors: usize,
) -> AnchorMatchResult<Vec<RegressionTarget>> {
    let expected = expected_anchors
        .checked_mul(4)
        .ok_or(AnchorMatchError::ConfigurationMismatch {
            reason: "anchor count overflows the flat regression length",
        })?;
    if values.len() != expected {
        return Err(AnchorMatchError::ShapeMismatch {
            expected,
            got: values.len(),
            context: "flat regressions",
        });
    }
    Ok(values
        .chunks_exact(4)
        .map(|c| RegressionTarget::new(c[0], c[1], c[2], c[3]))
        .collect())
}

/// Intersection over union with inclusive pixel edges.
///
/// Returns 0 for disjoint boxes or when either box has non-positive area.
/// The arithmetic matches the batched kernels operation for operation so
/// that scalar and vectorized overlaps compare equal.
#[inline]
pub fn iou(a: &BBox, b: &BBox) -> f32 {
    let area_a = a.area();
    let area_b = b.area();
    if area_a <= 0.0 || area_b <= 0.0 {
        return 0.0;
    }
    overlap_with_areas(
        [a.y1(), a.x1(), a.y2(), a.x2()],
        area_a,
        [b.y1(), b.x1(), b.y2(), b.x2()],
        area_b,
    )
}

/// Shared IoU core given precomputed inclusive areas.
#[inline]
pub(crate) fn overlap_with_areas(a: [f32; 4], area_a: f32, b: [f32; 4], area_b: f32) -> f32 {
    let ih = (a[2].min(b[2]) - a[0].max(b[0]) + 1.0).max(0.0);
    let iw = (a[3].min(b[3]) - a[1].max(b[1]) + 1.0).max(0.0);
    let inter = ih * iw;
    let union = area_a + area_b - inter;
    inter / union
}

/// Encodes `gt` relative to `anchor`.
///
/// Fails with [`AnchorMatchError::DegenerateBox`] if either box has a
/// non-positive height or width.
pub fn encode(anchor: &BBox, gt: &BBox) -> AnchorMatchResult<RegressionTarget> {
    let (a_h, a_w) = (anchor.height(), anchor.width());
    if a_h <= 0.0 || a_w <= 0.0 {
        return Err(AnchorMatchError::DegenerateBox {
            height: a_h,
            width: a_w,
        });
    }
    let (g_h, g_w) = (gt.height(), gt.width());
    if g_h <= 0.0 || g_w <= 0.0 {
        return Err(AnchorMatchError::DegenerateBox {
            height: g_h,
            width: g_w,
        });
    }

    let (a_cy, a_cx) = anchor.center();
    let (g_cy, g_cx) = gt.center();
    Ok(RegressionTarget {
        dy: (g_cy - a_cy) / a_h,
        dx: (g_cx - a_cx) / a_w,
        dh: (g_h / a_h).ln(),
        dw: (g_w / a_w).ln(),
    })
}

/// Applies `reg` to `base`; the exact inverse of [`encode`].
///
/// A decoded extent below one pixel collapses onto the leading edge so the
/// result still satisfies `y2 >= y1` and `x2 >= x1`. Non-finite regressions
/// propagate into the coordinates; check [`BBox::is_finite`].
pub fn decode(base: &BBox, reg: &RegressionTarget) -> BBox {
    let (a_h, a_w) = (base.height(), base.width());
    let (a_cy, a_cx) = base.center();

    let cy = reg.dy * a_h + a_cy;
    let cx = reg.dx * a_w + a_cx;
    let h = reg.dh.exp() * a_h;
    let w = reg.dw.exp() * a_w;

    let y1 = cy - 0.5 * h;
    let x1 = cx - 0.5 * w;
    let y2 = (cy + 0.5 * h - 1.0).max(y1);
    let x2 = (cx + 0.5 * w - 1.0).max(x1);
    BBox::from_corners(y1, x1, y2, x2)
}

/// Clamps all coordinates into `[0, H-1] x [0, W-1]`.
pub fn clip(bbox: &BBox, shape: ImageShape) -> BBox {
    let max_y = (shape.height() - 1) as f32;
    let max_x = (shape.width() - 1) as f32;
    BBox::from_corners(
        bbox.y1().clamp(0.0, max_y),
        bbox.x1().clamp(0.0, max_x),
        bbox.y2().clamp(0.0, max_y),
        bbox.x2().clamp(0.0, max_x),
    )
}

#[cfg(test)]
mod tests {
    use super::{clip, decode, encode, iou, regressions_from_flat, RegressionTarget};
    use crate::geometry::{BBox, ImageShape};
    use crate::util::AnchorMatchError;

    fn bbox(y1: f32, x1: f32, y2: f32, x2: f32) -> BBox {
        BBox::new(y1, x1, y2, x2).unwrap()
    }

    #[test]
    fn iou_of_half_overlap_is_one_third() {
        let a = bbox(0.0, 0.0, 9.0, 9.0);
        let b = bbox(0.0, 5.0, 9.0, 14.0);
        assert!((iou(&a, &b) - 50.0 / 150.0).abs() < 1e-6);
    }

    #[test]
    fn iou_counts_touching_edges_as_overlap() {
        // Inclusive edges: both boxes cover column 9.
        let a = bbox(0.0, 0.0, 9.0, 9.0);
        let b = bbox(0.0, 9.0, 9.0, 18.0);
        assert!(iou(&a, &b) > 0.0);
        let c = bbox(0.0, 10.0, 9.0, 19.0);
        assert_eq!(iou(&a, &c), 0.0);
    }

    #[test]
    fn encode_identity_is_zero() {
        let a = bbox(10.0, 20.0, 50.0, 80.0);
        let reg = encode(&a, &a).unwrap();
        assert_eq!(reg, RegressionTarget::ZERO);
    }

    #[test]
    fn encode_rejects_degenerate_anchor() {
        let anchor = BBox::from_corners(10.0, 10.0, 5.0, 20.0);
        let gt = bbox(0.0, 0.0, 10.0, 10.0);
        assert_eq!(
            encode(&anchor, &gt).unwrap_err(),
            AnchorMatchError::DegenerateBox {
                height: -4.0,
                width: 11.0,
            }
        );
    }

    #[test]
    fn decode_inverts_encode() {
        let anchor = bbox(72.0, 72.0, 327.0, 327.0);
        let gt = bbox(100.0, 100.0, 300.0, 300.0);
        let reg = encode(&anchor, &gt).unwrap();
        let back = decode(&anchor, &reg);
        for (got, want) in back.to_array().iter().zip(gt.to_array()) {
            assert!((got - want).abs() < 1e-3, "{got} vs {want}");
        }
    }

    #[test]
    fn decode_keeps_corner_order_for_tiny_extent() {
        let anchor = bbox(0.0, 0.0, 15.0, 15.0);
        let reg = RegressionTarget::new(0.0, 0.0, -10.0, -10.0);
        let out = decode(&anchor, &reg);
        assert!(out.y2() >= out.y1());
        assert!(out.x2() >= out.x1());
    }

    #[test]
    fn clip_clamps_to_image_bounds() {
        let shape = ImageShape::new(100, 200).unwrap();
        let out = clip(&BBox::from_corners(-5.0, -1.0, 150.0, 250.0), shape);
        assert_eq!(out.to_array(), [0.0, 0.0, 99.0, 199.0]);
    }

    #[test]
    fn flat_regressions_require_four_per_anchor() {
        let values = [0.1f32, 0.2, 0.3, 0.4, 1.0, 2.0, 3.0, 4.0];
        let regs = regressions_from_flat(&values, 2).unwrap();
        assert_eq!(regs[1], RegressionTarget::new(1.0, 2.0, 3.0, 4.0));

        let err = regressions_from_flat(&values[..7], 2).unwrap_err();
        assert_eq!(
            err,
            AnchorMatchError::ShapeMismatch {
                expected: 8,
                got: 7,
                context: "flat regressions",
            }
        );
    }

    #[test]
    fn overflowing_anchor_count_is_a_configuration_mismatch() {
        assert_eq!(
            regressions_from_flat(&[], usize::MAX).unwrap_err(),
            AnchorMatchError::ConfigurationMismatch {
                reason: "anchor count overflows the flat regression length",
            }
        );
    }
}
