//! Greedy overlap suppression.
//!
//! Inputs are assumed sorted by descending confidence; nothing here
//! re-sorts. The pairwise test uses the same inclusive-edge arithmetic as
//! [`crate::geometry::iou`], so a box pair is suppressed here exactly when
//! `iou(a, b) > threshold`.

use crate::geometry::codec::overlap_with_areas;
use crate::geometry::BBox;
use crate::proposal::Proposal;
use crate::trace::{trace_event, trace_span};
use crate::util::math::is_unit_interval;
use crate::util::{AnchorMatchError, AnchorMatchResult};

/// Removes lower-ranked boxes that overlap higher-ranked ones.
///
/// Implementations may use a spatial index instead of the quadratic scan,
/// but must keep the same output for the same input.
pub trait Suppressor {
    /// Indices of the surviving boxes, in input order.
    fn keep_indices(&self, boxes: &[BBox]) -> Vec<usize>;

    /// Surviving proposals, in input order.
    fn suppress(&self, proposals: &[Proposal]) -> Vec<Proposal> {
        let boxes: Vec<BBox> = proposals.iter().map(|p| p.bbox).collect();
        self.keep_indices(&boxes)
            .into_iter()
            .map(|idx| proposals[idx])
            .collect()
    }
}

/// Quadratic greedy NMS.
#[derive(Clone, Copy, Debug, PartialEq)]
pub struct GreedyNms {
    iou_threshold: f32,
}

impl GreedyNms {
    /// Fails with [`AnchorMatchError::InvalidConfig`] outside `[0, 1]`.
    pub fn new(iou_threshold: f32) -> AnchorMatchResult<Self> {
        if !is_unit_interval(iou_threshold) {
            return Err(AnchorMatchError::InvalidConfig {
                reason: "nms iou threshold must lie in [0, 1]",
            });
        }
        Ok(Self { iou_threshold })
    }

    pub fn iou_threshold(&self) -> f32 {
        self.iou_threshold
    }
}

impl Default for GreedyNms {
    fn default() -> Self {
        Self { iou_threshold: 0.7 }
    }
}

impl Suppressor for GreedyNms {
    fn keep_indices(&self, boxes: &[BBox]) -> Vec<usize> {
        nms_greedy(boxes, self.iou_threshold)
    }
}

/// Keeps each box unless an earlier kept box overlaps it by more than
/// `iou_threshold`. Returns kept indices in input order.
pub fn nms_greedy(boxes: &[BBox], iou_threshold: f32) -> Vec<usize> {
    let _span = trace_span!("nms_greedy", boxes = boxes.len()).entered();

    let corners: Vec<[f32; 4]> = boxes.iter().map(BBox::to_array).collect();
    let areas: Vec<f32> = boxes.iter().map(BBox::area).collect();
    let mut suppressed = vec![false; boxes.len()];
    let mut keep = Vec::new();

    for i in 0..boxes.len() {
        if suppressed[i] {
            continue;
        }
        keep.push(i);
        if areas[i] <= 0.0 {
            continue;
        }
        for j in (i + 1)..boxes.len() {
            if suppressed[j] || areas[j] <= 0.0 {
                continue;
            }
            if overlap_with_areas(corners[i], areas[i], corners[j], areas[j]) > iou_threshold {
                suppressed[j] = true;
            }
        }
    }

    trace_event!("nms", input = boxes.len(), kept = keep.len());
    keep
}

#[cfg(test)]
mod tests {
    use super::{nms_greedy, GreedyNms, Suppressor};
    use crate::geometry::BBox;
    use crate::proposal::Proposal;

    fn bbox(y1: f32, x1: f32, y2: f32, x2: f32) -> BBox {
        BBox::new(y1, x1, y2, x2).unwrap()
    }

    #[test]
    fn duplicate_is_removed_and_disjoint_box_kept() {
        let a = bbox(0.0, 0.0, 9.0, 9.0);
        let c = bbox(50.0, 50.0, 59.0, 59.0);
        assert_eq!(nms_greedy(&[a, a, c], 0.5), vec![0, 2]);
    }

    #[test]
    fn suppressed_box_does_not_suppress_others() {
        // b overlaps both a and c; c survives because b was removed by a.
        let a = bbox(0.0, 0.0, 9.0, 9.0);
        let b = bbox(0.0, 4.0, 9.0, 13.0);
        let c = bbox(0.0, 8.0, 9.0, 17.0);
        assert_eq!(nms_greedy(&[a, b, c], 0.2), vec![0, 2]);
    }

    #[test]
    fn input_order_is_respected_without_resorting() {
        let small = bbox(0.0, 0.0, 4.0, 4.0);
        let big = bbox(0.0, 0.0, 5.0, 5.0);
        assert_eq!(nms_greedy(&[big, small], 0.5), vec![0]);
        assert_eq!(nms_greedy(&[small, big], 0.5), vec![0]);
    }

    #[test]
    fn threshold_is_strict() {
        let a = bbox(0.0, 0.0, 9.0, 9.0);
        let b = bbox(0.0, 5.0, 9.0, 14.0);
        // iou(a, b) is exactly 1/3.
        let third = crate::geometry::iou(&a, &b);
        assert_eq!(nms_greedy(&[a, b], third), vec![0, 1]);
        assert_eq!(nms_greedy(&[a, b], third - 1e-6), vec![0]);
    }

    #[test]
    fn suppress_maps_back_to_proposals() {
        let nms = GreedyNms::new(0.5).unwrap();
        let proposals = [
            Proposal::new(bbox(0.0, 0.0, 9.0, 9.0), 0.9, 3),
            Proposal::new(bbox(0.0, 0.0, 9.0, 9.0), 0.8, 7),
            Proposal::new(bbox(30.0, 30.0, 39.0, 39.0), 0.7, 1),
        ];
        let kept = nms.suppress(&proposals);
        let sources: Vec<usize> = kept.iter().map(|p| p.source_index).collect();
        assert_eq!(sources, vec![3, 1]);
    }

    #[test]
    fn out_of_range_threshold_is_rejected() {
        assert!(GreedyNms::new(1.2).is_err());
        assert!(GreedyNms::new(f32::NAN).is_err());
        assert_eq!(GreedyNms::default().iou_threshold(), 0.7);
    }
}
