//! Second-stage targets: classify and regress proposals against ground truth.

use crate::assign::GroundTruth;
use crate::geometry::{encode, iou, BBox, RegressionTarget};
use crate::trace::{trace_event, trace_span};
use crate::util::math::is_unit_interval;
use crate::util::{AnchorMatchError, AnchorMatchResult};

#[derive(Clone, Copy, Debug, PartialEq)]
pub struct RoiAssignConfig {
    /// Proposals with best IoU at or above this become object samples.
    pub fg_iou_threshold: f32,
}

impl Default for RoiAssignConfig {
    fn default() -> Self {
        Self {
            fg_iou_threshold: 0.5,
        }
    }
}

impl RoiAssignConfig {
    pub fn validate(&self) -> AnchorMatchResult<()> {
        if !is_unit_interval(self.fg_iou_threshold) {
            return Err(AnchorMatchError::InvalidConfig {
                reason: "roi iou threshold must lie in [0, 1]",
            });
        }
        Ok(())
    }
}

#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum RoiLabel {
    Object { gt_index: usize, category_id: u32 },
    Background,
}

#[derive(Clone, Copy, Debug, PartialEq)]
pub struct RoiTarget {
    pub proposal: BBox,
    /// Best overlap with any ground-truth box (0 without ground truth).
    pub iou: f32,
    pub label: RoiLabel,
    /// Zero unless the label is an object.
    pub regression: RegressionTarget,
}

impl RoiTarget {
    pub fn is_object(&self) -> bool {
        matches!(self.label, RoiLabel::Object { .. })
    }
}

/// Matches each proposal to its best-overlapping ground-truth box.
///
/// Ties go to the earliest box. Output order follows `proposals`.
pub fn assign_proposal_targets(
    proposals: &[BBox],
    ground_truth: &[GroundTruth],
    config: &RoiAssignConfig,
) -> AnchorMatchResult<Vec<RoiTarget>> {
    config.validate()?;
    let _span = trace_span!(
        "assign_proposal_targets",
        proposals = proposals.len(),
        gt = ground_truth.len()
    )
    .entered();

    let mut out = Vec::with_capacity(proposals.len());
    for proposal in proposals {
        let mut best: Option<(usize, f32)> = None;
        for (gt_idx, gt) in ground_truth.iter().enumerate() {
            let overlap = iou(proposal, &gt.bbox);
            if best.map_or(true, |(_, b)| overlap > b) {
                best = Some((gt_idx, overlap));
            }
        }

        let target = match best {
            Some((gt_idx, overlap)) if overlap >= config.fg_iou_threshold => {
                let gt = &ground_truth[gt_idx];
                RoiTarget {
                    proposal: *proposal,
                    iou: overlap,
                    label: RoiLabel::Object {
                        gt_index: gt_idx,
                        category_id: gt.category_id,
                    },
                    regression: encode(proposal, &gt.bbox)?,
                }
            }
            other => RoiTarget {
                proposal: *proposal,
                iou: other.map_or(0.0, |(_, o)| o),
                label: RoiLabel::Background,
                regression: RegressionTarget::ZERO,
            },
        };
        out.push(target);
    }

    trace_event!(
        "roi_targets",
        objects = out.iter().filter(|t| t.is_object()).count(),
        total = out.len()
    );
    Ok(out)
}
