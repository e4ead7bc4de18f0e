//! Training target assignment for anchors and proposals.
//!
//! [`assign_anchor_targets`] labels every anchor of a grid against one
//! image's ground truth:
//!
//! 1. overlaps of all anchors against each ground-truth box are computed with
//!    the batched kernel;
//! 2. each box scores every anchor `1` (`iou > fg`), `0` (`iou < bg`) or
//!    `0.5` (in between), and forces its best unclaimed anchor to `1`;
//! 3. per-anchor scores are max-reduced across boxes, giving foreground,
//!    background, or ignore;
//! 4. foreground anchors are encoded against the box that scored them `1`
//!    with the highest overlap, earliest box first on ties.
//!
//! The `{0, 0.5, 1}` scores let step 3 be a plain maximum; they never leave
//! this module.

mod roi;
mod sample;

pub use roi::{assign_proposal_targets, RoiAssignConfig, RoiLabel, RoiTarget};
pub use sample::{sample_training_anchors, SamplingConfig, TrainingSample};

use crate::anchors::AnchorGrid;
use crate::geometry::{encode, BBox, RegressionTarget};
use crate::kernel::{overlaps_into, ColumnsView};
use crate::trace::{trace_debug, trace_event, trace_span};
use crate::util::math::{is_unit_interval, squared_distance};
use crate::util::{AnchorMatchError, AnchorMatchResult};
use std::sync::Arc;

const SCORE_BACKGROUND: f32 = 0.0;
const SCORE_IGNORE: f32 = 0.5;
const SCORE_FOREGROUND: f32 = 1.0;

/// Overlap thresholds for anchor labelling.
#[derive(Clone, Copy, Debug, PartialEq)]
pub struct AssignConfig {
    /// Anchors with IoU strictly above this are foreground.
    pub fg_iou_threshold: f32,
    /// Anchors with IoU strictly below this (for every box) are background.
    pub bg_iou_threshold: f32,
    /// Evaluate overlaps across threads (requires the `rayon` feature).
    pub parallel: bool,
}

impl Default for AssignConfig {
    fn default() -> Self {
        Self {
            fg_iou_threshold: 0.7,
            bg_iou_threshold: 0.3,
            parallel: false,
        }
    }
}

impl AssignConfig {
    pub fn validate(&self) -> AnchorMatchResult<()> {
        if !is_unit_interval(self.fg_iou_threshold) || !is_unit_interval(self.bg_iou_threshold) {
            return Err(AnchorMatchError::InvalidConfig {
                reason: "iou thresholds must lie in [0, 1]",
            });
        }
        if self.bg_iou_threshold > self.fg_iou_threshold {
            return Err(AnchorMatchError::InvalidConfig {
                reason: "background threshold exceeds foreground threshold",
            });
        }
        Ok(())
    }

    fn score(&self, iou: f32) -> f32 {
        if iou > self.fg_iou_threshold {
            SCORE_FOREGROUND
        } else if iou < self.bg_iou_threshold {
            SCORE_BACKGROUND
        } else {
            SCORE_IGNORE
        }
    }
}

/// Training role of an anchor.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash)]
pub enum AssignmentLabel {
    Foreground,
    Background,
    Ignore,
}

impl AssignmentLabel {
    fn from_score(score: f32) -> Self {
        if score == SCORE_FOREGROUND {
            Self::Foreground
        } else if score == SCORE_BACKGROUND {
            Self::Background
        } else {
            Self::Ignore
        }
    }
}

/// One annotated object.
#[derive(Clone, Copy, Debug, PartialEq)]
pub struct GroundTruth {
    pub bbox: BBox,
    pub category_id: u32,
}

impl GroundTruth {
    pub fn new(bbox: BBox, category_id: u32) -> Self {
        Self { bbox, category_id }
    }

    /// Builds a ground-truth entry from `(y1, x1, y2, x2, category_id)`.
    pub fn from_tuple(y1: f32, x1: f32, y2: f32, x2: f32, category_id: u32) -> AnchorMatchResult<Self> {
        Ok(Self {
            bbox: BBox::new(y1, x1, y2, x2)?,
            category_id,
        })
    }
}

/// Per-anchor labels and regression targets in flat anchor order.
#[derive(Clone, Debug, PartialEq)]
pub struct AnchorTargets {
    labels: Vec<AssignmentLabel>,
    regressions: Vec<RegressionTarget>,
    matched: Vec<Option<usize>>,
}

impl AnchorTargets {
    fn all_background(len: usize) -> Self {
        Self {
            labels: vec![AssignmentLabel::Background; len],
            regressions: vec![RegressionTarget::ZERO; len],
            matched: vec![None; len],
        }
    }

    pub fn len(&self) -> usize {
        self.labels.len()
    }

    pub fn is_empty(&self) -> bool {
        self.labels.is_empty()
    }

    pub fn labels(&self) -> &[AssignmentLabel] {
        &self.labels
    }

    /// Regression targets; zero for anchors that are not foreground.
    pub fn regressions(&self) -> &[RegressionTarget] {
        &self.regressions
    }

    /// Index into the ground-truth slice that drives each foreground anchor.
    pub fn matched(&self) -> &[Option<usize>] {
        &self.matched
    }

    pub fn count(&self, label: AssignmentLabel) -> usize {
        self.labels.iter().filter(|l| **l == label).count()
    }

    /// Flat indices of foreground anchors, ascending.
    pub fn foreground_indices(&self) -> Vec<usize> {
        self.indices_of(AssignmentLabel::Foreground)
    }

    /// Flat indices of anchors carrying `label`, ascending.
    pub fn indices_of(&self, label: AssignmentLabel) -> Vec<usize> {
        self.labels
            .iter()
            .enumerate()
            .filter(|(_, l)| **l == label)
            .map(|(idx, _)| idx)
            .collect()
    }
}

/// Assigner bound to a shared anchor grid.
#[derive(Clone, Debug)]
pub struct TargetAssigner {
    grid: Arc<AnchorGrid>,
    config: AssignConfig,
}

impl TargetAssigner {
    pub fn new(grid: Arc<AnchorGrid>, config: AssignConfig) -> AnchorMatchResult<Self> {
        config.validate()?;
        Ok(Self { grid, config })
    }

    pub fn grid(&self) -> &AnchorGrid {
        &self.grid
    }

    pub fn config(&self) -> &AssignConfig {
        &self.config
    }

    /// Labels the grid against one image's ground truth.
    pub fn assign(&self, ground_truth: &[GroundTruth]) -> AnchorMatchResult<AnchorTargets> {
        assign_anchor_targets(&self.grid, ground_truth, &self.config)
    }
}

/// Labels every anchor of `grid` and encodes regression targets.
///
/// An empty `ground_truth` is not an error: every anchor is background.
pub fn assign_anchor_targets(
    grid: &AnchorGrid,
    ground_truth: &[GroundTruth],
    config: &AssignConfig,
) -> AnchorMatchResult<AnchorTargets> {
    config.validate()?;
    let n = grid.len();
    let _span = trace_span!("assign_anchor_targets", anchors = n, gt = ground_truth.len()).entered();

    if ground_truth.is_empty() {
        trace_event!("empty_ground_truth", anchors = n);
        return Ok(AnchorTargets::all_background(n));
    }

    let anchors = grid.columns();
    let mut reduced = vec![SCORE_BACKGROUND; n];
    // Best (gt index, iou) among boxes that scored the anchor foreground.
    let mut winners: Vec<Option<(usize, f32)>> = vec![None; n];
    let mut claimed = vec![false; n];
    let mut overlaps = vec![0.0f32; n];

    for (gt_idx, gt) in ground_truth.iter().enumerate() {
        overlaps_into(anchors, &gt.bbox, &mut overlaps, config.parallel)?;

        let forced = forced_anchor(anchors, &overlaps, &claimed, gt.bbox.center());
        if let Some(idx) = forced {
            claimed[idx] = true;
            trace_debug!("forced_anchor", gt = gt_idx, anchor = idx, iou = overlaps[idx]);
        }

        for (idx, &iou) in overlaps.iter().enumerate() {
            let score = if forced == Some(idx) {
                SCORE_FOREGROUND
            } else {
                config.score(iou)
            };
            reduced[idx] = reduced[idx].max(score);
            if score == SCORE_FOREGROUND {
                match winners[idx] {
                    Some((_, best)) if iou <= best => {}
                    _ => winners[idx] = Some((gt_idx, iou)),
                }
            }
        }
    }

    let boxes = grid.boxes();
    let mut labels = Vec::with_capacity(n);
    let mut regressions = Vec::with_capacity(n);
    let mut matched = Vec::with_capacity(n);
    for idx in 0..n {
        let label = AssignmentLabel::from_score(reduced[idx]);
        match (label, winners[idx]) {
            (AssignmentLabel::Foreground, Some((gt_idx, _))) => {
                regressions.push(encode(&boxes[idx], &ground_truth[gt_idx].bbox)?);
                matched.push(Some(gt_idx));
            }
            _ => {
                regressions.push(RegressionTarget::ZERO);
                matched.push(None);
            }
        }
        labels.push(label);
    }

    let targets = AnchorTargets {
        labels,
        regressions,
        matched,
    };
    trace_event!(
        "anchor_targets",
        foreground = targets.count(AssignmentLabel::Foreground),
        background = targets.count(AssignmentLabel::Background),
        ignore = targets.count(AssignmentLabel::Ignore)
    );
    Ok(targets)
}

/// Highest-overlap anchor not already forced by an earlier box.
///
/// Equal overlaps resolve to the anchor whose center lies closest to the box
/// center, then to the lowest flat index.
fn forced_anchor(
    anchors: ColumnsView<'_>,
    overlaps: &[f32],
    claimed: &[bool],
    target: (f32, f32),
) -> Option<usize> {
    let mut best: Option<(usize, f32, f32)> = None;
    for (idx, &iou) in overlaps.iter().enumerate() {
        if claimed[idx] {
            continue;
        }
        match best {
            Some((_, best_iou, _)) if iou < best_iou => {}
            Some((_, best_iou, best_dist)) if iou == best_iou => {
                let dist = squared_distance(anchors.center_at(idx), target);
                if dist < best_dist {
                    best = Some((idx, iou, dist));
                }
            }
            _ => {
                let dist = squared_distance(anchors.center_at(idx), target);
                best = Some((idx, iou, dist));
            }
        }
    }
    best.map(|(idx, _, _)| idx)
}
