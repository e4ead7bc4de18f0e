//! Inference-time proposal selection and second-stage refinement.
//!
//! [`select_proposals`] turns the first-stage head's per-anchor scores and
//! regressions into a ranked list of image-space boxes. The steps run in a
//! fixed order:
//!
//! 1. keep the `max_proposals` highest scores (lower flat index first on
//!    ties);
//! 2. drop every score at or below `score_threshold`;
//! 3. decode each anchor with its regression, drop non-finite results and
//!    clip the rest to the image.
//!
//! The result is sorted by descending score and is ready for a
//! [`Suppressor`]. [`RegionProposer`] bundles the grid, config and
//! suppressor for repeated use.

use crate::anchors::AnchorGrid;
use crate::candidate::nms::Suppressor;
use crate::candidate::topk::{argsort_desc, top_k_desc};
use crate::geometry::{clip, decode, BBox, ImageShape, RegressionTarget};
use crate::trace::{trace_debug, trace_event, trace_span};
use crate::util::{AnchorMatchError, AnchorMatchResult};
use std::sync::Arc;

/// A decoded, scored box.
#[derive(Clone, Copy, Debug, PartialEq)]
pub struct Proposal {
    pub bbox: BBox,
    pub score: f32,
    /// Flat anchor index, or the input proposal index after refinement.
    pub source_index: usize,
}

impl Proposal {
    pub fn new(bbox: BBox, score: f32, source_index: usize) -> Self {
        Self {
            bbox,
            score,
            source_index,
        }
    }
}

/// Ranking parameters for [`select_proposals`].
#[derive(Clone, Copy, Debug, PartialEq)]
pub struct ProposalConfig {
    /// Number of top-scoring anchors considered (`K`).
    pub max_proposals: usize,
    /// Scores at or below this are discarded.
    pub score_threshold: f32,
}

impl Default for ProposalConfig {
    fn default() -> Self {
        Self {
            max_proposals: 300,
            score_threshold: 0.5,
        }
    }
}

/// Decodes and ranks the top-scoring anchors.
///
/// `anchors`, `scores` and `regressions` must share the grid's flat order.
/// Returns an empty list, not an error, when nothing clears the threshold.
pub fn select_proposals(
    anchors: &[BBox],
    scores: &[f32],
    regressions: &[RegressionTarget],
    image: ImageShape,
    config: &ProposalConfig,
) -> AnchorMatchResult<Vec<Proposal>> {
    check_len(anchors.len(), scores.len(), "proposal scores")?;
    check_len(anchors.len(), regressions.len(), "proposal regressions")?;
    let _span = trace_span!(
        "select_proposals",
        anchors = anchors.len(),
        k = config.max_proposals
    )
    .entered();

    let mut proposals = Vec::with_capacity(config.max_proposals.min(anchors.len()));
    for idx in top_k_desc(scores, config.max_proposals) {
        let score = scores[idx];
        // Also rejects NaN scores.
        if !(score > config.score_threshold) {
            continue;
        }
        let decoded = decode(&anchors[idx], &regressions[idx]);
        if !decoded.is_finite() {
            trace_debug!("non_finite_decode", anchor = idx);
            continue;
        }
        proposals.push(Proposal::new(clip(&decoded, image), score, idx));
    }

    trace_event!("proposals", kept = proposals.len());
    Ok(proposals)
}

/// First-stage proposal pipeline over a shared grid.
#[derive(Clone, Debug)]
pub struct RegionProposer<S> {
    grid: Arc<AnchorGrid>,
    config: ProposalConfig,
    suppressor: S,
}

impl<S: Suppressor> RegionProposer<S> {
    pub fn new(grid: Arc<AnchorGrid>, config: ProposalConfig, suppressor: S) -> Self {
        Self {
            grid,
            config,
            suppressor,
        }
    }

    pub fn grid(&self) -> &AnchorGrid {
        &self.grid
    }

    pub fn config(&self) -> &ProposalConfig {
        &self.config
    }

    pub fn suppressor(&self) -> &S {
        &self.suppressor
    }

    /// Ranked proposals before suppression.
    pub fn select(
        &self,
        scores: &[f32],
        regressions: &[RegressionTarget],
    ) -> AnchorMatchResult<Vec<Proposal>> {
        select_proposals(
            self.grid.boxes(),
            scores,
            regressions,
            self.grid.image_shape(),
            &self.config,
        )
    }

    /// Ranked proposals after suppression.
    pub fn propose(
        &self,
        scores: &[f32],
        regressions: &[RegressionTarget],
    ) -> AnchorMatchResult<Vec<Proposal>> {
        let ranked = self.select(scores, regressions)?;
        Ok(self.suppressor.suppress(&ranked))
    }
}

/// Applies the second-stage head to first-stage proposals.
///
/// Each proposal box is decoded with its regression and clipped. Survivors
/// are ordered by head score (lower input index first on ties) and then
/// suppressed. Proposals with a NaN head score are dropped. `source_index`
/// of each result is its position in `proposals`.
pub fn refine_detections<S: Suppressor + ?Sized>(
    proposals: &[Proposal],
    head_scores: &[f32],
    head_regressions: &[RegressionTarget],
    image: ImageShape,
    suppressor: &S,
) -> AnchorMatchResult<Vec<Proposal>> {
    check_len(proposals.len(), head_scores.len(), "head scores")?;
    check_len(proposals.len(), head_regressions.len(), "head regressions")?;
    let _span = trace_span!("refine_detections", proposals = proposals.len()).entered();

    let mut refined = Vec::with_capacity(proposals.len());
    for idx in argsort_desc(head_scores) {
        if head_scores[idx].is_nan() {
            trace_debug!("nan_head_score", proposal = idx);
            continue;
        }
        let decoded = decode(&proposals[idx].bbox, &head_regressions[idx]);
        if !decoded.is_finite() {
            trace_debug!("non_finite_decode", proposal = idx);
            continue;
        }
        refined.push(Proposal::new(clip(&decoded, image), head_scores[idx], idx));
    }

    let kept = suppressor.suppress(&refined);
    trace_event!("detections", refined = refined.len(), kept = kept.len());
    Ok(kept)
}

fn check_len(expected: usize, got: usize, context: &'static str) -> AnchorMatchResult<()> {
    if expected != got {
        return Err(AnchorMatchError::ShapeMismatch {
            expected,
            got,
            context,
        });
    }
    Ok(())
}
