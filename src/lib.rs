//! AnchorMatch is the geometry and set logic of a two-stage detector's
//! anchor stage.
//!
//! The crate generates dense anchor grids, labels them against ground truth,
//! encodes and decodes box regressions, selects proposals from head outputs
//! and suppresses overlapping boxes. It holds no trainable state: every
//! operation is a deterministic function of its inputs. Overlap evaluation
//! can run on an optional SIMD kernel (`simd` feature) and across threads
//! (`rayon` feature) with bit-identical results.

pub mod anchors;
pub mod assign;
mod candidate;
pub mod geometry;
pub mod kernel;
pub mod lowlevel;
pub mod proposal;
mod trace;
pub mod util;

pub use anchors::{AnchorCache, AnchorConfig, AnchorGrid, AnchorIndex, StageGrid};
pub use assign::{
    assign_anchor_targets, assign_proposal_targets, sample_training_anchors, AnchorTargets,
    AssignConfig, AssignmentLabel, GroundTruth, RoiAssignConfig, RoiLabel, RoiTarget,
    SamplingConfig, TargetAssigner, TrainingSample,
};
pub use geometry::{
    clip, decode, encode, iou, regressions_from_flat, BBox, ImageShape, RegressionTarget,
};
pub use util::{AnchorMatchError, AnchorMatchResult};

pub use candidate::nms::{nms_greedy, GreedyNms, Suppressor};
pub use proposal::{
    refine_detections, select_proposals, Proposal, ProposalConfig, RegionProposer,
};
