//! Candidate ranking and pruning.
//!
//! Includes deterministic Top-K selection and greedy overlap suppression.

pub mod nms;
pub mod topk;
