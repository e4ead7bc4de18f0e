//! Low-level building blocks for custom detection pipelines.
//!
//! These expose the overlap kernels, the per-cell anchor table and the
//! ranking helpers behind the high-level API. Most users should prefer
//! [`crate::AnchorGrid`], [`crate::TargetAssigner`] and
//! [`crate::RegionProposer`].

pub use crate::anchors::base_anchors;
pub use crate::candidate::nms::nms_greedy;
pub use crate::candidate::topk::top_k_desc;
pub use crate::kernel::scalar::ScalarOverlap;
#[cfg(feature = "simd")]
pub use crate::kernel::simd::SimdOverlap;
#[cfg(feature = "rayon")]
pub use crate::kernel::rayon::overlaps_par;
pub use crate::kernel::{overlaps_into, BoxColumns, ColumnsView, OverlapKernel};
