//! Rayon-parallel overlap driver (feature-gated).
//!
//! The anchor list is cut into fixed-size chunks and each chunk runs the
//! sequential kernel. Chunk boundaries do not affect results, so parallel
//! and sequential assignment produce identical targets.

use crate::geometry::BBox;
use crate::kernel::{ColumnsView, OverlapKernel};
use rayon::prelude::*;

/// Anchors per rayon task.
const CHUNK: usize = 4096;

/// Chunk-parallel overlap evaluation with kernel `K`.
pub fn overlaps_par<K: OverlapKernel>(anchors: ColumnsView<'_>, query: &BBox, out: &mut [f32]) {
    debug_assert_eq!(anchors.len(), out.len());
    out.par_chunks_mut(CHUNK)
        .enumerate()
        .for_each(|(chunk_idx, dst)| {
            let start = chunk_idx * CHUNK;
            let view = anchors.range(start, start + dst.len());
            K::overlaps(view, query, dst);
        });
}
