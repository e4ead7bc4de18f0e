//! Deterministic Top-K selection over per-anchor scores.

use std::cmp::Ordering;

/// Descending score, ascending index on ties. NaN ranks after every number.
fn score_cmp_desc(scores: &[f32], a: usize, b: usize) -> Ordering {
    let (sa, sb) = (scores[a], scores[b]);
    sa.is_nan()
        .cmp(&sb.is_nan())
        .then_with(|| sb.total_cmp(&sa))
        .then_with(|| a.cmp(&b))
}

/// Returns the indices of the `k` highest scores, best first.
///
/// Ties are broken by ascending index, so the result is a pure function of
/// the input. Runs in `O(n + k log k)`.
pub fn top_k_desc(scores: &[f32], k: usize) -> Vec<usize> {
    let k = k.min(scores.len());
    if k == 0 {
        return Vec::new();
    }

    let mut order: Vec<usize> = (0..scores.len()).collect();
    if k < order.len() {
        order.select_nth_unstable_by(k - 1, |&a, &b| score_cmp_desc(scores, a, b));
        order.truncate(k);
    }
    order.sort_unstable_by(|&a, &b| score_cmp_desc(scores, a, b));
    order
}

/// Sorts all indices by descending score, ascending index on ties.
pub(crate) fn argsort_desc(scores: &[f32]) -> Vec<usize> {
    top_k_desc(scores, scores.len())
}

#[cfg(test)]
mod tests {
    use super::{argsort_desc, top_k_desc};

    #[test]
    fn picks_highest_scores_in_order() {
        let scores = [0.9, 0.2, 0.95, 0.4, 0.99];
        assert_eq!(top_k_desc(&scores, 3), vec![4, 2, 0]);
    }

    #[test]
    fn ties_prefer_lower_index() {
        let scores = [0.5, 0.7, 0.5, 0.7, 0.5];
        assert_eq!(top_k_desc(&scores, 3), vec![1, 3, 0]);
        assert_eq!(argsort_desc(&scores), vec![1, 3, 0, 2, 4]);
    }

    #[test]
    fn nan_scores_rank_last() {
        let scores = [f32::NAN, 0.2, -f32::NAN, 0.9, f32::NEG_INFINITY];
        assert_eq!(top_k_desc(&scores, 2), vec![3, 1]);
        assert_eq!(argsort_desc(&scores), vec![3, 1, 4, 0, 2]);
    }

    #[test]
    fn k_larger_than_input_returns_everything() {
        assert_eq!(top_k_desc(&[0.1, 0.3], 10), vec![1, 0]);
        assert!(top_k_desc(&[0.1, 0.3], 0).is_empty());
        assert!(top_k_desc(&[], 5).is_empty());
    }
}
