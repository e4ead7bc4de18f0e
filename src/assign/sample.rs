//! Balanced anchor minibatches for the proposal-stage loss.

use crate::assign::{AnchorTargets, AssignmentLabel};
use crate::trace::trace_event;
use rand::seq::index;
use rand::Rng;

/// How many background anchors accompany the foreground set.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub struct SamplingConfig {
    pub background_per_image: usize,
}

impl Default for SamplingConfig {
    fn default() -> Self {
        Self {
            background_per_image: 128,
        }
    }
}

/// Anchors that contribute to the loss for one image.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct TrainingSample {
    /// Every foreground anchor, ascending.
    pub foreground: Vec<usize>,
    /// Randomly drawn background anchors, ascending.
    pub background: Vec<usize>,
}

impl TrainingSample {
    /// All sampled anchor indices, ascending.
    pub fn indices(&self) -> Vec<usize> {
        let mut all = Vec::with_capacity(self.foreground.len() + self.background.len());
        all.extend_from_slice(&self.foreground);
        all.extend_from_slice(&self.background);
        all.sort_unstable();
        all
    }

    /// Boolean loss weight per anchor for a grid of `len` anchors.
    pub fn mask(&self, len: usize) -> Vec<bool> {
        let mut mask = vec![false; len];
        for &idx in self.foreground.iter().chain(&self.background) {
            if let Some(slot) = mask.get_mut(idx) {
                *slot = true;
            }
        }
        mask
    }
}

/// Keeps every foreground anchor and draws background anchors uniformly
/// without replacement. Ignored anchors are never sampled.
pub fn sample_training_anchors<R: Rng + ?Sized>(
    targets: &AnchorTargets,
    config: &SamplingConfig,
    rng: &mut R,
) -> TrainingSample {
    let foreground = targets.indices_of(AssignmentLabel::Foreground);
    let candidates = targets.indices_of(AssignmentLabel::Background);

    let amount = config.background_per_image.min(candidates.len());
    let mut background: Vec<usize> = index::sample(rng, candidates.len(), amount)
        .into_iter()
        .map(|pos| candidates[pos])
        .collect();
    background.sort_unstable();

    trace_event!(
        "training_sample",
        foreground = foreground.len(),
        background = background.len()
    );
    TrainingSample {
        foreground,
        background,
    }
}

#[cfg(test)]
mod tests {
    use super::{sample_training_anchors, SamplingConfig};
    use crate::anchors::{AnchorConfig, AnchorGrid};
    use crate::assign::{assign_anchor_targets, AssignConfig, AssignmentLabel, GroundTruth};
    use crate::geometry::ImageShape;
    use rand::rngs::StdRng;
    use rand::SeedableRng;

    fn targets() -> crate::assign::AnchorTargets {
        let grid =
            AnchorGrid::generate(ImageShape::new(256, 256).unwrap(), &AnchorConfig::default()).unwrap();
        let gt = [GroundTruth::from_tuple(40.0, 40.0, 200.0, 180.0, 1).unwrap()];
        assign_anchor_targets(&grid, &gt, &AssignConfig::default()).unwrap()
    }

    #[test]
    fn sample_keeps_all_foreground_and_caps_background() {
        let targets = targets();
        let mut rng = StdRng::seed_from_u64(11);
        let sample = sample_training_anchors(&targets, &SamplingConfig::default(), &mut rng);

        assert_eq!(sample.foreground, targets.foreground_indices());
        assert_eq!(sample.background.len(), 128);
        for &idx in &sample.background {
            assert_eq!(targets.labels()[idx], AssignmentLabel::Background);
        }
        assert!(sample.background.windows(2).all(|w| w[0] < w[1]));

        let mask = sample.mask(targets.len());
        assert_eq!(
            mask.iter().filter(|m| **m).count(),
            sample.foreground.len() + 128
        );
    }

    #[test]
    fn same_seed_gives_same_sample() {
        let targets = targets();
        let cfg = SamplingConfig::default();
        let a = sample_training_anchors(&targets, &cfg, &mut StdRng::seed_from_u64(5));
        let b = sample_training_anchors(&targets, &cfg, &mut StdRng::seed_from_u64(5));
        assert_eq!(a, b);
    }

    #[test]
    fn small_background_pool_is_taken_whole() {
        let targets = targets();
        let cfg = SamplingConfig {
            background_per_image: usize::MAX,
        };
        let sample = sample_training_anchors(&targets, &cfg, &mut StdRng::seed_from_u64(1));
        assert_eq!(sample.background, targets.indices_of(AssignmentLabel::Background));
    }
}
