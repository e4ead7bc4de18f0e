//! Base anchors for a single grid cell.

use crate::util::math::round_half_even;
use crate::util::{AnchorMatchError, AnchorMatchResult};

/// Enumerates one cell's anchors, ratio-major then scale-minor.
///
/// Starts from the square `[0, 0, base-1, base-1]`. For each ratio
/// `r = h / w` the area-preserving width is `round(sqrt(base^2 / r))` and the
/// height `round(width * r)`, rounding half to even. Each scale multiplies
/// both sides; every anchor shares the base box's center. Output rows are
/// `[y1, x1, y2, x2]`.
pub fn base_anchors(base: f32, ratios: &[f32], scales: &[f32]) -> AnchorMatchResult<Vec<[f32; 4]>> {
    let ctr = 0.5 * (base - 1.0);
    let size = base * base;

    let mut out = Vec::with_capacity(ratios.len() * scales.len());
    for &ratio in ratios {
        let ws = round_half_even((size / ratio).sqrt());
        let hs = round_half_even(ws * ratio);
        if ws < 1.0 || hs < 1.0 {
            return Err(AnchorMatchError::ConfigurationMismatch {
                reason: "aspect ratio collapses the base anchor",
            });
        }
        for &scale in scales {
            let h = hs * scale;
            let w = ws * scale;
            out.push([
                ctr - 0.5 * (h - 1.0),
                ctr - 0.5 * (w - 1.0),
                ctr + 0.5 * (h - 1.0),
                ctr + 0.5 * (w - 1.0),
            ]);
        }
    }
    Ok(out)
}

#[cfg(test)]
mod tests {
    use super::base_anchors;

    #[test]
    fn default_config_reproduces_classic_anchor_table() {
        let anchors = base_anchors(16.0, &[0.5, 1.0, 2.0], &[8.0, 16.0, 32.0]).unwrap();
        assert_eq!(anchors.len(), 9);
        // (y1, x1, y2, x2) of the well-known 9-anchor table.
        let expected = [
            [-40.0, -84.0, 55.0, 99.0],
            [-88.0, -176.0, 103.0, 191.0],
            [-184.0, -360.0, 199.0, 375.0],
            [-56.0, -56.0, 71.0, 71.0],
            [-120.0, -120.0, 135.0, 135.0],
            [-248.0, -248.0, 263.0, 263.0],
            [-80.0, -36.0, 95.0, 51.0],
            [-168.0, -80.0, 183.0, 95.0],
            [-344.0, -168.0, 359.0, 183.0],
        ];
        for (got, want) in anchors.iter().zip(expected.iter()) {
            assert_eq!(got, want);
        }
    }

    #[test]
    fn extreme_ratio_is_rejected() {
        assert!(base_anchors(4.0, &[1000.0], &[1.0]).is_err());
    }
}
