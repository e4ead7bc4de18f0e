//! Anchor grid generation.
//!
//! An [`AnchorGrid`] tiles every pyramid stage of an image with the base
//! anchors of [`AnchorConfig`]. The flat enumeration order is fixed and every
//! per-anchor array in the crate (labels, regression targets, scores) follows
//! it:
//!
//! stage-major, then row-major over the stage grid, then ratio-major, then
//! scale-minor. For stage `s` with `cols` columns and `A = ratios * scales`
//! anchors per cell the flat index is
//! `offset_s + (row * cols + col) * A + ratio_idx * n_scales + scale_idx`.
//!
//! Generation is pure: the same shape and config always produce a
//! bit-identical grid, which is what makes sharing one grid across images
//! (see [`AnchorCache`]) safe.

mod base;
mod cache;

pub use base::base_anchors;
pub use cache::AnchorCache;

use crate::geometry::{BBox, ImageShape};
use crate::kernel::{BoxColumns, ColumnsView};
use crate::trace::{trace_event, trace_span};
use crate::util::math::ceil_div;
use crate::util::{AnchorMatchError, AnchorMatchResult};

/// Parameters describing the anchors tiled over an image.
#[derive(Clone, Debug, PartialEq)]
pub struct AnchorConfig {
    /// Side of the square base anchor at the first stage, in pixels.
    pub base_size: usize,
    /// Aspect ratios `h / w`.
    pub ratios: Vec<f32>,
    /// Multipliers applied to each ratio's base box.
    pub scales: Vec<f32>,
    /// Feature stride of each pyramid stage, in pixels.
    pub strides: Vec<usize>,
}

impl Default for AnchorConfig {
    fn default() -> Self {
        Self {
            base_size: 16,
            ratios: vec![0.5, 1.0, 2.0],
            scales: vec![8.0, 16.0, 32.0],
            strides: vec![16],
        }
    }
}

impl AnchorConfig {
    /// Builds a config whose stage `s` has stride `base_size * 2^s`.
    ///
    /// A stride that does not fit in `usize` is stored as `0`, which
    /// [`AnchorConfig::validate`] rejects as a configuration mismatch.
    pub fn with_stage_count(
        base_size: usize,
        ratios: Vec<f32>,
        scales: Vec<f32>,
        n_stages: usize,
    ) -> Self {
        let strides = (0..n_stages)
            .map(|s| {
                u32::try_from(s)
                    .ok()
                    .and_then(|s| 1usize.checked_shl(s))
                    .and_then(|factor| base_size.checked_mul(factor))
                    .unwrap_or(0)
            })
            .collect();
        Self {
            base_size,
            ratios,
            scales,
            strides,
        }
    }

    /// Number of anchors emitted per grid cell.
    pub fn anchors_per_cell(&self) -> usize {
        self.ratios.len() * self.scales.len()
    }

    pub fn num_stages(&self) -> usize {
        self.strides.len()
    }

    /// Checks that the config can tile an image.
    pub fn validate(&self) -> AnchorMatchResult<()> {
        let reason = if self.base_size == 0 {
            Some("base_size must be positive")
        } else if self.ratios.is_empty() || self.scales.is_empty() {
            Some("ratios and scales must be non-empty")
        } else if self.strides.is_empty() {
            Some("at least one stage stride is required")
        } else if self.strides.contains(&0) {
            Some("stage strides must be positive")
        } else if !self.ratios.iter().all(|r| r.is_finite() && *r > 0.0) {
            Some("ratios must be finite and positive")
        } else if !self.scales.iter().all(|s| s.is_finite() && *s > 0.0) {
            Some("scales must be finite and positive")
        } else {
            None
        };
        match reason {
            Some(reason) => Err(AnchorMatchError::ConfigurationMismatch { reason }),
            None => Ok(()),
        }
    }
}

/// Layout of one pyramid stage inside the flat anchor list.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub struct StageGrid {
    pub stride: usize,
    pub rows: usize,
    pub cols: usize,
    pub anchors_per_cell: usize,
    /// Flat index of this stage's first anchor.
    pub offset: usize,
}

impl StageGrid {
    /// Number of anchors in this stage.
    pub fn len(&self) -> usize {
        self.rows * self.cols * self.anchors_per_cell
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    /// Returns `(rows, cols, anchors_per_cell)`.
    pub fn shape(&self) -> (usize, usize, usize) {
        (self.rows, self.cols, self.anchors_per_cell)
    }
}

/// Structured position of one anchor.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub struct AnchorIndex {
    pub stage: usize,
    pub row: usize,
    pub col: usize,
    /// `ratio_idx * n_scales + scale_idx`.
    pub anchor: usize,
}

/// Immutable anchor tiling for one `(ImageShape, AnchorConfig)` pair.
#[derive(Clone, Debug, PartialEq)]
pub struct AnchorGrid {
    image_shape: ImageShape,
    config: AnchorConfig,
    stages: Vec<StageGrid>,
    boxes: Vec<BBox>,
    columns: BoxColumns,
}

impl AnchorGrid {
    /// Tiles `image_shape` with the anchors described by `config`.
    pub fn generate(image_shape: ImageShape, config: &AnchorConfig) -> AnchorMatchResult<Self> {
        config.validate()?;
        let _span = trace_span!(
            "generate_anchors",
            height = image_shape.height(),
            width = image_shape.width(),
            stages = config.num_stages()
        )
        .entered();

        let per_cell = config.anchors_per_cell();
        let first_stride = config.strides[0] as f32;

        let mut stages = Vec::with_capacity(config.num_stages());
        let mut boxes = Vec::new();
        for &stride in &config.strides {
            let rows = ceil_div(image_shape.height(), stride);
            let cols = ceil_div(image_shape.width(), stride);
            let stage_base = config.base_size as f32 * stride as f32 / first_stride;
            let cell = base_anchors(stage_base, &config.ratios, &config.scales)?;

            stages.push(StageGrid {
                stride,
                rows,
                cols,
                anchors_per_cell: per_cell,
                offset: boxes.len(),
            });
            boxes.reserve(rows * cols * per_cell);
            for row in 0..rows {
                let sy = (row * stride) as f32;
                for col in 0..cols {
                    let sx = (col * stride) as f32;
                    for a in &cell {
                        boxes.push(BBox::from_corners(a[0] + sy, a[1] + sx, a[2] + sy, a[3] + sx));
                    }
                }
            }
        }

        let columns = BoxColumns::from_boxes(&boxes);
        trace_event!("anchor_grid", anchors = boxes.len(), stages = stages.len());
        Ok(Self {
            image_shape,
            config: config.clone(),
            stages,
            boxes,
            columns,
        })
    }

    pub fn image_shape(&self) -> ImageShape {
        self.image_shape
    }

    pub fn config(&self) -> &AnchorConfig {
        &self.config
    }

    pub fn stages(&self) -> &[StageGrid] {
        &self.stages
    }

    /// Total number of anchors over all stages.
    pub fn len(&self) -> usize {
        self.boxes.len()
    }

    pub fn is_empty(&self) -> bool {
        self.boxes.is_empty()
    }

    /// All anchors in flat enumeration order.
    pub fn boxes(&self) -> &[BBox] {
        &self.boxes
    }

    pub fn anchor(&self, index: usize) -> Option<&BBox> {
        self.boxes.get(index)
    }

    /// Column layout consumed by the overlap kernels.
    pub fn columns(&self) -> ColumnsView<'_> {
        self.columns.view()
    }

    /// Flat index of a structured position, if it lies inside the grid.
    pub fn flat_index(&self, idx: AnchorIndex) -> Option<usize> {
        let stage = self.stages.get(idx.stage)?;
        if idx.row >= stage.rows || idx.col >= stage.cols || idx.anchor >= stage.anchors_per_cell {
            return None;
        }
        Some(stage.offset + (idx.row * stage.cols + idx.col) * stage.anchors_per_cell + idx.anchor)
    }

    /// Structured position of a flat index.
    pub fn locate(&self, index: usize) -> Option<AnchorIndex> {
        let (stage_idx, stage) = self
            .stages
            .iter()
            .enumerate()
            .find(|(_, s)| index >= s.offset && index < s.offset + s.len())?;
        let local = index - stage.offset;
        let cell = local / stage.anchors_per_cell;
        Some(AnchorIndex {
            stage: stage_idx,
            row: cell / stage.cols,
            col: cell % stage.cols,
            anchor: local % stage.anchors_per_cell,
        })
    }
}

#[cfg(test)]
mod tests {
    use super::{AnchorConfig, AnchorGrid, AnchorIndex};
    use crate::geometry::ImageShape;
    use crate::util::AnchorMatchError;

    #[test]
    fn grid_dimensions_round_up() {
        let shape = ImageShape::new(800, 1333).unwrap();
        let grid = AnchorGrid::generate(shape, &AnchorConfig::default()).unwrap();
        assert_eq!(grid.stages().len(), 1);
        assert_eq!(grid.stages()[0].shape(), (50, 84, 9));
        assert_eq!(grid.len(), 50 * 84 * 9);
    }

    #[test]
    fn flat_index_and_locate_agree() {
        let shape = ImageShape::new(64, 96).unwrap();
        let cfg = AnchorConfig::with_stage_count(8, vec![1.0, 2.0], vec![1.0, 2.0], 3);
        assert_eq!(cfg.strides, vec![8, 16, 32]);
        let grid = AnchorGrid::generate(shape, &cfg).unwrap();

        for index in [0, 1, 17, grid.stages()[1].offset, grid.len() - 1] {
            let pos = grid.locate(index).unwrap();
            assert_eq!(grid.flat_index(pos), Some(index));
        }
        assert!(grid.locate(grid.len()).is_none());
        assert!(grid
            .flat_index(AnchorIndex {
                stage: 0,
                row: 8,
                col: 0,
                anchor: 0,
            })
            .is_none());
    }

    #[test]
    fn anchors_shift_by_stride() {
        let shape = ImageShape::new(32, 32).unwrap();
        let grid = AnchorGrid::generate(shape, &AnchorConfig::default()).unwrap();
        let a = grid.boxes()[4];
        let b = grid.boxes()[9 + 4];
        assert_eq!(b.x1() - a.x1(), 16.0);
        assert_eq!(b.y1(), a.y1());
    }

    #[test]
    fn later_stages_scale_base_anchor_with_stride() {
        let shape = ImageShape::new(64, 64).unwrap();
        let cfg = AnchorConfig {
            base_size: 4,
            ratios: vec![1.0],
            scales: vec![1.0],
            strides: vec![4, 8],
        };
        let grid = AnchorGrid::generate(shape, &cfg).unwrap();
        let second = grid.boxes()[grid.stages()[1].offset];
        assert_eq!(second.height(), 8.0);
    }

    #[test]
    fn overflowing_stage_strides_fail_validation() {
        let cfg = AnchorConfig::with_stage_count(16, vec![1.0], vec![1.0], 70);
        assert_eq!(cfg.strides[3], 128);
        assert_eq!(cfg.strides[69], 0);
        assert_eq!(
            cfg.validate().unwrap_err(),
            AnchorMatchError::ConfigurationMismatch {
                reason: "stage strides must be positive",
            }
        );

        let huge = AnchorConfig::with_stage_count(usize::MAX / 2, vec![1.0], vec![1.0], 3);
        assert_eq!(huge.strides[2], 0);
        let shape = ImageShape::new(64, 64).unwrap();
        assert!(AnchorGrid::generate(shape, &huge).is_err());
    }

    #[test]
    fn invalid_configs_are_configuration_mismatches() {
        let shape = ImageShape::new(64, 64).unwrap();
        let cfg = AnchorConfig {
            strides: vec![16, 0],
            ..AnchorConfig::default()
        };
        assert_eq!(
            AnchorGrid::generate(shape, &cfg).unwrap_err(),
            AnchorMatchError::ConfigurationMismatch {
                reason: "stage strides must be positive",
            }
        );
        let cfg = AnchorConfig {
            ratios: Vec::new(),
            ..AnchorConfig::default()
        };
        assert!(AnchorGrid::generate(shape, &cfg).is_err());
    }
}
