use anchormatch::{
    regressions_from_flat, AnchorConfig, AnchorGrid, AssignConfig, AssignmentLabel, GreedyNms,
    GroundTruth, ImageShape, Proposal, ProposalConfig, RegionProposer, RegressionTarget,
    TargetAssigner,
};
use clap::Parser;
use serde::{Deserialize, Serialize};
use std::fs;
use std::path::PathBuf;
use std::sync::Arc;
use tracing_subscriber::EnvFilter;

const SCHEMA_JSON: &str = include_str!(concat!(env!("CARGO_MANIFEST_DIR"), "/config.schema.json"));
const EXAMPLE_JSON: &str =
    include_str!(concat!(env!("CARGO_MANIFEST_DIR"), "/config.example.json"));

#[derive(Parser, Debug)]
#[command(author, version, about = "AnchorMatch CLI (JSON config driven)")]
struct Cli {
    /// Path to the JSON configuration file.
    #[arg(short, long, value_name = "FILE", default_value = "config.json")]
    config: PathBuf,
    /// Print the JSON schema and exit.
    #[arg(long)]
    print_schema: bool,
    /// Print an example config and exit.
    #[arg(long)]
    print_example: bool,
    /// Enable tracing output for performance profiling.
    #[arg(long)]
    trace: bool,
}

#[derive(Debug, Deserialize)]
#[serde(default)]
struct AnchorConfigJson {
    base_size: usize,
    ratios: Vec<f32>,
    scales: Vec<f32>,
    strides: Vec<usize>,
}

impl Default for AnchorConfigJson {
    fn default() -> Self {
        let cfg = AnchorConfig::default();
        Self {
            base_size: cfg.base_size,
            ratios: cfg.ratios,
            scales: cfg.scales,
            strides: cfg.strides,
        }
    }
}

impl From<AnchorConfigJson> for AnchorConfig {
    fn from(value: AnchorConfigJson) -> Self {
        AnchorConfig {
            base_size: value.base_size,
            ratios: value.ratios,
            scales: value.scales,
            strides: value.strides,
        }
    }
}

#[derive(Debug, Deserialize)]
#[serde(default)]
struct AssignConfigJson {
    fg_iou_threshold: f32,
    bg_iou_threshold: f32,
    parallel: bool,
}

impl Default for AssignConfigJson {
    fn default() -> Self {
        let cfg = AssignConfig::default();
        Self {
            fg_iou_threshold: cfg.fg_iou_threshold,
            bg_iou_threshold: cfg.bg_iou_threshold,
            parallel: cfg.parallel,
        }
    }
}

#[derive(Debug, Deserialize)]
struct GroundTruthJson {
    bbox: [f32; 4],
    category_id: u32,
}

#[derive(Debug, Deserialize)]
struct ProposalInputJson {
    scores: Vec<f32>,
    /// Flat `[dy, dx, dh, dw]` per anchor; zeros when absent.
    #[serde(default)]
    regressions: Option<Vec<f32>>,
    #[serde(default = "default_max_proposals")]
    max_proposals: usize,
    #[serde(default = "default_score_threshold")]
    score_threshold: f32,
    #[serde(default = "default_nms_iou_threshold")]
    nms_iou_threshold: f32,
}

fn default_max_proposals() -> usize {
    ProposalConfig::default().max_proposals
}

fn default_score_threshold() -> f32 {
    ProposalConfig::default().score_threshold
}

fn default_nms_iou_threshold() -> f32 {
    GreedyNms::default().iou_threshold()
}

#[derive(Debug, Deserialize)]
struct Config {
    image_height: usize,
    image_width: usize,
    #[serde(default)]
    anchors: AnchorConfigJson,
    #[serde(default)]
    assign: AssignConfigJson,
    #[serde(default)]
    ground_truth: Vec<GroundTruthJson>,
    #[serde(default)]
    proposals: Option<ProposalInputJson>,
    #[serde(default)]
    output_path: Option<String>,
}

#[derive(Debug, Serialize)]
struct StageRecord {
    stride: usize,
    rows: usize,
    cols: usize,
    anchors_per_cell: usize,
    offset: usize,
}

#[derive(Debug, Serialize)]
struct ForegroundRecord {
    index: usize,
    stage: usize,
    row: usize,
    col: usize,
    anchor: usize,
    bbox: [f32; 4],
    gt_index: usize,
    category_id: u32,
    target: [f32; 4],
}

#[derive(Debug, Serialize)]
struct AssignmentRecord {
    foreground: usize,
    background: usize,
    ignore: usize,
    anchors: Vec<ForegroundRecord>,
}

#[derive(Debug, Serialize)]
struct ProposalRecord {
    bbox: [f32; 4],
    score: f32,
    source_index: usize,
}

impl From<Proposal> for ProposalRecord {
    fn from(value: Proposal) -> Self {
        Self {
            bbox: value.bbox.to_array(),
            score: value.score,
            source_index: value.source_index,
        }
    }
}

#[derive(Debug, Serialize)]
struct Output {
    image: [usize; 2],
    total_anchors: usize,
    stages: Vec<StageRecord>,
    assignment: AssignmentRecord,
    proposals: Option<Vec<ProposalRecord>>,
}

fn foreground_records(
    grid: &AnchorGrid,
    ground_truth: &[GroundTruth],
    matched: &[Option<usize>],
    regressions: &[RegressionTarget],
) -> Vec<ForegroundRecord> {
    let mut out = Vec::new();
    for (index, gt_index) in matched.iter().enumerate() {
        let (Some(gt_index), Some(pos), Some(bbox)) =
            (*gt_index, grid.locate(index), grid.anchor(index))
        else {
            continue;
        };
        out.push(ForegroundRecord {
            index,
            stage: pos.stage,
            row: pos.row,
            col: pos.col,
            anchor: pos.anchor,
            bbox: bbox.to_array(),
            gt_index,
            category_id: ground_truth[gt_index].category_id,
            target: regressions[index].to_array(),
        });
    }
    out
}

fn main() -> Result<(), Box<dyn std::error::Error>> {
    let cli = Cli::parse();

    if cli.trace {
        tracing_subscriber::fmt()
            .with_env_filter(
                EnvFilter::from_default_env().add_directive("anchormatch=info".parse()?),
            )
            .with_target(false)
            .init();
    }

    if cli.print_schema {
        println!("{SCHEMA_JSON}");
        return Ok(());
    }
    if cli.print_example {
        println!("{EXAMPLE_JSON}");
        return Ok(());
    }

    let config_text = fs::read_to_string(&cli.config)?;
    let config: Config = serde_json::from_str(&config_text)?;

    let shape = ImageShape::new(config.image_height, config.image_width)?;
    let grid = Arc::new(AnchorGrid::generate(shape, &config.anchors.into())?);

    let ground_truth = config
        .ground_truth
        .iter()
        .map(|g| {
            let [y1, x1, y2, x2] = g.bbox;
            GroundTruth::from_tuple(y1, x1, y2, x2, g.category_id)
        })
        .collect::<Result<Vec<_>, _>>()?;

    let assigner = TargetAssigner::new(
        Arc::clone(&grid),
        AssignConfig {
            fg_iou_threshold: config.assign.fg_iou_threshold,
            bg_iou_threshold: config.assign.bg_iou_threshold,
            parallel: config.assign.parallel,
        },
    )?;
    let targets = assigner.assign(&ground_truth)?;
    let assignment = AssignmentRecord {
        foreground: targets.count(AssignmentLabel::Foreground),
        background: targets.count(AssignmentLabel::Background),
        ignore: targets.count(AssignmentLabel::Ignore),
        anchors: foreground_records(
            &grid,
            &ground_truth,
            targets.matched(),
            targets.regressions(),
        ),
    };

    let proposals = match config.proposals {
        Some(input) => {
            let regressions = match &input.regressions {
                Some(flat) => regressions_from_flat(flat, grid.len())?,
                None => vec![RegressionTarget::ZERO; grid.len()],
            };
            let proposer = RegionProposer::new(
                Arc::clone(&grid),
                ProposalConfig {
                    max_proposals: input.max_proposals,
                    score_threshold: input.score_threshold,
                },
                GreedyNms::new(input.nms_iou_threshold)?,
            );
            let kept = proposer.propose(&input.scores, &regressions)?;
            Some(kept.into_iter().map(ProposalRecord::from).collect())
        }
        None => None,
    };

    let output = Output {
        image: [shape.height(), shape.width()],
        total_anchors: grid.len(),
        stages: grid
            .stages()
            .iter()
            .map(|s| StageRecord {
                stride: s.stride,
                rows: s.rows,
                cols: s.cols,
                anchors_per_cell: s.anchors_per_cell,
                offset: s.offset,
            })
            .collect(),
        assignment,
        proposals,
    };
    let json = serde_json::to_string_pretty(&output)?;

    match config.output_path {
        Some(path) => fs::write(path, json)?,
        None => println!("{json}"),
    }

    Ok(())
}
