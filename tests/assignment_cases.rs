//! Table-driven assignment checks loaded from `tests/data`.

use anchormatch::{
    assign_anchor_targets, AnchorConfig, AnchorGrid, AnchorIndex, AssignConfig, AssignmentLabel,
    GroundTruth, ImageShape,
};
use serde::Deserialize;

#[derive(Debug, Deserialize)]
struct CaseFile {
    cases: Vec<Case>,
}

#[derive(Debug, Deserialize)]
struct GtEntry {
    bbox: [f32; 4],
    category_id: u32,
}

#[derive(Debug, Deserialize)]
struct Case {
    case_id: String,
    image: [usize; 2],
    #[serde(default = "default_stages")]
    stages: usize,
    #[serde(default = "default_scales")]
    scales: Vec<f32>,
    ground_truth: Vec<GtEntry>,
    /// `[stage, row, col, anchor]` of every expected foreground anchor.
    #[serde(default)]
    expected_foreground: Option<Vec<[usize; 4]>>,
    #[serde(default)]
    min_foreground: usize,
}

fn default_stages() -> usize {
    1
}

fn default_scales() -> Vec<f32> {
    vec![8.0, 16.0, 32.0]
}

fn load_cases() -> Vec<Case> {
    let raw = include_str!("data/assignment_cases.json");
    let file: CaseFile = serde_json::from_str(raw).expect("valid case file");
    file.cases
}

#[test]
fn assignment_cases_hold() {
    for case in load_cases() {
        let shape = ImageShape::new(case.image[0], case.image[1]).unwrap();
        let cfg =
            AnchorConfig::with_stage_count(16, vec![0.5, 1.0, 2.0], case.scales.clone(), case.stages);
        let grid = AnchorGrid::generate(shape, &cfg).unwrap();
        let gt: Vec<GroundTruth> = case
            .ground_truth
            .iter()
            .map(|g| {
                let [y1, x1, y2, x2] = g.bbox;
                GroundTruth::from_tuple(y1, x1, y2, x2, g.category_id).unwrap()
            })
            .collect();

        let targets = assign_anchor_targets(&grid, &gt, &AssignConfig::default()).unwrap();
        let foreground = targets.foreground_indices();

        assert!(
            foreground.len() >= case.min_foreground.max(gt.len()),
            "{}: {} foreground anchors for {} boxes",
            case.case_id,
            foreground.len(),
            gt.len()
        );
        if let Some(expected) = &case.expected_foreground {
            let expected: Vec<usize> = expected
                .iter()
                .map(|&[stage, row, col, anchor]| {
                    grid.flat_index(AnchorIndex {
                        stage,
                        row,
                        col,
                        anchor,
                    })
                    .unwrap()
                })
                .collect();
            assert_eq!(foreground, expected, "{}", case.case_id);
        }
        if gt.is_empty() {
            assert_eq!(
                targets.count(AssignmentLabel::Background),
                grid.len(),
                "{}",
                case.case_id
            );
        }
    }
}
