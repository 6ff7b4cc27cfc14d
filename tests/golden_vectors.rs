use std::fs;
use std::path::PathBuf;

use approx::assert_abs_diff_eq;
use serde::Deserialize;

use wicketline::artifact::ModelArtifact;
use wicketline::classify::Predictor;

#[derive(Deserialize)]
#[serde(rename_all = "camelCase")]
struct GoldenFile {
    team_aware: Vec<GoldenCase>,
    scorecard: Vec<GoldenCase>,
}

#[derive(Deserialize)]
struct GoldenCase {
    raw: Vec<f64>,
    expected: GoldenProbs,
}

#[derive(Deserialize)]
struct GoldenProbs {
    win: f64,
    draw: f64,
    loss: f64,
}

fn fixture_path(name: &str) -> PathBuf {
    let mut path = PathBuf::from(env!("CARGO_MANIFEST_DIR"));
    path.push("tests");
    path.push("fixtures");
    path.push(name);
    path
}

fn predictor(name: &str) -> Predictor {
    let artifact = ModelArtifact::load(&fixture_path(name)).expect("artifact fixture should load");
    Predictor::from_artifact(&artifact).expect("artifact should build a predictor")
}

fn golden() -> GoldenFile {
    let raw = fs::read_to_string(fixture_path("golden_vectors.json"))
        .expect("fixture file should be readable");
    serde_json::from_str(&raw).expect("golden fixture should parse")
}

#[test]
fn replica_matches_reference_outputs() {
    let golden = golden();
    let team = predictor("model_team_aware.json");
    let scorecard = predictor("model_scorecard.json");

    // Reference coverage spans early, middle and endgame states.
    assert!(golden.team_aware.len() >= 20);

    for (model, cases) in [(&team, &golden.team_aware), (&scorecard, &golden.scorecard)] {
        for case in cases {
            let p = model.predict_vector(&case.raw).expect("vector should score");
            assert_abs_diff_eq!(p.win, case.expected.win, epsilon = 1e-6);
            assert_abs_diff_eq!(p.draw, case.expected.draw, epsilon = 1e-6);
            assert_abs_diff_eq!(p.loss, case.expected.loss, epsilon = 1e-6);
        }
    }
}

#[test]
fn outputs_are_proper_distributions() {
    let golden = golden();
    let team = predictor("model_team_aware.json");
    let scorecard = predictor("model_scorecard.json");

    for (model, cases) in [(&team, &golden.team_aware), (&scorecard, &golden.scorecard)] {
        for case in cases {
            let p = model.predict_vector(&case.raw).expect("vector should score");
            for v in [p.win, p.draw, p.loss] {
                assert!((0.0..=1.0).contains(&v), "probability {v} out of range");
            }
            assert_abs_diff_eq!(p.sum(), 1.0, epsilon = 1e-6);
        }
    }
}
