#![allow(dead_code)]

use std::fs;
use std::path::{Path, PathBuf};

use serde_json::{Value, json};

use utracker::config::ModelArtifacts;
use utracker::features::FeatureStats;

pub fn read_fixture(name: &str) -> String {
    fs::read_to_string(fixture_path(name)).expect("fixture file should be readable")
}

pub fn fixture_path(name: &str) -> PathBuf {
    let mut path = PathBuf::from(env!("CARGO_MANIFEST_DIR"));
    path.push("tests");
    path.push("fixtures");
    path.push(name);
    path
}

/// `predictor.pt` was written by `scripts/make_predictor_fixture.py`; these
/// are the logits it reports for `fighter_a` against an all-zero opponent.
pub const FIXTURE_LOGIT_A_VS_ZEROS: f64 = -2.266_494_177_991_335e-4;
pub const FIXTURE_LOGIT_ZEROS_VS_A: f64 = -1.016_935_855_082_828_8e-3;

pub fn meta_json(input_dim: usize) -> Value {
    json!({ "input_dim": input_dim })
}

/// Writes metadata into `dir` and pairs it with a checkpoint fixture.
pub fn artifacts_with(dir: &Path, meta: &Value, checkpoint: &str) -> ModelArtifacts {
    let meta_path = dir.join("predictor_meta.json");
    fs::write(&meta_path, meta.to_string()).expect("write meta");
    ModelArtifacts {
        meta_path,
        weights_path: fixture_path(checkpoint),
    }
}

pub fn default_artifacts(dir: &Path) -> ModelArtifacts {
    artifacts_with(dir, &meta_json(14), "predictor.pt")
}

pub fn fighter_a() -> FeatureStats {
    FeatureStats {
        avg_sig_str_landed: 2.53,
        avg_sig_str_pct: 0.69,
        avg_sub_att: 0.0,
        avg_td_landed: 4.04,
        avg_td_pct: 0.59,
        wins_by_ko: 1,
        wins_by_submission: 6,
    }
}
