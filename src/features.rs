use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use crate::FighterId;

/// Canonical per-fighter feature order. The classifier was trained on this
/// exact layout, red corner first.
pub const FEATURE_NAMES: [&str; 7] = [
    "avg_sig_str_landed",
    "avg_sig_str_pct",
    "avg_sub_att",
    "avg_td_landed",
    "avg_td_pct",
    "wins_by_ko",
    "wins_by_submission",
];

pub const FEATURES_PER_FIGHTER: usize = FEATURE_NAMES.len();
pub const FEATURE_VECTOR_LEN: usize = FEATURES_PER_FIGHTER * 2;

/// The seven statistics stored for a fighter.
#[derive(Debug, Clone, Copy, PartialEq, Default, Serialize, Deserialize)]
pub struct FeatureStats {
    pub avg_sig_str_landed: f64,
    pub avg_sig_str_pct: f64,
    pub avg_sub_att: f64,
    pub avg_td_landed: f64,
    pub avg_td_pct: f64,
    pub wins_by_ko: u32,
    pub wins_by_submission: u32,
}

impl FeatureStats {
    pub fn zeros() -> Self {
        Self::default()
    }

    /// Values in `FEATURE_NAMES` order.
    pub fn as_array(&self) -> [f64; FEATURES_PER_FIGHTER] {
        [
            self.avg_sig_str_landed,
            self.avg_sig_str_pct,
            self.avg_sub_att,
            self.avg_td_landed,
            self.avg_td_pct,
            self.wins_by_ko as f64,
            self.wins_by_submission as f64,
        ]
    }

    pub fn is_valid(&self) -> bool {
        self.as_array().iter().all(|v| v.is_finite() && *v >= 0.0)
    }
}

/// A stored feature row.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct FighterFeatures {
    pub fighter_id: FighterId,
    #[serde(flatten)]
    pub stats: FeatureStats,
    pub updated_at: DateTime<Utc>,
}

/// Model input for one matchup: red corner's seven values, then blue's.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct FeatureVector {
    values: [f64; FEATURE_VECTOR_LEN],
}

impl FeatureVector {
    pub fn as_slice(&self) -> &[f64] {
        &self.values
    }

    pub fn red(&self) -> &[f64] {
        &self.values[..FEATURES_PER_FIGHTER]
    }

    pub fn blue(&self) -> &[f64] {
        &self.values[FEATURES_PER_FIGHTER..]
    }
}

pub fn assemble(red: &FeatureStats, blue: &FeatureStats) -> FeatureVector {
    let mut values = [0.0; FEATURE_VECTOR_LEN];
    values[..FEATURES_PER_FIGHTER].copy_from_slice(&red.as_array());
    values[FEATURES_PER_FIGHTER..].copy_from_slice(&blue.as_array());
    FeatureVector { values }
}
