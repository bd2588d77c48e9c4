//! Fight outcome prediction for the uTracker MMA tracker.
//!
//! Fighter statistics come from an external lookup, get normalized into a
//! fixed feature record, and are stored per fighter. A pretrained
//! feed-forward classifier turns two stored records into complementary
//! red/blue win probabilities.

pub mod cli;
pub mod config;
pub mod enrollment;
pub mod feature_store;
pub mod features;
pub mod fetch_cache;
pub mod http_client;
pub mod normalize;
pub mod prediction;
pub mod predictor;
pub mod stats_fetch;

use std::fmt;

use serde::{Deserialize, Serialize};

/// Database identity of a fighter.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(transparent)]
pub struct FighterId(pub i64);

impl fmt::Display for FighterId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

/// Side of the cage. Red is always concatenated first.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Corner {
    Red,
    Blue,
}

impl fmt::Display for Corner {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Corner::Red => write!(f, "red"),
            Corner::Blue => write!(f, "blue"),
        }
    }
}
