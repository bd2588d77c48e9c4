use rayon::prelude::*;
use tracing::{info, warn};

use crate::FighterId;
use crate::config::SeedPolicy;
use crate::feature_store::{FeatureStore, Fighter};
use crate::features::FeatureStats;
use crate::normalize::normalize;
use crate::stats_fetch::{FeatureFetcher, StatsLookup};

#[derive(Debug, Clone, Copy, PartialEq)]
pub enum EnrollOutcome {
    /// Provider data was normalized and stored.
    Fetched(FeatureStats),
    /// No provider data; an all-zero row was stored.
    Seeded,
    /// No provider data and no row written.
    Skipped,
    /// A row was due but the store refused it. The fighter stays registered
    /// without features.
    Unsaved,
}

/// Creation-time feature attachment. Neither a provider failure nor a
/// store failure fails the enrollment: the fighter is already registered,
/// and backfill can attach features later.
pub fn enroll_fighter<S, L>(
    store: &S,
    fetcher: &FeatureFetcher<L>,
    fighter_id: FighterId,
    name: &str,
    policy: SeedPolicy,
) -> EnrollOutcome
where
    S: FeatureStore,
    L: StatsLookup,
{
    let (stats, outcome) = match fetcher.fetch(name) {
        Some(record) => {
            let stats = normalize(&record);
            (stats, EnrollOutcome::Fetched(stats))
        }
        None => match policy {
            SeedPolicy::SeedZeros => (FeatureStats::zeros(), EnrollOutcome::Seeded),
            SeedPolicy::LeaveEmpty => return EnrollOutcome::Skipped,
        },
    };
    match store.upsert_features(fighter_id, &stats) {
        Ok(_) => {
            info!(fighter = name, id = %fighter_id, ?outcome, "stored fighter features");
            outcome
        }
        Err(err) => {
            warn!(fighter = name, id = %fighter_id, error = %err, "could not update features");
            EnrollOutcome::Unsaved
        }
    }
}

#[derive(Debug, Clone, Default)]
pub struct BackfillSummary {
    pub total: usize,
    pub updated: usize,
    pub errors: Vec<(FighterId, String)>,
}

/// Refetches every fighter and overwrites rows that come back. Existing rows
/// are left alone when the provider has nothing.
pub fn backfill<S, L>(
    store: &S,
    fetcher: &FeatureFetcher<L>,
    fighters: &[Fighter],
    parallelism: usize,
) -> BackfillSummary
where
    S: FeatureStore,
    L: StatsLookup,
{
    let pool = rayon::ThreadPoolBuilder::new()
        .num_threads(parallelism.max(1))
        .build()
        .ok();

    let run = || {
        fighters
            .par_iter()
            .map(|fighter| {
                let outcome = fetcher
                    .try_fetch(&fighter.name)
                    .map_err(|err| err.to_string())
                    .and_then(|record| {
                        store
                            .upsert_features(fighter.id, &normalize(&record))
                            .map_err(|err| err.to_string())
                    });
                (fighter.id, outcome.map(|_| ()))
            })
            .collect::<Vec<_>>()
    };
    let results = match pool.as_ref() {
        Some(pool) => pool.install(run),
        None => run(),
    };

    let mut summary = BackfillSummary {
        total: fighters.len(),
        ..BackfillSummary::default()
    };
    for (id, outcome) in results {
        match outcome {
            Ok(()) => summary.updated += 1,
            Err(err) => {
                warn!(id = %id, error = %err, "backfill failed");
                summary.errors.push((id, err));
            }
        }
    }
    summary
}
