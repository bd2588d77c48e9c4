use anyhow::{Context, Result, anyhow};

use utracker::cli::{db_path_arg, flag_value, init_tracing};
use utracker::config::{AppConfig, load_dotenv};
use utracker::enrollment::{EnrollOutcome, enroll_fighter};
use utracker::feature_store::SqliteFeatureStore;
use utracker::stats_fetch::{FeatureFetcher, RapidApiLookup};

fn main() -> Result<()> {
    load_dotenv();
    init_tracing();

    let args = std::env::args().skip(1).collect::<Vec<_>>();
    let name = flag_value(&args, "--name").ok_or_else(|| anyhow!("missing --name <fighter>"))?;

    let cfg = AppConfig::from_env();
    let db_path = db_path_arg(&args)
        .or_else(|| cfg.db_path.clone())
        .context("unable to resolve sqlite path")?;
    let store = SqliteFeatureStore::open(&db_path)?;
    let fetcher = FeatureFetcher::new(RapidApiLookup::from_config(&cfg.stats_api)?);

    let fighter = store
        .insert_fighter(&name)
        .with_context(|| format!("register fighter {name:?}"))?;
    let outcome = enroll_fighter(&store, &fetcher, fighter.id, &fighter.name, cfg.seed_policy);

    println!("Fighter {} registered as id {}", fighter.name, fighter.id);
    match outcome {
        EnrollOutcome::Fetched(stats) => {
            println!(
                "Features: sig_str={:.2} sig_pct={:.2} sub={:.2} td={:.2} td_pct={:.2} \
                 ko={} subs={}",
                stats.avg_sig_str_landed,
                stats.avg_sig_str_pct,
                stats.avg_sub_att,
                stats.avg_td_landed,
                stats.avg_td_pct,
                stats.wins_by_ko,
                stats.wins_by_submission
            );
        }
        EnrollOutcome::Seeded => println!("Features: none found, seeded with zeros"),
        EnrollOutcome::Skipped => {
            println!("Features: none found, predictions unavailable until backfilled")
        }
        EnrollOutcome::Unsaved => println!("Features: could not be stored, run backfill_features"),
    }
    Ok(())
}
