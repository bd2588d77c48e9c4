use anyhow::{Context, Result};

use utracker::cli::{db_path_arg, init_tracing};
use utracker::config::{AppConfig, load_dotenv};
use utracker::enrollment::backfill;
use utracker::feature_store::SqliteFeatureStore;
use utracker::stats_fetch::{FeatureFetcher, RapidApiLookup};

fn main() -> Result<()> {
    load_dotenv();
    init_tracing();

    let args = std::env::args().skip(1).collect::<Vec<_>>();
    let cfg = AppConfig::from_env();
    let db_path = db_path_arg(&args)
        .or_else(|| cfg.db_path.clone())
        .context("unable to resolve sqlite path")?;
    let store = SqliteFeatureStore::open(&db_path)?;
    let fetcher = FeatureFetcher::new(RapidApiLookup::from_config(&cfg.stats_api)?);

    let fighters = store.list_fighters().context("list fighters")?;
    let summary = backfill(&store, &fetcher, &fighters, cfg.fetch_parallelism);

    println!("Feature backfill complete");
    println!("DB: {}", db_path.display());
    println!("Updated: {}/{}", summary.updated, summary.total);
    if !summary.errors.is_empty() {
        println!("  errors: {}", summary.errors.len());
        for (id, err) in summary.errors.iter().take(10) {
            println!("   - fighter {id}: {err}");
        }
    }
    Ok(())
}
