use std::sync::Arc;

use anyhow::{Context, Result, anyhow};

use utracker::FighterId;
use utracker::cli::{db_path_arg, flag_value, init_tracing};
use utracker::config::{AppConfig, load_dotenv};
use utracker::feature_store::SqliteFeatureStore;
use utracker::prediction::{FightPredictionRequest, PredictionService};
use utracker::predictor::LazyPredictor;

const EXIT_CLIENT_ERROR: i32 = 2;

fn main() -> Result<()> {
    load_dotenv();
    init_tracing();

    let args = std::env::args().skip(1).collect::<Vec<_>>();
    let request = FightPredictionRequest {
        red_corner_id: parse_id(&args, "--red")?,
        blue_corner_id: parse_id(&args, "--blue")?,
    };

    let cfg = AppConfig::from_env();
    let db_path = db_path_arg(&args)
        .or_else(|| cfg.db_path.clone())
        .context("unable to resolve sqlite path")?;
    let store = SqliteFeatureStore::open(&db_path)?;

    let predictor = Arc::new(LazyPredictor::from_artifacts(cfg.artifacts.clone()));
    predictor.get().context("load fight predictor")?;

    let service = PredictionService::new(store, predictor);
    match service.handle(request) {
        Ok(resp) => {
            let json = serde_json::to_string_pretty(&resp).context("serialize prediction")?;
            println!("{json}");
            Ok(())
        }
        Err(err) if err.is_client_error() => {
            eprintln!("{err}");
            eprintln!("hint: run add_fighter or backfill_features first");
            std::process::exit(EXIT_CLIENT_ERROR);
        }
        Err(err) => Err(anyhow::Error::new(err).context("prediction failed")),
    }
}

fn parse_id(args: &[String], flag: &str) -> Result<FighterId> {
    let raw = flag_value(args, flag).ok_or_else(|| anyhow!("missing {flag} <fighter id>"))?;
    let id = raw
        .parse::<i64>()
        .with_context(|| format!("{flag} expects an integer, got {raw:?}"))?;
    Ok(FighterId(id))
}
