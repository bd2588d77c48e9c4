use std::env;
use std::path::PathBuf;

const APP_DIR: &str = "utracker";
const DB_FILE: &str = "utracker.sqlite";

pub const DEFAULT_STATS_URL: &str = "https://mma-stats.p.rapidapi.com/search";
pub const DEFAULT_STATS_HOST: &str = "mma-stats.p.rapidapi.com";
pub const DEFAULT_META_PATH: &str = "pytorch/predictor_meta.json";
pub const DEFAULT_WEIGHTS_PATH: &str = "pytorch/predictor.pt";
const DEFAULT_TIMEOUT_SECS: u64 = 10;
const DEFAULT_FETCH_PARALLELISM: usize = 6;

/// What enrollment writes when the provider has nothing for a fighter.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SeedPolicy {
    /// Insert an all-zero feature row.
    SeedZeros,
    /// Leave the fighter without a feature row; predictions will refuse it.
    LeaveEmpty,
}

impl SeedPolicy {
    pub fn parse(raw: &str) -> Option<Self> {
        match raw.trim().to_ascii_lowercase().as_str() {
            "zeros" | "zero" | "seed" => Some(SeedPolicy::SeedZeros),
            "empty" | "none" | "skip" => Some(SeedPolicy::LeaveEmpty),
            _ => None,
        }
    }
}

#[derive(Debug, Clone)]
pub struct StatsApiConfig {
    pub url: String,
    pub host: String,
    pub api_key: Option<String>,
    pub timeout_secs: u64,
}

#[derive(Debug, Clone)]
pub struct ModelArtifacts {
    pub meta_path: PathBuf,
    pub weights_path: PathBuf,
}

impl Default for ModelArtifacts {
    fn default() -> Self {
        Self {
            meta_path: PathBuf::from(DEFAULT_META_PATH),
            weights_path: PathBuf::from(DEFAULT_WEIGHTS_PATH),
        }
    }
}

#[derive(Debug, Clone)]
pub struct AppConfig {
    pub stats_api: StatsApiConfig,
    pub artifacts: ModelArtifacts,
    pub db_path: Option<PathBuf>,
    pub seed_policy: SeedPolicy,
    pub fetch_parallelism: usize,
}

impl AppConfig {
    pub fn from_env() -> Self {
        let api_key = opt_env("RAPIDAPI_API_KEY").map(|s| s.trim().to_string());
        let timeout_secs = env::var("MMA_STATS_TIMEOUT_SECS")
            .ok()
            .and_then(|v| v.trim().parse::<u64>().ok())
            .unwrap_or(DEFAULT_TIMEOUT_SECS)
            .clamp(1, 60);
        let stats_api = StatsApiConfig {
            url: opt_env("MMA_STATS_URL").unwrap_or_else(|| DEFAULT_STATS_URL.to_string()),
            host: opt_env("MMA_STATS_HOST").unwrap_or_else(|| DEFAULT_STATS_HOST.to_string()),
            api_key,
            timeout_secs,
        };

        let artifacts = ModelArtifacts {
            meta_path: opt_env("PREDICTOR_META_PATH")
                .map(PathBuf::from)
                .unwrap_or_else(|| PathBuf::from(DEFAULT_META_PATH)),
            weights_path: opt_env("PREDICTOR_WEIGHTS_PATH")
                .map(PathBuf::from)
                .unwrap_or_else(|| PathBuf::from(DEFAULT_WEIGHTS_PATH)),
        };

        let db_path = opt_env("UTRACKER_DB_PATH")
            .map(PathBuf::from)
            .or_else(default_db_path);

        let seed_policy = opt_env("FEATURE_SEED_POLICY")
            .and_then(|raw| SeedPolicy::parse(&raw))
            .unwrap_or(SeedPolicy::LeaveEmpty);

        let fetch_parallelism = env::var("FETCH_PARALLELISM")
            .ok()
            .and_then(|val| val.trim().parse::<usize>().ok())
            .unwrap_or(DEFAULT_FETCH_PARALLELISM)
            .clamp(2, 32);

        Self {
            stats_api,
            artifacts,
            db_path,
            seed_policy,
            fetch_parallelism,
        }
    }
}

/// Loads `.env.local` then `.env`; later files never override earlier ones.
pub fn load_dotenv() {
    let _ = dotenvy::from_filename(".env.local");
    let _ = dotenvy::from_filename(".env");
}

pub fn app_cache_dir() -> Option<PathBuf> {
    if let Ok(base) = env::var("XDG_CACHE_HOME")
        && !base.trim().is_empty()
    {
        return Some(PathBuf::from(base).join(APP_DIR));
    }
    let home = env::var("HOME").ok()?;
    if home.trim().is_empty() {
        return None;
    }
    Some(PathBuf::from(home).join(".cache").join(APP_DIR))
}

pub fn default_db_path() -> Option<PathBuf> {
    app_cache_dir().map(|dir| dir.join(DB_FILE))
}

fn opt_env(key: &str) -> Option<String> {
    env::var(key).ok().filter(|val| !val.trim().is_empty())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn seed_policy_parses_aliases() {
        assert_eq!(SeedPolicy::parse(" Zeros "), Some(SeedPolicy::SeedZeros));
        assert_eq!(SeedPolicy::parse("empty"), Some(SeedPolicy::LeaveEmpty));
        assert_eq!(SeedPolicy::parse("maybe"), None);
    }
}
