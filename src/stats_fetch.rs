use std::sync::Arc;

use reqwest::StatusCode;
use reqwest::blocking::Client;
use serde_json::Value;
use thiserror::Error;
use tracing::{debug, warn};

use crate::config::StatsApiConfig;
use crate::fetch_cache::{FetchCache, UnboundedCache};
use crate::http_client::http_client;
use crate::normalize::ProviderRecord;

#[derive(Debug, Error)]
pub enum FetchError {
    #[error("stats api key is not set")]
    MissingApiKey,
    #[error("stats request failed: {0}")]
    Transport(#[from] reqwest::Error),
    #[error("stats api returned http {status}")]
    Status { status: u16 },
    #[error("invalid json from stats api: {0}")]
    MalformedBody(#[from] serde_json::Error),
    #[error("no candidates for {name:?}")]
    NoCandidates { name: String },
}

/// A single search against the statistics provider.
pub trait StatsLookup: Send + Sync {
    fn lookup(&self, name: &str) -> Result<ProviderRecord, FetchError>;
}

/// RapidAPI `mma-stats` search endpoint.
pub struct RapidApiLookup {
    client: &'static Client,
    url: String,
    host: String,
    api_key: Option<String>,
}

impl RapidApiLookup {
    pub fn from_config(cfg: &StatsApiConfig) -> anyhow::Result<Self> {
        Ok(Self {
            client: http_client(cfg.timeout_secs)?,
            url: cfg.url.clone(),
            host: cfg.host.clone(),
            api_key: cfg.api_key.clone(),
        })
    }
}

impl StatsLookup for RapidApiLookup {
    fn lookup(&self, name: &str) -> Result<ProviderRecord, FetchError> {
        let api_key = self.api_key.as_deref().ok_or(FetchError::MissingApiKey)?;
        let resp = self
            .client
            .get(&self.url)
            .query(&[("name", name.trim())])
            .header("x-rapidapi-key", api_key)
            .header("x-rapidapi-host", &self.host)
            .send()?;
        let status = resp.status();
        if status != StatusCode::OK {
            return Err(FetchError::Status {
                status: status.as_u16(),
            });
        }
        let body = resp.text()?;
        parse_search_response(name, &body)
    }
}

/// Picks the first candidate out of a search response. There is no
/// disambiguation between fighters sharing a name.
pub fn parse_search_response(name: &str, body: &str) -> Result<ProviderRecord, FetchError> {
    let value = serde_json::from_str::<Value>(body.trim())?;
    let first = value
        .as_array()
        .and_then(|arr| arr.first())
        .ok_or_else(|| FetchError::NoCandidates {
            name: name.to_string(),
        })?;
    Ok(serde_json::from_value::<ProviderRecord>(first.clone())?)
}

/// Memoizing front for a [`StatsLookup`]. Failures are not cached, so a
/// later call may succeed.
pub struct FeatureFetcher<L> {
    lookup: L,
    cache: Arc<dyn FetchCache>,
}

impl<L: StatsLookup> FeatureFetcher<L> {
    pub fn new(lookup: L) -> Self {
        Self::with_cache(lookup, Arc::new(UnboundedCache::new()))
    }

    pub fn with_cache(lookup: L, cache: Arc<dyn FetchCache>) -> Self {
        Self { lookup, cache }
    }

    pub fn try_fetch(&self, name: &str) -> Result<ProviderRecord, FetchError> {
        if let Some(hit) = self.cache.get(name) {
            debug!(fighter = name, "stats cache hit");
            return Ok(hit);
        }
        // Two threads missing on the same name both go to the network; the
        // second put just overwrites an equal record.
        let record = self.lookup.lookup(name)?;
        self.cache.put(name, record.clone());
        Ok(record)
    }

    /// Like [`try_fetch`](Self::try_fetch) but absorbs the failure.
    pub fn fetch(&self, name: &str) -> Option<ProviderRecord> {
        match self.try_fetch(name) {
            Ok(record) => Some(record),
            Err(err) => {
                warn!(fighter = name, error = %err, "could not fetch external stats");
                None
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn empty_array_has_no_candidates() {
        let err = parse_search_response("Nobody", "[]").unwrap_err();
        assert!(matches!(err, FetchError::NoCandidates { .. }));
    }

    #[test]
    fn object_body_has_no_candidates() {
        let err = parse_search_response("Nobody", r#"{"message":"nope"}"#).unwrap_err();
        assert!(matches!(err, FetchError::NoCandidates { .. }));
    }

    #[test]
    fn garbage_body_is_malformed() {
        let err = parse_search_response("x", "<html>").unwrap_err();
        assert!(matches!(err, FetchError::MalformedBody(_)));
    }

    #[test]
    fn non_object_records_is_malformed() {
        let err = parse_search_response("x", r#"[{"Records": "n/a"}]"#).unwrap_err();
        assert!(matches!(err, FetchError::MalformedBody(_)));
    }

    #[test]
    fn missing_key_fails_before_network() {
        let lookup = RapidApiLookup {
            client: http_client(1).expect("client builds"),
            url: "http://127.0.0.1:9/search".to_string(),
            host: "localhost".to_string(),
            api_key: None,
        };
        assert!(matches!(
            lookup.lookup("Anyone"),
            Err(FetchError::MissingApiKey)
        ));
    }
}
