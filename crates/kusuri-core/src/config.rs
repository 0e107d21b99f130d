//! Pipeline configuration: feed endpoints, freshness windows, HTTP settings.
//!
//! Every field has a default, so an empty JSON object (or no file at all)
//! yields a working configuration.

use std::path::{Path, PathBuf};

use serde::{Deserialize, Serialize};

pub const DEFAULT_SHORTAGE_URL: &str = "https://docs.google.com/spreadsheets/d/1ZyjtfiRjGoV9xHSA5Go4rJZr281gqfMFW883Y7s9mQU/gviz/tq?tqx=out:csv";
pub const DEFAULT_INCIDENT_URL: &str = "https://hiyari-proxy-708146219355.asia-east1.run.app/proxy";
pub const DEFAULT_POLLEN_URL: &str = "https://wxtech.weathernews.com/opendata/v1/pollen";

const HOUR_MS: u64 = 3_600_000;

#[derive(Debug, thiserror::Error)]
pub enum ConfigError {
    #[error("reading config {path}: {source}")]
    Io {
        path: PathBuf,
        source: std::io::Error,
    },
    #[error("invalid config {path}: {source}")]
    Json {
        path: PathBuf,
        source: serde_json::Error,
    },
}

/// Where a feed lives and how long a fetched copy stays fresh.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct FeedSource {
    /// Endpoint URL. Empty means the feed is not configured.
    #[serde(default)]
    pub url: String,
    pub freshness_ms: u64,
}

impl FeedSource {
    pub fn new(url: impl Into<String>, freshness_ms: u64) -> Self {
        Self {
            url: url.into(),
            freshness_ms,
        }
    }

    pub fn is_configured(&self) -> bool {
        !self.url.trim().is_empty()
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct PipelineConfig {
    pub cache_dir: PathBuf,
    pub request_timeout_secs: u64,
    pub user_agent: String,
    /// Append a `cb=<epoch ms>` parameter to defeat intermediary caches.
    pub cache_bust: bool,
    pub shortage: FeedSource,
    pub incidents: FeedSource,
    pub surveillance: FeedSource,
    pub pollen: FeedSource,
}

impl Default for PipelineConfig {
    fn default() -> Self {
        Self {
            cache_dir: PathBuf::from(".kusuri-cache"),
            request_timeout_secs: 30,
            user_agent: concat!("kusuri/", env!("CARGO_PKG_VERSION")).to_string(),
            cache_bust: true,
            shortage: FeedSource::new(DEFAULT_SHORTAGE_URL, HOUR_MS),
            incidents: FeedSource::new(DEFAULT_INCIDENT_URL, HOUR_MS),
            // The surveillance export has no stable public URL; set it in the config file.
            surveillance: FeedSource::new("", HOUR_MS / 2),
            pollen: FeedSource::new(DEFAULT_POLLEN_URL, HOUR_MS / 6),
        }
    }
}

impl PipelineConfig {
    /// Load from a JSON file. Missing keys take their defaults.
    pub fn from_json_file(path: &Path) -> Result<Self, ConfigError> {
        let text = std::fs::read_to_string(path).map_err(|source| ConfigError::Io {
            path: path.to_path_buf(),
            source,
        })?;
        serde_json::from_str(&text).map_err(|source| ConfigError::Json {
            path: path.to_path_buf(),
            source,
        })
    }
}
