//! Type-safe configuration loader using the `config` crate,
//! with manual environment-variable overrides for core settings.

use std::path::{Path, PathBuf};
use std::{env, time::Duration};

use config::{Config, ConfigError, File};
use serde::Deserialize;

/// Top-level application settings loaded from `Config.toml`
/// and then overridden (where applicable) by environment variables.
#[derive(Debug, Deserialize, Clone)]
pub struct Settings {
    /// Root of the markdown content tree
    pub content_dir: PathBuf,

    /// Directory holding the dataset databases
    pub dataset_root: PathBuf,

    /// Database (directory) under `dataset_root`
    pub database: String,

    /// Table the ingestion routine appends to
    pub table: String,

    /// End-of-day quotes endpoint
    pub source_endpoint: String,

    /// Keys fetched on every run, one record each
    pub tracked_keys: Vec<String>,

    /// Interval between in-process triggers (e.g. "1d", "30m")
    #[serde(with = "humantime_serde")]
    pub ingest_interval: Duration,

    /// Execution deadline for a single run
    #[serde(with = "humantime_serde")]
    pub run_timeout: Duration,

    /// Timeout for one upstream HTTP request
    #[serde(with = "humantime_serde")]
    pub request_timeout: Duration,

    /// HTTP bind address for metrics & health endpoints
    pub server_bind: String,
}

impl Settings {
    /// Load settings from `Config.toml` in the working directory (if present).
    pub fn new() -> Result<Self, ConfigError> {
        Self::load(None)
    }

    /// Load defaults, then `path` (or `Config.*` when `None`), then apply any
    /// overrides from these environment variables:
    ///
    /// - `APP__CONTENT_DIR`
    /// - `APP__DATASET_ROOT`
    /// - `APP__SOURCE_ENDPOINT`
    /// - `APP__INGEST_INTERVAL`
    /// - `APP__SERVER_BIND`
    pub fn load(path: Option<&Path>) -> Result<Self, ConfigError> {
        let file = match path {
            Some(p) => File::from(p).required(true),
            None => File::with_name("Config").required(false),
        };

        // 1) Defaults, then the file
        let cfg = Config::builder()
            .set_default("content_dir", "content")?
            .set_default("dataset_root", "data")?
            .set_default("database", "finance")?
            .set_default("table", "market_tracker")?
            .set_default("source_endpoint", "http://127.0.0.1:8081/v1/eod")?
            .set_default("tracked_keys", vec!["AAPL", "MSFT", "TSLA"])?
            .set_default("ingest_interval", "1d")?
            .set_default("run_timeout", "5m")?
            .set_default("request_timeout", "30s")?
            .set_default("server_bind", "0.0.0.0:9100")?
            .add_source(file)
            .build()?;

        let mut settings: Settings = cfg.try_deserialize()?;

        // 2) Manual overrides for core settings
        if let Ok(val) = env::var("APP__CONTENT_DIR") {
            settings.content_dir = PathBuf::from(val);
        }
        if let Ok(val) = env::var("APP__DATASET_ROOT") {
            settings.dataset_root = PathBuf::from(val);
        }
        if let Ok(val) = env::var("APP__SOURCE_ENDPOINT") {
            settings.source_endpoint = val;
        }
        if let Ok(val) = env::var("APP__INGEST_INTERVAL") {
            settings.ingest_interval = humantime::parse_duration(&val)
                .map_err(|e| ConfigError::Foreign(Box::new(e)))?;
        }
        if let Ok(val) = env::var("APP__SERVER_BIND") {
            settings.server_bind = val;
        }

        Ok(settings)
    }
}
