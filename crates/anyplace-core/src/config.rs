//! Worker configuration.
//!
//! Defaults reproduce the deployed Anyplace worker. A JSON file at
//! `~/.config/anyplace/config.json` may override any field, and the
//! `ANYPLACE_*` environment variables override the file.

use std::path::PathBuf;
use std::time::Duration;

use anyhow::{Context, Result};
use reqwest::Url;
use serde::{Deserialize, Serialize};

use crate::error::WorkerError;
use crate::manifest::STATIC_ASSETS;
use crate::route::MAPBOX_PATTERN;

/// Application name used for config/cache directory paths
const APP_NAME: &str = "anyplace";

/// Config file name
const CONFIG_FILE: &str = "config.json";

/// Version-tagged cache name; bumping it orphans the previous cache.
pub const DEFAULT_CACHE_NAME: &str = "Anyplace-V1";

/// Tag carried by periodic and one-shot sync events.
pub const DEFAULT_SYNC_TAG: &str = "ANYPLACE_BACKGROUND_SYNC";

/// Origin the app is served from during development.
pub const DEFAULT_ORIGIN: &str = "http://localhost:8080/";

/// Proxy endpoint serving the timeline document.
pub const DEFAULT_DOCUMENT_ENDPOINT: &str =
    "https://infinite-castle-19858.herokuapp.com/api/getGoogleDoc?docID=1hvpoA2NNjfe8PELZNxWR7mJnNMQ4Sn49";

/// Seconds between periodic syncs when the host drives the timer itself.
/// 12 hours matches the minimum interval browsers grant periodic sync.
const DEFAULT_SYNC_INTERVAL_SECS: u64 = 12 * 60 * 60;

/// HTTP request timeout in seconds.
const DEFAULT_REQUEST_TIMEOUT_SECS: u64 = 30;

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct WorkerConfig {
    pub cache_name: String,
    pub origin: String,
    pub document_endpoint: String,
    pub sync_tag: String,
    pub network_only_patterns: Vec<String>,
    pub manifest: Vec<String>,
    pub sync_interval_secs: u64,
    pub request_timeout_secs: u64,
}

impl Default for WorkerConfig {
    fn default() -> Self {
        Self {
            cache_name: DEFAULT_CACHE_NAME.to_string(),
            origin: DEFAULT_ORIGIN.to_string(),
            document_endpoint: DEFAULT_DOCUMENT_ENDPOINT.to_string(),
            sync_tag: DEFAULT_SYNC_TAG.to_string(),
            network_only_patterns: vec![MAPBOX_PATTERN.to_string()],
            manifest: STATIC_ASSETS.iter().map(|s| s.to_string()).collect(),
            sync_interval_secs: DEFAULT_SYNC_INTERVAL_SECS,
            request_timeout_secs: DEFAULT_REQUEST_TIMEOUT_SECS,
        }
    }
}

impl WorkerConfig {
    /// Load the config file if present, then apply environment overrides.
    pub fn load() -> Result<Self> {
        let path = Self::config_path()?;
        let mut config = if path.exists() {
            let contents = std::fs::read_to_string(&path)
                .with_context(|| format!("Failed to read config file: {}", path.display()))?;
            serde_json::from_str(&contents)
                .with_context(|| format!("Failed to parse config file: {}", path.display()))?
        } else {
            Self::default()
        };
        config.apply_env(|name| std::env::var(name).ok());
        Ok(config)
    }

    pub fn save(&self) -> Result<()> {
        let path = Self::config_path()?;
        if let Some(parent) = path.parent() {
            std::fs::create_dir_all(parent)?;
        }
        let contents = serde_json::to_string_pretty(self)?;
        std::fs::write(path, contents)?;
        Ok(())
    }

    pub fn config_path() -> Result<PathBuf> {
        let config_dir = dirs::config_dir()
            .ok_or_else(|| anyhow::anyhow!("Could not find config directory"))?;
        Ok(config_dir.join(APP_NAME).join(CONFIG_FILE))
    }

    /// Root directory holding one subdirectory per named cache
    pub fn cache_dir(&self) -> Result<PathBuf> {
        let cache_dir = dirs::cache_dir()
            .ok_or_else(|| anyhow::anyhow!("Could not find cache directory"))?;
        Ok(cache_dir.join(APP_NAME))
    }

    pub fn apply_env(&mut self, lookup: impl Fn(&str) -> Option<String>) {
        if let Some(origin) = lookup("ANYPLACE_ORIGIN") {
            self.origin = origin;
        }
        if let Some(endpoint) = lookup("ANYPLACE_DOCUMENT_ENDPOINT") {
            self.document_endpoint = endpoint;
        }
        if let Some(name) = lookup("ANYPLACE_CACHE_NAME") {
            self.cache_name = name;
        }
    }

    pub fn origin_url(&self) -> Result<Url, WorkerError> {
        Url::parse(&self.origin)
            .map_err(|e| WorkerError::Config(format!("origin {:?}: {}", self.origin, e)))
    }

    pub fn document_url(&self) -> Result<Url, WorkerError> {
        Url::parse(&self.document_endpoint).map_err(|e| {
            WorkerError::Config(format!("document endpoint {:?}: {}", self.document_endpoint, e))
        })
    }

    pub fn request_timeout(&self) -> Duration {
        Duration::from_secs(self.request_timeout_secs)
    }

    pub fn sync_interval(&self) -> Duration {
        Duration::from_secs(self.sync_interval_secs)
    }
}
