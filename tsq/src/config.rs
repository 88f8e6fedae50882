//! Configuration management for tsq
//!
//! Default config location: ~/.tsq/config.toml

use serde::{Deserialize, Serialize};
use std::fs;
use std::path::{Path, PathBuf};

use crate::error::{Error, Result};

/// Main configuration
#[derive(Debug, Clone, Deserialize, Serialize)]
pub struct Config {
    #[serde(default)]
    pub backend: BackendConfig,
    /// Available rollups, finest first after [`Config::validate`]
    #[serde(default = "default_rollups")]
    pub rollups: Vec<RollupConfig>,
    #[serde(default)]
    pub logging: LoggingConfig,
}

impl Default for Config {
    fn default() -> Self {
        Self {
            backend: BackendConfig::default(),
            rollups: default_rollups(),
            logging: LoggingConfig::default(),
        }
    }
}

#[derive(Debug, Clone, Deserialize, Serialize)]
pub struct BackendConfig {
    /// Base URL of the query backend
    #[serde(default = "default_backend_url")]
    pub url: String,
    #[serde(default = "default_query_path")]
    pub query_path: String,
    /// Request timeout in seconds
    #[serde(default = "default_timeout_secs")]
    pub timeout_secs: u64,
}

fn default_backend_url() -> String {
    "http://localhost:5000".to_string()
}

fn default_query_path() -> String {
    "/query".to_string()
}

fn default_timeout_secs() -> u64 {
    30
}

impl Default for BackendConfig {
    fn default() -> Self {
        Self {
            url: default_backend_url(),
            query_path: default_query_path(),
            timeout_secs: default_timeout_secs(),
        }
    }
}

impl BackendConfig {
    /// Full URL of the query endpoint
    pub fn query_url(&self) -> String {
        format!(
            "{}/{}",
            self.url.trim_end_matches('/'),
            self.query_path.trim_start_matches('/')
        )
    }
}

/// A bucket width and how many buckets of it are retained
#[derive(Debug, Clone, Copy, PartialEq, Eq, Deserialize, Serialize)]
pub struct RollupConfig {
    pub seconds: u64,
    pub buckets: u64,
}

fn default_rollups() -> Vec<RollupConfig> {
    vec![
        RollupConfig {
            seconds: 10,
            buckets: 360,
        },
        RollupConfig {
            seconds: 3600,
            buckets: 24 * 7,
        },
    ]
}

#[derive(Debug, Clone, Deserialize, Serialize)]
pub struct LoggingConfig {
    /// Log level filter string
    /// Override with RUST_LOG env var
    #[serde(default = "default_level")]
    pub level: String,
    /// Log output format: "pretty" or "json"
    /// Override with LOG_FORMAT env var
    #[serde(default = "default_format")]
    pub format: String,
}

fn default_level() -> String {
    "info".to_string()
}

fn default_format() -> String {
    "pretty".to_string()
}

impl Default for LoggingConfig {
    fn default() -> Self {
        Self {
            level: default_level(),
            format: default_format(),
        }
    }
}

fn default_config_path() -> PathBuf {
    dirs::home_dir()
        .unwrap_or_else(|| PathBuf::from("."))
        .join(".tsq")
        .join("config.toml")
}

pub fn expand_tilde(path: &Path) -> Result<PathBuf> {
    let s = path.to_string_lossy();
    if let Some(rest) = s.strip_prefix("~/") {
        let home = dirs::home_dir()
            .ok_or_else(|| Error::Config("Cannot determine home directory".to_string()))?;
        Ok(home.join(rest))
    } else if s == "~" {
        dirs::home_dir().ok_or_else(|| Error::Config("Cannot determine home directory".to_string()))
    } else {
        Ok(path.to_path_buf())
    }
}

impl Config {
    /// Load config from default location (~/.tsq/config.toml)
    pub fn load() -> Result<Self> {
        Self::load_or_default(&default_config_path())
    }

    /// Load config from file path, falling back to defaults if it is missing
    pub fn load_or_default(path: &Path) -> Result<Self> {
        let path = expand_tilde(path)?;
        if path.exists() {
            let content = fs::read_to_string(&path)?;
            Self::from_toml_str(&content)
        } else {
            tracing::debug!("No config at {:?}, using defaults", path);
            Ok(Config::default())
        }
    }

    pub fn from_toml_str(content: &str) -> Result<Self> {
        let mut config: Config = toml::from_str(content)?;
        config.validate()?;
        Ok(config)
    }

    /// Save config to file
    pub fn save(&self, path: &Path) -> Result<()> {
        let content =
            toml::to_string_pretty(self).map_err(|e| Error::Config(e.to_string()))?;
        if let Some(parent) = path.parent() {
            fs::create_dir_all(parent)?;
        }
        fs::write(path, content)?;
        Ok(())
    }

    /// Check invariants and sort rollups finest first
    pub fn validate(&mut self) -> Result<()> {
        if self.backend.url.trim().is_empty() {
            return Err(Error::Config("backend.url must not be empty".to_string()));
        }
        if self.rollups.is_empty() {
            return Err(Error::Config("at least one rollup is required".to_string()));
        }
        if let Some(bad) = self.rollups.iter().find(|r| r.seconds == 0) {
            return Err(Error::Config(format!(
                "rollup seconds must be positive (buckets: {})",
                bad.buckets
            )));
        }
        self.rollups.sort_by_key(|r| r.seconds);
        Ok(())
    }

    /// Smallest configured bucket width in seconds
    pub fn finest_rollup(&self) -> u64 {
        self.rollups
            .iter()
            .map(|r| r.seconds)
            .min()
            .unwrap_or_else(|| default_rollups()[0].seconds)
    }
}
