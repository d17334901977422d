use std::fmt;
use std::fs;
use std::path::{Path, PathBuf};
use std::time::Duration;

use chrono::{DateTime, Utc};
use serde::de::DeserializeOwned;
use serde::{Deserialize, Serialize};
use serde_json::Value;
use thiserror::Error;

use crate::utils::datetime::{parse_datetime, DateTimeError};

/// Default Ringover API base URL.
pub const API_ENDPOINT: &str = "https://public-api.ringover.com/v2";

/// Keys that must be present in the configuration file.
pub const REQUIRED_CONFIG_KEYS: [&str; 2] = ["start_date", "api_key"];

#[derive(Debug, Error)]
pub enum ConfigError {
    #[error("I/O error reading {path}: {source}")]
    IoError {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    #[error("Invalid JSON in {path}: {source}")]
    JsonError {
        path: PathBuf,
        #[source]
        source: serde_json::Error,
    },

    #[error("Config is missing required keys: {0:?}")]
    MissingKeys(Vec<String>),

    #[error("Config value start_date is not a valid timestamp: {0}")]
    InvalidStartDate(#[from] DateTimeError),
}

fn default_user_agent() -> String {
    format!("tap-ringover/{}", env!("CARGO_PKG_VERSION"))
}

fn default_base_url() -> String {
    API_ENDPOINT.to_string()
}

#[derive(Debug, Deserialize, Serialize, Clone)]
pub struct TapConfig {
    pub start_date: String,
    pub api_key: String,
    #[serde(rename = "user-agent", default = "default_user_agent")]
    pub user_agent: String,
    #[serde(default = "default_base_url")]
    pub base_url: String,
    #[serde(default)]
    pub request_timeout_secs: Option<u64>,
    #[serde(default)]
    pub log_level: Option<String>,
    #[serde(default)]
    pub log_dir: Option<PathBuf>,
}

impl TapConfig {
    /// Builds a config from an already-parsed JSON document.
    ///
    /// Every missing required key is reported at once, and `start_date` must parse.
    pub fn from_value(value: Value) -> Result<Self, ConfigError> {
        let missing: Vec<String> = REQUIRED_CONFIG_KEYS
            .iter()
            .filter(|k| value.get(**k).map_or(true, Value::is_null))
            .map(|k| k.to_string())
            .collect();
        if !missing.is_empty() {
            return Err(ConfigError::MissingKeys(missing));
        }

        let config: TapConfig = serde_json::from_value(value).map_err(|e| ConfigError::JsonError {
            path: PathBuf::from("<config>"),
            source: e,
        })?;
        config.start_datetime()?;
        Ok(config)
    }

    /// Reads and validates the configuration file at `path`.
    pub fn load(path: &Path) -> Result<Self, ConfigError> {
        let value: Value = load_json_file(path)?;
        Self::from_value(value)
    }

    /// The configured `start_date` as a UTC timestamp.
    pub fn start_datetime(&self) -> Result<DateTime<Utc>, ConfigError> {
        Ok(parse_datetime(&self.start_date)?)
    }

    /// Per-request timeout, when configured.
    pub fn request_timeout(&self) -> Option<Duration> {
        self.request_timeout_secs.map(Duration::from_secs)
    }
}

impl fmt::Display for TapConfig {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "TapConfig
    Start date: {},
    Base URL: {},
    User agent: {},
    API key: {},
    Request timeout: {:?},
",
            self.start_date,
            self.base_url,
            self.user_agent,
            if self.api_key.is_empty() { "<empty>" } else { "<redacted>" },
            self.request_timeout_secs
        )
    }
}

/// Reads a JSON file into any deserializable type (state, catalog, config).
pub fn load_json_file<T: DeserializeOwned>(path: &Path) -> Result<T, ConfigError> {
    let content = fs::read_to_string(path).map_err(|e| ConfigError::IoError {
        path: path.to_path_buf(),
        source: e,
    })?;
    serde_json::from_str(&content).map_err(|e| ConfigError::JsonError {
        path: path.to_path_buf(),
        source: e,
    })
}
