//! Pesto - Settings
//!
//! Service settings: defaults, an optional TOML file, then environment overrides

use std::fs;
use std::net::SocketAddr;
use std::path::{Path, PathBuf};
use std::time::Duration;

use serde::{Deserialize, Serialize};

/// Environment variable naming the settings file
pub const CONFIG_PATH_ENV: &str = "PESTO_CONFIG";

/// Configuration error type
#[derive(Debug, thiserror::Error)]
pub enum ConfigError {
    #[error("Failed to read settings file {path:?}: {source}")]
    Read {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },
    #[error("Invalid settings file: {0}")]
    Parse(#[from] toml::de::Error),
    #[error("Invalid value {value:?} for {key}: {reason}")]
    Env {
        key: &'static str,
        value: String,
        reason: String,
    },
}

/// History size limit
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum StorageLimit {
    /// Keep at most this many items
    Items(usize),
    /// Unlimited
    #[default]
    Unlimited,
}

// Custom serialization: serialize as numeric value
impl Serialize for StorageLimit {
    fn serialize<S>(&self, serializer: S) -> Result<S::Ok, S::Error>
    where
        S: serde::Serializer,
    {
        serializer.serialize_i64(self.as_i64())
    }
}

// Custom deserialization: deserialize from numeric value
impl<'de> Deserialize<'de> for StorageLimit {
    fn deserialize<D>(deserializer: D) -> Result<Self, D::Error>
    where
        D: serde::Deserializer<'de>,
    {
        let value = i64::deserialize(deserializer)?;
        Ok(StorageLimit::from_i64(value))
    }
}

impl StorageLimit {
    /// Get numeric value (-1 means unlimited)
    pub fn as_i64(&self) -> i64 {
        match self {
            StorageLimit::Items(n) => i64::try_from(*n).unwrap_or(i64::MAX),
            StorageLimit::Unlimited => -1,
        }
    }

    /// Create from numeric value; zero and negatives mean unlimited
    pub fn from_i64(value: i64) -> Self {
        match usize::try_from(value) {
            Ok(n) if n > 0 => StorageLimit::Items(n),
            _ => StorageLimit::Unlimited,
        }
    }

    /// Maximum number of items to keep, if limited
    pub fn max_items(&self) -> Option<usize> {
        match self {
            StorageLimit::Items(n) => Some(*n),
            StorageLimit::Unlimited => None,
        }
    }
}

/// What Create does when demoting the previous current item fails
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum DemotionPolicy {
    /// Fail the create; nothing is inserted
    #[default]
    Strict,
    /// Log a warning and insert anyway
    BestEffort,
}

impl DemotionPolicy {
    pub fn from_str(s: &str) -> Option<Self> {
        match s {
            "strict" => Some(DemotionPolicy::Strict),
            "best_effort" => Some(DemotionPolicy::BestEffort),
            _ => None,
        }
    }
}

/// Service settings
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct Settings {
    /// HTTP listen address
    pub bind_addr: SocketAddr,
    /// Directory holding the database file
    pub data_dir: PathBuf,
    /// History size limit
    pub storage_limit: StorageLimit,
    /// Skip creates that repeat the current item
    pub ignore_duplicates: bool,
    /// Demotion failure handling
    pub demotion: DemotionPolicy,
    /// Per-request deadline in milliseconds
    pub request_timeout_ms: u64,
}

impl Default for Settings {
    fn default() -> Self {
        Self {
            bind_addr: SocketAddr::from(([127, 0, 0, 1], 8080)),
            data_dir: default_data_dir(),
            storage_limit: StorageLimit::Unlimited,
            ignore_duplicates: false,
            demotion: DemotionPolicy::Strict,
            request_timeout_ms: 5000,
        }
    }
}

/// Platform data directory, falling back to the working directory
fn default_data_dir() -> PathBuf {
    dirs::data_dir()
        .unwrap_or_else(|| PathBuf::from("."))
        .join("pesto")
}

impl Settings {
    /// Load settings from an optional file, then apply process environment overrides
    pub fn load(path: Option<&Path>) -> Result<Self, ConfigError> {
        let mut settings = match path {
            Some(path) => Self::from_file(path)?,
            None => Settings::default(),
        };
        settings.apply_env(|key| std::env::var(key).ok())?;
        Ok(settings)
    }

    /// Parse a TOML settings file; missing keys keep their defaults
    pub fn from_file(path: &Path) -> Result<Self, ConfigError> {
        log::info!("Loading settings from: {:?}", path);
        let text = fs::read_to_string(path).map_err(|source| ConfigError::Read {
            path: path.to_path_buf(),
            source,
        })?;
        Self::from_toml(&text)
    }

    pub fn from_toml(text: &str) -> Result<Self, ConfigError> {
        Ok(toml::from_str(text)?)
    }

    /// Override fields from `PESTO_*` variables found through `lookup`
    pub fn apply_env<F>(&mut self, lookup: F) -> Result<(), ConfigError>
    where
        F: Fn(&str) -> Option<String>,
    {
        if let Some(value) = lookup("PESTO_BIND_ADDR") {
            self.bind_addr = parse_env("PESTO_BIND_ADDR", value)?;
        }
        if let Some(value) = lookup("PESTO_DATA_DIR") {
            self.data_dir = PathBuf::from(value);
        }
        if let Some(value) = lookup("PESTO_STORAGE_LIMIT") {
            self.storage_limit = StorageLimit::from_i64(parse_env("PESTO_STORAGE_LIMIT", value)?);
        }
        if let Some(value) = lookup("PESTO_IGNORE_DUPLICATES") {
            self.ignore_duplicates = parse_env("PESTO_IGNORE_DUPLICATES", value)?;
        }
        if let Some(value) = lookup("PESTO_DEMOTION") {
            self.demotion = DemotionPolicy::from_str(&value).ok_or_else(|| ConfigError::Env {
                key: "PESTO_DEMOTION",
                reason: "expected strict or best_effort".to_string(),
                value,
            })?;
        }
        if let Some(value) = lookup("PESTO_REQUEST_TIMEOUT_MS") {
            self.request_timeout_ms = parse_env("PESTO_REQUEST_TIMEOUT_MS", value)?;
        }
        Ok(())
    }

    /// Per-request deadline
    pub fn request_timeout(&self) -> Duration {
        Duration::from_millis(self.request_timeout_ms)
    }
}

fn parse_env<T>(key: &'static str, value: String) -> Result<T, ConfigError>
where
    T: std::str::FromStr,
    T::Err: std::fmt::Display,
{
    let parsed = value.trim().parse::<T>();
    parsed.map_err(|e| ConfigError::Env {
        key,
        reason: e.to_string(),
        value,
    })
}
