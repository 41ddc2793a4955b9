//! Store and query configuration.
//!
//! Loaded from environment variables with defaults matching the capture
//! server's historical layout (`collected_data/request_log.json`, rotation
//! after 1000 records).

use std::env;
use std::path::{Path, PathBuf};

use thiserror::Error;

/// Records kept in the active set before it is rotated into an archive.
pub const DEFAULT_ROTATION_THRESHOLD: usize = 1000;
pub const DEFAULT_DATA_DIR: &str = "collected_data";
pub const ACTIVE_FILE_NAME: &str = "request_log.json";
pub const ARCHIVE_PREFIX: &str = "requests_";

/// Most recent records returned by "list records" when no limit is given.
pub const DEFAULT_LIST_LIMIT: usize = 500;
pub const DEFAULT_TOP_COUNTRIES: usize = 5;
pub const DEFAULT_TOP_CREDENTIALS: usize = 8;
pub const DEFAULT_TIMELINE_HOURS: u32 = 24;
/// One week of hourly buckets.
pub const MAX_TIMELINE_HOURS: u32 = 168;

#[derive(Debug, Error, PartialEq, Eq)]
pub enum ConfigError {
    #[error("{var} must be a positive integer, got {value:?}")]
    InvalidNumber { var: &'static str, value: String },

    #[error("{var} must not be empty")]
    Empty { var: &'static str },
}

/// Where and how the event store persists its files.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct StoreConfig {
    pub data_dir: PathBuf,
    pub active_file_name: String,
    pub archive_prefix: String,
    pub rotation_threshold: usize,
}

impl StoreConfig {
    pub fn new(data_dir: impl Into<PathBuf>) -> Self {
        Self {
            data_dir: data_dir.into(),
            active_file_name: ACTIVE_FILE_NAME.to_string(),
            archive_prefix: ARCHIVE_PREFIX.to_string(),
            rotation_threshold: DEFAULT_ROTATION_THRESHOLD,
        }
    }

    pub fn with_rotation_threshold(mut self, threshold: usize) -> Self {
        self.rotation_threshold = threshold;
        self
    }

    /// Load configuration from environment variables.
    ///
    /// Environment variables:
    /// - `DECOYFLOW_DATA_DIR` (default: collected_data)
    /// - `DECOYFLOW_ROTATION_THRESHOLD` (default: 1000)
    pub fn from_env() -> Result<Self, ConfigError> {
        Self::from_lookup(|key| env::var(key).ok())
    }

    /// Same as [`StoreConfig::from_env`] with an injectable variable source.
    pub fn from_lookup<F>(lookup: F) -> Result<Self, ConfigError>
    where
        F: Fn(&str) -> Option<String>,
    {
        let data_dir = match lookup("DECOYFLOW_DATA_DIR") {
            Some(dir) if dir.trim().is_empty() => {
                return Err(ConfigError::Empty {
                    var: "DECOYFLOW_DATA_DIR",
                })
            }
            Some(dir) => PathBuf::from(dir),
            None => PathBuf::from(DEFAULT_DATA_DIR),
        };

        let rotation_threshold = parse_positive(
            &lookup,
            "DECOYFLOW_ROTATION_THRESHOLD",
            DEFAULT_ROTATION_THRESHOLD,
        )?;

        Ok(Self::new(data_dir).with_rotation_threshold(rotation_threshold))
    }

    pub fn active_path(&self) -> PathBuf {
        self.data_dir.join(&self.active_file_name)
    }

    pub fn archive_path(&self, file_name: &str) -> PathBuf {
        self.data_dir.join(file_name)
    }

    /// Short name used as the `store=` log field.
    pub fn store_name(&self) -> String {
        display_name(&self.data_dir)
    }
}

impl Default for StoreConfig {
    fn default() -> Self {
        Self::new(DEFAULT_DATA_DIR)
    }
}

/// Limits applied by the query surface.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct QueryOptions {
    pub list_limit: usize,
    pub top_countries: usize,
    pub top_credentials: usize,
    pub timeline_hours: u32,
}

impl QueryOptions {
    /// Environment variables:
    /// - `DECOYFLOW_LIST_LIMIT` (default: 500)
    /// - `DECOYFLOW_TIMELINE_HOURS` (default: 24)
    pub fn from_env() -> Result<Self, ConfigError> {
        Self::from_lookup(|key| env::var(key).ok())
    }

    pub fn from_lookup<F>(lookup: F) -> Result<Self, ConfigError>
    where
        F: Fn(&str) -> Option<String>,
    {
        let list_limit = parse_positive(&lookup, "DECOYFLOW_LIST_LIMIT", DEFAULT_LIST_LIMIT)?;
        let timeline_hours = parse_positive(
            &lookup,
            "DECOYFLOW_TIMELINE_HOURS",
            DEFAULT_TIMELINE_HOURS as usize,
        )?;

        let timeline_hours = u32::try_from(timeline_hours)
            .ok()
            .filter(|h| *h <= MAX_TIMELINE_HOURS)
            .ok_or_else(|| ConfigError::InvalidNumber {
                var: "DECOYFLOW_TIMELINE_HOURS",
                value: timeline_hours.to_string(),
            })?;

        Ok(Self {
            list_limit,
            timeline_hours,
            ..Self::default()
        })
    }
}

impl Default for QueryOptions {
    fn default() -> Self {
        Self {
            list_limit: DEFAULT_LIST_LIMIT,
            top_countries: DEFAULT_TOP_COUNTRIES,
            top_credentials: DEFAULT_TOP_CREDENTIALS,
            timeline_hours: DEFAULT_TIMELINE_HOURS,
        }
    }
}

fn parse_positive<F>(lookup: &F, var: &'static str, default: usize) -> Result<usize, ConfigError>
where
    F: Fn(&str) -> Option<String>,
{
    match lookup(var) {
        None => Ok(default),
        Some(raw) => raw
            .trim()
            .parse::<usize>()
            .ok()
            .filter(|n| *n > 0)
            .ok_or(ConfigError::InvalidNumber { var, value: raw }),
    }
}

fn display_name(path: &Path) -> String {
    path.file_name()
        .map(|n| n.to_string_lossy().into_owned())
        .unwrap_or_else(|| path.display().to_string())
}
