//! Configuration for the generation engine.
//!
//! Every field has a default, so an empty TOML document is a valid config.
//! Semantic checks (trigger time, offset range) happen in `AppBuilder::build`.

use std::path::{Path, PathBuf};

use chrono::{FixedOffset, NaiveTime};
use serde::{Deserialize, Serialize};
use thiserror::Error;

#[derive(Debug, Error)]
pub enum ConfigError {
    #[error("failed to read config {path}: {source}")]
    Io {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    #[error("invalid config: {0}")]
    Parse(#[from] toml::de::Error),
}

/// Top-level configuration.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct QuestifyConfig {
    pub scheduler: SchedulerConfig,
    pub logging: LoggingConfig,
}

/// Daily trigger and batch window.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct SchedulerConfig {
    /// Local hour of the daily run (0-23).
    pub trigger_hour: u32,
    pub trigger_minute: u32,
    /// Offset of the trigger's local time from UTC, in minutes.
    pub utc_offset_minutes: i32,
    /// Days generated after today by the manual "upcoming" run.
    pub lookahead_days: u32,
}

impl Default for SchedulerConfig {
    fn default() -> Self {
        Self {
            trigger_hour: 18,
            trigger_minute: 0,
            utc_offset_minutes: 0,
            lookahead_days: 6,
        }
    }
}

impl SchedulerConfig {
    /// `None` when hour/minute are out of range.
    pub fn trigger_time(&self) -> Option<NaiveTime> {
        NaiveTime::from_hms_opt(self.trigger_hour, self.trigger_minute, 0)
    }

    /// `None` when the offset is not within ±24h.
    pub fn utc_offset(&self) -> Option<FixedOffset> {
        FixedOffset::east_opt(self.utc_offset_minutes.checked_mul(60)?)
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct LoggingConfig {
    /// `tracing_subscriber::EnvFilter` directive, e.g. `"info,questify_core=debug"`.
    /// `RUST_LOG` takes precedence when set.
    pub filter: String,
}

impl Default for LoggingConfig {
    fn default() -> Self {
        Self {
            filter: "info".to_string(),
        }
    }
}

impl QuestifyConfig {
    pub fn from_toml_str(content: &str) -> Result<Self, ConfigError> {
        Ok(toml::from_str(content)?)
    }

    /// Load configuration from a TOML file, falling back to defaults for missing fields.
    pub fn load(path: &Path) -> Result<Self, ConfigError> {
        let content = std::fs::read_to_string(path).map_err(|source| ConfigError::Io {
            path: path.to_path_buf(),
            source,
        })?;
        Self::from_toml_str(&content)
    }
}
