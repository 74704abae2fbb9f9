//! Configuration loading for simulation runs.
//!
//! Runs are configured from a YAML file whose sections mirror the structs
//! below. Every field has a default, so an empty file is a valid
//! configuration. Durations are written in the `HH:MM:SS[.ffffff]` form.
//!
//! Environment variable overrides:
//! - `ORRERY_LOG_LEVEL` overrides `logging.level`

use std::path::Path;

use chrono::{DateTime, Utc};
use orrery_resources::SecantConfig;
use orrery_types::Duration;
use serde::Deserialize;

/// Errors that can occur when loading configuration.
#[derive(Debug, thiserror::Error)]
pub enum ConfigError {
    /// Failed to read the configuration file from disk.
    #[error("failed to read config file: {source}")]
    Io {
        /// The underlying I/O error.
        #[from]
        source: std::io::Error,
    },

    /// Failed to parse YAML content.
    #[error("failed to parse config YAML: {source}")]
    Yaml {
        /// The underlying YAML parse error.
        source: serde_yml::Error,
    },
}

impl From<serde_yml::Error> for ConfigError {
    fn from(source: serde_yml::Error) -> Self {
        Self::Yaml { source }
    }
}

/// Top-level configuration of a run.
#[derive(Debug, Clone, Default, PartialEq, Deserialize)]
pub struct SimulationConfig {
    /// Plan length, sampling, and start time.
    #[serde(default)]
    pub simulation: RunConfig,

    /// Bounds for adaptive sampling of black-box resources.
    #[serde(default)]
    pub secant: SecantConfig,

    /// Logging configuration.
    #[serde(default)]
    pub logging: LoggingConfig,
}

impl SimulationConfig {
    /// Load configuration from a YAML file at the given path.
    ///
    /// After parsing, environment variable overrides are applied.
    pub fn from_file(path: &Path) -> Result<Self, ConfigError> {
        let contents = std::fs::read_to_string(path)?;
        Self::parse(&contents)
    }

    /// Parse configuration from a YAML string, then apply environment
    /// variable overrides.
    pub fn parse(yaml: &str) -> Result<Self, ConfigError> {
        let mut config: Self = serde_yml::from_str(yaml)?;
        config.logging.apply_env_overrides();
        Ok(config)
    }
}

/// Plan length, sampling, and start time.
#[derive(Debug, Clone, PartialEq, Eq, Deserialize)]
pub struct RunConfig {
    /// Length of the simulated plan.
    #[serde(default = "default_duration", with = "orrery_types::duration::text")]
    pub duration: Duration,

    /// Interval between resource samples.
    #[serde(default = "default_sampling_period", with = "orrery_types::duration::text")]
    pub sampling_period: Duration,

    /// Wall-clock time of offset zero (RFC 3339).
    #[serde(default = "default_start_time")]
    pub start_time: DateTime<Utc>,
}

impl Default for RunConfig {
    fn default() -> Self {
        Self {
            duration: default_duration(),
            sampling_period: default_sampling_period(),
            start_time: default_start_time(),
        }
    }
}

/// Logging configuration.
#[derive(Debug, Clone, PartialEq, Eq, Deserialize)]
pub struct LoggingConfig {
    /// Log level (trace, debug, info, warn, error).
    #[serde(default = "default_log_level")]
    pub level: String,
}

impl LoggingConfig {
    /// Override the level with `ORRERY_LOG_LEVEL` when set.
    pub fn apply_env_overrides(&mut self) {
        if let Ok(val) = std::env::var("ORRERY_LOG_LEVEL") {
            self.level = val;
        }
    }
}

impl Default for LoggingConfig {
    fn default() -> Self {
        Self {
            level: default_log_level(),
        }
    }
}

const fn default_duration() -> Duration {
    Duration::DAY
}

const fn default_sampling_period() -> Duration {
    Duration::HOUR
}

const fn default_start_time() -> DateTime<Utc> {
    DateTime::UNIX_EPOCH
}

fn default_log_level() -> String {
    "info".to_owned()
}
