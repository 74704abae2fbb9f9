//! Error types for the simulation runner binary.
//!
//! [`SimError`] wraps every failure mode of a run so that `main` can
//! propagate with `?`.

use std::path::PathBuf;

/// Top-level error for the runner.
#[derive(Debug, thiserror::Error)]
pub enum SimError {
    /// Configuration loading failed.
    #[error("config error: {source}")]
    Config {
        /// The underlying config error.
        #[from]
        source: orrery_engine::ConfigError,
    },

    /// The schedule file could not be read.
    #[error("failed to read schedule {}: {source}", .path.display())]
    ReadSchedule {
        /// The schedule path.
        path: PathBuf,
        /// The underlying I/O error.
        source: std::io::Error,
    },

    /// The schedule file is not a valid plan.
    #[error("failed to parse schedule {}: {source}", .path.display())]
    ParseSchedule {
        /// The schedule path.
        path: PathBuf,
        /// The underlying JSON error.
        source: serde_json::Error,
    },

    /// The mission model could not be built.
    #[error("model error: {source}")]
    Model {
        /// The underlying model error.
        #[from]
        source: orrery_banananation::BananaError,
    },

    /// The simulation itself failed.
    #[error("simulation error: {source}")]
    Simulation {
        /// The underlying simulation error.
        #[from]
        source: orrery_engine::SimulationError,
    },

    /// The results could not be written.
    #[error("failed to write results: {source}")]
    Output {
        /// The underlying JSON error.
        #[from]
        source: serde_json::Error,
    },
}
