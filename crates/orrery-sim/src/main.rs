//! Command-line runner for the Orrery simulation core.
//!
//! Simulates a plan against the banana mission model and prints the
//! results as JSON on standard output. Logs go to standard error.
//!
//! ```text
//! orrery-sim <SCHEDULE> [--config <CONFIG>]
//! ```
//!
//! # Startup Sequence
//!
//! 1. Load configuration from the given path, or `orrery-config.yaml` in
//!    the working directory, or defaults
//! 2. Initialize structured logging (tracing), `RUST_LOG` first, then the
//!    configured level
//! 3. Read the schedule: a JSON object of directive id to
//!    `{"start_offset", "type", "arguments"}`
//! 4. Build the mission model
//! 5. Simulate and print the results

mod error;

use std::io::Write as _;
use std::path::{Path, PathBuf};

use clap::Parser;
use orrery_engine::{Schedule, SimulationConfig, simulate};
use tracing::info;
use tracing_subscriber::EnvFilter;

use crate::error::SimError;

const DEFAULT_CONFIG: &str = "orrery-config.yaml";

#[derive(Parser, Debug)]
#[command(name = "orrery-sim")]
#[command(about = "Simulate a plan against the banana mission model and print the results as JSON")]
struct Args {
    /// Path to the schedule: a JSON object of directive id to
    /// `{"start_offset", "type", "arguments"}`
    schedule: PathBuf,

    /// Path to a YAML configuration file (defaults to `orrery-config.yaml`
    /// in the working directory when present)
    #[arg(long)]
    config: Option<PathBuf>,
}

/// Application entry point.
///
/// # Errors
///
/// Returns an error if the configuration, the schedule, the model, or the
/// simulation fails.
fn main() -> Result<(), Box<dyn std::error::Error>> {
    let args = Args::parse();

    // 1. Load configuration.
    let config = load_config(args.config.as_deref())?;

    // 2. Initialize structured logging.
    tracing_subscriber::fmt()
        .with_env_filter(
            EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(&config.logging.level)),
        )
        .with_writer(std::io::stderr)
        .with_target(true)
        .init();

    info!(
        duration = %config.simulation.duration,
        sampling_period = %config.simulation.sampling_period,
        start_time = %config.simulation.start_time,
        "orrery-sim starting"
    );

    // 3. Read the schedule.
    let schedule = load_schedule(&args.schedule)?;
    info!(path = %args.schedule.display(), activities = schedule.len(), "Schedule loaded");

    // 4. Build the mission model.
    let model = orrery_banananation::build(config.secant).map_err(SimError::from)?;

    // 5. Simulate.
    let results = simulate(
        model,
        &schedule,
        config.simulation.start_time,
        config.simulation.duration,
        config.simulation.sampling_period,
    )
    .map_err(SimError::from)?;

    let mut out = std::io::stdout().lock();
    serde_json::to_writer_pretty(&mut out, &results).map_err(SimError::from)?;
    writeln!(out)?;

    info!(
        simulated = results.simulated_activities.len(),
        violations = results.constraint_violations.len(),
        "orrery-sim finished"
    );
    Ok(())
}

/// Load configuration from `path`, falling back to `orrery-config.yaml`
/// and then to defaults.
fn load_config(path: Option<&Path>) -> Result<SimulationConfig, SimError> {
    if let Some(path) = path {
        return Ok(SimulationConfig::from_file(path)?);
    }
    let default_path = Path::new(DEFAULT_CONFIG);
    if default_path.exists() {
        Ok(SimulationConfig::from_file(default_path)?)
    } else {
        Ok(SimulationConfig::parse("{}")?)
    }
}

/// Read and parse the plan at `path`.
fn load_schedule(path: &Path) -> Result<Schedule, SimError> {
    let contents = std::fs::read_to_string(path).map_err(|source| SimError::ReadSchedule {
        path: path.to_path_buf(),
        source,
    })?;
    serde_json::from_str(&contents).map_err(|source| SimError::ParseSchedule {
        path: path.to_path_buf(),
        source,
    })
}
