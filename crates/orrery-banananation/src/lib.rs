//! Banananation: a small example mission model for the Orrery engine.
//!
//! A bunch of bananas on a plantation. The fruit and the peel are linear
//! quantities, the plants are counted, the current producer is a register,
//! and the sun follows a daily cycle the model only knows as a black box.
//!
//! # Modules
//!
//! - [`mission`] -- cells, topics, exported resources, the photosynthesis
//!   daemon, and the constraints.
//! - [`activities`] -- `BiteBanana`, `PeelBanana`, `GrowBanana`,
//!   `ChangeProducer`, and `ParameterTest`.
//! - [`error`] -- Error types for model construction.
//!
//! Activities are written in all three task styles the engine supports so
//! the model doubles as a usage reference: plain step functions, replaying
//! tasks, and `async` coroutines.

pub mod activities;
pub mod error;
pub mod mission;

use orrery_engine::{Initializer, MissionModel};
use orrery_resources::SecantConfig;
use tracing::info;

pub use error::BananaError;
pub use mission::Mission;

/// Build the complete model, with black-box sampling bounded by `secant`.
pub fn build(secant: SecantConfig) -> Result<MissionModel, BananaError> {
    let mut init = Initializer::with_secant(secant);
    let mission = Mission::register(&mut init)?;
    activities::register_all(&mut init, mission)?;
    info!("Banananation mission model ready");
    Ok(init.build())
}
