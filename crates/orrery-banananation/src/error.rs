//! Error types for the `orrery-banananation` crate.

use orrery_engine::InstantiationError;
use orrery_resources::ResourceError;

/// Errors that can occur while building the mission model.
#[derive(Debug, thiserror::Error)]
pub enum BananaError {
    /// An activity type could not be registered.
    #[error("activity registration failed: {source}")]
    Registration {
        /// The underlying registration error.
        #[from]
        source: InstantiationError,
    },

    /// The configured black-box sampling bounds were rejected.
    #[error("invalid sampling configuration: {source}")]
    Sampling {
        /// The underlying resource error.
        #[from]
        source: ResourceError,
    },
}
