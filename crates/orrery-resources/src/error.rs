//! Error types for the `orrery-resources` crate.

use orrery_timeline::TimelineError;

/// Errors that can occur while evaluating resources and conditions.
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum ResourceError {
    /// Reading a cell failed.
    #[error("timeline query failed: {source}")]
    Timeline {
        /// The underlying timeline error.
        #[from]
        source: TimelineError,
    },

    /// A secant sampling configuration is unusable.
    #[error("invalid secant configuration: {reason}")]
    InvalidSecantConfig {
        /// Explanation of what is wrong with the configuration.
        reason: String,
    },
}
