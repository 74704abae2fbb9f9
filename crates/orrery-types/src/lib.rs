//! Shared type definitions for the Orrery simulation core.
//!
//! This crate holds the leaf types every other crate in the workspace builds
//! on: fixed-point simulated time, closed time windows and their set algebra,
//! and the tagged value representation used for anything that crosses the
//! boundary of the engine (activity arguments, resource samples, events).
//!
//! # Modules
//!
//! - [`duration`] -- Microsecond-resolution [`Duration`] with saturating
//!   arithmetic and `±HH:MM:SS.ffffff` formatting.
//! - [`window`] -- Closed [`Window`] intervals and the canonical
//!   [`Windows`] set decomposition.
//! - [`value`] -- [`SerializedValue`] and [`ValueSchema`].
//! - [`mapper`] -- [`ValueMapper`] implementations that convert typed values
//!   to and from [`SerializedValue`].
//! - [`ids`] -- Sequential identifiers for tasks and activities.

pub mod duration;
pub mod ids;
pub mod mapper;
pub mod value;
pub mod window;

// Re-export primary types at crate root.
pub use duration::{Duration, DurationParseError};
pub use ids::{ActivityDirectiveId, ActivityInstanceId, TaskId};
pub use mapper::{
    BooleanValueMapper, DurationValueMapper, IntValueMapper, ListValueMapper, MapperError,
    RealValueMapper, StringValueMapper, ValueMapper,
};
pub use value::{SerializedValue, ValueSchema, Variant};
pub use window::{Window, Windows};
