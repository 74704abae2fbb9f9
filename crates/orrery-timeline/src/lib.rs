//! Effect algebra, event graphs, and the branching timeline for Orrery.
//!
//! This crate holds everything needed to record what happened during a
//! simulation and to answer "what is the state of this cell here":
//!
//! - [`effect`] -- [`EffectTrait`] and [`Projection`], the algebra that
//!   merges sequential and concurrent effects.
//! - [`graph`] -- [`EventGraph`], the series-parallel record of emitted
//!   events, with evaluation, filtering, and normalized display.
//! - [`flatten`](mod@flatten) -- the `(CausalTime, event)` persistence
//!   encoding of fanout graphs.
//! - [`topic`] -- typed [`Topic`] channels and type-erased [`Event`]s.
//! - [`cell`] -- the [`CellType`] contract and typed [`CellId`] handles.
//! - [`cells`] -- stock registers, counters, and accumulators.
//! - [`timeline`] -- the arena [`Timeline`] and the read-only [`Querier`].

pub mod cell;
pub mod cells;
pub mod effect;
pub mod error;
pub mod flatten;
pub mod graph;
pub mod timeline;
pub mod topic;

pub use cell::{CellId, CellType};
pub use cells::{
    Accumulator, AccumulatorEffect, AccumulatorState, Counter, Register, RegisterEffect,
    RegisterEffectTrait, RegisterState,
};
pub use effect::{EffectTrait, Projection, SumEffectTrait};
pub use error::TimelineError;
pub use flatten::{CausalTime, FlattenError, flatten, unflatten};
pub use graph::{EventGraph, IdentityTrait};
pub use timeline::{NodeId, Querier, Timeline};
pub use topic::{Event, Topic, TopicId};
