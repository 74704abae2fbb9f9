//! Task execution and the simulation driver for Orrery.
//!
//! - [`task`] -- the [`Task`] protocol and [`TaskStatus`].
//! - [`scheduler`] -- the [`Scheduler`] a running task reads and emits
//!   through.
//! - [`replay`] and [`coroutine`] -- two ways to write task logic as
//!   straight-line code: re-run from the top on every step, or polled as
//!   an `async` body.
//! - [`activity`] -- activity type registration data.
//! - [`model`] -- the [`Initializer`] a mission model is built with.
//! - [`engine`] -- the [`SimulationEngine`] priority loop.
//! - [`driver`] -- [`simulate`], which runs a plan and collects results.
//! - [`config`] -- YAML configuration for runs.
//!
//! # Design Principles
//!
//! - Contexts are explicit. Tasks get a [`Scheduler`], mission-model setup
//!   gets an [`Initializer`], resources get a [`orrery_timeline::Querier`],
//!   and none of them can do what the others do.
//! - Runs are deterministic. Identifiers are sequential, queues are
//!   ordered maps, and tasks resumed together only meet through the
//!   commutative `concurrently` combinator.
//! - Failures are precise. A task failure stops the run and reports the
//!   task, its activity, the time, and a trace of the history behind it.

pub mod activity;
pub mod config;
pub mod coroutine;
pub mod driver;
pub mod engine;
pub mod error;
pub mod model;
pub mod replay;
pub mod scheduler;
pub mod task;

pub use activity::{ActivityTypeSpec, Parameter, argument};
pub use config::{ConfigError, SimulationConfig};
pub use coroutine::{CoroutineContext, CoroutineTask};
pub use driver::{
    EventRecord, Schedule, ScheduledActivity, SimulatedActivity, SimulationResults, TopicDescription,
    UnfinishedActivity, simulate,
};
pub use engine::{ActivityRecord, Commit, ConstraintViolation, SimulationEngine, TaskWindow};
pub use error::{InstantiationError, SimulationError, TaskError};
pub use model::{ActivityTopics, ExportedResource, ExportedTopic, Initializer, MissionModel, Registry};
pub use replay::{Interrupt, ReplayContext, ReplayingTask};
pub use scheduler::Scheduler;
pub use task::{ActivityCall, Arguments, BoxedTask, StepFn, Task, TaskFactory, TaskStatus};
