//! The task protocol.
//!
//! A [`Task`] is a suspendable computation. The engine calls
//! [`Task::step`] with a [`Scheduler`] bound to the point in history where
//! the task resumes; the task runs until its next suspension point and
//! reports why it stopped through a [`TaskStatus`]. Calling `step` again
//! continues from that point, so the task value itself is the continuation.

use core::fmt;
use std::collections::BTreeMap;

use orrery_resources::SharedCondition;
use orrery_types::{Duration, SerializedValue};
use serde::{Deserialize, Serialize};

use crate::error::TaskError;
use crate::scheduler::Scheduler;

/// Arguments of an activity, by parameter name.
pub type Arguments = BTreeMap<String, SerializedValue>;

/// A request to run an activity: its type name and the arguments supplied
/// for it. Unsupplied parameters take their declared defaults.
#[derive(Debug, Clone, PartialEq, Default, Serialize, Deserialize)]
pub struct ActivityCall {
    /// Registered activity type name.
    #[serde(rename = "type")]
    pub type_name: String,
    /// Supplied arguments.
    #[serde(default)]
    pub arguments: Arguments,
}

impl ActivityCall {
    /// A call of `type_name` with no arguments.
    pub fn new(type_name: impl Into<String>) -> Self {
        Self {
            type_name: type_name.into(),
            arguments: Arguments::new(),
        }
    }

    /// Add an argument.
    #[must_use]
    pub fn with(mut self, name: impl Into<String>, value: impl Into<SerializedValue>) -> Self {
        self.arguments.insert(name.into(), value.into());
        self
    }
}

/// Why a task stopped running.
pub enum TaskStatus<R> {
    /// The task finished with a value.
    Completed(R),
    /// Resume the task after this much simulated time.
    Delayed(Duration),
    /// Resume the task once the condition holds.
    Awaiting(SharedCondition),
    /// Start the activity and resume the task when it completes.
    CallingActivity(ActivityCall),
}

impl<R> TaskStatus<R> {
    /// Transform the completion value.
    pub fn map<S, F: FnOnce(R) -> S>(self, f: F) -> TaskStatus<S> {
        match self {
            Self::Completed(value) => TaskStatus::Completed(f(value)),
            Self::Delayed(duration) => TaskStatus::Delayed(duration),
            Self::Awaiting(condition) => TaskStatus::Awaiting(condition),
            Self::CallingActivity(call) => TaskStatus::CallingActivity(call),
        }
    }

    /// Whether the task finished.
    pub const fn is_completed(&self) -> bool {
        matches!(self, Self::Completed(_))
    }
}

impl<R: fmt::Debug> fmt::Debug for TaskStatus<R> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Completed(value) => f.debug_tuple("Completed").field(value).finish(),
            Self::Delayed(duration) => f.debug_tuple("Delayed").field(duration).finish(),
            Self::Awaiting(_) => f.write_str("Awaiting(..)"),
            Self::CallingActivity(call) => f.debug_tuple("CallingActivity").field(call).finish(),
        }
    }
}

/// A suspendable computation driven by the engine.
///
/// Completed tasks report their computed attributes as a
/// [`SerializedValue`]; tasks with nothing to report complete with
/// [`SerializedValue::Null`].
pub trait Task: Send {
    /// Run until the next suspension point.
    fn step(&mut self, scheduler: &mut Scheduler<'_>) -> Result<TaskStatus<SerializedValue>, TaskError>;
}

/// Boxed task.
pub type BoxedTask = Box<dyn Task>;

/// Builds a fresh task each time it is called. Used for daemons.
pub type TaskFactory = Box<dyn Fn() -> BoxedTask + Send + Sync>;

/// A task built from a closure called once per step. The closure gets the
/// number of earlier steps, which is enough for small state machines.
pub struct StepFn<F> {
    steps: u64,
    body: F,
}

impl<F> StepFn<F>
where
    F: FnMut(u64, &mut Scheduler<'_>) -> Result<TaskStatus<SerializedValue>, TaskError> + Send,
{
    /// Wrap `body`.
    pub const fn new(body: F) -> Self {
        Self { steps: 0, body }
    }
}

impl<F> Task for StepFn<F>
where
    F: FnMut(u64, &mut Scheduler<'_>) -> Result<TaskStatus<SerializedValue>, TaskError> + Send,
{
    fn step(&mut self, scheduler: &mut Scheduler<'_>) -> Result<TaskStatus<SerializedValue>, TaskError> {
        let status = (self.body)(self.steps, scheduler);
        self.steps = self.steps.saturating_add(1);
        status
    }
}
