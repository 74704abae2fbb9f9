//! Error types for the `orrery-engine` crate.

use orrery_resources::ResourceError;
use orrery_timeline::{FlattenError, TimelineError};
use orrery_types::{ActivityDirectiveId, ActivityInstanceId, Duration, MapperError, TaskId};

/// Errors raised while turning a serialized activity into a runnable task.
///
/// These are construction-time failures: they surface before any
/// simulation state is touched.
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum InstantiationError {
    /// No activity type is registered under this name.
    #[error("unknown activity type {type_name:?}")]
    UnknownType {
        /// The requested type name.
        type_name: String,
    },

    /// An activity type with this name is already registered.
    #[error("activity type {type_name:?} registered twice")]
    DuplicateType {
        /// The repeated type name.
        type_name: String,
    },

    /// Required parameters were neither supplied nor defaulted.
    #[error("activity {type_name:?} is missing arguments {parameters:?}")]
    MissingArguments {
        /// The activity type.
        type_name: String,
        /// The parameters with no value.
        parameters: Vec<String>,
    },

    /// Arguments were supplied for parameters the type does not declare.
    #[error("activity {type_name:?} has extraneous arguments {parameters:?}")]
    ExtraneousArguments {
        /// The activity type.
        type_name: String,
        /// The undeclared parameter names.
        parameters: Vec<String>,
    },

    /// An argument does not match its parameter's schema.
    #[error("activity {type_name:?} argument {parameter:?} is ill-typed: {reason}")]
    IllTyped {
        /// The activity type.
        type_name: String,
        /// The offending parameter.
        parameter: String,
        /// What is wrong with the value.
        reason: String,
    },

    /// The arguments are well-typed but the task cannot be built from them.
    #[error("activity {type_name:?} is unconstructable: {reason}")]
    Unconstructable {
        /// The activity type.
        type_name: String,
        /// Why construction failed.
        reason: String,
    },
}

impl InstantiationError {
    /// Wrap a mapper failure for `parameter` of `type_name`.
    pub fn ill_typed(type_name: &str, parameter: &str, source: &MapperError) -> Self {
        Self::IllTyped {
            type_name: type_name.to_owned(),
            parameter: parameter.to_owned(),
            reason: source.to_string(),
        }
    }
}

/// Errors raised by running task logic.
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum TaskError {
    /// The task logic reported a failure.
    #[error("task failed: {message}")]
    Failed {
        /// Description supplied by the task.
        message: String,
    },

    /// Reading or extending the timeline failed.
    #[error("timeline error: {source}")]
    Timeline {
        /// The underlying timeline error.
        #[from]
        source: TimelineError,
    },

    /// A spawned or called activity could not be instantiated.
    #[error("child activity error: {source}")]
    Instantiation {
        /// The underlying instantiation error.
        #[from]
        source: InstantiationError,
    },

    /// A replayed task took a different path than on its first run.
    #[error("replay diverged: {detail}")]
    ReplayDiverged {
        /// What differed.
        detail: String,
    },

    /// A coroutine task returned control without completing or making a
    /// request.
    #[error("coroutine suspended without a request")]
    Stalled,
}

impl TaskError {
    /// A failure with the given message.
    pub fn failed(message: impl Into<String>) -> Self {
        Self::Failed {
            message: message.into(),
        }
    }
}

/// Errors that abort a simulation run.
#[derive(Debug, thiserror::Error)]
pub enum SimulationError {
    /// A scheduled activity could not be instantiated.
    #[error("directive {directive}: {source}")]
    Instantiation {
        /// The plan entry at fault.
        directive: ActivityDirectiveId,
        /// The underlying instantiation error.
        source: InstantiationError,
    },

    /// Task logic failed. The run stops and the committed history up to the
    /// failure is attached for diagnosis.
    #[error("task {task} (activity {activity:?}) failed at {time}: {source}")]
    TaskFailed {
        /// The failing task.
        task: TaskId,
        /// The activity the task belongs to, if any.
        activity: Option<ActivityInstanceId>,
        /// Simulated time of the failure.
        time: Duration,
        /// The failure raised by the task.
        source: Box<TaskError>,
        /// Rendering of the committed history and pending work.
        trace: String,
    },

    /// Evaluating a condition failed.
    #[error("condition for {subject} failed: {source}")]
    Condition {
        /// The waiting task or constraint name.
        subject: String,
        /// The underlying resource error.
        source: ResourceError,
    },

    /// The timeline rejected an operation.
    #[error("timeline error: {source}")]
    Timeline {
        /// The underlying timeline error.
        #[from]
        source: TimelineError,
    },

    /// A committed graph could not be flattened for the event log.
    #[error("event log error: {source}")]
    Flatten {
        /// The underlying flatten error.
        #[from]
        source: FlattenError,
    },

    /// The sampling period is not positive.
    #[error("sampling period must be positive, got {period}")]
    InvalidSamplingPeriod {
        /// The rejected period.
        period: Duration,
    },

    /// A simulated offset cannot be expressed as a calendar time.
    #[error("offset {offset} is outside the calendar range")]
    TimeOutOfRange {
        /// The offending offset.
        offset: Duration,
    },
}
