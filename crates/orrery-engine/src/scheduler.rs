//! The context handed to a running task.
//!
//! A [`Scheduler`] is bound to one point in history. Reads see the state
//! there, and every emit extends the task's private branch by one node, so
//! a task always observes its own earlier emissions. Children spawned
//! through the scheduler start from the point where they were spawned and
//! run in the same engine step, concurrently with whatever their parent
//! emits afterwards.
//!
//! The scheduler cannot allocate cells or register anything; that is the
//! job of the [`crate::Initializer`] before the run starts.

use orrery_timeline::{CellId, Event, NodeId, Querier, Timeline, Topic};
use orrery_types::{ActivityInstanceId, Duration};

use crate::error::TaskError;
use crate::model::Registry;
use crate::task::{ActivityCall, Arguments, BoxedTask};

/// An activity waiting to be started by the engine.
pub(crate) struct PendingActivity {
    pub(crate) type_name: String,
    pub(crate) arguments: Arguments,
    pub(crate) parent: Option<ActivityInstanceId>,
}

/// Work spawned during a step.
pub(crate) struct Spawned {
    pub(crate) task: BoxedTask,
    pub(crate) origin: NodeId,
    pub(crate) activity: Option<PendingActivity>,
}

/// Read, emit, and spawn access for a running task.
pub struct Scheduler<'a> {
    timeline: &'a mut Timeline,
    registry: &'a Registry,
    cursor: NodeId,
    now: Duration,
    activity: Option<ActivityInstanceId>,
    spawned: Vec<Spawned>,
}

impl<'a> Scheduler<'a> {
    pub(crate) const fn new(
        timeline: &'a mut Timeline,
        registry: &'a Registry,
        cursor: NodeId,
        now: Duration,
        activity: Option<ActivityInstanceId>,
    ) -> Self {
        Self {
            timeline,
            registry,
            cursor,
            now,
            activity,
            spawned: Vec::new(),
        }
    }

    /// Current simulated time, as an offset from the start of the plan.
    pub const fn now(&self) -> Duration {
        self.now
    }

    /// The activity this task is running on behalf of, if any.
    pub const fn activity(&self) -> Option<ActivityInstanceId> {
        self.activity
    }

    /// The history node this task has reached.
    pub const fn cursor(&self) -> NodeId {
        self.cursor
    }

    /// Value of `cell`, including this task's own emissions so far.
    pub fn get<S: Send + Sync + 'static>(&self, cell: &CellId<S>) -> Result<S, TaskError> {
        Ok(self.timeline.get(self.cursor, cell)?)
    }

    /// Read-only view at the current point, for evaluating resources.
    pub fn querier(&self) -> Querier<'_> {
        self.timeline.querier(self.cursor)
    }

    /// Emit `value` on `topic`.
    pub fn emit<E: Send + Sync + 'static>(&mut self, topic: &Topic<E>, value: E) -> Result<(), TaskError> {
        self.emit_event(Event::new(topic, value))
    }

    /// Emit an already-built event.
    pub fn emit_event(&mut self, event: Event) -> Result<(), TaskError> {
        self.cursor = self.timeline.emit(self.cursor, event)?;
        Ok(())
    }

    /// Start `task` now, without waiting for it.
    pub fn spawn(&mut self, task: BoxedTask) {
        self.spawned.push(Spawned {
            task,
            origin: self.cursor,
            activity: None,
        });
    }

    /// Start an activity now, without waiting for it.
    pub fn spawn_activity(&mut self, call: &ActivityCall) -> Result<(), TaskError> {
        let spec = self.registry.activity_type(&call.type_name)?;
        let (arguments, task) = spec.instantiate(&call.arguments)?;
        self.spawned.push(Spawned {
            task,
            origin: self.cursor,
            activity: Some(PendingActivity {
                type_name: call.type_name.clone(),
                arguments,
                parent: self.activity,
            }),
        });
        Ok(())
    }

    pub(crate) fn into_spawned(self) -> (NodeId, Vec<Spawned>) {
        (self.cursor, self.spawned)
    }
}

impl core::fmt::Debug for Scheduler<'_> {
    fn fmt(&self, f: &mut core::fmt::Formatter<'_>) -> core::fmt::Result {
        f.debug_struct("Scheduler")
            .field("cursor", &self.cursor)
            .field("now", &self.now)
            .field("activity", &self.activity)
            .finish_non_exhaustive()
    }
}
