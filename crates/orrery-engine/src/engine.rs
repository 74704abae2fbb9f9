//! The simulation engine: a priority loop over simulated time.
//!
//! Pending resumptions are kept in a queue ordered by `(time, sequence)`.
//! Every pass of the loop takes the earliest time and runs one batch:
//!
//! 1. **Advance** -- extend the committed history by the elapsed time,
//!    stepping every cell.
//! 2. **Run** -- step every task due at that time from the same base node.
//!    Children spawned or called during the batch run in it too, starting
//!    from the point where they were created.
//! 3. **Commit** -- gather what every branch emitted into one event graph
//!    and commit it on top of the base. Branches that forked are combined
//!    with `concurrently`, so the resumption order inside a batch is not
//!    observable.
//! 4. **Wake** -- re-solve the conditions of awaiting tasks against the new
//!    state and note when each will hold.
//!
//! Tasks due at the same time are stepped in enqueue order. A task resumed
//! at the same time by a child it called runs in a later batch, after the
//! child's effects are committed.

use core::fmt::Write as _;
use std::collections::{BTreeMap, VecDeque};
use std::sync::Arc;

use orrery_resources::{Condition, SharedCondition};
use orrery_timeline::{Event, EventGraph, NodeId, Timeline};
use orrery_types::{ActivityDirectiveId, ActivityInstanceId, Duration, SerializedValue, TaskId, Window, Windows};
use serde::Serialize;
use tracing::{debug, info, warn};

use crate::error::{InstantiationError, SimulationError, TaskError};
use crate::model::{ActivityTopics, MissionModel, Registry};
use crate::scheduler::{PendingActivity, Scheduler, Spawned};
use crate::task::{ActivityCall, Arguments, BoxedTask, Task, TaskStatus};

// ----------------------------------------------------------------------
// Records
// ----------------------------------------------------------------------

/// Everything the engine knows about one activity instance.
#[derive(Debug, Clone, PartialEq)]
pub struct ActivityRecord {
    /// Plan entry the activity came from. `None` for activities started by
    /// other tasks.
    pub directive: Option<ActivityDirectiveId>,
    /// Activity type name.
    pub type_name: String,
    /// Effective arguments.
    pub arguments: Arguments,
    /// Activity that spawned or called this one.
    pub parent: Option<ActivityInstanceId>,
    /// Task running the activity.
    pub task: TaskId,
    /// Scheduled start.
    pub start: Duration,
    /// Completion time, once finished.
    pub end: Option<Duration>,
    /// Value the activity completed with, once finished.
    pub computed_attributes: Option<SerializedValue>,
}

/// When a task started and, if it has, when it completed.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
pub struct TaskWindow {
    /// First scheduled resumption.
    pub start: Duration,
    /// Completion time.
    pub end: Option<Duration>,
}

/// One committed batch of events.
#[derive(Debug, Clone)]
pub struct Commit {
    /// Simulated time of the batch.
    pub time: Duration,
    /// Everything emitted during the batch.
    pub graph: EventGraph<Event>,
}

/// A constraint and the windows in which it did not hold.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct ConstraintViolation {
    /// Registered constraint name.
    pub name: String,
    /// Offsets from the start of the run at which the constraint failed.
    pub windows: Windows,
}

struct TaskEntry {
    task: BoxedTask,
    activity: Option<ActivityInstanceId>,
}

struct Waiting {
    condition: SharedCondition,
    /// Time at which the condition next holds.
    wake: Option<Duration>,
    /// Time at which the answer expires and must be recomputed.
    recheck: Option<Duration>,
}

/// Wraps an activity's task so that its start and end appear in the event
/// log on the type's built-in topics.
struct ActivityTask {
    inner: BoxedTask,
    topics: Option<ActivityTopics>,
    arguments: Option<Arguments>,
}

impl Task for ActivityTask {
    fn step(&mut self, scheduler: &mut Scheduler<'_>) -> Result<TaskStatus<SerializedValue>, TaskError> {
        if let (Some(topics), Some(arguments)) = (self.topics, self.arguments.take()) {
            scheduler.emit(&topics.input, SerializedValue::from(arguments))?;
        }
        let status = self.inner.step(scheduler)?;
        if let (Some(topics), TaskStatus::Completed(attributes)) = (self.topics, &status) {
            scheduler.emit(&topics.output, attributes.clone())?;
        }
        Ok(status)
    }
}

// ----------------------------------------------------------------------
// Engine
// ----------------------------------------------------------------------

/// Runs a mission model forward through simulated time.
pub struct SimulationEngine {
    timeline: Timeline,
    registry: Arc<Registry>,
    tip: NodeId,
    now: Duration,
    sequence: u64,
    next_task: TaskId,
    next_activity: ActivityInstanceId,
    queue: BTreeMap<(Duration, u64), TaskId>,
    tasks: BTreeMap<TaskId, TaskEntry>,
    waiting: BTreeMap<TaskId, Waiting>,
    callers: BTreeMap<TaskId, TaskId>,
    activities: BTreeMap<ActivityInstanceId, ActivityRecord>,
    windows: BTreeMap<TaskId, TaskWindow>,
    commits: Vec<Commit>,
    segments: Vec<(Duration, NodeId)>,
}

impl SimulationEngine {
    /// An engine positioned at the start of the run, with nothing
    /// scheduled.
    pub fn new(model: MissionModel) -> Self {
        let (timeline, registry) = model.into_parts();
        let origin = timeline.origin();
        Self {
            timeline,
            registry,
            tip: origin,
            now: Duration::ZERO,
            sequence: 0,
            next_task: TaskId(0),
            next_activity: ActivityInstanceId(0),
            queue: BTreeMap::new(),
            tasks: BTreeMap::new(),
            waiting: BTreeMap::new(),
            callers: BTreeMap::new(),
            activities: BTreeMap::new(),
            windows: BTreeMap::new(),
            commits: Vec::new(),
            segments: vec![(Duration::ZERO, origin)],
        }
    }

    /// Current simulated time.
    pub const fn now(&self) -> Duration {
        self.now
    }

    /// The mission model's registrations.
    pub const fn registry(&self) -> &Arc<Registry> {
        &self.registry
    }

    /// The history built so far.
    pub const fn timeline(&self) -> &Timeline {
        &self.timeline
    }

    /// The latest committed node.
    pub const fn tip(&self) -> NodeId {
        self.tip
    }

    /// Every activity started so far.
    pub const fn activities(&self) -> &BTreeMap<ActivityInstanceId, ActivityRecord> {
        &self.activities
    }

    /// Start and end of `task`.
    pub fn task_window(&self, task: TaskId) -> Option<TaskWindow> {
        self.windows.get(&task).copied()
    }

    /// Committed batches, in order.
    pub fn commits(&self) -> &[Commit] {
        &self.commits
    }

    // ------------------------------------------------------------------
    // Scheduling
    // ------------------------------------------------------------------

    fn enqueue(&mut self, task: TaskId, time: Duration) {
        self.queue.insert((time, self.sequence), task);
        self.sequence = self.sequence.saturating_add(1);
    }

    fn allocate_task(&mut self, task: BoxedTask, activity: Option<ActivityInstanceId>) -> TaskId {
        let id = self.next_task;
        self.next_task = id.next();
        self.tasks.insert(id, TaskEntry { task, activity });
        self.windows.insert(id, TaskWindow {
            start: self.now,
            end: None,
        });
        id
    }

    fn register_activity(
        &mut self,
        pending: PendingActivity,
        directive: Option<ActivityDirectiveId>,
        task: BoxedTask,
        start: Duration,
    ) -> TaskId {
        let activity = self.next_activity;
        self.next_activity = activity.next();
        let wrapped = ActivityTask {
            inner: task,
            topics: self.registry.activity_topics(&pending.type_name),
            arguments: Some(pending.arguments.clone()),
        };
        let id = self.allocate_task(Box::new(wrapped), Some(activity));
        if let Some(window) = self.windows.get_mut(&id) {
            window.start = start;
        }
        debug!(%activity, task = %id, activity_type = %pending.type_name, %start, "Activity scheduled");
        self.activities.insert(activity, ActivityRecord {
            directive,
            type_name: pending.type_name,
            arguments: pending.arguments,
            parent: pending.parent,
            task: id,
            start,
            end: None,
            computed_attributes: None,
        });
        id
    }

    /// Schedule `task` to first run at `start`.
    pub fn spawn_task(&mut self, task: BoxedTask, start: Duration) -> TaskId {
        let id = self.allocate_task(task, None);
        if let Some(window) = self.windows.get_mut(&id) {
            window.start = start;
        }
        self.enqueue(id, start);
        id
    }

    /// Start every registered daemon at the current time.
    pub fn spawn_daemons(&mut self) {
        let registry = Arc::clone(&self.registry);
        for (name, factory) in registry.daemons() {
            let id = self.spawn_task(factory(), self.now);
            debug!(daemon = %name, task = %id, "Daemon spawned");
        }
    }

    /// Instantiate `call` and schedule it to start at `start`.
    pub fn schedule_activity(
        &mut self,
        directive: Option<ActivityDirectiveId>,
        call: &ActivityCall,
        start: Duration,
    ) -> Result<ActivityInstanceId, InstantiationError> {
        let registry = Arc::clone(&self.registry);
        let spec = registry.activity_type(&call.type_name)?;
        let (arguments, task) = spec.instantiate(&call.arguments)?;
        let activity = self.next_activity;
        let pending = PendingActivity {
            type_name: call.type_name.clone(),
            arguments,
            parent: None,
        };
        let id = self.register_activity(pending, directive, task, start);
        self.enqueue(id, start);
        Ok(activity)
    }

    // ------------------------------------------------------------------
    // Main loop
    // ------------------------------------------------------------------

    fn next_time(&self, limit: Duration) -> Option<Duration> {
        let queued = self.queue.keys().next().map(|&(time, _)| time);
        let waits = self
            .waiting
            .values()
            .flat_map(|waiting| waiting.wake.into_iter().chain(waiting.recheck));
        queued
            .into_iter()
            .chain(waits)
            .filter(|time| time.no_longer_than(limit))
            .min()
    }

    /// Run every batch due at or before `limit`.
    ///
    /// Work scheduled after `limit` stays pending; tasks still running at
    /// that point keep whatever they emitted so far.
    pub fn run_until(&mut self, limit: Duration) -> Result<(), SimulationError> {
        info!(%limit, queued = self.queue.len(), "Simulation started");
        let mut batches: u64 = 0;
        while let Some(time) = self.next_time(limit) {
            self.advance_to(time)?;

            let woken: Vec<TaskId> = self
                .waiting
                .iter()
                .filter(|(_, waiting)| waiting.wake == Some(time))
                .map(|(&id, _)| id)
                .collect();
            for id in woken {
                self.waiting.remove(&id);
                debug!(task = %id, %time, "Condition satisfied");
                self.enqueue(id, time);
            }

            if self.queue.keys().next().is_some_and(|&(due, _)| due == time) {
                self.run_batch(limit)?;
                batches = batches.saturating_add(1);
            } else {
                self.evaluate_conditions(limit)?;
            }
        }
        self.advance_to(limit)?;

        if !self.queue.is_empty() || !self.waiting.is_empty() {
            info!(
                pending = self.queue.len(),
                waiting = self.waiting.len(),
                "Horizon reached with work outstanding"
            );
        }
        info!(batches, commits = self.commits.len(), "Simulation finished");
        Ok(())
    }

    fn advance_to(&mut self, time: Duration) -> Result<(), SimulationError> {
        if time.longer_than(self.now) {
            self.tip = self.timeline.wait(self.tip, time.saturating_minus(self.now))?;
            self.now = time;
        }
        Ok(())
    }

    fn run_batch(&mut self, limit: Duration) -> Result<(), SimulationError> {
        let registry = Arc::clone(&self.registry);
        let base = self.tip;
        let now = self.now;

        let mut ready: VecDeque<(TaskId, NodeId)> = VecDeque::new();
        while let Some(entry) = self.queue.first_entry() {
            if entry.key().0 != now {
                break;
            }
            ready.push_back((entry.remove(), base));
        }
        debug!(time = %now, tasks = ready.len(), "Batch started");

        while let Some((id, origin)) = ready.pop_front() {
            let Some(mut entry) = self.tasks.remove(&id) else {
                continue;
            };
            let mut scheduler = Scheduler::new(&mut self.timeline, &registry, origin, now, entry.activity);
            let outcome = entry.task.step(&mut scheduler);
            let (cursor, spawned) = scheduler.into_spawned();
            let status = match outcome {
                Ok(status) => status,
                Err(error) => return Err(self.task_failed(id, entry.activity, cursor, error)),
            };

            for Spawned { task, origin, activity } in spawned {
                let child = match activity {
                    Some(pending) => self.register_activity(pending, None, task, now),
                    None => self.allocate_task(task, None),
                };
                ready.push_back((child, origin));
            }

            match status {
                TaskStatus::Completed(value) => self.complete(id, entry.activity, value),
                TaskStatus::Delayed(delay) => {
                    self.tasks.insert(id, entry);
                    self.enqueue(id, now.saturating_plus(delay.max(Duration::ZERO)));
                }
                TaskStatus::Awaiting(condition) => {
                    self.tasks.insert(id, entry);
                    self.waiting.insert(id, Waiting {
                        condition,
                        wake: None,
                        recheck: None,
                    });
                }
                TaskStatus::CallingActivity(call) => {
                    let parent = entry.activity;
                    self.tasks.insert(id, entry);
                    let instantiated = registry
                        .activity_type(&call.type_name)
                        .and_then(|spec| spec.instantiate(&call.arguments));
                    let (arguments, task) = match instantiated {
                        Ok(child) => child,
                        Err(error) => return Err(self.task_failed(id, parent, cursor, error.into())),
                    };
                    let pending = PendingActivity {
                        type_name: call.type_name,
                        arguments,
                        parent,
                    };
                    let child = self.register_activity(pending, None, task, now);
                    self.callers.insert(child, id);
                    ready.push_back((child, cursor));
                }
            }
        }

        let graph = self.timeline.graph_since(base)?;
        debug!(time = %now, events = graph.len(), "Batch committed");
        self.tip = self.timeline.commit(base, graph.clone())?;
        if !graph.is_empty() {
            self.commits.push(Commit { time: now, graph });
        }
        self.record_segment();
        self.evaluate_conditions(limit)
    }

    fn complete(&mut self, task: TaskId, activity: Option<ActivityInstanceId>, value: SerializedValue) {
        let now = self.now;
        if let Some(window) = self.windows.get_mut(&task) {
            window.end = Some(now);
        }
        if let Some(record) = activity.and_then(|id| self.activities.get_mut(&id)) {
            record.end = Some(now);
            record.computed_attributes = Some(value);
        }
        debug!(%task, time = %now, "Task completed");
        if let Some(caller) = self.callers.remove(&task) {
            self.enqueue(caller, now);
        }
    }

    fn record_segment(&mut self) {
        let (now, tip) = (self.now, self.tip);
        if let Some(last) = self.segments.last_mut().filter(|(time, _)| *time == now) {
            last.1 = tip;
        } else {
            self.segments.push((now, tip));
        }
    }

    fn evaluate_conditions(&mut self, limit: Duration) -> Result<(), SimulationError> {
        let now = self.now;
        let horizon = Window::between(Duration::ZERO, limit.saturating_minus(now));
        let querier = self.timeline.querier(self.tip);
        for (id, waiting) in &mut self.waiting {
            let satisfaction = waiting
                .condition
                .evaluate(&querier, horizon)
                .map_err(|source| SimulationError::Condition {
                    subject: format!("task {id}"),
                    source,
                })?;
            waiting.wake = satisfaction
                .windows
                .min_time_point()
                .map(|offset| now.saturating_plus(offset));
            waiting.recheck = match (waiting.wake, satisfaction.expiry.value()) {
                (None, Some(expiry)) => Some(now.saturating_plus(expiry.max(Duration::EPSILON))),
                _ => None,
            };
        }
        Ok(())
    }

    fn task_failed(
        &self,
        task: TaskId,
        activity: Option<ActivityInstanceId>,
        cursor: NodeId,
        error: TaskError,
    ) -> SimulationError {
        warn!(%task, time = %self.now, %error, "Task failed");
        SimulationError::TaskFailed {
            task,
            activity,
            time: self.now,
            source: Box::new(error),
            trace: self.trace_from(cursor),
        }
    }

    // ------------------------------------------------------------------
    // Inspection
    // ------------------------------------------------------------------

    fn trace_from(&self, node: NodeId) -> String {
        let registry = &self.registry;
        let mut trace = self
            .timeline
            .debug_trace(node, &|event| registry.describe(event))
            .unwrap_or_else(|error| format!("history unavailable: {error}\n"));
        for (&(time, _), task) in &self.queue {
            let _ = writeln!(trace, "pending: task {task} at {time}");
        }
        for task in self.waiting.keys() {
            let _ = writeln!(trace, "awaiting: task {task}");
        }
        trace
    }

    /// The committed history, one delta per line, followed by the pending
    /// and awaiting tasks.
    pub fn debug_trace(&self) -> String {
        self.trace_from(self.tip)
    }

    /// A node holding the committed state as of `time`.
    pub fn node_at(&mut self, time: Duration) -> Result<NodeId, SimulationError> {
        let (start, node) = self
            .segments
            .iter()
            .rev()
            .find(|(start, _)| start.no_longer_than(time))
            .or_else(|| self.segments.first())
            .copied()
            .unwrap_or((Duration::ZERO, self.timeline.origin()));
        Ok(self.timeline.wait(node, time.saturating_minus(start).max(Duration::ZERO))?)
    }

    /// Windows within `[0, end]` in which each registered constraint fails.
    ///
    /// Each constraint is solved separately on every stretch between
    /// commits, re-solving whenever the dynamics it read expire.
    pub fn constraint_violations(&mut self, end: Duration) -> Result<Vec<ConstraintViolation>, SimulationError> {
        let registry = Arc::clone(&self.registry);
        let segments = self.segments.clone();
        let mut violations = Vec::new();
        for (name, condition) in registry.constraints() {
            let mut failed = Windows::new();
            for (index, &(start, node)) in segments.iter().enumerate() {
                if start.longer_than(end) {
                    break;
                }
                let stop = match segments.get(index.saturating_add(1)) {
                    Some(&(next, _)) if next.no_longer_than(end) => next.saturating_minus(Duration::EPSILON),
                    _ => end,
                };
                failed = failed.union(&self.failures_between(name, condition.as_ref(), node, start, stop)?);
            }
            if !failed.is_empty() {
                warn!(constraint = %name, windows = %failed, "Constraint violated");
                violations.push(ConstraintViolation {
                    name: name.clone(),
                    windows: failed,
                });
            }
        }
        Ok(violations)
    }

    fn failures_between(
        &mut self,
        name: &str,
        condition: &dyn Condition,
        node: NodeId,
        start: Duration,
        stop: Duration,
    ) -> Result<Windows, SimulationError> {
        let mut failed = Windows::new();
        let mut cursor = node;
        let mut cursor_time = start;
        while cursor_time.no_longer_than(stop) {
            let horizon = Window::between(Duration::ZERO, stop.saturating_minus(cursor_time));
            let satisfaction = condition
                .evaluate(&self.timeline.querier(cursor), horizon)
                .map_err(|source| SimulationError::Condition {
                    subject: format!("constraint {name}"),
                    source,
                })?;
            let expiry = satisfaction
                .expiry
                .value()
                .filter(|expiry| expiry.shorter_than(horizon.end()));
            let known = Window::between(Duration::ZERO, expiry.unwrap_or_else(|| horizon.end()));
            failed = failed.union(&satisfaction.windows.complement(&known).shift_by(cursor_time));

            let Some(expiry) = expiry else {
                break;
            };
            let step = expiry.max(Duration::EPSILON);
            cursor = self.timeline.wait(cursor, step)?;
            cursor_time = cursor_time.saturating_plus(step);
        }
        Ok(failed)
    }
}

impl core::fmt::Debug for SimulationEngine {
    fn fmt(&self, f: &mut core::fmt::Formatter<'_>) -> core::fmt::Result {
        f.debug_struct("SimulationEngine")
            .field("now", &self.now)
            .field("tip", &self.tip)
            .field("queued", &self.queue.len())
            .field("waiting", &self.waiting.len())
            .field("activities", &self.activities.len())
            .finish_non_exhaustive()
    }
}
