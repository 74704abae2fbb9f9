//! The replaying task strategy.
//!
//! Task logic is an ordinary function of a [`ReplayContext`]. Every
//! suspension point (`delay`, `wait_until`, `call`) interrupts the function
//! by returning [`Interrupt::Yield`]; on the next step the function is run
//! again from the top. Suspension points already passed return
//! immediately, emits and spawns made before them are skipped because they
//! are already part of history, and reads made before them return the
//! values they returned the first time.
//!
//! The logic must therefore be deterministic given what it reads. A replay
//! that reads a value of a different type than on the first run fails with
//! [`TaskError::ReplayDiverged`].

use core::any::Any;
use core::fmt;

use orrery_resources::SharedCondition;
use orrery_timeline::{CellId, Topic};
use orrery_types::{Duration, SerializedValue};

use crate::error::TaskError;
use crate::scheduler::Scheduler;
use crate::task::{ActivityCall, BoxedTask, Task, TaskStatus};

/// Why a run of replayed logic stopped before returning.
pub enum Interrupt {
    /// The logic reached a new suspension point.
    Yield(TaskStatus<SerializedValue>),
    /// The logic failed.
    Failed(TaskError),
}

impl From<TaskError> for Interrupt {
    fn from(error: TaskError) -> Self {
        Self::Failed(error)
    }
}

impl fmt::Debug for Interrupt {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Yield(status) => f.debug_tuple("Yield").field(status).finish(),
            Self::Failed(error) => f.debug_tuple("Failed").field(error).finish(),
        }
    }
}

/// What a replaying task remembers between steps.
#[derive(Default)]
struct ReplayLog {
    /// Suspension points passed so far.
    suspensions: usize,
    /// Values read before the latest suspension point, in order.
    reads: Vec<Box<dyn Any + Send>>,
}

/// The interface replayed logic runs against.
pub struct ReplayContext<'s, 'a> {
    scheduler: &'s mut Scheduler<'a>,
    log: &'s mut ReplayLog,
    passed: usize,
    read: usize,
}

impl ReplayContext<'_, '_> {
    /// Whether the logic is still retracing steps it already took.
    pub const fn is_replaying(&self) -> bool {
        self.passed < self.log.suspensions
    }

    /// Evaluate `query` against the scheduler, or return its remembered
    /// result when replaying.
    pub fn read<T, F>(&mut self, query: F) -> Result<T, Interrupt>
    where
        T: Clone + Send + 'static,
        F: FnOnce(&Scheduler<'_>) -> Result<T, TaskError>,
    {
        let position = self.read;
        self.read = self.read.saturating_add(1);
        if let Some(remembered) = self.log.reads.get(position) {
            return remembered.downcast_ref::<T>().cloned().ok_or_else(|| {
                Interrupt::Failed(TaskError::ReplayDiverged {
                    detail: format!("read {position} has a different type than on the first run"),
                })
            });
        }
        let value = query(&*self.scheduler)?;
        self.log.reads.push(Box::new(value.clone()));
        Ok(value)
    }

    /// Value of `cell`.
    pub fn get<S: Clone + Send + Sync + 'static>(&mut self, cell: &CellId<S>) -> Result<S, Interrupt> {
        self.read(|scheduler| scheduler.get(cell))
    }

    /// Current simulated time.
    pub fn now(&mut self) -> Result<Duration, Interrupt> {
        self.read(|scheduler| Ok(scheduler.now()))
    }

    /// Emit `value` on `topic`. Skipped when replaying.
    pub fn emit<E: Send + Sync + 'static>(&mut self, topic: &Topic<E>, value: E) -> Result<(), Interrupt> {
        if !self.is_replaying() {
            self.scheduler.emit(topic, value)?;
        }
        Ok(())
    }

    /// Start `task` without waiting for it. Skipped when replaying.
    pub fn spawn(&mut self, task: BoxedTask) {
        if !self.is_replaying() {
            self.scheduler.spawn(task);
        }
    }

    /// Start an activity without waiting for it. Skipped when replaying.
    pub fn spawn_activity(&mut self, call: &ActivityCall) -> Result<(), Interrupt> {
        if !self.is_replaying() {
            self.scheduler.spawn_activity(call)?;
        }
        Ok(())
    }

    /// Suspend for `duration` of simulated time.
    pub fn delay(&mut self, duration: Duration) -> Result<(), Interrupt> {
        self.suspend(|| TaskStatus::Delayed(duration))
    }

    /// Suspend until `condition` holds.
    pub fn wait_until(&mut self, condition: &SharedCondition) -> Result<(), Interrupt> {
        self.suspend(|| TaskStatus::Awaiting(SharedCondition::clone(condition)))
    }

    /// Run an activity and suspend until it completes.
    pub fn call(&mut self, call: &ActivityCall) -> Result<(), Interrupt> {
        self.suspend(|| TaskStatus::CallingActivity(call.clone()))
    }

    fn suspend<F: FnOnce() -> TaskStatus<SerializedValue>>(&mut self, status: F) -> Result<(), Interrupt> {
        if self.is_replaying() {
            self.passed = self.passed.saturating_add(1);
            return Ok(());
        }
        self.log.suspensions = self.log.suspensions.saturating_add(1);
        Err(Interrupt::Yield(status()))
    }
}

impl fmt::Debug for ReplayContext<'_, '_> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("ReplayContext")
            .field("passed", &self.passed)
            .field("suspensions", &self.log.suspensions)
            .field("read", &self.read)
            .finish_non_exhaustive()
    }
}

/// A task whose logic is re-run from the start on every step.
pub struct ReplayingTask<F> {
    logic: F,
    log: ReplayLog,
}

impl<F> ReplayingTask<F>
where
    F: Fn(&mut ReplayContext<'_, '_>) -> Result<SerializedValue, Interrupt> + Send,
{
    /// Wrap `logic`.
    pub fn new(logic: F) -> Self {
        Self {
            logic,
            log: ReplayLog::default(),
        }
    }
}

impl<F> Task for ReplayingTask<F>
where
    F: Fn(&mut ReplayContext<'_, '_>) -> Result<SerializedValue, Interrupt> + Send,
{
    fn step(&mut self, scheduler: &mut Scheduler<'_>) -> Result<TaskStatus<SerializedValue>, TaskError> {
        let mut context = ReplayContext {
            scheduler,
            log: &mut self.log,
            passed: 0,
            read: 0,
        };
        match (self.logic)(&mut context) {
            Ok(value) => Ok(TaskStatus::Completed(value)),
            Err(Interrupt::Yield(status)) => Ok(status),
            Err(Interrupt::Failed(error)) => Err(error),
        }
    }
}

impl<F> fmt::Debug for ReplayingTask<F> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("ReplayingTask")
            .field("suspensions", &self.log.suspensions)
            .field("reads", &self.log.reads.len())
            .finish_non_exhaustive()
    }
}
