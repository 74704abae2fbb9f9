//! The coroutine task strategy.
//!
//! Task logic is written as straight-line `async` code against a
//! [`CoroutineContext`]. Each context operation posts a request to a
//! mailbox shared with the [`CoroutineTask`] and parks the future; the task
//! services the request against the scheduler and polls again. Suspension
//! requests end the step, and the next step resumes the future exactly
//! where it parked.
//!
//! # Design Principles
//!
//! - **Single driver**: futures are polled only from [`Task::step`], with
//!   a no-op waker. Nothing else ever wakes them, so only one coroutine
//!   runs engine logic at any moment.
//! - **No replay**: unlike [`crate::ReplayingTask`], the logic runs once.
//!   Both strategies emit the same events for the same logic.

use core::any::Any;
use core::fmt;
use core::future::Future;
use core::pin::Pin;
use core::task::{Context, Poll};
use std::sync::{Arc, Mutex, MutexGuard, PoisonError};

use futures::task::noop_waker_ref;
use orrery_resources::SharedCondition;
use orrery_timeline::{CellId, Event, Topic};
use orrery_types::{Duration, SerializedValue};

use crate::error::TaskError;
use crate::scheduler::Scheduler;
use crate::task::{ActivityCall, BoxedTask, Task, TaskStatus};

type AnyValue = Box<dyn Any + Send>;
type Query = Box<dyn FnOnce(&Scheduler<'_>) -> Result<AnyValue, TaskError> + Send>;
type Body = Pin<Box<dyn Future<Output = Result<SerializedValue, TaskError>> + Send>>;

enum Request {
    Emit(Event),
    Read(Query),
    Spawn(BoxedTask),
    SpawnActivity(ActivityCall),
    Suspend(TaskStatus<SerializedValue>),
}

#[derive(Default)]
struct Mailbox {
    request: Option<Request>,
    response: Option<AnyValue>,
}

fn lock(mailbox: &Mutex<Mailbox>) -> MutexGuard<'_, Mailbox> {
    mailbox.lock().unwrap_or_else(PoisonError::into_inner)
}

/// Posts one request and resolves with the response to it.
struct Exchange {
    mailbox: Arc<Mutex<Mailbox>>,
    request: Option<Request>,
}

impl Future for Exchange {
    type Output = Result<AnyValue, TaskError>;

    fn poll(mut self: Pin<&mut Self>, _cx: &mut Context<'_>) -> Poll<Self::Output> {
        if let Some(request) = self.request.take() {
            lock(&self.mailbox).request = Some(request);
            return Poll::Pending;
        }
        lock(&self.mailbox)
            .response
            .take()
            .map_or(Poll::Pending, |response| Poll::Ready(Ok(response)))
    }
}

/// The interface coroutine logic runs against.
#[derive(Clone)]
pub struct CoroutineContext {
    mailbox: Arc<Mutex<Mailbox>>,
}

impl CoroutineContext {
    async fn exchange(&self, request: Request) -> Result<AnyValue, TaskError> {
        Exchange {
            mailbox: Arc::clone(&self.mailbox),
            request: Some(request),
        }
        .await
    }

    async fn suspend(&self, status: TaskStatus<SerializedValue>) -> Result<(), TaskError> {
        self.exchange(Request::Suspend(status)).await.map(drop)
    }

    /// Evaluate `query` against the scheduler at the current point.
    pub async fn read<T, F>(&self, query: F) -> Result<T, TaskError>
    where
        T: Send + 'static,
        F: FnOnce(&Scheduler<'_>) -> Result<T, TaskError> + Send + 'static,
    {
        let response = self
            .exchange(Request::Read(Box::new(
                move |scheduler: &Scheduler<'_>| -> Result<AnyValue, TaskError> {
                    query(scheduler).map(|value| Box::new(value) as AnyValue)
                },
            )))
            .await?;
        response
            .downcast::<T>()
            .map(|value| *value)
            .map_err(|_response| TaskError::failed("coroutine read answered with the wrong type"))
    }

    /// Value of `cell`.
    pub async fn get<S: Send + Sync + 'static>(&self, cell: CellId<S>) -> Result<S, TaskError> {
        self.read(move |scheduler| scheduler.get(&cell)).await
    }

    /// Current simulated time.
    pub async fn now(&self) -> Result<Duration, TaskError> {
        self.read(|scheduler| Ok(scheduler.now())).await
    }

    /// Emit `value` on `topic`.
    pub async fn emit<E: Send + Sync + 'static>(&self, topic: &Topic<E>, value: E) -> Result<(), TaskError> {
        self.exchange(Request::Emit(Event::new(topic, value))).await.map(drop)
    }

    /// Start `task` without waiting for it.
    pub async fn spawn(&self, task: BoxedTask) -> Result<(), TaskError> {
        self.exchange(Request::Spawn(task)).await.map(drop)
    }

    /// Start an activity without waiting for it.
    pub async fn spawn_activity(&self, call: ActivityCall) -> Result<(), TaskError> {
        self.exchange(Request::SpawnActivity(call)).await.map(drop)
    }

    /// Suspend for `duration` of simulated time.
    pub async fn delay(&self, duration: Duration) -> Result<(), TaskError> {
        self.suspend(TaskStatus::Delayed(duration)).await
    }

    /// Suspend until `condition` holds.
    pub async fn wait_until(&self, condition: SharedCondition) -> Result<(), TaskError> {
        self.suspend(TaskStatus::Awaiting(condition)).await
    }

    /// Run an activity and suspend until it completes.
    pub async fn call(&self, call: ActivityCall) -> Result<(), TaskError> {
        self.suspend(TaskStatus::CallingActivity(call)).await
    }
}

impl fmt::Debug for CoroutineContext {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("CoroutineContext").finish_non_exhaustive()
    }
}

/// A task driven by polling an `async` body.
pub struct CoroutineTask {
    body: Body,
    mailbox: Arc<Mutex<Mailbox>>,
}

impl CoroutineTask {
    /// Build a task from `logic`, which receives the context it must use
    /// for every interaction with the simulation.
    pub fn new<F, Fut>(logic: F) -> Self
    where
        F: FnOnce(CoroutineContext) -> Fut,
        Fut: Future<Output = Result<SerializedValue, TaskError>> + Send + 'static,
    {
        let mailbox = Arc::new(Mutex::new(Mailbox::default()));
        let context = CoroutineContext {
            mailbox: Arc::clone(&mailbox),
        };
        Self {
            body: Box::pin(logic(context)),
            mailbox,
        }
    }

    fn respond(&self, value: AnyValue) {
        lock(&self.mailbox).response = Some(value);
    }
}

impl Task for CoroutineTask {
    fn step(&mut self, scheduler: &mut Scheduler<'_>) -> Result<TaskStatus<SerializedValue>, TaskError> {
        let mut cx = Context::from_waker(noop_waker_ref());
        loop {
            if let Poll::Ready(result) = self.body.as_mut().poll(&mut cx) {
                return result.map(TaskStatus::Completed);
            }
            let request = lock(&self.mailbox).request.take();
            match request.ok_or(TaskError::Stalled)? {
                Request::Emit(event) => {
                    scheduler.emit_event(event)?;
                    self.respond(Box::new(()));
                }
                Request::Read(query) => {
                    let value = query(&*scheduler)?;
                    self.respond(value);
                }
                Request::Spawn(task) => {
                    scheduler.spawn(task);
                    self.respond(Box::new(()));
                }
                Request::SpawnActivity(call) => {
                    scheduler.spawn_activity(&call)?;
                    self.respond(Box::new(()));
                }
                Request::Suspend(status) => {
                    // Answered now, delivered when the next step polls.
                    self.respond(Box::new(()));
                    return Ok(status);
                }
            }
        }
    }
}

impl fmt::Debug for CoroutineTask {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("CoroutineTask").finish_non_exhaustive()
    }
}
