//! Task-backed await adapter.
//!
//! A [`Task`] is an erased future. Wrapping it in a [`TaskAdapter`] starts it
//! immediately: the first poll happens on the creating thread. Later polls
//! are scheduled by the task's waker, which posts them to the
//! synchronization context that was current when the adapter was created, or
//! polls inline on the waking thread when there was none.

use std::any::Any;
use std::fmt;
use std::future::Future;
use std::mem;
use std::sync::{Arc, Condvar, Mutex, MutexGuard, PoisonError};
use std::task::{Context, Poll, Wake, Waker};

use ambit_pump::{
    AnyValue, AwaitAdapter, ContextScope, Continuation, Fault, Outcome, SyncContext,
    current_context,
};
use futures::FutureExt;
use futures::future::BoxFuture;

use crate::context::TestExecutionContext;
use crate::error::FrameworkError;

/// Boxes a result value, mapping `()` to `None`.
pub(crate) fn box_result<T>(value: T) -> Option<AnyValue>
where
    T: Any + Send,
{
    let boxed: AnyValue = Box::new(value);
    if boxed.is::<()>() { None } else { Some(boxed) }
}

/// Erased asynchronous operation producing an [`Outcome`].
///
/// # Examples
///
/// ```
/// use ambit::adapter::{Task, TaskAdapter};
/// use ambit_pump::AwaitAdapter;
///
/// let adapter = TaskAdapter::new(Task::new(async { Ok::<_, ambit_pump::Fault>(42_i32) }));
/// assert!(adapter.is_completed());
/// let value = adapter.get_result().unwrap().unwrap();
/// assert_eq!(value.downcast_ref::<i32>(), Some(&42));
/// ```
pub struct Task {
    future: BoxFuture<'static, Outcome>,
}

impl Task {
    /// Wraps a fallible future.
    pub fn new<F, T>(future: F) -> Self
    where
        F: Future<Output = Result<T, Fault>> + Send + 'static,
        T: Any + Send,
    {
        Self {
            future: future.map(|result| result.map(box_result)).boxed(),
        }
    }

    /// Wraps a future that produces a plain value.
    pub fn from_future<F>(future: F) -> Self
    where
        F: Future + Send + 'static,
        F::Output: Any + Send,
    {
        Self::new(future.map(Ok))
    }

    /// Task that has already produced `value`.
    pub fn from_value<T>(value: T) -> Self
    where
        T: Any + Send,
    {
        Self::from_outcome(Ok(box_result(value)))
    }

    /// Task that has already failed with `fault`.
    #[must_use]
    pub fn from_fault(fault: Fault) -> Self {
        Self::from_outcome(Err(fault))
    }

    /// Task that resolves to `outcome`.
    #[must_use]
    pub fn from_outcome(outcome: Outcome) -> Self {
        Self {
            future: futures::future::ready(outcome).boxed(),
        }
    }

    pub(crate) fn into_future(self) -> BoxFuture<'static, Outcome> {
        self.future
    }
}

impl fmt::Debug for Task {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Task").finish_non_exhaustive()
    }
}

#[derive(Default)]
struct TaskState {
    future: Option<BoxFuture<'static, Outcome>>,
    outcome: Option<Outcome>,
    completed: bool,
    taken: bool,
    polling: bool,
    notified: bool,
    continuations: Vec<Continuation>,
}

struct TaskCore {
    state: Mutex<TaskState>,
    done: Condvar,
    scheduler: Option<Arc<dyn SyncContext>>,
    context: Option<Arc<TestExecutionContext>>,
}

impl TaskCore {
    fn lock(&self) -> MutexGuard<'_, TaskState> {
        self.state.lock().unwrap_or_else(PoisonError::into_inner)
    }

    fn run(self: &Arc<Self>) {
        loop {
            let mut future = {
                let mut state = self.lock();
                if state.completed {
                    return;
                }
                if state.polling {
                    state.notified = true;
                    return;
                }
                let Some(future) = state.future.take() else {
                    return;
                };
                state.polling = true;
                state.notified = false;
                future
            };

            let waker = Waker::from(Arc::clone(self));
            let mut cx = Context::from_waker(&waker);
            let polled = {
                let _context = self.context.as_ref().map(TestExecutionContext::install);
                let _scheduler = self
                    .scheduler
                    .clone()
                    .map(|scheduler| ContextScope::install(Some(scheduler)));
                Fault::catch(|| future.as_mut().poll(&mut cx))
            };

            match polled {
                Ok(Poll::Pending) => {
                    let mut state = self.lock();
                    state.future = Some(future);
                    state.polling = false;
                    if !mem::take(&mut state.notified) {
                        return;
                    }
                }
                Ok(Poll::Ready(outcome)) => {
                    self.complete(outcome);
                    return;
                }
                Err(fault) => {
                    self.complete(Err(fault));
                    return;
                }
            }
        }
    }

    fn complete(&self, outcome: Outcome) {
        let continuations = {
            let mut state = self.lock();
            if state.completed {
                return;
            }
            state.outcome = Some(outcome);
            state.completed = true;
            state.polling = false;
            state.future = None;
            self.done.notify_all();
            mem::take(&mut state.continuations)
        };
        for continuation in continuations {
            continuation();
        }
    }

    fn schedule(self: &Arc<Self>) {
        let Some(scheduler) = &self.scheduler else {
            self.run();
            return;
        };
        let core = Arc::clone(self);
        if let Err(fault) = scheduler.post(Box::new(move || core.run())) {
            log::warn!(
                "{} rejected a task wakeup, polling inline: {fault}",
                scheduler.type_name()
            );
            self.run();
        }
    }
}

impl Wake for TaskCore {
    fn wake(self: Arc<Self>) {
        self.schedule();
    }

    fn wake_by_ref(self: &Arc<Self>) {
        self.schedule();
    }
}

/// Await adapter over a [`Task`].
pub struct TaskAdapter {
    core: Arc<TaskCore>,
}

impl TaskAdapter {
    /// Starts `task`, capturing the calling thread's synchronization context
    /// and execution context.
    #[must_use]
    pub fn new(task: Task) -> Self {
        let core = Arc::new(TaskCore {
            state: Mutex::new(TaskState {
                future: Some(task.into_future()),
                ..TaskState::default()
            }),
            done: Condvar::new(),
            scheduler: current_context(),
            context: TestExecutionContext::current_opt(),
        });
        core.run();
        Self { core }
    }

    /// Adapter that has already completed with `outcome`.
    #[must_use]
    pub fn completed(outcome: Outcome) -> Self {
        Self {
            core: Arc::new(TaskCore {
                state: Mutex::new(TaskState {
                    outcome: Some(outcome),
                    completed: true,
                    ..TaskState::default()
                }),
                done: Condvar::new(),
                scheduler: None,
                context: None,
            }),
        }
    }

    /// Type name of the context wakeups are posted to, if any.
    #[must_use]
    pub fn scheduler_name(&self) -> Option<&'static str> {
        self.core.scheduler.as_ref().map(|scheduler| scheduler.type_name())
    }
}

impl AwaitAdapter for TaskAdapter {
    fn is_completed(&self) -> bool {
        self.core.lock().completed
    }

    fn on_completed(&self, continuation: Continuation) {
        let mut state = self.core.lock();
        if state.completed {
            drop(state);
            continuation();
        } else {
            state.continuations.push(continuation);
        }
    }

    fn block_until_completed(&self) {
        let mut state = self.core.lock();
        while !state.completed {
            state = self
                .core
                .done
                .wait(state)
                .unwrap_or_else(PoisonError::into_inner);
        }
    }

    fn get_result(&self) -> Outcome {
        self.block_until_completed();
        let mut state = self.core.lock();
        if mem::replace(&mut state.taken, true) {
            return Err(Fault::from(FrameworkError::ResultConsumed));
        }
        state
            .outcome
            .take()
            .unwrap_or_else(|| Err(Fault::from(FrameworkError::ResultConsumed)))
            .map_err(Fault::first_inner)
    }
}

impl fmt::Debug for TaskAdapter {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("TaskAdapter")
            .field("completed", &self.is_completed())
            .field("scheduler", &self.scheduler_name())
            .finish_non_exhaustive()
    }
}
