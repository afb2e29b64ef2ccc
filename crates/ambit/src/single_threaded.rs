//! Cooperative single-threaded synchronization context.
//!
//! Work posted to a [`SingleThreadedContext`] is queued and executed in FIFO
//! order by the one thread that calls [`SingleThreadedContext::run`]. The
//! loop exits once shutdown has been requested and the queue is empty.
//! After shutdown, work is still accepted for a grace period so that
//! continuations racing the shutdown are not lost; anything arriving later
//! is rejected and reported against a test result.

use std::any::Any;
use std::collections::VecDeque;
use std::fmt;
use std::ptr;
use std::sync::mpsc::{SyncSender, sync_channel};
use std::sync::{Arc, Condvar, Mutex, MutexGuard, PoisonError};
use std::thread::{self, ThreadId};
use std::time::{Duration, Instant};

use ambit_pump::{
    ContextScope, Fault, SyncContext, WorkItem, current_context, underlying_context,
};

use crate::config;
use crate::context::TestExecutionContext;
use crate::error::FrameworkError;
use crate::model::{AssertionResult, AssertionStatus, TestResult};

/// Lifecycle of a [`SingleThreadedContext`].
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum LoopStatus {
    /// `run` has not been called and shutdown has not been requested.
    NotStarted,
    /// The loop is processing work.
    Running,
    /// Shutdown was requested; queued work is still drained.
    ShuttingDown,
    /// The loop has exited.
    ShutDown,
}

/// Queued work plus the channel a blocked sender waits on.
struct ScheduledWork {
    work: WorkItem,
    completion: Option<SyncSender<Result<(), Fault>>>,
}

impl ScheduledWork {
    fn posted(work: WorkItem) -> Self {
        Self {
            work,
            completion: None,
        }
    }

    fn execute(self) -> Result<(), Fault> {
        let outcome = Fault::catch(self.work);
        let Some(completion) = self.completion else {
            return outcome;
        };
        // The sender owns the failure; a vanished sender has nobody to report to.
        let _ = completion.send(outcome);
        Ok(())
    }
}

struct LoopState {
    queue: VecDeque<ScheduledWork>,
    status: LoopStatus,
    started: bool,
    shutdown_requested: Option<Instant>,
    loop_thread: Option<ThreadId>,
}

/// Synchronization context executing work on a single thread.
///
/// # Examples
///
/// ```
/// use std::sync::{Arc, Mutex};
/// use ambit::single_threaded::SingleThreadedContext;
/// use ambit_pump::SyncContext;
///
/// let context = Arc::new(SingleThreadedContext::new());
/// let seen = Arc::new(Mutex::new(Vec::new()));
/// for step in 1..=3 {
///     let seen = Arc::clone(&seen);
///     context.post(Box::new(move || seen.lock().unwrap().push(step))).unwrap();
/// }
/// context.shutdown();
/// context.run().unwrap();
/// assert_eq!(*seen.lock().unwrap(), vec![1, 2, 3]);
/// ```
pub struct SingleThreadedContext {
    state: Mutex<LoopState>,
    wake: Condvar,
    shutdown_timeout: Duration,
    owner: Option<Arc<TestExecutionContext>>,
}

impl SingleThreadedContext {
    /// Context using the configured shutdown grace period.
    #[must_use]
    pub fn new() -> Self {
        Self::with_timeout(config::shutdown_timeout())
    }

    /// Context accepting work for `shutdown_timeout` after shutdown.
    ///
    /// The calling thread's execution context, when there is one, receives
    /// failures that cannot be attributed to a current test.
    #[must_use]
    pub fn with_timeout(shutdown_timeout: Duration) -> Self {
        Self {
            state: Mutex::new(LoopState {
                queue: VecDeque::new(),
                status: LoopStatus::NotStarted,
                started: false,
                shutdown_requested: None,
                loop_thread: None,
            }),
            wake: Condvar::new(),
            shutdown_timeout,
            owner: TestExecutionContext::current_opt(),
        }
    }

    fn lock(&self) -> MutexGuard<'_, LoopState> {
        self.state.lock().unwrap_or_else(PoisonError::into_inner)
    }

    /// Current lifecycle status.
    #[must_use]
    pub fn status(&self) -> LoopStatus {
        self.lock().status
    }

    /// Number of queued work items.
    #[must_use]
    pub fn pending(&self) -> usize {
        self.lock().queue.len()
    }

    /// Grace period after shutdown.
    #[must_use]
    pub fn shutdown_timeout(&self) -> Duration {
        self.shutdown_timeout
    }

    /// Returns `true` when called from the thread running the loop.
    #[must_use]
    pub fn is_loop_thread(&self) -> bool {
        self.lock().loop_thread == Some(thread::current().id())
    }

    /// Requests that the loop exit once its queue is empty.
    ///
    /// Repeated calls have no further effect.
    pub fn shutdown(&self) {
        let mut state = self.lock();
        if matches!(state.status, LoopStatus::NotStarted | LoopStatus::Running) {
            log::debug!("single-threaded context shutting down");
            state.status = LoopStatus::ShuttingDown;
            state.shutdown_requested = Some(Instant::now());
        }
        self.wake.notify_all();
    }

    /// Processes queued work on the calling thread until shutdown.
    ///
    /// While the loop runs the context is the thread's current
    /// synchronization context, unless a context wrapping it already is.
    /// Failures in posted work are logged and recorded against a test result;
    /// the loop keeps going.
    ///
    /// # Errors
    ///
    /// Returns [`FrameworkError::LoopAlreadyRunning`] when the loop has been
    /// started before, or [`FrameworkError::LoopShutDown`] when it has
    /// already exited.
    pub fn run(self: &Arc<Self>) -> Result<(), Fault> {
        {
            let mut state = self.lock();
            if state.status == LoopStatus::ShutDown {
                return Err(Fault::from(FrameworkError::LoopShutDown));
            }
            if state.started {
                return Err(Fault::from(FrameworkError::LoopAlreadyRunning));
            }
            state.started = true;
            state.loop_thread = Some(thread::current().id());
            if state.status == LoopStatus::NotStarted {
                state.status = LoopStatus::Running;
            }
        }

        let _scope = (!self.is_current()).then(|| {
            let context: Arc<dyn SyncContext> = Arc::<Self>::clone(self);
            ContextScope::install(Some(context))
        });

        while let Some(work) = self.next_work() {
            if let Err(fault) = work.execute() {
                self.report_posted_failure(&fault);
            }
        }
        Ok(())
    }

    fn is_current(self: &Arc<Self>) -> bool {
        current_context()
            .map(underlying_context)
            .is_some_and(|context| ptr::addr_eq(Arc::as_ptr(&context), Arc::as_ptr(self)))
    }

    fn next_work(&self) -> Option<ScheduledWork> {
        let mut state = self.lock();
        loop {
            if let Some(work) = state.queue.pop_front() {
                return Some(work);
            }
            if state.status == LoopStatus::ShuttingDown {
                state.status = LoopStatus::ShutDown;
                state.loop_thread = None;
                log::debug!("single-threaded context shut down");
                return None;
            }
            state = self
                .wake
                .wait(state)
                .unwrap_or_else(PoisonError::into_inner);
        }
    }

    fn enqueue(&self, work: ScheduledWork) -> Result<(), Fault> {
        let mut state = self.lock();
        let elapsed = state
            .shutdown_requested
            .map_or(Duration::ZERO, |requested| requested.elapsed());
        let rejected = match state.status {
            LoopStatus::NotStarted | LoopStatus::Running => false,
            LoopStatus::ShuttingDown => elapsed > self.shutdown_timeout,
            LoopStatus::ShutDown => true,
        };
        if rejected {
            drop(state);
            return Err(self.reject(elapsed));
        }
        state.queue.push_back(work);
        self.wake.notify_all();
        Ok(())
    }

    fn reject(&self, elapsed: Duration) -> Fault {
        let error = FrameworkError::ShutdownTimeout {
            elapsed,
            timeout: self.shutdown_timeout,
        };
        let message = error.to_string();
        log::error!("{message}");
        if let Some(result) = self.reporting_result() {
            result.record_assertion(AssertionResult::new(AssertionStatus::Error, message));
        }
        Fault::from(error)
    }

    fn report_posted_failure(&self, fault: &Fault) {
        log::error!("work posted to a single-threaded context failed: {fault}");
        if let Some(result) = self.reporting_result() {
            result.record_exception(fault);
        }
    }

    fn reporting_result(&self) -> Option<Arc<TestResult>> {
        TestExecutionContext::current_opt()
            .and_then(|context| context.current_result())
            .or_else(|| self.owner.as_ref().and_then(|owner| owner.current_result()))
    }
}

impl Default for SingleThreadedContext {
    fn default() -> Self {
        Self::new()
    }
}

impl SyncContext for SingleThreadedContext {
    fn post(&self, work: WorkItem) -> Result<(), Fault> {
        self.enqueue(ScheduledWork::posted(work))
    }

    fn send(&self, work: WorkItem) -> Result<(), Fault> {
        if self.is_loop_thread() {
            return Fault::catch(work);
        }
        let (completion, done) = sync_channel(1);
        self.enqueue(ScheduledWork {
            work,
            completion: Some(completion),
        })?;
        done.recv().unwrap_or_else(|_| {
            Err(Fault::cancelled_with(
                "single-threaded context dropped sent work",
            ))
        })
    }

    fn as_any(&self) -> &dyn Any {
        self
    }

    fn into_any_arc(self: Arc<Self>) -> Arc<dyn Any + Send + Sync> {
        self
    }
}

impl fmt::Debug for SingleThreadedContext {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let state = self.lock();
        f.debug_struct("SingleThreadedContext")
            .field("status", &state.status)
            .field("pending", &state.queue.len())
            .field("shutdown_timeout", &self.shutdown_timeout)
            .finish_non_exhaustive()
    }
}
