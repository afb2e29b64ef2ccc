//! Blocking façade over every supported awaitable shape.
//!
//! [`AsyncToSync::await_value`] invokes a delegate, detects the shape of the
//! value it returns, and blocks until that value completes, pumping the
//! thread's synchronization context when one needs to be kept alive.

use std::any::Any;
use std::sync::Arc;

use ambit_pump::{ContextScope, Fault, Outcome, SyncContext, current_context};

use crate::ambient::{self, ApartmentState};
use crate::config;
use crate::context::{EstablishedScope, TestExecutionContext};
use crate::error::FrameworkError;
use crate::pump::pumps;
use crate::safe_context::SafeSyncContext;
use crate::shape::{ReturnValue, TypeMeta, shapes};
use crate::single_threaded::SingleThreadedContext;

/// Converts asynchronous invocations into blocking ones.
#[derive(Clone, Copy, Debug, Default)]
pub struct AsyncToSync;

impl AsyncToSync {
    /// Returns `true` when values of type `R` are awaited rather than
    /// returned directly.
    #[must_use]
    pub fn is_async<R>() -> bool
    where
        R: ?Sized + 'static,
    {
        shapes().is_awaitable(&TypeMeta::of::<R>())
    }

    /// Invokes `invoke` under `context` and waits for the awaitable it
    /// returns.
    ///
    /// When the context is single-threaded, or the thread is an
    /// [`ApartmentState::Sta`] thread, and no synchronization context is
    /// installed, a [`SingleThreadedContext`] is installed for the duration
    /// of the call so continuations return to the calling thread.
    ///
    /// # Errors
    ///
    /// Returns the original fault raised by the delegate or the awaited
    /// operation, or [`FrameworkError::NotAwaitable`] when the returned value
    /// has no awaitable shape.
    ///
    /// # Examples
    ///
    /// ```
    /// use ambit::AsyncToSync;
    /// use ambit::adapter::Task;
    /// use ambit::context::TestExecutionContext;
    /// use ambit::shape::ReturnValue;
    ///
    /// let context = TestExecutionContext::new();
    /// let value = AsyncToSync::await_value(&context, || {
    ///     ReturnValue::new(Task::from_value(42_i32))
    /// })
    /// .unwrap()
    /// .unwrap();
    /// assert_eq!(value.downcast_ref::<i32>(), Some(&42));
    /// ```
    pub fn await_value<F>(context: &Arc<TestExecutionContext>, invoke: F) -> Outcome
    where
        F: FnOnce() -> ReturnValue,
    {
        Self::settle(context, invoke, |value| {
            Err(Fault::from(FrameworkError::NotAwaitable {
                type_name: value.type_name(),
            }))
        })
    }

    /// Invokes a test method, waiting for its value only when it is
    /// awaitable.
    ///
    /// The thread is prepared exactly as for [`AsyncToSync::await_value`].
    /// A plain value is returned as it is, with `()` reported as `Ok(None)`.
    ///
    /// # Errors
    ///
    /// Returns the original fault raised by the method or the awaited
    /// operation.
    ///
    /// # Examples
    ///
    /// ```
    /// use ambit::AsyncToSync;
    /// use ambit::context::TestExecutionContext;
    /// use ambit::shape::ReturnValue;
    ///
    /// let context = TestExecutionContext::new();
    /// let outcome = AsyncToSync::invoke(&context, ReturnValue::unit);
    /// assert!(matches!(outcome, Ok(None)));
    /// ```
    pub fn invoke<F>(context: &Arc<TestExecutionContext>, invoke: F) -> Outcome
    where
        F: FnOnce() -> ReturnValue,
    {
        Self::settle(context, invoke, |value| {
            if value.is_unit() {
                Ok(None)
            } else {
                Ok(Some(value.into_any()))
            }
        })
    }

    fn settle<F>(
        context: &Arc<TestExecutionContext>,
        invoke: F,
        plain: impl FnOnce(ReturnValue) -> Outcome,
    ) -> Outcome
    where
        F: FnOnce() -> ReturnValue,
    {
        let _environment = AwaitEnvironment::prepare(context);
        let returned = Fault::catch(invoke)?;
        let adapter = match shapes().detect(returned) {
            Ok(adapter) => adapter,
            Err(value) => return plain(value),
        };
        if !adapter.is_completed() {
            pumps().select_current().wait_for_completion(adapter.as_ref())?;
        }
        adapter.get_result()
    }

    /// Waits for `value` when it is awaitable.
    ///
    /// Returns `None`, dropping the value, when it has no awaitable shape.
    #[must_use]
    pub fn try_await(context: &Arc<TestExecutionContext>, value: ReturnValue) -> Option<Outcome> {
        if !shapes().is_awaitable(&value.type_meta()) {
            return None;
        }
        Some(Self::await_value(context, || value))
    }

    /// Invokes `f` and waits for the awaitable it returns.
    ///
    /// # Errors
    ///
    /// As for [`AsyncToSync::await_value`].
    pub fn await_fn<F, R>(context: &Arc<TestExecutionContext>, f: F) -> Outcome
    where
        F: FnOnce() -> R,
        R: Any + Send,
    {
        Self::await_value(context, || ReturnValue::new(f()))
    }
}

/// Thread setup held for the duration of one wait.
struct AwaitEnvironment {
    loop_context: Option<Arc<SingleThreadedContext>>,
    sync_scope: Option<ContextScope>,
    _established: EstablishedScope,
}

impl AwaitEnvironment {
    fn prepare(context: &Arc<TestExecutionContext>) -> Self {
        let established = context.install();
        let needs_loop = (context.is_single_threaded()
            || ambient::apartment_state() == ApartmentState::Sta)
            && current_context().is_none();
        if !needs_loop {
            return Self {
                loop_context: None,
                sync_scope: None,
                _established: established,
            };
        }
        log::debug!("installing a single-threaded context for the wait");
        let loop_context = Arc::new(SingleThreadedContext::with_timeout(
            config::shutdown_timeout(),
        ));
        let inner: Arc<dyn SyncContext> = Arc::<SingleThreadedContext>::clone(&loop_context);
        let safe: Arc<dyn SyncContext> =
            Arc::new(SafeSyncContext::new(Some(inner), Arc::clone(context)));
        Self {
            loop_context: Some(loop_context),
            sync_scope: Some(ContextScope::install(Some(safe))),
            _established: established,
        }
    }
}

impl Drop for AwaitEnvironment {
    fn drop(&mut self) {
        drop(self.sync_scope.take());
        if let Some(loop_context) = self.loop_context.take() {
            loop_context.shutdown();
        }
    }
}
