//! Synchronization contexts and the thread's current-context slot.
//!
//! A synchronization context decides where posted work runs. Each thread
//! carries at most one installed context; [`ContextScope`] installs one for a
//! lexical region and restores the previous context when dropped.

use std::any::Any;
use std::cell::RefCell;
use std::marker::PhantomData;
use std::rc::Rc;
use std::sync::Arc;

use crate::fault::Fault;
use crate::pump::PumpError;

/// Unit of work handed to a synchronization context.
pub type WorkItem = Box<dyn FnOnce() + Send>;

/// Target for work that must run in a particular execution environment.
pub trait SyncContext: Send + Sync + 'static {
    /// Queues `work` without waiting for it to run.
    ///
    /// # Errors
    ///
    /// Returns a fault when the context can no longer accept work.
    fn post(&self, work: WorkItem) -> Result<(), Fault>;

    /// Runs `work` and waits for it to finish.
    ///
    /// # Errors
    ///
    /// Returns a fault when the context rejects the work or when the work
    /// itself panics.
    fn send(&self, work: WorkItem) -> Result<(), Fault>;

    /// Borrows the context as [`Any`] for concrete-type checks.
    fn as_any(&self) -> &dyn Any;

    /// Converts a shared context into a shared [`Any`] for downcasting.
    fn into_any_arc(self: Arc<Self>) -> Arc<dyn Any + Send + Sync>;

    /// Name of the concrete context type, used in diagnostics.
    fn type_name(&self) -> &'static str {
        std::any::type_name::<Self>()
    }

    /// Context wrapped by this one, if it is a decorator.
    fn inner(&self) -> Option<Arc<dyn SyncContext>> {
        None
    }
}

thread_local! {
    static CURRENT: RefCell<Option<Arc<dyn SyncContext>>> = const { RefCell::new(None) };
}

/// Returns the context installed on the calling thread.
#[must_use]
pub fn current_context() -> Option<Arc<dyn SyncContext>> {
    CURRENT.with(|cell| cell.borrow().clone())
}

/// Replaces the calling thread's context, returning the previous one.
pub fn set_current_context(
    context: Option<Arc<dyn SyncContext>>,
) -> Option<Arc<dyn SyncContext>> {
    CURRENT.with(|cell| cell.replace(context))
}

/// Follows [`SyncContext::inner`] down to the innermost wrapped context.
#[must_use]
pub fn underlying_context(context: Arc<dyn SyncContext>) -> Arc<dyn SyncContext> {
    let mut current = context;
    while let Some(inner) = current.inner() {
        current = inner;
    }
    current
}

/// Returns the underlying installed context when it has concrete type `C`.
///
/// # Errors
///
/// Returns [`PumpError::WrongContext`] when no context is installed or the
/// underlying context has a different type.
pub fn installed<C>(pump: &'static str) -> Result<Arc<C>, Fault>
where
    C: SyncContext,
{
    let found = current_context().map(underlying_context);
    let actual = found
        .as_ref()
        .map_or("none", |context| context.type_name());
    found
        .and_then(|context| context.into_any_arc().downcast::<C>().ok())
        .ok_or_else(|| {
            Fault::from(PumpError::WrongContext {
                pump,
                expected: std::any::type_name::<C>(),
                actual,
            })
        })
}

/// Guard that installs a synchronization context on the current thread.
///
/// The previous context is restored when the guard drops, including during
/// unwinding. The guard is bound to the thread that created it.
#[must_use = "dropping the scope restores the previous context immediately"]
pub struct ContextScope {
    previous: Option<Option<Arc<dyn SyncContext>>>,
    _not_send: PhantomData<Rc<()>>,
}

impl ContextScope {
    /// Installs `context` (or clears the slot for `None`).
    pub fn install(context: Option<Arc<dyn SyncContext>>) -> Self {
        Self {
            previous: Some(set_current_context(context)),
            _not_send: PhantomData,
        }
    }
}

impl Drop for ContextScope {
    fn drop(&mut self) {
        if let Some(previous) = self.previous.take() {
            set_current_context(previous);
        }
    }
}
