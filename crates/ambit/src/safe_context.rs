//! Synchronization context that turns failing work into recorded results.

use std::any::Any;
use std::fmt;
use std::sync::Arc;

use ambit_pump::{Fault, SyncContext, WorkItem};

use crate::context::TestExecutionContext;

/// Decorator that guards every payload handed to a synchronization context.
///
/// A payload that panics or otherwise fails is logged and recorded as an
/// exception on the current result of the owning execution context, and the
/// result is completed. Without an inner context, posted work runs on the
/// `rayon` global pool and sent work runs inline.
pub struct SafeSyncContext {
    inner: Option<Arc<dyn SyncContext>>,
    context: Arc<TestExecutionContext>,
}

impl SafeSyncContext {
    /// Guards `inner` on behalf of `context`.
    #[must_use]
    pub fn new(inner: Option<Arc<dyn SyncContext>>, context: Arc<TestExecutionContext>) -> Self {
        Self { inner, context }
    }

    /// Execution context failures are recorded against.
    #[must_use]
    pub fn context(&self) -> &Arc<TestExecutionContext> {
        &self.context
    }

    fn guard(&self, work: WorkItem) -> WorkItem {
        let context = Arc::clone(&self.context);
        Box::new(move || {
            if let Err(fault) = Fault::catch(work) {
                record_failure(&context, &fault);
            }
        })
    }
}

fn record_failure(context: &TestExecutionContext, fault: &Fault) {
    log::error!("unhandled failure in synchronization context work: {fault}");
    let _recording = context.recording_lock();
    if let Some(result) = context.current_result() {
        result.record_exception(fault);
        result.record_test_completion();
    }
}

impl SyncContext for SafeSyncContext {
    fn post(&self, work: WorkItem) -> Result<(), Fault> {
        let guarded = self.guard(work);
        let Some(inner) = &self.inner else {
            rayon::spawn(guarded);
            return Ok(());
        };
        inner.post(guarded)
    }

    fn send(&self, work: WorkItem) -> Result<(), Fault> {
        let guarded = self.guard(work);
        let Some(inner) = &self.inner else {
            guarded();
            return Ok(());
        };
        inner.send(guarded)
    }

    fn as_any(&self) -> &dyn Any {
        self
    }

    fn into_any_arc(self: Arc<Self>) -> Arc<dyn Any + Send + Sync> {
        self
    }

    fn inner(&self) -> Option<Arc<dyn SyncContext>> {
        self.inner.clone()
    }
}

impl fmt::Debug for SafeSyncContext {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("SafeSyncContext")
            .field("inner", &self.inner.as_ref().map(|inner| inner.type_name()))
            .finish_non_exhaustive()
    }
}
