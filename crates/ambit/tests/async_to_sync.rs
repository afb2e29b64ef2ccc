//! Behavioural tests for thread affinity and context flow while awaiting.

mod common;

use std::sync::Arc;
use std::thread::{self, ThreadId};
use std::time::Duration;

use ambit::adapter::Task;
use ambit::ambient::{self, ApartmentState};
use ambit::context::TestExecutionContext;
use ambit::single_threaded::SingleThreadedContext;
use ambit::{AsyncToSync, ReturnValue};
use ambit_pump::{ContextScope, Fault, SyncContext, current_context};
use common::value_of;
use futures::channel::oneshot;
use rstest::{fixture, rstest};

/// Task that resumes after another thread signals it, reporting the thread
/// it resumed on.
fn resume_elsewhere() -> Task {
    let (tx, rx) = oneshot::channel::<()>();
    thread::spawn(move || {
        thread::sleep(Duration::from_millis(10));
        let _ = tx.send(());
    });
    Task::new(async move {
        rx.await.map_err(Fault::from)?;
        Ok::<ThreadId, Fault>(thread::current().id())
    })
}

#[fixture]
fn context() -> Arc<TestExecutionContext> {
    TestExecutionContext::new()
}

#[rstest]
fn single_threaded_contexts_resume_on_the_calling_thread(context: Arc<TestExecutionContext>) {
    context.set_single_threaded(true);
    let caller = thread::current().id();
    let outcome = AsyncToSync::await_value(&context, || ReturnValue::new(resume_elsewhere()));
    assert_eq!(value_of::<ThreadId>(outcome), caller);
    assert!(current_context().is_none());
}

#[rstest]
fn sta_threads_resume_on_the_calling_thread(context: Arc<TestExecutionContext>) {
    ambient::set_apartment_state(ApartmentState::Sta);
    let caller = thread::current().id();
    let outcome = AsyncToSync::await_value(&context, || ReturnValue::new(resume_elsewhere()));
    ambient::set_apartment_state(ApartmentState::Mta);
    assert_eq!(value_of::<ThreadId>(outcome), caller);
}

#[rstest]
fn free_threaded_contexts_resume_on_the_waking_thread(context: Arc<TestExecutionContext>) {
    let caller = thread::current().id();
    let outcome = AsyncToSync::await_value(&context, || ReturnValue::new(resume_elsewhere()));
    assert_ne!(value_of::<ThreadId>(outcome), caller);
}

#[rstest]
fn the_installed_loop_is_guarded_and_removed(context: Arc<TestExecutionContext>) {
    context.set_single_threaded(true);
    let outcome = AsyncToSync::await_fn(&context, || {
        let installed = current_context().map(|current| current.type_name());
        Task::from_value(installed)
    });
    let installed = value_of::<Option<&'static str>>(outcome)
        .unwrap_or_else(|| panic!("no context installed during the invocation"));
    assert!(installed.ends_with("SafeSyncContext"));
    assert!(current_context().is_none());
}

#[rstest]
fn an_existing_context_is_left_in_place(context: Arc<TestExecutionContext>) {
    context.set_single_threaded(true);
    let existing: Arc<dyn SyncContext> =
        Arc::new(SingleThreadedContext::with_timeout(Duration::from_secs(1)));
    let _scope = ContextScope::install(Some(Arc::clone(&existing)));
    let outcome = AsyncToSync::await_fn(&context, || {
        let same = current_context().is_some_and(|current| Arc::ptr_eq(&current, &existing));
        Task::from_value(same)
    });
    assert!(value_of::<bool>(outcome));
}

#[rstest]
fn the_execution_context_follows_continuations(context: Arc<TestExecutionContext>) {
    let expected = Arc::clone(&context);
    let outcome = AsyncToSync::await_fn(&context, || {
        let (tx, rx) = oneshot::channel::<()>();
        thread::spawn(move || {
            thread::sleep(Duration::from_millis(10));
            let _ = tx.send(());
        });
        Task::new(async move {
            rx.await.map_err(Fault::from)?;
            let current = TestExecutionContext::current_opt();
            Ok::<bool, Fault>(current.is_some_and(|current| Arc::ptr_eq(&current, &expected)))
        })
    });
    assert!(value_of::<bool>(outcome));
}

#[rstest]
fn the_callers_context_is_restored_after_waiting(context: Arc<TestExecutionContext>) {
    TestExecutionContext::clear_current();
    let outcome = AsyncToSync::await_fn(&context, || Task::from_value(()));
    assert!(matches!(outcome, Ok(None)));
    assert!(TestExecutionContext::current_opt().is_none());
}

#[rstest]
fn invoking_returns_plain_values_without_waiting(context: Arc<TestExecutionContext>) {
    let outcome = AsyncToSync::invoke(&context, || ReturnValue::new(7_u8));
    assert_eq!(value_of::<u8>(outcome), 7);
    assert!(matches!(AsyncToSync::invoke(&context, ReturnValue::unit), Ok(None)));
}

#[rstest]
fn invoking_waits_for_awaitables_on_the_caller(context: Arc<TestExecutionContext>) {
    context.set_single_threaded(true);
    let caller = thread::current().id();
    let outcome = AsyncToSync::invoke(&context, || ReturnValue::new(resume_elsewhere()));
    assert_eq!(value_of::<ThreadId>(outcome), caller);
}
