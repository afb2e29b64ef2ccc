//! Behavioural tests for awaiting through the Tokio loop and join handles.

use std::any::Any;
use std::sync::Arc;
use std::thread::{self, ThreadId};
use std::time::{Duration, Instant};

use ambit::adapter::Task;
use ambit::context::TestExecutionContext;
use ambit::pump::pumps;
use ambit::safe_context::SafeSyncContext;
use ambit::{AsyncToSync, ReturnValue};
use ambit_pump::{ContextScope, Fault, FaultCategory, Outcome, SyncContext};
use ambit_pump_tokio::{
    PUMP_NAME, TokioLoopContext, expose_fallible_join_handle, expose_join_handle, install,
};
use rstest::{fixture, rstest};
use tokio::runtime::{Handle, Runtime};
use tokio::sync::oneshot;
use tokio::task::JoinHandle;

fn value_of<T: Any>(outcome: Outcome) -> T {
    outcome
        .unwrap_or_else(|fault| panic!("unexpected fault: {fault}"))
        .and_then(|value| value.downcast::<T>().ok())
        .map_or_else(|| panic!("outcome did not carry the expected type"), |value| *value)
}

fn fault_of(outcome: Outcome) -> Fault {
    outcome
        .err()
        .unwrap_or_else(|| panic!("expected the outcome to be a fault"))
}

/// Task body that panics with `message`.
fn explode(message: &'static str) {
    panic!("{message}");
}

#[fixture]
fn context() -> Arc<TestExecutionContext> {
    install();
    TestExecutionContext::new()
}

#[fixture]
fn runtime() -> Runtime {
    tokio::runtime::Builder::new_multi_thread()
        .worker_threads(2)
        .enable_all()
        .build()
        .unwrap_or_else(|error| panic!("runtime failed to build: {error}"))
}

#[rstest]
fn continuations_run_inside_the_runtime_on_the_waiting_thread(context: Arc<TestExecutionContext>) {
    let loop_context: Arc<dyn SyncContext> = Arc::new(TokioLoopContext::new());
    let _scope = ContextScope::install(Some(loop_context));
    let caller = thread::current().id();
    let outcome = AsyncToSync::await_fn(&context, || {
        let (tx, rx) = oneshot::channel::<()>();
        thread::spawn(move || {
            thread::sleep(Duration::from_millis(10));
            let _ = tx.send(());
        });
        Task::new(async move {
            rx.await.map_err(Fault::from)?;
            Ok::<_, Fault>((thread::current().id(), Handle::try_current().is_ok()))
        })
    });
    let (resumed, in_runtime) = value_of::<(ThreadId, bool)>(outcome);
    assert_eq!(resumed, caller);
    assert!(in_runtime);
}

#[rstest]
fn the_loop_can_be_pumped_again(context: Arc<TestExecutionContext>) {
    let loop_context: Arc<dyn SyncContext> = Arc::new(TokioLoopContext::new());
    let _scope = ContextScope::install(Some(loop_context));
    for expected in 1..=2_u8 {
        let outcome = AsyncToSync::await_fn(&context, || {
            let (tx, rx) = oneshot::channel::<u8>();
            thread::spawn(move || {
                thread::sleep(Duration::from_millis(5));
                let _ = tx.send(expected);
            });
            Task::new(async move { rx.await.map_err(Fault::from) })
        });
        assert_eq!(value_of::<u8>(outcome), expected);
    }
}

#[rstest]
fn the_tokio_pump_is_selected_through_wrappers(context: Arc<TestExecutionContext>) {
    let loop_context: Arc<dyn SyncContext> = Arc::new(TokioLoopContext::new());
    assert_eq!(pumps().select(Some(Arc::clone(&loop_context))).name(), PUMP_NAME);
    let wrapped: Arc<dyn SyncContext> = Arc::new(SafeSyncContext::new(Some(loop_context), context));
    assert_eq!(pumps().select(Some(wrapped)).name(), PUMP_NAME);
    assert!(pumps().names().contains(&PUMP_NAME));
}

#[rstest]
fn join_handles_produce_the_task_value(context: Arc<TestExecutionContext>, runtime: Runtime) {
    expose_join_handle::<i32>();
    let outcome = AsyncToSync::await_value(&context, || {
        ReturnValue::new(runtime.spawn(async {
            tokio::time::sleep(Duration::from_millis(5)).await;
            42_i32
        }))
    });
    assert_eq!(value_of::<i32>(outcome), 42);
}

#[rstest]
fn panicking_tasks_fail_with_their_message(context: Arc<TestExecutionContext>, runtime: Runtime) {
    expose_join_handle::<()>();
    let outcome = AsyncToSync::await_value(&context, || {
        ReturnValue::new(runtime.spawn(async { explode("spawned task exploded") }))
    });
    let fault = fault_of(outcome);
    assert_eq!(fault.category(), FaultCategory::Panic);
    assert_eq!(fault.message(), "spawned task exploded");
}

#[rstest]
fn aborted_tasks_are_cancelled(context: Arc<TestExecutionContext>, runtime: Runtime) {
    expose_join_handle::<()>();
    let outcome = AsyncToSync::await_value(&context, || {
        let handle = runtime.spawn(std::future::pending::<()>());
        handle.abort();
        ReturnValue::new(handle)
    });
    assert_eq!(fault_of(outcome).category(), FaultCategory::Cancelled);
}

#[rstest]
fn fallible_tasks_return_their_own_fault(context: Arc<TestExecutionContext>, runtime: Runtime) {
    expose_fallible_join_handle::<u16>();
    let original = Fault::from(std::io::Error::other("task refused"));
    let raised = original.clone();
    let outcome = AsyncToSync::await_value(&context, || {
        ReturnValue::new(runtime.spawn(async move { Err::<u16, Fault>(raised) }))
    });
    assert!(Fault::ptr_eq(&fault_of(outcome), &original));
}

#[test]
fn join_handles_become_async_once_exposed() {
    install();
    assert!(!AsyncToSync::is_async::<JoinHandle<Instant>>());
    expose_join_handle::<Instant>();
    assert!(AsyncToSync::is_async::<JoinHandle<Instant>>());
}
