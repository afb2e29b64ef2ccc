//! Awaitable shape for Tokio [`JoinHandle`]s.

use std::any::type_name;
use std::sync::{Arc, Once};

use ambit::adapter::{Task, TaskAdapter};
use ambit::pump::pumps;
use ambit::shape::{ExposedMembers, TypeMeta, WorkflowProbe};
use ambit::shapes;
use ambit_pump::{AnyValue, AwaitAdapter, Fault};
use tokio::task::{JoinError, JoinHandle};

use crate::pump::TokioPump;

static INSTALL: Once = Once::new();

/// Registers the `JoinHandle` probe and the [`TokioPump`].
///
/// Safe to call more than once; registration happens on the first call.
pub fn install() {
    INSTALL.call_once(|| {
        let definition = TypeMeta::of::<JoinHandle<()>>().generic_definition();
        log::debug!("registering the Tokio workflow probe for {definition}");
        shapes().add_probe(Arc::new(WorkflowProbe::new(definition)));
        pumps().register(Arc::new(TokioPump));
    });
}

/// Makes `JoinHandle<T>` awaitable, producing the task's `T`.
///
/// A panicking task fails with its panic message; an aborted task fails with
/// a cancellation fault.
pub fn expose_join_handle<T>()
where
    T: Send + 'static,
{
    install();
    shapes().expose(
        ExposedMembers::workflow::<JoinHandle<T>>(adapt_join_handle::<T>)
            .with_result_type(type_name::<T>),
    );
}

/// Makes `JoinHandle<Result<T, Fault>>` awaitable, producing `T` or the
/// task's own fault.
pub fn expose_fallible_join_handle<T>()
where
    T: Send + 'static,
{
    install();
    shapes().expose(
        ExposedMembers::workflow::<JoinHandle<Result<T, Fault>>>(adapt_fallible_join_handle::<T>)
            .with_result_type(type_name::<T>),
    );
}

fn adapt_join_handle<T>(value: AnyValue) -> Result<Box<dyn AwaitAdapter>, AnyValue>
where
    T: Send + 'static,
{
    let handle = *value.downcast::<JoinHandle<T>>()?;
    let task = Task::new(async move { handle.await.map_err(join_fault) });
    Ok(Box::new(TaskAdapter::new(task)))
}

fn adapt_fallible_join_handle<T>(value: AnyValue) -> Result<Box<dyn AwaitAdapter>, AnyValue>
where
    T: Send + 'static,
{
    let handle = *value.downcast::<JoinHandle<Result<T, Fault>>>()?;
    let task = Task::new(async move { handle.await.map_err(join_fault)? });
    Ok(Box::new(TaskAdapter::new(task)))
}

/// Maps a failed join onto the fault a synchronous caller expects.
fn join_fault(error: JoinError) -> Fault {
    if error.is_cancelled() {
        return Fault::cancelled_with("the tokio task was aborted");
    }
    match error.try_into_panic() {
        Ok(payload) => Fault::from_panic(payload),
        Err(error) => Fault::from(error),
    }
}

#[cfg(test)]
mod tests {
    //! Unit tests for join failure mapping.

    use super::*;
    use ambit_pump::FaultCategory;

    #[test]
    fn aborted_joins_become_cancellations() {
        let runtime = tokio::runtime::Builder::new_current_thread()
            .build()
            .unwrap_or_else(|error| panic!("runtime failed to build: {error}"));
        let error = runtime.block_on(async {
            let handle = tokio::spawn(std::future::pending::<()>());
            handle.abort();
            handle
                .await
                .err()
                .unwrap_or_else(|| panic!("aborted task must not complete"))
        });
        assert_eq!(join_fault(error).category(), FaultCategory::Cancelled);
    }

    fn explode() {
        panic!("joined task exploded");
    }

    #[test]
    fn panicking_joins_keep_the_message() {
        let runtime = tokio::runtime::Builder::new_current_thread()
            .build()
            .unwrap_or_else(|error| panic!("runtime failed to build: {error}"));
        let error = runtime.block_on(async {
            tokio::spawn(async { explode() })
                .await
                .err()
                .unwrap_or_else(|| panic!("panicking task must not complete"))
        });
        let fault = join_fault(error);
        assert_eq!(fault.category(), FaultCategory::Panic);
        assert_eq!(fault.message(), "joined task exploded");
    }
}
