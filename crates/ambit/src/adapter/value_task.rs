//! Value tasks: results that are usually ready but may still be pending.

use std::any::Any;

use ambit_pump::{AwaitAdapter, Continuation, Fault, Outcome};

use super::task::{Task, TaskAdapter, box_result};

/// Either an outcome that is already known or a task still running.
#[derive(Debug)]
pub enum ValueTask {
    /// The operation completed synchronously.
    Ready(Outcome),
    /// The operation is still running.
    Pending(Task),
}

impl ValueTask {
    /// Value task that has already produced `value`.
    pub fn ready<T>(value: T) -> Self
    where
        T: Any + Send,
    {
        Self::Ready(Ok(box_result(value)))
    }

    /// Value task that has already failed with `fault`.
    #[must_use]
    pub fn failed(fault: Fault) -> Self {
        Self::Ready(Err(fault))
    }

    /// Value task backed by a running task.
    #[must_use]
    pub fn from_task(task: Task) -> Self {
        Self::Pending(task)
    }

    /// Returns `true` when the outcome was known up front.
    #[must_use]
    pub fn is_ready(&self) -> bool {
        matches!(self, Self::Ready(_))
    }
}

impl From<Task> for ValueTask {
    fn from(task: Task) -> Self {
        Self::Pending(task)
    }
}

/// Await adapter over a [`ValueTask`].
///
/// # Examples
///
/// ```
/// use ambit::adapter::{ValueTask, ValueTaskAdapter};
/// use ambit_pump::AwaitAdapter;
///
/// let adapter = ValueTaskAdapter::new(ValueTask::ready("done"));
/// assert!(adapter.was_synchronous());
/// let value = adapter.get_result().unwrap().unwrap();
/// assert_eq!(value.downcast_ref::<&str>(), Some(&"done"));
/// ```
#[derive(Debug)]
pub struct ValueTaskAdapter {
    inner: TaskAdapter,
    synchronous: bool,
}

impl ValueTaskAdapter {
    /// Adapts `value_task`, starting it when it is still pending.
    #[must_use]
    pub fn new(value_task: ValueTask) -> Self {
        match value_task {
            ValueTask::Ready(outcome) => Self {
                inner: TaskAdapter::completed(outcome),
                synchronous: true,
            },
            ValueTask::Pending(task) => Self {
                inner: TaskAdapter::new(task),
                synchronous: false,
            },
        }
    }

    /// Returns `true` when the value task carried a ready outcome.
    #[must_use]
    pub fn was_synchronous(&self) -> bool {
        self.synchronous
    }
}

impl AwaitAdapter for ValueTaskAdapter {
    fn is_completed(&self) -> bool {
        self.inner.is_completed()
    }

    fn on_completed(&self, continuation: Continuation) {
        self.inner.on_completed(continuation);
    }

    fn block_until_completed(&self) {
        self.inner.block_until_completed();
    }

    fn get_result(&self) -> Outcome {
        self.inner.get_result()
    }
}

/// Types that can hand out a [`ValueTask`] for themselves.
pub trait AsValueTask: Send + 'static {
    /// Converts the value into the value task it wraps.
    fn as_value_task(self) -> ValueTask;
}
