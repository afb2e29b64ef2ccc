//! Test descriptors, actions, and dispatchers consumed by the execution core.

use std::fmt;
use std::sync::Arc;

use ambit_pump::{Fault, WorkItem};

/// Identity of the test a context is running.
#[derive(Clone, Debug, PartialEq, Eq, Hash)]
pub struct TestInfo {
    id: String,
    name: String,
    full_name: String,
    seed: u64,
}

impl TestInfo {
    /// Creates a descriptor. The short name is the last dotted segment of
    /// `full_name`.
    ///
    /// # Examples
    ///
    /// ```
    /// use ambit::model::TestInfo;
    ///
    /// let test = TestInfo::new("1001", "Maths.Adds").with_seed(7);
    /// assert_eq!(test.name(), "Adds");
    /// assert_eq!(test.seed(), 7);
    /// ```
    #[must_use]
    pub fn new(id: impl Into<String>, full_name: impl Into<String>) -> Self {
        let full_name = full_name.into();
        let name = full_name
            .rsplit('.')
            .next()
            .unwrap_or(full_name.as_str())
            .to_owned();
        Self {
            id: id.into(),
            name,
            full_name,
            seed: 0,
        }
    }

    /// Copy with the random seed used for this test.
    #[must_use]
    pub fn with_seed(self, seed: u64) -> Self {
        Self { seed, ..self }
    }

    /// Unique identifier assigned by the runner.
    #[must_use]
    pub fn id(&self) -> &str {
        &self.id
    }

    /// Short name.
    #[must_use]
    pub fn name(&self) -> &str {
        &self.name
    }

    /// Fully qualified name.
    #[must_use]
    pub fn full_name(&self) -> &str {
        &self.full_name
    }

    /// Seed for the test's randomizer.
    #[must_use]
    pub fn seed(&self) -> u64 {
        self.seed
    }
}

impl fmt::Display for TestInfo {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.full_name)
    }
}

/// Hook run around every test beneath the item that declared it.
pub trait TestAction: Send + Sync {
    /// Runs before the test body.
    ///
    /// # Errors
    ///
    /// A fault stops the test; it is recorded on the test's result.
    fn before_test(&self, test: &TestInfo) -> Result<(), Fault>;

    /// Runs after the test body, in reverse registration order.
    ///
    /// # Errors
    ///
    /// A fault is recorded on the test's result.
    fn after_test(&self, test: &TestInfo) -> Result<(), Fault>;
}

/// Schedules work items for the runner.
pub trait WorkItemDispatcher: Send + Sync {
    /// Short name used in diagnostics.
    fn name(&self) -> &str;

    /// Hands `work` to the dispatcher.
    fn dispatch(&self, work: WorkItem);
}

/// Dispatcher that runs every item on the calling thread.
#[derive(Clone, Copy, Debug, Default)]
pub struct InlineDispatcher;

impl WorkItemDispatcher for InlineDispatcher {
    fn name(&self) -> &str {
        "inline"
    }

    fn dispatch(&self, work: WorkItem) {
        work();
    }
}

/// Dispatcher that runs items on the `rayon` global pool.
#[derive(Clone, Copy, Debug, Default)]
pub struct PoolDispatcher;

impl WorkItemDispatcher for PoolDispatcher {
    fn name(&self) -> &str {
        "pool"
    }

    fn dispatch(&self, work: WorkItem) {
        rayon::spawn(work);
    }
}

/// Shared handle to a dispatcher.
pub type SharedDispatcher = Arc<dyn WorkItemDispatcher>;

#[cfg(test)]
mod tests {
    //! Unit tests for descriptors and dispatchers.

    use super::{InlineDispatcher, PoolDispatcher, TestInfo, WorkItemDispatcher};
    use std::sync::mpsc;
    use std::time::Duration;

    #[test]
    fn names_without_dots_are_kept_whole() {
        let test = TestInfo::new("1", "standalone");
        assert_eq!(test.name(), "standalone");
        assert_eq!(test.to_string(), "standalone");
    }

    #[test]
    fn dispatchers_run_their_work() {
        let (tx, rx) = mpsc::channel();
        let inline_tx = tx.clone();
        InlineDispatcher.dispatch(Box::new(move || {
            let _ = inline_tx.send("inline");
        }));
        assert_eq!(rx.try_recv().ok(), Some("inline"));
        PoolDispatcher.dispatch(Box::new(move || {
            let _ = tx.send("pool");
        }));
        assert_eq!(rx.recv_timeout(Duration::from_secs(5)).ok(), Some("pool"));
    }
}
