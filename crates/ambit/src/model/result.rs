//! Test results and the assertion records they accumulate.

use std::sync::{Mutex, MutexGuard, PoisonError};
use std::time::SystemTime;

use ambit_pump::{Fault, FaultCategory};

use crate::localization;

/// Overall outcome of a test.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq, Hash)]
pub enum ResultState {
    /// No outcome has been decided yet.
    #[default]
    Inconclusive,
    /// Every assertion passed.
    Success,
    /// At least one assertion failed.
    Failure,
    /// The test raised an error or the framework recorded one against it.
    Error,
    /// The test was cancelled before finishing.
    Cancelled,
}

impl ResultState {
    /// Localised label for the state.
    #[must_use]
    pub fn label(self) -> String {
        let id = match self {
            Self::Inconclusive => "result-state-inconclusive",
            Self::Success => "result-state-success",
            Self::Failure => "result-state-failure",
            Self::Error => "result-state-error",
            Self::Cancelled => "result-state-cancelled",
        };
        localization::message(id)
    }
}

/// Outcome of one assertion, or of a framework check recorded like one.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash)]
pub enum AssertionStatus {
    /// The assertion could not decide.
    Inconclusive,
    /// The assertion held.
    Passed,
    /// The assertion raised a warning.
    Warning,
    /// The assertion did not hold.
    Failed,
    /// An error occurred while evaluating or running the test.
    Error,
}

/// Record of one assertion against a result.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct AssertionResult {
    /// Outcome of the assertion.
    pub status: AssertionStatus,
    /// Message describing the outcome.
    pub message: String,
    /// Stack trace captured when the assertion was recorded.
    pub stack_trace: Option<String>,
}

impl AssertionResult {
    /// Creates a record without a stack trace.
    #[must_use]
    pub fn new(status: AssertionStatus, message: impl Into<String>) -> Self {
        Self {
            status,
            message: message.into(),
            stack_trace: None,
        }
    }
}

#[derive(Debug, Default)]
struct ResultRecord {
    state: ResultState,
    message: Option<String>,
    stack_trace: Option<String>,
    assertions: Vec<AssertionResult>,
    faults: Vec<Fault>,
    output: String,
    assert_count: usize,
    end_time: Option<SystemTime>,
    completed: bool,
}

/// Mutable outcome of one test, shared between the runner and the contexts
/// that record into it.
///
/// # Examples
///
/// ```
/// use ambit::model::{AssertionResult, AssertionStatus, ResultState, TestResult};
///
/// let result = TestResult::new("suite.adds");
/// result.record_assertion(AssertionResult::new(AssertionStatus::Failed, "1 != 2"));
/// result.record_test_completion();
/// assert_eq!(result.result_state(), ResultState::Failure);
/// assert_eq!(result.message().as_deref(), Some("1 != 2"));
/// ```
#[derive(Debug)]
pub struct TestResult {
    test_name: String,
    record: Mutex<ResultRecord>,
}

impl TestResult {
    /// Creates an inconclusive result for the test named `test_name`.
    #[must_use]
    pub fn new(test_name: impl Into<String>) -> Self {
        Self {
            test_name: test_name.into(),
            record: Mutex::new(ResultRecord::default()),
        }
    }

    fn lock(&self) -> MutexGuard<'_, ResultRecord> {
        self.record.lock().unwrap_or_else(PoisonError::into_inner)
    }

    /// Full name of the test this result belongs to.
    #[must_use]
    pub fn test_name(&self) -> &str {
        &self.test_name
    }

    /// Current outcome.
    #[must_use]
    pub fn result_state(&self) -> ResultState {
        self.lock().state
    }

    /// Message attached to the outcome, if any.
    #[must_use]
    pub fn message(&self) -> Option<String> {
        self.lock().message.clone()
    }

    /// Stack trace attached to the outcome, if any.
    #[must_use]
    pub fn stack_trace(&self) -> Option<String> {
        self.lock().stack_trace.clone()
    }

    /// Assertions recorded so far.
    #[must_use]
    pub fn assertion_results(&self) -> Vec<AssertionResult> {
        self.lock().assertions.clone()
    }

    /// Faults recorded so far, in the order they arrived.
    #[must_use]
    pub fn recorded_faults(&self) -> Vec<Fault> {
        self.lock().faults.clone()
    }

    /// Output written to the result.
    #[must_use]
    pub fn output(&self) -> String {
        self.lock().output.clone()
    }

    /// Number of assertions counted for the test.
    #[must_use]
    pub fn assert_count(&self) -> usize {
        self.lock().assert_count
    }

    /// Time the result was completed.
    #[must_use]
    pub fn end_time(&self) -> Option<SystemTime> {
        self.lock().end_time
    }

    /// Returns `true` once [`TestResult::record_test_completion`] has run.
    #[must_use]
    pub fn is_completed(&self) -> bool {
        self.lock().completed
    }

    /// Sets the outcome and message directly.
    pub fn set_result(&self, state: ResultState, message: Option<String>) {
        let mut record = self.lock();
        record.state = state;
        record.message = message;
    }

    /// Stores the assertion count reported by the execution context.
    pub fn set_assert_count(&self, count: usize) {
        self.lock().assert_count = count;
    }

    /// Appends `text` to the captured output.
    pub fn write_output(&self, text: &str) {
        self.lock().output.push_str(text);
    }

    /// Removes and returns the captured output.
    #[must_use]
    pub fn take_output(&self) -> String {
        std::mem::take(&mut self.lock().output)
    }

    /// Records an assertion outcome.
    pub fn record_assertion(&self, assertion: AssertionResult) {
        self.lock().assertions.push(assertion);
    }

    /// Records a fault raised by the test or on its behalf.
    ///
    /// Cancellation faults mark the result cancelled; every other fault marks
    /// it as an error. The fault itself is kept so callers can check its
    /// identity later.
    pub fn record_exception(&self, fault: &Fault) {
        let state = if fault.category() == FaultCategory::Cancelled {
            ResultState::Cancelled
        } else {
            ResultState::Error
        };
        let mut record = self.lock();
        record.state = state;
        record.message = Some(fault.message());
        record.stack_trace = Some(fault.backtrace().to_string());
        record.faults.push(fault.clone());
    }

    /// Finalises the outcome from the recorded assertions.
    ///
    /// An outcome already decided by [`TestResult::record_exception`] or
    /// [`TestResult::set_result`] is kept; otherwise the worst recorded
    /// assertion decides it.
    pub fn record_test_completion(&self) {
        let mut record = self.lock();
        if record.state == ResultState::Inconclusive {
            let worst = worst_assertion(&record.assertions).cloned();
            record.state = match worst.as_ref().map(|a| a.status) {
                Some(AssertionStatus::Error) => ResultState::Error,
                Some(AssertionStatus::Failed) => ResultState::Failure,
                Some(AssertionStatus::Inconclusive) => ResultState::Inconclusive,
                Some(AssertionStatus::Passed | AssertionStatus::Warning) | None => {
                    ResultState::Success
                }
            };
            if record.message.is_none() && record.state != ResultState::Success {
                record.message = worst.map(|a| a.message);
            }
        }
        record.end_time = Some(SystemTime::now());
        record.completed = true;
    }
}

fn severity(status: AssertionStatus) -> u8 {
    match status {
        AssertionStatus::Passed => 0,
        AssertionStatus::Warning => 1,
        AssertionStatus::Inconclusive => 2,
        AssertionStatus::Failed => 3,
        AssertionStatus::Error => 4,
    }
}

fn worst_assertion(assertions: &[AssertionResult]) -> Option<&AssertionResult> {
    assertions
        .iter()
        .rev()
        .max_by_key(|assertion| severity(assertion.status))
}
