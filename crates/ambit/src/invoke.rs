//! Runs one test method under its execution context.

use std::sync::Arc;

use ambit_pump::Fault;

use crate::async_to_sync::AsyncToSync;
use crate::context::{ADHOC_TEST_NAME, ExecutionStatus, TestExecutionContext};
use crate::error::FrameworkError;
use crate::model::{ResultState, TestAction, TestInfo, TestResult};
use crate::shape::ReturnValue;

/// Invokes test methods and records their outcome.
///
/// # Examples
///
/// ```
/// use std::sync::Arc;
/// use ambit::TestInvoker;
/// use ambit::adapter::Task;
/// use ambit::context::TestExecutionContext;
/// use ambit::model::{ResultState, TestInfo};
/// use ambit::shape::ReturnValue;
///
/// let context = TestExecutionContext::new();
/// context.set_current_test(Some(Arc::new(TestInfo::new("1", "suite.answers"))));
/// let result = TestInvoker::new(context).run(|| ReturnValue::new(Task::from_value(42_i32)));
/// assert_eq!(result.result_state(), ResultState::Success);
/// ```
#[derive(Debug)]
pub struct TestInvoker {
    context: Arc<TestExecutionContext>,
}

impl TestInvoker {
    /// Invoker running tests under `context`.
    #[must_use]
    pub fn new(context: Arc<TestExecutionContext>) -> Self {
        Self { context }
    }

    /// Context the invoker runs under.
    #[must_use]
    pub fn context(&self) -> &Arc<TestExecutionContext> {
        &self.context
    }

    /// Runs `method` as the context's current test and returns its result.
    ///
    /// Awaitable return values are waited for; any other value, including
    /// `()`, counts as a synchronous success.
    ///
    /// Upstream actions run before the method in registration order and
    /// after it in reverse. A failed `before_test` skips the method and the
    /// remaining actions, but the actions that already ran still get their
    /// `after_test`. When a stop or abort has been requested the method is
    /// not invoked and the result is marked cancelled.
    pub fn run<F>(&self, method: F) -> Arc<TestResult>
    where
        F: FnOnce() -> ReturnValue,
    {
        let context = &self.context;
        let test = context
            .current_test()
            .unwrap_or_else(|| Arc::new(TestInfo::new(ADHOC_TEST_NAME, ADHOC_TEST_NAME)));
        let result = context.current_result().unwrap_or_else(|| {
            let fresh = Arc::new(TestResult::new(test.full_name()));
            context.set_current_result(Some(Arc::clone(&fresh)));
            fresh
        });

        let _scope = context.enter();
        context.mark_started();
        let listener = context.listener();
        listener.test_started(&test);

        let status = context.execution_status();
        if status == ExecutionStatus::Running {
            self.invoke(&test, &result, method);
        } else {
            let stopped = FrameworkError::ExecutionStopped {
                status,
                test_name: test.full_name().to_owned(),
            };
            log::debug!("{stopped}");
            result.set_result(ResultState::Cancelled, Some(stopped.to_string()));
        }

        result.set_assert_count(context.assert_count());
        result.record_test_completion();
        if context.stop_on_error()
            && matches!(
                result.result_state(),
                ResultState::Error | ResultState::Failure
            )
        {
            context.set_execution_status(ExecutionStatus::StopRequested);
        }
        listener.test_finished(&result);
        result
    }

    fn invoke<F>(&self, test: &TestInfo, result: &TestResult, method: F)
    where
        F: FnOnce() -> ReturnValue,
    {
        let actions = self.context.upstream_actions();
        let mut prepared: Vec<&Arc<dyn TestAction>> = Vec::with_capacity(actions.len());
        let mut ready = true;
        for action in &actions {
            match Fault::catch(|| action.before_test(test)).and_then(|outcome| outcome) {
                Ok(()) => prepared.push(action),
                Err(fault) => {
                    result.record_exception(&fault);
                    ready = false;
                    break;
                }
            }
        }

        if ready {
            if let Err(fault) = AsyncToSync::invoke(&self.context, method) {
                result.record_exception(&fault);
            }
        }

        for action in prepared.into_iter().rev() {
            if let Err(fault) = Fault::catch(|| action.after_test(test)).and_then(|outcome| outcome)
            {
                result.record_exception(&fault);
            }
        }
    }
}
