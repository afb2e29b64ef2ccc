//! Isolated child contexts.

use std::marker::PhantomData;
use std::rc::Rc;
use std::sync::Arc;

use super::TestExecutionContext;
use crate::model::TestResult;

/// Scope that runs code in a child of the current context.
///
/// On entry the current context is captured and a child is installed. When
/// the child has a test it gets a fresh result, so assertions made inside the
/// scope do not reach the enclosing result. On drop, including during
/// unwinding, output written to the child's result is appended to the
/// parent's result and the parent is established again.
///
/// # Examples
///
/// ```
/// use ambit::context::{IsolatedContext, TestExecutionContext};
/// use std::sync::Arc;
///
/// let outer = TestExecutionContext::current();
/// {
///     let isolated = IsolatedContext::enter();
///     isolated.context().increment_assert_count();
///     assert!(!Arc::ptr_eq(&TestExecutionContext::current(), &outer));
/// }
/// assert!(Arc::ptr_eq(&TestExecutionContext::current(), &outer));
/// assert_eq!(outer.assert_count(), 0);
/// ```
#[must_use = "dropping the scope restores the enclosing context immediately"]
pub struct IsolatedContext {
    prior: Arc<TestExecutionContext>,
    child: Arc<TestExecutionContext>,
    _not_send: PhantomData<Rc<()>>,
}

impl IsolatedContext {
    /// Installs a child of the current context.
    pub fn enter() -> Self {
        let prior = TestExecutionContext::current();
        let child = TestExecutionContext::child_of(&prior);
        if let Some(test) = child.current_test() {
            child.set_current_result(Some(Arc::new(TestResult::new(test.full_name()))));
        }
        child.establish_execution_environment();
        log::debug!("entered isolated execution context");
        Self {
            prior,
            child,
            _not_send: PhantomData,
        }
    }

    /// Child context active inside the scope.
    #[must_use]
    pub fn context(&self) -> &Arc<TestExecutionContext> {
        &self.child
    }

    /// Context that will be restored when the scope ends.
    #[must_use]
    pub fn prior(&self) -> &Arc<TestExecutionContext> {
        &self.prior
    }
}

impl Drop for IsolatedContext {
    fn drop(&mut self) {
        if let (Some(child_result), Some(parent_result)) =
            (self.child.current_result(), self.prior.current_result())
        {
            if !Arc::ptr_eq(&child_result, &parent_result) {
                let output = child_result.take_output();
                if !output.is_empty() {
                    parent_result.write_output(&output);
                }
            }
        }
        self.prior.establish_execution_environment();
    }
}
