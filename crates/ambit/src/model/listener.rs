//! The listener contract used to report progress and messages.

use super::{TestInfo, TestResult};

/// Message sent from a running test to a named destination.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct TestMessage {
    /// Destination the message is addressed to.
    pub destination: String,
    /// Message text.
    pub text: String,
    /// Identifier of the test that sent it, empty outside a test.
    pub test_id: String,
}

/// Receives events from the execution core.
///
/// Every method has an empty default so listeners implement only what they
/// need.
pub trait TestListener: Send + Sync {
    /// A test is about to run.
    fn test_started(&self, _test: &TestInfo) {}

    /// A test has finished and its result is final.
    fn test_finished(&self, _result: &TestResult) {}

    /// A test sent a message.
    fn send_message(&self, _message: TestMessage) {}
}

/// Listener that ignores every event.
#[derive(Clone, Copy, Debug, Default)]
pub struct NullListener;

impl TestListener for NullListener {}
