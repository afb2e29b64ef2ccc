//! Contracts shared with the test runner.
//!
//! The runner owns test discovery and reporting; the execution core only
//! needs to know which test is running, where to record its outcome, where
//! to send messages, and how to dispatch work.

mod listener;
mod result;
mod test;

pub use listener::{NullListener, TestListener, TestMessage};
pub use result::{AssertionResult, AssertionStatus, ResultState, TestResult};
pub use test::{
    InlineDispatcher, PoolDispatcher, SharedDispatcher, TestAction, TestInfo, WorkItemDispatcher,
};
