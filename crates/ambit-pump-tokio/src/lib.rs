//! Tokio support for the `ambit` execution core.
//!
//! [`TokioLoopContext`] runs posted work inside a current-thread Tokio
//! runtime on the waiting thread, and [`TokioPump`] keeps that loop turning
//! until an awaited value completes. [`expose_join_handle`] makes
//! [`tokio::task::JoinHandle`] awaitable for [`ambit::AsyncToSync`].

mod join_handle;
mod loop_context;
mod pump;

pub use join_handle::{expose_fallible_join_handle, expose_join_handle, install};
pub use loop_context::TokioLoopContext;
pub use pump::TokioPump;

/// Name the Tokio pump reports in diagnostics.
pub const PUMP_NAME: &str = "tokio";
