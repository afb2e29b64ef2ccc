//! Execution core for unit-testing frameworks.
//!
//! `ambit` runs test methods synchronously whatever their asynchronous
//! style, and manages the per-test ambient state they run under.
//!
//! - [`shape`] detects whether a returned value is awaitable and picks an
//!   adapter for it; [`adapter`] holds the adapters themselves.
//! - [`AsyncToSync`] invokes a delegate and blocks until the value it
//!   returns completes, pumping the thread's synchronization context when
//!   required ([`pump`], [`single_threaded`], [`safe_context`]).
//! - [`context`] holds [`TestExecutionContext`], the chain of per-test
//!   contexts, with its isolated and ad-hoc variants; [`sandbox`] and
//!   [`ambient`] cover the thread properties a context captures.
//! - [`TestInvoker`] ties these together to run a single test.
//!
//! Runners plug in through the contracts in [`model`].

pub mod adapter;
pub mod ambient;
mod async_to_sync;
pub mod config;
pub mod context;
mod error;
mod invoke;
pub mod localization;
pub mod model;
pub mod pump;
pub mod randomizer;
pub mod safe_context;
pub mod sandbox;
pub mod shape;
pub mod single_threaded;

pub use async_to_sync::AsyncToSync;
pub use context::{IsolatedContext, TestExecutionContext};
pub use error::FrameworkError;
pub use invoke::TestInvoker;
pub use localization::LocalizationError;
pub use sandbox::SandboxedThreadState;
pub use shape::{ReturnValue, shapes};

#[doc(hidden)]
pub use inventory::submit;
