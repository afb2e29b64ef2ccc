//! Await adapters for the awaitable shapes the core understands.
//!
//! Every adapter implements [`AwaitAdapter`](ambit_pump::AwaitAdapter):
//!
//! - [`TaskAdapter`] drives an erased future ([`Task`]).
//! - [`ValueTaskAdapter`] handles a [`ValueTask`], which may already be
//!   complete.
//! - [`PatternAdapter`] wraps any type implementing [`Awaitable`].
//!
//! Framework plugins build their own adapters on top of [`TaskAdapter`].

mod pattern;
mod task;
mod value_task;

pub use pattern::{Awaitable, Awaiter, PatternAdapter};
pub use task::{Task, TaskAdapter};
pub use value_task::{AsValueTask, ValueTask, ValueTaskAdapter};
