//! Await adapter, synchronization context, and message pump contracts.
//!
//! This crate holds the pieces shared by the `ambit` execution core and its
//! runtime plugins: the [`Fault`] failure handle, the [`AwaitAdapter`]
//! blocking-wait contract with its [`CompletionGate`], the [`SyncContext`]
//! trait with the per-thread current-context slot, and the [`MessagePump`]
//! strategy trait with the [`NoPump`] fallback.

mod awaiter;
mod fault;
mod pump;
mod sync_context;

pub use awaiter::{AwaitAdapter, CompletionEvent, CompletionGate, Continuation, Outcome};
pub use fault::{AnyValue, Fault, FaultCategory, panic_message};
pub use pump::{MessagePump, NoPump, PumpError};
pub use sync_context::{
    ContextScope, SyncContext, WorkItem, current_context, installed, set_current_context,
    underlying_context,
};
