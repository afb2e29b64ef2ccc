//! Adapter for custom awaitables that follow the awaiter pattern.
//!
//! A type opts in by implementing [`Awaitable`] and publishing itself with
//! [`expose_awaitable!`](crate::expose_awaitable) or
//! [`ShapeRegistry::expose`](crate::shape::ShapeRegistry::expose).

use std::any::Any;
use std::sync::atomic::{AtomicBool, Ordering};

use ambit_pump::{AwaitAdapter, CompletionGate, Continuation, Fault, Outcome};

use super::task::box_result;
use crate::error::FrameworkError;

/// Value that hands out an [`Awaiter`] for the operation it represents.
pub trait Awaitable: Send + 'static {
    /// Awaiter tracking the operation.
    type Awaiter: Awaiter;

    /// Produces the awaiter.
    fn get_awaiter(self) -> Self::Awaiter;
}

/// Completion, continuation, and result access for one operation.
pub trait Awaiter: Send + Sync + 'static {
    /// Value produced on success.
    type Output: Any + Send;

    /// Returns `true` once the operation has finished.
    fn is_completed(&self) -> bool;

    /// Registers a continuation to run when the operation finishes.
    fn on_completed(&self, continuation: Continuation);

    /// Takes the result of a finished operation.
    ///
    /// # Errors
    ///
    /// Returns the fault that ended the operation.
    fn get_result(&self) -> Result<Self::Output, Fault>;
}

/// Await adapter over an [`Awaiter`].
///
/// Blocking goes through a [`CompletionGate`], so however many threads wait
/// the awaiter sees a single continuation registration.
pub struct PatternAdapter<W> {
    awaiter: W,
    gate: CompletionGate,
    taken: AtomicBool,
}

impl<W> PatternAdapter<W>
where
    W: Awaiter,
{
    /// Adapts `awaiter`.
    #[must_use]
    pub const fn new(awaiter: W) -> Self {
        Self {
            awaiter,
            gate: CompletionGate::new(),
            taken: AtomicBool::new(false),
        }
    }

    /// Adapts the awaiter of `awaitable`.
    #[must_use]
    pub fn from_awaitable<A>(awaitable: A) -> Self
    where
        A: Awaitable<Awaiter = W>,
    {
        Self::new(awaitable.get_awaiter())
    }
}

impl<W> AwaitAdapter for PatternAdapter<W>
where
    W: Awaiter,
{
    fn is_completed(&self) -> bool {
        self.awaiter.is_completed()
    }

    fn on_completed(&self, continuation: Continuation) {
        self.awaiter.on_completed(continuation);
    }

    fn block_until_completed(&self) {
        self.gate.wait(self);
    }

    fn get_result(&self) -> Outcome {
        self.block_until_completed();
        if self.taken.swap(true, Ordering::AcqRel) {
            return Err(Fault::from(FrameworkError::ResultConsumed));
        }
        self.awaiter
            .get_result()
            .map(box_result)
            .map_err(Fault::first_inner)
    }
}
