//! Message pump strategies.
//!
//! A pump decides how the calling thread waits for an adapter to complete.
//! Pumps tied to a particular synchronization context keep that context
//! processing work while the thread waits.

use thiserror::Error;

use crate::awaiter::AwaitAdapter;
use crate::fault::Fault;
use crate::sync_context::SyncContext;

/// Errors raised by pump implementations.
#[derive(Debug, Error)]
#[non_exhaustive]
pub enum PumpError {
    /// The pump was asked to wait on a thread running a different context.
    #[error("{pump} requires a {expected} context but found {actual}")]
    WrongContext {
        /// Name of the pump that was invoked.
        pump: &'static str,
        /// Type name of the context the pump drives.
        expected: &'static str,
        /// Type name of the installed context, or `none`.
        actual: &'static str,
    },
    /// The framework loop could not be started.
    #[error("{pump} failed to start its loop: {reason}")]
    LoopUnavailable {
        /// Name of the pump that was invoked.
        pump: &'static str,
        /// Description of the failure.
        reason: String,
    },
}

/// Strategy for waiting on an adapter from a blocking caller.
pub trait MessagePump: Send + Sync {
    /// Short name used in diagnostics.
    fn name(&self) -> &'static str;

    /// Returns `true` when this pump can drive the given underlying context.
    fn accepts(&self, context: Option<&dyn SyncContext>) -> bool;

    /// Blocks until `adapter` completes, keeping the context's loop alive.
    ///
    /// # Errors
    ///
    /// Returns a fault when the pump cannot drive the installed context.
    fn wait_for_completion(&self, adapter: &dyn AwaitAdapter) -> Result<(), Fault>;
}

/// Pump that blocks the thread without processing any messages.
///
/// It accepts every context and is used as the fallback.
#[derive(Clone, Copy, Debug, Default)]
pub struct NoPump;

impl MessagePump for NoPump {
    fn name(&self) -> &'static str {
        "no-pump"
    }

    fn accepts(&self, _context: Option<&dyn SyncContext>) -> bool {
        true
    }

    fn wait_for_completion(&self, adapter: &dyn AwaitAdapter) -> Result<(), Fault> {
        adapter.block_until_completed();
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    //! Unit tests for the fallback pump.

    use super::{MessagePump, NoPump};
    use crate::awaiter::{AwaitAdapter, Continuation, Outcome};
    use std::sync::atomic::{AtomicUsize, Ordering};

    #[derive(Default)]
    struct Counting {
        blocks: AtomicUsize,
    }

    impl AwaitAdapter for Counting {
        fn is_completed(&self) -> bool {
            true
        }

        fn on_completed(&self, continuation: Continuation) {
            continuation();
        }

        fn block_until_completed(&self) {
            self.blocks.fetch_add(1, Ordering::SeqCst);
        }

        fn get_result(&self) -> Outcome {
            Ok(None)
        }
    }

    #[test]
    fn no_pump_accepts_everything_and_blocks() {
        let adapter = Counting::default();
        assert!(NoPump.accepts(None));
        assert!(NoPump.wait_for_completion(&adapter).is_ok());
        assert_eq!(adapter.blocks.load(Ordering::SeqCst), 1);
    }
}
