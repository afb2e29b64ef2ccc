//! Message pump driving a [`TokioLoopContext`].

use std::sync::Arc;

use ambit_pump::{AwaitAdapter, Fault, MessagePump, SyncContext, installed};

use crate::PUMP_NAME;
use crate::loop_context::TokioLoopContext;

/// Pump that runs the installed [`TokioLoopContext`] until the awaited
/// adapter completes.
///
/// Completion queues an exit request behind any work already posted, so
/// continuations scheduled before completion still run on the loop.
#[derive(Clone, Copy, Debug, Default)]
pub struct TokioPump;

impl MessagePump for TokioPump {
    fn name(&self) -> &'static str {
        PUMP_NAME
    }

    fn accepts(&self, context: Option<&dyn SyncContext>) -> bool {
        context.is_some_and(|context| context.as_any().is::<TokioLoopContext>())
    }

    fn wait_for_completion(&self, adapter: &dyn AwaitAdapter) -> Result<(), Fault> {
        let context = installed::<TokioLoopContext>(self.name())?;
        let closing = Arc::clone(&context);
        adapter.on_completed(Box::new(move || {
            if let Err(fault) = closing.request_exit() {
                log::warn!("exit could not be requested from the Tokio loop: {fault}");
            }
        }));
        log::debug!("pumping the Tokio loop until the awaited value completes");
        context.pump()
    }
}
