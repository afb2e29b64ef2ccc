//! Synchronization context backed by a Tokio current-thread runtime.

use std::any::Any;
use std::fmt;
use std::sync::mpsc::sync_channel;
use std::sync::{Arc, Mutex, MutexGuard, PoisonError};
use std::thread::{self, ThreadId};

use ambit_pump::{Fault, PumpError, SyncContext, WorkItem};
use tokio::sync::mpsc::{UnboundedReceiver, UnboundedSender, unbounded_channel};
use tokio::task::LocalSet;

use crate::PUMP_NAME;

enum LoopMessage {
    Work(WorkItem),
    Exit,
}

/// Synchronization context whose work runs inside a Tokio runtime on the
/// thread pumping it.
///
/// Work is queued on an unbounded channel. [`TokioLoopContext::pump`] drives
/// a fresh current-thread runtime with a [`LocalSet`] and executes queued
/// work in order until an exit request arrives, so work items can spawn
/// local tasks and reach the runtime handle.
pub struct TokioLoopContext {
    sender: UnboundedSender<LoopMessage>,
    receiver: Mutex<Option<UnboundedReceiver<LoopMessage>>>,
    loop_thread: Mutex<Option<ThreadId>>,
}

impl TokioLoopContext {
    /// Creates an idle loop.
    #[must_use]
    pub fn new() -> Self {
        let (sender, receiver) = unbounded_channel();
        Self {
            sender,
            receiver: Mutex::new(Some(receiver)),
            loop_thread: Mutex::new(None),
        }
    }

    fn thread_slot(&self) -> MutexGuard<'_, Option<ThreadId>> {
        self.loop_thread
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
    }

    /// Returns `true` when called from the thread pumping the loop.
    #[must_use]
    pub fn is_loop_thread(&self) -> bool {
        *self.thread_slot() == Some(thread::current().id())
    }

    /// Asks the pumping thread to stop after the work already queued.
    ///
    /// # Errors
    ///
    /// Returns [`PumpError::LoopUnavailable`] when the loop has been dropped.
    pub fn request_exit(&self) -> Result<(), Fault> {
        self.enqueue(LoopMessage::Exit)
    }

    fn enqueue(&self, message: LoopMessage) -> Result<(), Fault> {
        self.sender.send(message).map_err(|_| {
            Fault::from(PumpError::LoopUnavailable {
                pump: PUMP_NAME,
                reason: "the loop's receiver has been dropped".to_owned(),
            })
        })
    }

    /// Runs queued work on the calling thread until an exit request.
    ///
    /// The loop can be pumped again afterwards; work queued after the exit
    /// request waits for the next pump.
    ///
    /// # Errors
    ///
    /// Returns [`PumpError::LoopUnavailable`] when another thread is pumping
    /// the loop or the runtime cannot be built.
    pub fn pump(&self) -> Result<(), Fault> {
        let mut receiver = self
            .receiver
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .take()
            .ok_or_else(|| unavailable("the loop is already being pumped"))?;
        let runtime = match tokio::runtime::Builder::new_current_thread()
            .enable_all()
            .build()
        {
            Ok(runtime) => runtime,
            Err(error) => {
                self.restore(receiver);
                return Err(unavailable(&error.to_string()));
            }
        };

        *self.thread_slot() = Some(thread::current().id());
        LocalSet::new().block_on(&runtime, async {
            while let Some(message) = receiver.recv().await {
                match message {
                    LoopMessage::Work(work) => {
                        if let Err(fault) = Fault::catch(work) {
                            log::error!("work posted to the Tokio loop failed: {fault}");
                        }
                    }
                    LoopMessage::Exit => break,
                }
                tokio::task::yield_now().await;
            }
        });
        *self.thread_slot() = None;
        self.restore(receiver);
        Ok(())
    }

    fn restore(&self, receiver: UnboundedReceiver<LoopMessage>) {
        *self
            .receiver
            .lock()
            .unwrap_or_else(PoisonError::into_inner) = Some(receiver);
    }
}

fn unavailable(reason: &str) -> Fault {
    Fault::from(PumpError::LoopUnavailable {
        pump: PUMP_NAME,
        reason: reason.to_owned(),
    })
}

impl Default for TokioLoopContext {
    fn default() -> Self {
        Self::new()
    }
}

impl SyncContext for TokioLoopContext {
    fn post(&self, work: WorkItem) -> Result<(), Fault> {
        self.enqueue(LoopMessage::Work(work))
    }

    fn send(&self, work: WorkItem) -> Result<(), Fault> {
        if self.is_loop_thread() {
            return Fault::catch(work);
        }
        let (completion, done) = sync_channel(1);
        self.enqueue(LoopMessage::Work(Box::new(move || {
            let _ = completion.send(Fault::catch(work));
        })))?;
        done.recv()
            .unwrap_or_else(|_| Err(Fault::cancelled_with("the Tokio loop dropped sent work")))
    }

    fn as_any(&self) -> &dyn Any {
        self
    }

    fn into_any_arc(self: Arc<Self>) -> Arc<dyn Any + Send + Sync> {
        self
    }
}

impl fmt::Debug for TokioLoopContext {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("TokioLoopContext")
            .field("loop_thread", &*self.thread_slot())
            .finish_non_exhaustive()
    }
}
