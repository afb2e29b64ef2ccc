//! The blocking-wait contract shared by every awaitable shape.

use std::sync::{Arc, Condvar, Mutex, OnceLock, PoisonError};

use crate::fault::{AnyValue, Fault};

/// Callback registered against an in-flight operation.
pub type Continuation = Box<dyn FnOnce() + Send>;

/// Terminal value of an awaited operation.
///
/// `Ok(None)` stands for a unit result; `Ok(Some(value))` carries the boxed
/// result value.
pub type Outcome = Result<Option<AnyValue>, Fault>;

/// Uniform view over one in-flight asynchronous operation.
///
/// Implementations move once from pending to completed. Continuations
/// registered after completion run immediately on the registering thread.
pub trait AwaitAdapter: Send + Sync {
    /// Returns `true` once the operation has produced a value or a fault.
    fn is_completed(&self) -> bool;

    /// Registers a continuation to run once the operation completes.
    fn on_completed(&self, continuation: Continuation);

    /// Blocks the calling thread until the operation has completed.
    fn block_until_completed(&self);

    /// Takes the result of the operation.
    ///
    /// Blocks first when the operation has not completed. The value can be
    /// taken once.
    ///
    /// # Errors
    ///
    /// Returns the original fault raised by the operation. Aggregate faults
    /// are unwrapped to their first inner fault.
    fn get_result(&self) -> Outcome;
}

/// Manual-reset event used to park waiting threads.
#[derive(Debug, Default)]
pub struct CompletionEvent {
    signalled: Mutex<bool>,
    ready: Condvar,
}

impl CompletionEvent {
    /// Creates an unsignalled event.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Signals the event and wakes every waiter.
    pub fn set(&self) {
        let mut signalled = self
            .signalled
            .lock()
            .unwrap_or_else(PoisonError::into_inner);
        *signalled = true;
        self.ready.notify_all();
    }

    /// Returns `true` when the event has been signalled.
    #[must_use]
    pub fn is_set(&self) -> bool {
        *self
            .signalled
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
    }

    /// Blocks until the event is signalled.
    pub fn wait(&self) {
        let mut signalled = self
            .signalled
            .lock()
            .unwrap_or_else(PoisonError::into_inner);
        while !*signalled {
            signalled = self
                .ready
                .wait(signalled)
                .unwrap_or_else(PoisonError::into_inner);
        }
    }
}

/// Default blocking strategy for adapters.
///
/// The gate creates its event lazily and registers exactly one continuation
/// with the adapter, however many threads race to wait.
///
/// # Examples
///
/// ```
/// use ambit_pump::{AwaitAdapter, CompletionGate, Continuation, Outcome};
///
/// struct Done;
///
/// impl AwaitAdapter for Done {
///     fn is_completed(&self) -> bool { true }
///     fn on_completed(&self, continuation: Continuation) { continuation(); }
///     fn block_until_completed(&self) {}
///     fn get_result(&self) -> Outcome { Ok(None) }
/// }
///
/// let gate = CompletionGate::new();
/// gate.wait(&Done);
/// assert!(!gate.is_armed());
/// ```
#[derive(Debug, Default)]
pub struct CompletionGate {
    event: OnceLock<Arc<CompletionEvent>>,
}

impl CompletionGate {
    /// Creates a gate with no event allocated.
    #[must_use]
    pub const fn new() -> Self {
        Self {
            event: OnceLock::new(),
        }
    }

    /// Returns `true` once a waiter has allocated the completion event.
    #[must_use]
    pub fn is_armed(&self) -> bool {
        self.event.get().is_some()
    }

    /// Blocks until `adapter` reports completion.
    pub fn wait(&self, adapter: &dyn AwaitAdapter) {
        if adapter.is_completed() {
            return;
        }
        let event = self.event.get_or_init(|| {
            let event = Arc::new(CompletionEvent::new());
            let signal = Arc::clone(&event);
            adapter.on_completed(Box::new(move || signal.set()));
            event
        });
        event.wait();
    }
}

#[cfg(test)]
mod tests {
    //! Unit tests for the completion gate.

    use super::{AwaitAdapter, CompletionGate, Continuation, Outcome};
    use std::sync::atomic::{AtomicBool, AtomicUsize, Ordering};
    use std::sync::{Arc, Mutex, PoisonError};
    use std::thread;
    use std::time::Duration;

    #[derive(Default)]
    struct Manual {
        completed: AtomicBool,
        registrations: AtomicUsize,
        continuations: Mutex<Vec<Continuation>>,
    }

    impl Manual {
        fn complete(&self) {
            self.completed.store(true, Ordering::SeqCst);
            let pending = std::mem::take(
                &mut *self
                    .continuations
                    .lock()
                    .unwrap_or_else(PoisonError::into_inner),
            );
            for continuation in pending {
                continuation();
            }
        }
    }

    impl AwaitAdapter for Manual {
        fn is_completed(&self) -> bool {
            self.completed.load(Ordering::SeqCst)
        }

        fn on_completed(&self, continuation: Continuation) {
            self.registrations.fetch_add(1, Ordering::SeqCst);
            let mut continuations = self
                .continuations
                .lock()
                .unwrap_or_else(PoisonError::into_inner);
            if self.is_completed() {
                drop(continuations);
                continuation();
            } else {
                continuations.push(continuation);
            }
        }

        fn block_until_completed(&self) {}

        fn get_result(&self) -> Outcome {
            Ok(None)
        }
    }

    #[test]
    fn racing_waiters_register_one_continuation() {
        let adapter = Arc::new(Manual::default());
        let gate = Arc::new(CompletionGate::new());
        let waiters: Vec<_> = (0..8)
            .map(|_| {
                let adapter = Arc::clone(&adapter);
                let gate = Arc::clone(&gate);
                thread::spawn(move || gate.wait(adapter.as_ref()))
            })
            .collect();
        while !gate.is_armed() {
            thread::sleep(Duration::from_millis(1));
        }
        thread::sleep(Duration::from_millis(20));
        adapter.complete();
        for waiter in waiters {
            waiter.join().unwrap_or_else(|_| panic!("waiter panicked"));
        }
        assert_eq!(adapter.registrations.load(Ordering::SeqCst), 1);
    }

    #[test]
    fn completed_adapter_never_arms_the_gate() {
        let adapter = Manual::default();
        adapter.complete();
        let gate = CompletionGate::new();
        gate.wait(&adapter);
        gate.wait(&adapter);
        assert!(!gate.is_armed());
        assert_eq!(adapter.registrations.load(Ordering::SeqCst), 0);
    }
}
