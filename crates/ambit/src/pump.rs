//! Pump selection and the single-threaded pump.

use std::fmt;
use std::sync::{Arc, LazyLock, PoisonError, RwLock};

use ambit_pump::{
    AwaitAdapter, Fault, MessagePump, NoPump, SyncContext, current_context, installed,
    underlying_context,
};

use crate::single_threaded::SingleThreadedContext;

/// Pump driving a [`SingleThreadedContext`] until the adapter completes.
///
/// Completion posts a shutdown request to the loop, so work queued ahead of
/// the completion still runs before [`SingleThreadedContext::run`] returns.
#[derive(Clone, Copy, Debug, Default)]
pub struct SingleThreadedPump;

impl MessagePump for SingleThreadedPump {
    fn name(&self) -> &'static str {
        "single-threaded"
    }

    fn accepts(&self, context: Option<&dyn SyncContext>) -> bool {
        context.is_some_and(|context| context.as_any().is::<SingleThreadedContext>())
    }

    fn wait_for_completion(&self, adapter: &dyn AwaitAdapter) -> Result<(), Fault> {
        let context = installed::<SingleThreadedContext>(self.name())?;
        let closing = Arc::clone(&context);
        adapter.on_completed(Box::new(move || {
            let target = Arc::clone(&closing);
            if let Err(fault) = closing.post(Box::new(move || target.shutdown())) {
                log::warn!("shutdown could not be posted to the loop: {fault}");
                closing.shutdown();
            }
        }));
        context.run()
    }
}

/// Ordered pump strategies.
///
/// The single-threaded pump is consulted first, then plugin pumps in
/// registration order; [`NoPump`] is the fallback.
pub struct PumpRegistry {
    pumps: RwLock<Vec<Arc<dyn MessagePump>>>,
    fallback: Arc<dyn MessagePump>,
}

impl PumpRegistry {
    /// Registry holding only the built-in pumps.
    #[must_use]
    pub fn new() -> Self {
        let pumps: Vec<Arc<dyn MessagePump>> = vec![Arc::new(SingleThreadedPump)];
        Self {
            pumps: RwLock::new(pumps),
            fallback: Arc::new(NoPump),
        }
    }

    /// Adds a plugin pump after those already registered.
    pub fn register(&self, pump: Arc<dyn MessagePump>) {
        log::debug!("registering message pump {}", pump.name());
        self.pumps
            .write()
            .unwrap_or_else(PoisonError::into_inner)
            .push(pump);
    }

    /// Names of every pump in selection order, fallback included.
    #[must_use]
    pub fn names(&self) -> Vec<&'static str> {
        let mut names: Vec<_> = self
            .pumps
            .read()
            .unwrap_or_else(PoisonError::into_inner)
            .iter()
            .map(|pump| pump.name())
            .collect();
        names.push(self.fallback.name());
        names
    }

    /// Picks the pump for `current`, looking through wrapping contexts.
    #[must_use]
    pub fn select(&self, current: Option<Arc<dyn SyncContext>>) -> Arc<dyn MessagePump> {
        let underlying = current.map(underlying_context);
        let context = underlying.as_deref();
        let selected = self
            .pumps
            .read()
            .unwrap_or_else(PoisonError::into_inner)
            .iter()
            .find(|pump| pump.accepts(context))
            .cloned()
            .unwrap_or_else(|| Arc::clone(&self.fallback));
        log::debug!(
            "selected {} pump for {}",
            selected.name(),
            context.map_or("no context", |context| context.type_name())
        );
        selected
    }

    /// Picks the pump for the calling thread's installed context.
    #[must_use]
    pub fn select_current(&self) -> Arc<dyn MessagePump> {
        self.select(current_context())
    }
}

impl Default for PumpRegistry {
    fn default() -> Self {
        Self::new()
    }
}

impl fmt::Debug for PumpRegistry {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("PumpRegistry")
            .field("pumps", &self.names())
            .finish()
    }
}

static PUMPS: LazyLock<PumpRegistry> = LazyLock::new(PumpRegistry::new);

/// The process-wide pump registry.
#[must_use]
pub fn pumps() -> &'static PumpRegistry {
    &PUMPS
}
