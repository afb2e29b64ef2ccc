//! Awaitable shape detection.
//!
//! The registry runs an ordered list of [`ShapeProbe`]s against the type of
//! a returned value and caches the first match per [`TypeId`]. Probes see
//! the member tables the type has published, either at link time through
//! [`expose_awaitable!`](crate::expose_awaitable) and
//! [`expose_value_task_wrapper!`](crate::expose_value_task_wrapper), or at
//! runtime through [`ShapeRegistry::expose`].

mod members;
mod probe;
mod value;

use std::any::TypeId;
use std::fmt;
use std::sync::{Arc, LazyLock, PoisonError, RwLock};

use ambit_pump::AwaitAdapter;
use dashmap::DashMap;

pub use members::{AdaptFn, ExposedMembers};
pub use probe::{
    PatternProbe, ShapeDescriptor, ShapeKind, ShapeProbe, TaskProbe, ValueTaskProbe,
    WorkflowProbe, WrappedValueTaskProbe,
};
pub use value::{ReturnValue, TypeMeta};

/// Ordered probes plus the per-type descriptor cache.
pub struct ShapeRegistry {
    probes: RwLock<Vec<Arc<dyn ShapeProbe>>>,
    exposed: DashMap<TypeId, Vec<ExposedMembers>>,
    cache: DashMap<TypeId, Option<Arc<ShapeDescriptor>>>,
}

impl ShapeRegistry {
    /// Registry with the built-in probes.
    #[must_use]
    pub fn new() -> Self {
        let probes: Vec<Arc<dyn ShapeProbe>> = vec![
            Arc::new(TaskProbe),
            Arc::new(ValueTaskProbe),
            Arc::new(WrappedValueTaskProbe),
            Arc::new(PatternProbe),
        ];
        Self {
            probes: RwLock::new(probes),
            exposed: DashMap::new(),
            cache: DashMap::new(),
        }
    }

    /// Appends `probe`, after every probe already registered.
    ///
    /// Types previously found not to be awaitable are probed again on their
    /// next lookup.
    pub fn add_probe(&self, probe: Arc<dyn ShapeProbe>) {
        log::debug!("registering shape probe {}", probe.name());
        self.probes
            .write()
            .unwrap_or_else(PoisonError::into_inner)
            .push(probe);
        self.cache.retain(|_, descriptor| descriptor.is_some());
    }

    /// Publishes `members` for their type at runtime.
    pub fn expose(&self, members: ExposedMembers) {
        let id = (members.type_id)();
        self.exposed.entry(id).or_default().push(members);
        self.cache.remove_if(&id, |_, descriptor| descriptor.is_none());
    }

    /// Names of the registered probes, in evaluation order.
    #[must_use]
    pub fn probe_names(&self) -> Vec<&'static str> {
        self.probes
            .read()
            .unwrap_or_else(PoisonError::into_inner)
            .iter()
            .map(|probe| probe.name())
            .collect()
    }

    /// Describes how values of `meta`'s type are adapted, or `None` when
    /// the type is not awaitable.
    #[must_use]
    pub fn descriptor_for(&self, meta: &TypeMeta) -> Option<Arc<ShapeDescriptor>> {
        if let Some(cached) = self.cache.get(&meta.id()) {
            return cached.value().clone();
        }
        let members = self.members_for(meta.id());
        let descriptor = self
            .probes
            .read()
            .unwrap_or_else(PoisonError::into_inner)
            .iter()
            .find_map(|probe| probe.probe(meta, &members))
            .map(Arc::new);
        log::debug!(
            "shape cache miss for {}: {}",
            meta.name(),
            descriptor
                .as_ref()
                .map_or("not awaitable", |found| found.kind().as_str())
        );
        self.cache.insert(meta.id(), descriptor.clone());
        descriptor
    }

    /// Returns `true` when values of `meta`'s type can be awaited.
    #[must_use]
    pub fn is_awaitable(&self, meta: &TypeMeta) -> bool {
        self.descriptor_for(meta).is_some()
    }

    /// Adapts `value` when its type is awaitable.
    ///
    /// # Errors
    ///
    /// Hands `value` back when no probe recognises its type.
    pub fn detect(&self, value: ReturnValue) -> Result<Box<dyn AwaitAdapter>, ReturnValue> {
        let Some(descriptor) = self.descriptor_for(&value.type_meta()) else {
            return Err(value);
        };
        descriptor.adapt(value)
    }

    fn members_for(&self, id: TypeId) -> Vec<ExposedMembers> {
        let mut members = self
            .exposed
            .get(&id)
            .map(|entry| entry.value().clone())
            .unwrap_or_default();
        members.extend(
            inventory::iter::<ExposedMembers>
                .into_iter()
                .filter(|record| record.describes(id))
                .copied(),
        );
        members
    }
}

impl Default for ShapeRegistry {
    fn default() -> Self {
        Self::new()
    }
}

impl fmt::Debug for ShapeRegistry {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("ShapeRegistry")
            .field("probes", &self.probe_names())
            .field("cached", &self.cache.len())
            .finish_non_exhaustive()
    }
}

static SHAPES: LazyLock<ShapeRegistry> = LazyLock::new(ShapeRegistry::new);

/// The process-wide shape registry.
#[must_use]
pub fn shapes() -> &'static ShapeRegistry {
    &SHAPES
}
