//! Probes deciding whether a type is awaitable and how to adapt it.

use std::any::TypeId;
use std::fmt;

use ambit_pump::{AnyValue, AwaitAdapter};

use super::members::{AdaptFn, ExposedMembers};
use super::value::{ReturnValue, TypeMeta};
use crate::adapter::{Task, TaskAdapter, ValueTask, ValueTaskAdapter};

/// Kind of awaitable a descriptor adapts.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash)]
pub enum ShapeKind {
    /// A [`Task`].
    Task,
    /// A [`ValueTask`].
    ValueTask,
    /// A type exposing the value task it wraps.
    WrappedValueTask,
    /// A type following the awaiter pattern.
    Pattern,
    /// A framework-specific construct adapted by a plugin.
    Workflow,
}

impl ShapeKind {
    /// Short lowercase name of the kind.
    #[must_use]
    pub fn as_str(self) -> &'static str {
        match self {
            Self::Task => "task",
            Self::ValueTask => "value-task",
            Self::WrappedValueTask => "wrapped-value-task",
            Self::Pattern => "pattern",
            Self::Workflow => "workflow",
        }
    }
}

impl fmt::Display for ShapeKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// How values of one type are adapted.
#[derive(Clone, Copy)]
pub struct ShapeDescriptor {
    kind: ShapeKind,
    type_name: &'static str,
    result_type: Option<&'static str>,
    adapt: AdaptFn,
}

impl ShapeDescriptor {
    /// Descriptor for `meta` adapted by `adapt`.
    #[must_use]
    pub fn new(
        kind: ShapeKind,
        meta: &TypeMeta,
        result_type: Option<&'static str>,
        adapt: AdaptFn,
    ) -> Self {
        Self {
            kind,
            type_name: meta.name(),
            result_type,
            adapt,
        }
    }

    /// Kind of awaitable.
    #[must_use]
    pub fn kind(&self) -> ShapeKind {
        self.kind
    }

    /// Name of the described type.
    #[must_use]
    pub fn type_name(&self) -> &'static str {
        self.type_name
    }

    /// Name of the awaited result type, when known statically.
    #[must_use]
    pub fn result_type(&self) -> Option<&'static str> {
        self.result_type
    }

    /// Adapts `value`.
    ///
    /// # Errors
    ///
    /// Returns `value` unchanged when it is not of the described type.
    pub fn adapt(&self, value: ReturnValue) -> Result<Box<dyn AwaitAdapter>, ReturnValue> {
        let (meta, value) = value.into_parts();
        (self.adapt)(value).map_err(|value| ReturnValue::from_parts(meta, value))
    }
}

impl fmt::Debug for ShapeDescriptor {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("ShapeDescriptor")
            .field("kind", &self.kind)
            .field("type_name", &self.type_name)
            .field("result_type", &self.result_type)
            .finish_non_exhaustive()
    }
}

/// One step of shape detection.
pub trait ShapeProbe: Send + Sync {
    /// Name used in diagnostics.
    fn name(&self) -> &'static str;

    /// Describes `meta` when this probe recognises it. `members` holds every
    /// record the type has published.
    fn probe(&self, meta: &TypeMeta, members: &[ExposedMembers]) -> Option<ShapeDescriptor>;
}

fn adapt_task(value: AnyValue) -> Result<Box<dyn AwaitAdapter>, AnyValue> {
    let task = value.downcast::<Task>()?;
    Ok(Box::new(TaskAdapter::new(*task)))
}

fn adapt_value_task(value: AnyValue) -> Result<Box<dyn AwaitAdapter>, AnyValue> {
    let value_task = value.downcast::<ValueTask>()?;
    Ok(Box::new(ValueTaskAdapter::new(*value_task)))
}

fn result_type_of(members: &[ExposedMembers]) -> Option<&'static str> {
    members
        .iter()
        .find_map(|record| record.result_type)
        .map(|name| name())
}

/// Matches [`Task`].
#[derive(Clone, Copy, Debug, Default)]
pub struct TaskProbe;

impl ShapeProbe for TaskProbe {
    fn name(&self) -> &'static str {
        "task"
    }

    fn probe(&self, meta: &TypeMeta, _members: &[ExposedMembers]) -> Option<ShapeDescriptor> {
        (meta.id() == TypeId::of::<Task>())
            .then(|| ShapeDescriptor::new(ShapeKind::Task, meta, None, adapt_task))
    }
}

/// Matches [`ValueTask`].
#[derive(Clone, Copy, Debug, Default)]
pub struct ValueTaskProbe;

impl ShapeProbe for ValueTaskProbe {
    fn name(&self) -> &'static str {
        "value-task"
    }

    fn probe(&self, meta: &TypeMeta, _members: &[ExposedMembers]) -> Option<ShapeDescriptor> {
        (meta.id() == TypeId::of::<ValueTask>())
            .then(|| ShapeDescriptor::new(ShapeKind::ValueTask, meta, None, adapt_value_task))
    }
}

/// Matches types exposing an `as_value_task` member.
#[derive(Clone, Copy, Debug, Default)]
pub struct WrappedValueTaskProbe;

impl ShapeProbe for WrappedValueTaskProbe {
    fn name(&self) -> &'static str {
        "wrapped-value-task"
    }

    fn probe(&self, meta: &TypeMeta, members: &[ExposedMembers]) -> Option<ShapeDescriptor> {
        let adapt = members.iter().find_map(|record| record.as_value_task)?;
        Some(ShapeDescriptor::new(
            ShapeKind::WrappedValueTask,
            meta,
            result_type_of(members),
            adapt,
        ))
    }
}

/// Matches types exposing a `get_awaiter` member.
#[derive(Clone, Copy, Debug, Default)]
pub struct PatternProbe;

impl ShapeProbe for PatternProbe {
    fn name(&self) -> &'static str {
        "pattern"
    }

    fn probe(&self, meta: &TypeMeta, members: &[ExposedMembers]) -> Option<ShapeDescriptor> {
        let adapt = members.iter().find_map(|record| record.get_awaiter)?;
        Some(ShapeDescriptor::new(
            ShapeKind::Pattern,
            meta,
            result_type_of(members),
            adapt,
        ))
    }
}

/// Matches instantiations of one generic type definition that expose a
/// `workflow` member.
///
/// `definition` is the full type path without generic arguments, as in
/// `"tokio::runtime::task::join::JoinHandle"`.
#[derive(Clone, Copy, Debug)]
pub struct WorkflowProbe {
    definition: &'static str,
}

impl WorkflowProbe {
    /// Probe for instantiations of `definition`.
    #[must_use]
    pub const fn new(definition: &'static str) -> Self {
        Self { definition }
    }

    /// The generic type definition this probe matches.
    #[must_use]
    pub fn definition(&self) -> &'static str {
        self.definition
    }
}

impl ShapeProbe for WorkflowProbe {
    fn name(&self) -> &'static str {
        self.definition
    }

    fn probe(&self, meta: &TypeMeta, members: &[ExposedMembers]) -> Option<ShapeDescriptor> {
        if meta.generic_definition() != self.definition {
            return None;
        }
        let adapt = members.iter().find_map(|record| record.workflow)?;
        Some(ShapeDescriptor::new(
            ShapeKind::Workflow,
            meta,
            result_type_of(members),
            adapt,
        ))
    }
}
