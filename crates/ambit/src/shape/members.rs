//! Member tables that let types opt into awaitable detection.
//!
//! Rust has no runtime reflection, so a type makes its awaitable members
//! visible by publishing an [`ExposedMembers`] record. Records are gathered
//! at link time with `inventory` or registered at runtime through
//! [`ShapeRegistry::expose`](super::ShapeRegistry::expose).

use std::any::{Any, TypeId, type_name};
use std::fmt;

use ambit_pump::{AnyValue, AwaitAdapter};

use crate::adapter::{AsValueTask, Awaitable, Awaiter, PatternAdapter, ValueTaskAdapter};

/// Converts an erased value into an await adapter, handing the value back
/// when it has an unexpected type.
pub type AdaptFn = fn(AnyValue) -> Result<Box<dyn AwaitAdapter>, AnyValue>;

/// Awaitable members a type exposes.
#[derive(Clone, Copy)]
pub struct ExposedMembers {
    /// Identity of the exposing type.
    pub type_id: fn() -> TypeId,
    /// Name of the exposing type.
    pub type_name: fn() -> &'static str,
    /// Name of the value produced when awaited, when known.
    pub result_type: Option<fn() -> &'static str>,
    /// Adapter built from the type's awaiter.
    pub get_awaiter: Option<AdaptFn>,
    /// Adapter built from the value task the type wraps.
    pub as_value_task: Option<AdaptFn>,
    /// Adapter supplied by a framework plugin.
    pub workflow: Option<AdaptFn>,
}

impl ExposedMembers {
    /// Members of a type implementing [`Awaitable`].
    #[must_use]
    pub const fn awaitable<A>() -> Self
    where
        A: Awaitable,
    {
        Self {
            type_id: TypeId::of::<A>,
            type_name: type_name::<A>,
            result_type: Some(type_name::<<A::Awaiter as Awaiter>::Output>),
            get_awaiter: Some(adapt_awaitable::<A>),
            as_value_task: None,
            workflow: None,
        }
    }

    /// Members of a type wrapping a value task.
    #[must_use]
    pub const fn value_task_wrapper<W>() -> Self
    where
        W: AsValueTask,
    {
        Self {
            type_id: TypeId::of::<W>,
            type_name: type_name::<W>,
            result_type: None,
            get_awaiter: None,
            as_value_task: Some(adapt_value_task_wrapper::<W>),
            workflow: None,
        }
    }

    /// Members of a framework-specific type adapted by `adapt`.
    #[must_use]
    pub const fn workflow<T>(adapt: AdaptFn) -> Self
    where
        T: Any,
    {
        Self {
            type_id: TypeId::of::<T>,
            type_name: type_name::<T>,
            result_type: None,
            get_awaiter: None,
            as_value_task: None,
            workflow: Some(adapt),
        }
    }

    /// Sets the name of the awaited result type.
    #[must_use]
    pub const fn with_result_type(mut self, result_type: fn() -> &'static str) -> Self {
        self.result_type = Some(result_type);
        self
    }

    /// Returns `true` when the record describes `id`.
    #[must_use]
    pub fn describes(&self, id: TypeId) -> bool {
        (self.type_id)() == id
    }
}

impl fmt::Debug for ExposedMembers {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("ExposedMembers")
            .field("type_name", &(self.type_name)())
            .field("get_awaiter", &self.get_awaiter.is_some())
            .field("as_value_task", &self.as_value_task.is_some())
            .field("workflow", &self.workflow.is_some())
            .finish()
    }
}

inventory::collect!(ExposedMembers);

fn adapt_awaitable<A>(value: AnyValue) -> Result<Box<dyn AwaitAdapter>, AnyValue>
where
    A: Awaitable,
{
    let awaitable = value.downcast::<A>()?;
    Ok(Box::new(PatternAdapter::from_awaitable(*awaitable)))
}

fn adapt_value_task_wrapper<W>(value: AnyValue) -> Result<Box<dyn AwaitAdapter>, AnyValue>
where
    W: AsValueTask,
{
    let wrapper = value.downcast::<W>()?;
    Ok(Box::new(ValueTaskAdapter::new(wrapper.as_value_task())))
}

/// Publishes a type implementing [`Awaitable`](crate::adapter::Awaitable) so
/// that it is detected as a pattern-based awaitable.
///
/// # Examples
///
/// ```
/// use ambit::adapter::{Awaitable, Awaiter};
/// use ambit::shape::{ShapeKind, TypeMeta, shapes};
/// use ambit_pump::{Continuation, Fault};
///
/// struct Ready(u8);
///
/// impl Awaitable for Ready {
///     type Awaiter = ReadyAwaiter;
///     fn get_awaiter(self) -> ReadyAwaiter {
///         ReadyAwaiter(self.0)
///     }
/// }
///
/// struct ReadyAwaiter(u8);
///
/// impl Awaiter for ReadyAwaiter {
///     type Output = u8;
///     fn is_completed(&self) -> bool {
///         true
///     }
///     fn on_completed(&self, continuation: Continuation) {
///         continuation();
///     }
///     fn get_result(&self) -> Result<u8, Fault> {
///         Ok(self.0)
///     }
/// }
///
/// ambit::expose_awaitable!(Ready);
///
/// let descriptor = shapes().descriptor_for(&TypeMeta::of::<Ready>()).unwrap();
/// assert_eq!(descriptor.kind(), ShapeKind::Pattern);
/// assert_eq!(descriptor.result_type(), Some("u8"));
/// ```
#[macro_export]
macro_rules! expose_awaitable {
    ($ty:ty) => {
        $crate::submit! {
            $crate::shape::ExposedMembers::awaitable::<$ty>()
        }
    };
}

/// Publishes a type implementing
/// [`AsValueTask`](crate::adapter::AsValueTask) so that it is detected as a
/// wrapped value task.
#[macro_export]
macro_rules! expose_value_task_wrapper {
    ($ty:ty) => {
        $crate::submit! {
            $crate::shape::ExposedMembers::value_task_wrapper::<$ty>()
        }
    };
}
