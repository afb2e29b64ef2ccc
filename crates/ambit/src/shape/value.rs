//! Runtime values tagged with their type.

use std::any::{Any, TypeId, type_name};
use std::fmt;

use ambit_pump::AnyValue;

/// Identity and name of a type.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash)]
pub struct TypeMeta {
    id: TypeId,
    name: &'static str,
}

impl TypeMeta {
    /// Metadata for `T`.
    #[must_use]
    pub fn of<T>() -> Self
    where
        T: ?Sized + 'static,
    {
        Self {
            id: TypeId::of::<T>(),
            name: type_name::<T>(),
        }
    }

    /// Type identity.
    #[must_use]
    pub fn id(&self) -> TypeId {
        self.id
    }

    /// Full type name, including generic arguments.
    #[must_use]
    pub fn name(&self) -> &'static str {
        self.name
    }

    /// Type name with generic arguments removed.
    ///
    /// # Examples
    ///
    /// ```
    /// use ambit::shape::TypeMeta;
    ///
    /// let meta = TypeMeta::of::<Vec<Option<u8>>>();
    /// assert_eq!(meta.generic_definition(), "alloc::vec::Vec");
    /// ```
    #[must_use]
    pub fn generic_definition(&self) -> &'static str {
        self.name
            .split_once('<')
            .map_or(self.name, |(definition, _)| definition)
    }
}

/// Value returned by an invocation, with the metadata of its concrete type.
pub struct ReturnValue {
    meta: TypeMeta,
    value: AnyValue,
}

impl ReturnValue {
    /// Wraps `value`.
    pub fn new<T>(value: T) -> Self
    where
        T: Any + Send,
    {
        Self {
            meta: TypeMeta::of::<T>(),
            value: Box::new(value),
        }
    }

    /// The unit value, returned by invocations without a result.
    #[must_use]
    pub fn unit() -> Self {
        Self::new(())
    }

    /// Rebuilds a value from its parts.
    #[must_use]
    pub fn from_parts(meta: TypeMeta, value: AnyValue) -> Self {
        Self { meta, value }
    }

    /// Metadata of the wrapped value's type.
    #[must_use]
    pub fn type_meta(&self) -> TypeMeta {
        self.meta
    }

    /// Name of the wrapped value's type.
    #[must_use]
    pub fn type_name(&self) -> &'static str {
        self.meta.name
    }

    /// Returns `true` when the wrapped value is `()`.
    #[must_use]
    pub fn is_unit(&self) -> bool {
        self.meta.id == TypeId::of::<()>()
    }

    /// Takes the wrapped value as `T`, or returns `self` unchanged.
    ///
    /// # Errors
    ///
    /// Returns `self` when the value has a different type.
    pub fn downcast<T>(self) -> Result<T, Self>
    where
        T: Any,
    {
        let meta = self.meta;
        self.value
            .downcast::<T>()
            .map(|value| *value)
            .map_err(|value| Self { meta, value })
    }

    /// Separates the metadata from the boxed value.
    #[must_use]
    pub fn into_parts(self) -> (TypeMeta, AnyValue) {
        (self.meta, self.value)
    }

    /// Drops the metadata, keeping the boxed value.
    #[must_use]
    pub fn into_any(self) -> AnyValue {
        self.value
    }
}

impl fmt::Debug for ReturnValue {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("ReturnValue")
            .field("type", &self.meta.name)
            .finish_non_exhaustive()
    }
}
