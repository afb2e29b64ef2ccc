//! Failure handles that preserve the identity of the original error.
//!
//! A [`Fault`] is the terminal error state of an awaited operation. It wraps
//! the original error (or panic) once and is then passed around by cloning the
//! handle, so every observer sees the same underlying failure. Rethrowing is a
//! single explicit operation, [`Fault::rethrow`], rather than a re-dispatch
//! that could lose the original value.

use std::any::Any;
use std::backtrace::Backtrace;
use std::error::Error;
use std::fmt;
use std::panic::{self, AssertUnwindSafe};
use std::sync::Arc;

/// Boxed value produced by an invocation or an awaited operation.
pub type AnyValue = Box<dyn Any + Send>;

/// Broad classification of a [`Fault`].
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum FaultCategory {
    /// An error value returned by the operation.
    Error,
    /// A panic raised while running the operation.
    Panic,
    /// The operation was cancelled before producing a value.
    Cancelled,
    /// Several failures gathered together.
    Aggregate,
}

/// Cloneable handle to the failure that ended an operation.
///
/// Cloning shares the same allocation, so [`Fault::ptr_eq`] can be used to
/// check that a failure surfaced unchanged through the adapter layers.
///
/// # Examples
///
/// ```
/// use ambit_pump::{Fault, FaultCategory};
///
/// let fault = Fault::from(std::io::Error::other("boom"));
/// let seen = fault.clone();
/// assert!(Fault::ptr_eq(&fault, &seen));
/// assert_eq!(fault.category(), FaultCategory::Error);
/// assert_eq!(fault.message(), "boom");
/// ```
#[derive(Clone)]
pub struct Fault {
    inner: Arc<FaultInner>,
}

struct FaultInner {
    kind: FaultKind,
    backtrace: Backtrace,
}

enum FaultKind {
    Error(Box<dyn Error + Send + Sync>),
    Panic(String),
    Cancelled(Option<String>),
    Aggregate(Vec<Fault>),
}

impl Fault {
    fn from_kind(kind: FaultKind) -> Self {
        Self {
            inner: Arc::new(FaultInner {
                kind,
                backtrace: Backtrace::capture(),
            }),
        }
    }

    /// Wraps an error value.
    #[must_use]
    pub fn from_error<E>(error: E) -> Self
    where
        E: Error + Send + Sync + 'static,
    {
        Self::from_kind(FaultKind::Error(Box::new(error)))
    }

    /// Wraps an already boxed error value.
    #[must_use]
    pub fn from_boxed(error: Box<dyn Error + Send + Sync>) -> Self {
        Self::from_kind(FaultKind::Error(error))
    }

    /// Converts a panic payload into a fault.
    ///
    /// Payloads raised by [`Fault::rethrow`] are unwrapped so the original
    /// handle is returned rather than a new one.
    #[must_use]
    pub fn from_panic(payload: AnyValue) -> Self {
        match payload.downcast::<Self>() {
            Ok(fault) => *fault,
            Err(payload) => Self::from_kind(FaultKind::Panic(panic_message(payload.as_ref()))),
        }
    }

    /// Creates a panic fault from a message.
    #[must_use]
    pub fn panic(message: impl Into<String>) -> Self {
        Self::from_kind(FaultKind::Panic(message.into()))
    }

    /// Creates a cancellation fault without a reason.
    #[must_use]
    pub fn cancelled() -> Self {
        Self::from_kind(FaultKind::Cancelled(None))
    }

    /// Creates a cancellation fault carrying a reason.
    #[must_use]
    pub fn cancelled_with(reason: impl Into<String>) -> Self {
        Self::from_kind(FaultKind::Cancelled(Some(reason.into())))
    }

    /// Gathers several faults into one.
    #[must_use]
    pub fn aggregate(faults: Vec<Self>) -> Self {
        Self::from_kind(FaultKind::Aggregate(faults))
    }

    /// Returns the category of this fault.
    #[must_use]
    pub fn category(&self) -> FaultCategory {
        match &self.inner.kind {
            FaultKind::Error(_) => FaultCategory::Error,
            FaultKind::Panic(_) => FaultCategory::Panic,
            FaultKind::Cancelled(_) => FaultCategory::Cancelled,
            FaultKind::Aggregate(_) => FaultCategory::Aggregate,
        }
    }

    /// Renders a human-readable description of the failure.
    #[must_use]
    pub fn message(&self) -> String {
        match &self.inner.kind {
            FaultKind::Error(error) => error.to_string(),
            FaultKind::Panic(message) => message.clone(),
            FaultKind::Cancelled(None) => "the operation was cancelled".to_owned(),
            FaultKind::Cancelled(Some(reason)) => format!("the operation was cancelled: {reason}"),
            FaultKind::Aggregate(faults) if faults.is_empty() => {
                "one or more errors occurred".to_owned()
            }
            FaultKind::Aggregate(faults) => faults
                .iter()
                .map(Self::message)
                .collect::<Vec<_>>()
                .join("; "),
        }
    }

    /// Borrows the wrapped error when this is an error fault.
    #[must_use]
    pub fn as_error(&self) -> Option<&(dyn Error + Send + Sync + 'static)> {
        match &self.inner.kind {
            FaultKind::Error(error) => Some(error.as_ref()),
            _ => None,
        }
    }

    /// Downcasts the wrapped error to a concrete type.
    #[must_use]
    pub fn downcast_ref<E>(&self) -> Option<&E>
    where
        E: Error + 'static,
    {
        self.as_error()?.downcast_ref::<E>()
    }

    /// Returns `true` when the wrapped error has type `E`.
    #[must_use]
    pub fn is<E>(&self) -> bool
    where
        E: Error + 'static,
    {
        self.downcast_ref::<E>().is_some()
    }

    /// Faults gathered by an aggregate; empty for every other category.
    #[must_use]
    pub fn inner_faults(&self) -> &[Self] {
        match &self.inner.kind {
            FaultKind::Aggregate(faults) => faults,
            _ => &[],
        }
    }

    /// Unwraps nested aggregates down to their first inner fault.
    ///
    /// Empty aggregates and non-aggregate faults are returned unchanged.
    #[must_use]
    pub fn first_inner(self) -> Self {
        match self.inner_faults().first() {
            Some(first) => first.clone().first_inner(),
            None => self,
        }
    }

    /// Backtrace captured when the fault was created.
    #[must_use]
    pub fn backtrace(&self) -> &Backtrace {
        &self.inner.backtrace
    }

    /// Returns `true` when both handles refer to the same failure.
    #[must_use]
    pub fn ptr_eq(left: &Self, right: &Self) -> bool {
        Arc::ptr_eq(&left.inner, &right.inner)
    }

    /// Resumes unwinding with this fault as the panic payload.
    ///
    /// [`Fault::catch`] and [`Fault::from_panic`] recover the same handle on
    /// the other side.
    pub fn rethrow(self) -> ! {
        panic::resume_unwind(Box::new(self))
    }

    /// Runs `body`, converting a panic into a fault.
    ///
    /// # Errors
    ///
    /// Returns the fault raised by `body` when it panics.
    pub fn catch<R>(body: impl FnOnce() -> R) -> Result<R, Self> {
        panic::catch_unwind(AssertUnwindSafe(body)).map_err(Self::from_panic)
    }
}

impl<E> From<E> for Fault
where
    E: Error + Send + Sync + 'static,
{
    fn from(error: E) -> Self {
        Self::from_error(error)
    }
}

impl fmt::Display for Fault {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.message())
    }
}

impl fmt::Debug for Fault {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Fault")
            .field("category", &self.category())
            .field("message", &self.message())
            .finish_non_exhaustive()
    }
}

/// Extracts a panic payload into a human-readable message.
///
/// # Examples
///
/// ```
/// use ambit_pump::panic_message;
///
/// let err = std::panic::catch_unwind(|| panic!("boom")).unwrap_err();
/// assert_eq!(panic_message(err.as_ref()), "boom");
/// ```
#[must_use]
pub fn panic_message(payload: &(dyn Any + Send)) -> String {
    macro_rules! try_downcast {
        ($($ty:ty),* $(,)?) => {
            $(
                if let Some(val) = payload.downcast_ref::<$ty>() {
                    return val.to_string();
                }
            )*
        };
    }

    try_downcast!(&str, String, i32, u32, i64, u64, isize, usize);
    format!("opaque panic payload (TypeId({:?}))", payload.type_id())
}
