//! Errors raised by the framework plumbing itself.
//!
//! Failures from user code never pass through this type; they travel as the
//! original [`Fault`](ambit_pump::Fault). [`FrameworkError`] covers the
//! failures the execution core detects on its own, and is wrapped in a fault
//! when it crosses an adapter or context boundary.

use std::time::Duration;

use i18n_embed::fluent::FluentLanguageLoader;

use crate::context::ExecutionStatus;
use crate::localization;

/// Failure detected by the execution core.
///
/// # Examples
///
/// ```
/// use ambit::FrameworkError;
/// use ambit_pump::Fault;
///
/// let fault = Fault::from(FrameworkError::LoopAlreadyRunning);
/// assert!(matches!(
///     fault.downcast_ref::<FrameworkError>(),
///     Some(FrameworkError::LoopAlreadyRunning)
/// ));
/// ```
#[derive(Debug, Clone, PartialEq, Eq)]
#[non_exhaustive]
pub enum FrameworkError {
    /// No awaitable shape matched the value returned by an invocation.
    NotAwaitable {
        /// Type name of the rejected value.
        type_name: &'static str,
    },
    /// The result of an adapter was requested a second time.
    ResultConsumed,
    /// `run` was called on a single-threaded context that already ran.
    LoopAlreadyRunning,
    /// `run` was called on a single-threaded context after shutdown.
    LoopShutDown,
    /// Work arrived at a single-threaded context after its grace period.
    ShutdownTimeout {
        /// Time elapsed since shutdown was requested.
        elapsed: Duration,
        /// Configured grace period.
        timeout: Duration,
    },
    /// A test was skipped because a stop or abort had been requested.
    ExecutionStopped {
        /// Status observed when the test was about to run.
        status: ExecutionStatus,
        /// Full name of the skipped test.
        test_name: String,
    },
}

impl FrameworkError {
    /// Returns `true` for errors caused by misuse of a single-threaded loop.
    #[must_use]
    pub fn is_loop_violation(&self) -> bool {
        matches!(self, Self::LoopAlreadyRunning | Self::LoopShutDown)
    }

    /// Render the error message using the provided Fluent loader.
    #[must_use]
    pub fn format_with_loader(&self, loader: &FluentLanguageLoader) -> String {
        match self {
            Self::NotAwaitable { type_name } => localization::message_with_loader(
                loader,
                "framework-error-not-awaitable",
                |args| {
                    args.set("type_name", (*type_name).to_owned());
                },
            ),
            Self::ResultConsumed => {
                localization::message_with_loader(loader, "framework-error-result-consumed", |_| {})
            }
            Self::LoopAlreadyRunning => localization::message_with_loader(
                loader,
                "framework-error-loop-already-running",
                |_| {},
            ),
            Self::LoopShutDown => {
                localization::message_with_loader(loader, "framework-error-loop-shut-down", |_| {})
            }
            Self::ShutdownTimeout { elapsed, timeout } => localization::message_with_loader(
                loader,
                "framework-error-shutdown-timeout",
                |args| {
                    args.set("elapsed_ms", elapsed.as_millis().to_string());
                    args.set("timeout_ms", timeout.as_millis().to_string());
                },
            ),
            Self::ExecutionStopped { status, test_name } => localization::message_with_loader(
                loader,
                "framework-error-execution-stopped",
                |args| {
                    let status = if matches!(status, ExecutionStatus::AbortRequested) {
                        "abort"
                    } else {
                        "stop"
                    };
                    args.set("status", status.to_owned());
                    args.set("test_name", test_name.clone());
                },
            ),
        }
    }
}

impl std::fmt::Display for FrameworkError {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let message = localization::with_loader(|loader| self.format_with_loader(loader));
        f.write_str(&localization::strip_directional_isolates(&message))
    }
}

impl std::error::Error for FrameworkError {}
