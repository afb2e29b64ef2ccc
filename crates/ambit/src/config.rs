//! Runtime configuration for ambit.
//!
//! The module exposes the grace period granted to single-threaded contexts
//! after shutdown and the culture new threads start with.

use std::sync::atomic::{AtomicU64, Ordering};
use std::time::Duration;

use unic_langid::{LanguageIdentifier, langid};

const OVERRIDE_UNSET: u64 = u64::MAX;

/// Grace period used when no override is installed.
pub const DEFAULT_SHUTDOWN_TIMEOUT: Duration = Duration::from_secs(10);

static SHUTDOWN_TIMEOUT_OVERRIDE_MS: AtomicU64 = AtomicU64::new(OVERRIDE_UNSET);

fn override_state() -> Option<Duration> {
    match SHUTDOWN_TIMEOUT_OVERRIDE_MS.load(Ordering::Relaxed) {
        OVERRIDE_UNSET => None,
        millis => Some(Duration::from_millis(millis)),
    }
}

/// How long a single-threaded context keeps accepting work after shutdown.
#[must_use]
pub fn shutdown_timeout() -> Duration {
    override_state().unwrap_or(DEFAULT_SHUTDOWN_TIMEOUT)
}

/// Override the shutdown grace period for the current process.
///
/// The value is stored with millisecond precision. Tests may call
/// [`clear_shutdown_timeout_override`] to restore the default afterwards.
pub fn set_shutdown_timeout(timeout: Duration) {
    let millis = u64::try_from(timeout.as_millis())
        .unwrap_or(OVERRIDE_UNSET - 1)
        .min(OVERRIDE_UNSET - 1);
    SHUTDOWN_TIMEOUT_OVERRIDE_MS.store(millis, Ordering::Relaxed);
}

/// Remove any in-process override for the shutdown grace period.
pub fn clear_shutdown_timeout_override() {
    SHUTDOWN_TIMEOUT_OVERRIDE_MS.store(OVERRIDE_UNSET, Ordering::Relaxed);
}

/// Culture assigned to threads that have not chosen one.
#[must_use]
pub fn default_culture() -> LanguageIdentifier {
    langid!("en-US")
}

#[cfg(test)]
mod tests {
    use super::*;
    use serial_test::serial;

    fn reset_override() {
        clear_shutdown_timeout_override();
    }

    #[test]
    #[serial]
    fn default_is_ten_seconds() {
        reset_override();
        assert_eq!(shutdown_timeout(), Duration::from_secs(10));
    }

    #[test]
    #[serial]
    fn override_replaces_default() {
        reset_override();
        set_shutdown_timeout(Duration::from_millis(250));
        assert_eq!(shutdown_timeout(), Duration::from_millis(250));
        set_shutdown_timeout(Duration::ZERO);
        assert_eq!(shutdown_timeout(), Duration::ZERO);
        reset_override();
        assert_eq!(shutdown_timeout(), DEFAULT_SHUTDOWN_TIMEOUT);
    }

    #[test]
    #[serial]
    fn huge_overrides_saturate() {
        reset_override();
        set_shutdown_timeout(Duration::MAX);
        assert!(shutdown_timeout() > Duration::from_secs(60 * 60 * 24 * 365));
        reset_override();
    }
}
