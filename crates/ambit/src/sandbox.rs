//! Snapshots of ambient thread state.

use std::fmt;
use std::sync::Arc;

use ambit_pump::{SyncContext, current_context, set_current_context};
use unic_langid::LanguageIdentifier;

use crate::ambient::{self, Principal};

/// Immutable snapshot of the ambient properties a test may change.
///
/// The `with_*` methods return modified copies; a snapshot held by one
/// context never changes underneath it.
///
/// # Examples
///
/// ```
/// use ambit::sandbox::SandboxedThreadState;
/// use unic_langid::langid;
///
/// let original = SandboxedThreadState::capture();
/// let german = original.clone().with_culture(langid!("de-DE"));
/// german.restore();
/// assert_eq!(ambit::ambient::culture(), langid!("de-DE"));
/// original.restore();
/// assert_eq!(ambit::ambient::culture(), langid!("en-US"));
/// ```
#[derive(Clone)]
pub struct SandboxedThreadState {
    culture: LanguageIdentifier,
    ui_culture: LanguageIdentifier,
    principal: Option<Arc<dyn Principal>>,
    sync_context: Option<Arc<dyn SyncContext>>,
}

impl SandboxedThreadState {
    /// Reads the calling thread's ambient properties.
    #[must_use]
    pub fn capture() -> Self {
        Self {
            culture: ambient::culture(),
            ui_culture: ambient::ui_culture(),
            principal: ambient::principal(),
            sync_context: current_context(),
        }
    }

    /// Writes every captured property back onto the calling thread.
    pub fn restore(&self) {
        ambient::set_culture(self.culture.clone());
        ambient::set_ui_culture(self.ui_culture.clone());
        ambient::set_principal(self.principal.clone());
        set_current_context(self.sync_context.clone());
    }

    /// Captured culture.
    #[must_use]
    pub fn culture(&self) -> &LanguageIdentifier {
        &self.culture
    }

    /// Captured UI culture.
    #[must_use]
    pub fn ui_culture(&self) -> &LanguageIdentifier {
        &self.ui_culture
    }

    /// Captured principal.
    #[must_use]
    pub fn principal(&self) -> Option<&Arc<dyn Principal>> {
        self.principal.as_ref()
    }

    /// Captured synchronization context.
    #[must_use]
    pub fn sync_context(&self) -> Option<&Arc<dyn SyncContext>> {
        self.sync_context.as_ref()
    }

    /// Copy with a different culture.
    #[must_use]
    pub fn with_culture(self, culture: LanguageIdentifier) -> Self {
        Self { culture, ..self }
    }

    /// Copy with a different UI culture.
    #[must_use]
    pub fn with_ui_culture(self, ui_culture: LanguageIdentifier) -> Self {
        Self { ui_culture, ..self }
    }

    /// Copy with a different principal.
    #[must_use]
    pub fn with_principal(self, principal: Option<Arc<dyn Principal>>) -> Self {
        Self { principal, ..self }
    }

    /// Copy with a different synchronization context.
    #[must_use]
    pub fn with_sync_context(self, sync_context: Option<Arc<dyn SyncContext>>) -> Self {
        Self {
            sync_context,
            ..self
        }
    }

    /// Returns `true` when both snapshots hold the same values and the same
    /// principal and context instances.
    #[must_use]
    pub fn same_as(&self, other: &Self) -> bool {
        self.culture == other.culture
            && self.ui_culture == other.ui_culture
            && same_arc(self.principal.as_ref(), other.principal.as_ref())
            && same_arc(self.sync_context.as_ref(), other.sync_context.as_ref())
    }
}

fn same_arc<T: ?Sized>(left: Option<&Arc<T>>, right: Option<&Arc<T>>) -> bool {
    match (left, right) {
        (Some(left), Some(right)) => Arc::ptr_eq(left, right),
        (None, None) => true,
        _ => false,
    }
}

impl fmt::Debug for SandboxedThreadState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("SandboxedThreadState")
            .field("culture", &self.culture.to_string())
            .field("ui_culture", &self.ui_culture.to_string())
            .field("principal", &self.principal.as_ref().map(|p| p.name().to_owned()))
            .field(
                "sync_context",
                &self.sync_context.as_ref().map(|c| c.type_name()),
            )
            .finish()
    }
}

#[cfg(test)]
mod tests {
    //! Unit tests for thread state snapshots.

    use super::SandboxedThreadState;
    use crate::ambient::{self, GenericPrincipal, Principal};
    use std::sync::Arc;
    use unic_langid::langid;

    #[test]
    fn with_methods_leave_the_original_untouched() {
        let original = SandboxedThreadState::capture();
        let changed = original
            .clone()
            .with_culture(langid!("fr-FR"))
            .with_ui_culture(langid!("fr"));
        assert_eq!(original.culture(), &langid!("en-US"));
        assert_eq!(changed.culture(), &langid!("fr-FR"));
        assert!(original.same_as(&SandboxedThreadState::capture()));
        assert!(!original.same_as(&changed));
    }

    #[test]
    fn restore_writes_every_property() {
        let baseline = SandboxedThreadState::capture();
        let principal: Arc<dyn Principal> = Arc::new(GenericPrincipal::new("grace", ["ops"]));
        let snapshot = baseline
            .clone()
            .with_culture(langid!("ja-JP"))
            .with_ui_culture(langid!("fr"))
            .with_principal(Some(Arc::clone(&principal)));
        snapshot.restore();
        assert_eq!(ambient::culture(), langid!("ja-JP"));
        assert_eq!(ambient::ui_culture(), langid!("fr"));
        assert!(ambient::principal().is_some_and(|p| Arc::ptr_eq(&p, &principal)));
        baseline.restore();
        assert!(baseline.same_as(&SandboxedThreadState::capture()));
    }
}
