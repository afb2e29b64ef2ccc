//! Ambient per-thread properties that tests may change.
//!
//! Each thread carries a culture, a UI culture, a principal, and an apartment
//! state. They start from process defaults and are captured and restored by
//! [`crate::sandbox::SandboxedThreadState`] so one test cannot leak changes
//! into the next.

use std::cell::RefCell;
use std::fmt;
use std::marker::PhantomData;
use std::rc::Rc;
use std::sync::Arc;

use unic_langid::LanguageIdentifier;

use crate::config;

/// Identity on whose behalf a thread runs.
pub trait Principal: Send + Sync + fmt::Debug {
    /// Name of the identity.
    fn name(&self) -> &str;

    /// Returns `true` when the identity holds `role`.
    fn is_in_role(&self, role: &str) -> bool;
}

/// Principal with a fixed name and role list.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct GenericPrincipal {
    name: String,
    roles: Vec<String>,
}

impl GenericPrincipal {
    /// Creates a principal named `name` holding `roles`.
    #[must_use]
    pub fn new(
        name: impl Into<String>,
        roles: impl IntoIterator<Item = impl Into<String>>,
    ) -> Self {
        Self {
            name: name.into(),
            roles: roles.into_iter().map(Into::into).collect(),
        }
    }
}

impl Principal for GenericPrincipal {
    fn name(&self) -> &str {
        &self.name
    }

    fn is_in_role(&self, role: &str) -> bool {
        self.roles.iter().any(|held| held == role)
    }
}

/// Threading model a thread has declared for the code it runs.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq, Hash)]
pub enum ApartmentState {
    /// Work may hop between threads freely.
    #[default]
    Mta,
    /// The thread owns its work; continuations must return to it.
    Sta,
}

struct Ambient {
    culture: LanguageIdentifier,
    ui_culture: LanguageIdentifier,
    principal: Option<Arc<dyn Principal>>,
    apartment: ApartmentState,
}

impl Default for Ambient {
    fn default() -> Self {
        Self {
            culture: config::default_culture(),
            ui_culture: config::default_culture(),
            principal: None,
            apartment: ApartmentState::default(),
        }
    }
}

thread_local! {
    static AMBIENT: RefCell<Ambient> = RefCell::new(Ambient::default());
}

/// The calling thread's culture.
#[must_use]
pub fn culture() -> LanguageIdentifier {
    AMBIENT.with(|cell| cell.borrow().culture.clone())
}

/// Sets the calling thread's culture.
pub fn set_culture(culture: LanguageIdentifier) {
    AMBIENT.with(|cell| cell.borrow_mut().culture = culture);
}

/// The calling thread's UI culture, used to localise framework messages.
#[must_use]
pub fn ui_culture() -> LanguageIdentifier {
    AMBIENT.with(|cell| cell.borrow().ui_culture.clone())
}

/// Sets the calling thread's UI culture.
pub fn set_ui_culture(culture: LanguageIdentifier) {
    AMBIENT.with(|cell| cell.borrow_mut().ui_culture = culture);
}

/// The calling thread's principal, if one has been assigned.
#[must_use]
pub fn principal() -> Option<Arc<dyn Principal>> {
    AMBIENT.with(|cell| cell.borrow().principal.clone())
}

/// Sets or clears the calling thread's principal.
pub fn set_principal(principal: Option<Arc<dyn Principal>>) {
    AMBIENT.with(|cell| cell.borrow_mut().principal = principal);
}

/// The calling thread's apartment state.
#[must_use]
pub fn apartment_state() -> ApartmentState {
    AMBIENT.with(|cell| cell.borrow().apartment)
}

/// Sets the calling thread's apartment state.
pub fn set_apartment_state(state: ApartmentState) {
    AMBIENT.with(|cell| cell.borrow_mut().apartment = state);
}

/// Guard that switches the thread's UI culture and restores it on drop.
#[must_use = "dropping the guard restores the previous UI culture"]
pub struct UiCultureScope {
    previous: Option<LanguageIdentifier>,
    _not_send: PhantomData<Rc<()>>,
}

impl UiCultureScope {
    /// Switches the UI culture to `culture`.
    pub fn new(culture: LanguageIdentifier) -> Self {
        let previous = ui_culture();
        set_ui_culture(culture);
        Self {
            previous: Some(previous),
            _not_send: PhantomData,
        }
    }
}

impl Drop for UiCultureScope {
    fn drop(&mut self) {
        if let Some(previous) = self.previous.take() {
            set_ui_culture(previous);
        }
    }
}
