//! Localization of framework messages.
//!
//! Messages are resolved through a Fluent loader chosen by the calling
//! thread's UI culture (see [`crate::ambient::ui_culture`]). Loaders are built
//! once per language and cached for the life of the process.

use std::collections::HashMap;
use std::sync::{Arc, LazyLock, PoisonError, RwLock};

use fluent::FluentArgs;
use i18n_embed::I18nEmbedError;
use i18n_embed::fluent::{FluentLanguageLoader, fluent_language_loader};
use rust_embed::RustEmbed;
use thiserror::Error;
use unic_langid::LanguageIdentifier;

use crate::ambient;

/// Embedded Fluent resources shipped with the crate.
///
/// # Examples
/// ```
/// # use ambit::localization::Localizations;
/// # use i18n_embed::fluent::fluent_language_loader;
/// # use unic_langid::langid;
/// let loader = fluent_language_loader!();
/// let selected = i18n_embed::select(&loader, &Localizations, &[langid!("fr")]).unwrap();
/// assert!(selected.contains(&langid!("fr")));
/// ```
#[derive(RustEmbed)]
#[folder = "i18n"]
pub struct Localizations;

type LoaderCache = HashMap<LanguageIdentifier, Arc<FluentLanguageLoader>>;

static LOADERS: LazyLock<RwLock<LoaderCache>> = LazyLock::new(|| RwLock::new(HashMap::new()));

/// Errors from localization setup and queries.
#[derive(Debug, Error)]
pub enum LocalizationError {
    /// The loader cache lock was poisoned.
    #[error("localization state is poisoned")]
    Poisoned,
    /// Loading or selecting Fluent resources failed.
    #[error("failed to load localization resources: {0}")]
    Loader(#[from] I18nEmbedError),
}

/// Builds (or fetches from the cache) the loader for `language`.
///
/// Languages without bundled resources fall back to English.
///
/// # Errors
///
/// Returns [`LocalizationError::Loader`] when the embedded resources cannot
/// be selected, or [`LocalizationError::Poisoned`] when the cache lock is
/// poisoned.
pub fn loader_for(
    language: &LanguageIdentifier,
) -> Result<Arc<FluentLanguageLoader>, LocalizationError> {
    {
        let cache = LOADERS.read().map_err(|_| LocalizationError::Poisoned)?;
        if let Some(loader) = cache.get(language) {
            return Ok(Arc::clone(loader));
        }
    }
    let loader = fluent_language_loader!();
    i18n_embed::select(&loader, &Localizations, &[language.clone()])?;
    let loader = Arc::new(loader);
    let mut cache = LOADERS.write().map_err(|_| LocalizationError::Poisoned)?;
    Ok(Arc::clone(
        cache.entry(language.clone()).or_insert(loader),
    ))
}

/// Languages with bundled message resources.
#[must_use]
pub fn available_languages() -> Vec<LanguageIdentifier> {
    let mut languages: Vec<LanguageIdentifier> = Localizations::iter()
        .filter_map(|path| {
            path.split('/')
                .next()
                .and_then(|tag| tag.parse::<LanguageIdentifier>().ok())
        })
        .collect();
    languages.sort_by_key(ToString::to_string);
    languages.dedup();
    languages
}

#[must_use]
/// Retrieve a localised string without interpolation arguments.
///
/// # Examples
/// ```
/// # use ambit::localization;
/// assert_eq!(
///     localization::message("result-state-success"),
///     "Passed"
/// );
/// ```
pub fn message(id: &str) -> String {
    with_loader(|loader| loader.get(id))
}

#[must_use]
/// Retrieve a localised string with Fluent arguments supplied via a closure.
pub fn message_with_args<F>(id: &str, configure: F) -> String
where
    F: FnOnce(&mut FluentArgs<'static>),
{
    with_loader(|loader| message_with_loader(loader, id, configure))
}

pub(crate) fn message_with_loader<F>(
    loader: &FluentLanguageLoader,
    id: &str,
    configure: F,
) -> String
where
    F: FnOnce(&mut FluentArgs<'static>),
{
    let mut args: FluentArgs<'static> = FluentArgs::new();
    configure(&mut args);
    loader.get_args_fluent(id, Some(&args))
}

/// Runs `callback` with the loader for the thread's current UI culture.
///
/// When that loader cannot be built the English loader is used; when even
/// that fails the callback receives an empty loader, which renders message
/// identifiers verbatim.
pub(crate) fn with_loader<R>(callback: impl FnOnce(&FluentLanguageLoader) -> R) -> R {
    let culture = ambient::ui_culture();
    let loader = loader_for(&culture)
        .or_else(|error| {
            log::warn!("falling back to English messages for {culture}: {error}");
            loader_for(&crate::config::default_culture())
        })
        .unwrap_or_else(|error| {
            log::error!("no localization resources could be loaded: {error}");
            let fallback: FluentLanguageLoader = fluent_language_loader!();
            Arc::new(fallback)
        });
    callback(&loader)
}

/// Remove Unicode directional isolates inserted by Fluent during interpolation.
#[must_use]
pub fn strip_directional_isolates(text: &str) -> String {
    text.chars()
        .filter(|c| !matches!(*c, '\u{2066}' | '\u{2067}' | '\u{2068}' | '\u{2069}'))
        .collect()
}

/// Drops every cached loader, forcing the next lookup to rebuild it.
pub fn reset_loader_cache() {
    LOADERS
        .write()
        .unwrap_or_else(PoisonError::into_inner)
        .clear();
}
