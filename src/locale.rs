//! Locale resolution and message lookup.
//!
//! String catalogs belong to the surrounding application. The store
//! only needs a way to format a message id for a locale, which is what
//! [`MessageCatalog`] provides.

use std::collections::HashMap;

/// Locales for which a changelog is published.
pub const CHANGELOG_LOCALES: &[&str] = &["en-US", "zh-CN"];

/// Locale used whenever nothing better is known.
pub const DEFAULT_LOCALE: &str = "en-US";

/// Formats message ids for a locale.
pub trait MessageCatalog: Send + Sync {
    /// Return the message for `id` in `locale`, or `default` when the
    /// catalog has no entry.
    fn format(&self, locale: &str, id: &str, default: &str) -> String;
}

/// In-memory catalog keyed by locale then message id.
#[derive(Debug, Default, Clone)]
pub struct Catalog {
    messages: HashMap<String, HashMap<String, String>>,
}

impl Catalog {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_locale<I, K, V>(mut self, locale: &str, entries: I) -> Self
    where
        I: IntoIterator<Item = (K, V)>,
        K: Into<String>,
        V: Into<String>,
    {
        self.messages
            .entry(locale.to_string())
            .or_default()
            .extend(entries.into_iter().map(|(k, v)| (k.into(), v.into())));
        self
    }
}

impl MessageCatalog for Catalog {
    fn format(&self, locale: &str, id: &str, default: &str) -> String {
        self.messages
            .get(locale)
            .and_then(|m| m.get(id))
            .cloned()
            .unwrap_or_else(|| default.to_string())
    }
}

/// Pick the stored locale when one is set, else the environment default.
pub fn resolve_locale(stored: Option<String>, environment_default: &str) -> String {
    match stored {
        Some(locale) if !locale.trim().is_empty() => locale,
        _ => environment_default.to_string(),
    }
}

/// Best-effort locale of the host environment (`LC_ALL`, then `LANG`),
/// normalized from `zh_CN.UTF-8` style to `zh-CN`.
pub fn environment_locale() -> Option<String> {
    ["LC_ALL", "LANG"]
        .iter()
        .filter_map(|var| std::env::var(var).ok())
        .find_map(|raw| normalize_posix_locale(&raw))
}

fn normalize_posix_locale(raw: &str) -> Option<String> {
    let base = raw.split(['.', '@']).next().unwrap_or_default().trim();
    if base.is_empty() || base == "C" || base == "POSIX" {
        return None;
    }
    Some(base.replace('_', "-"))
}

/// URL of the changelog document for `locale`, falling back to
/// [`DEFAULT_LOCALE`] for locales without a published changelog.
pub fn changelog_url(resource_host: &str, locale: &str) -> String {
    let locale = if CHANGELOG_LOCALES.contains(&locale) {
        locale
    } else {
        DEFAULT_LOCALE
    };
    format!(
        "{}/changelog/CHANGELOG.{locale}.md",
        resource_host.trim_end_matches('/')
    )
}
