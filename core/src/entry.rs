/// Per-key translation state
use serde::Serialize;

use crate::text::to_display;

/// Flags derived when a translation file is diffed against the reference.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct Classification {
    pub needs_review: bool,
    pub missing: bool,
}

/// Classify one key of a loaded translation file.
///
/// `needs_review` is a heuristic: a value identical to the source is treated
/// as an untranslated copy, which also flags proper nouns and other strings
/// whose correct translation equals the source.
pub fn classify(source: &str, loaded: &str, was_present: bool) -> Classification {
    Classification {
        needs_review: was_present && loaded == source,
        missing: !was_present,
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum EntryStatus {
    Untranslated,
    Translated,
    NeedsReview,
    Missing,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct Entry {
    key: String,
    source: String,
    translation: String,
    needs_review: bool,
    missing: bool,
}

impl Entry {
    pub fn new(key: impl Into<String>, source: impl Into<String>) -> Self {
        Self {
            key: key.into(),
            source: source.into(),
            translation: String::new(),
            needs_review: false,
            missing: false,
        }
    }

    pub fn key(&self) -> &str {
        &self.key
    }

    /// Raw reference value, markup and escapes included.
    pub fn source(&self) -> &str {
        &self.source
    }

    pub fn translation(&self) -> &str {
        &self.translation
    }

    pub fn needs_review(&self) -> bool {
        self.needs_review
    }

    pub fn missing(&self) -> bool {
        self.missing
    }

    pub fn is_translated(&self) -> bool {
        !self.translation.is_empty()
    }

    pub fn display_source(&self, preserve_markup: bool) -> String {
        to_display(&self.source, preserve_markup)
    }

    pub fn status(&self) -> EntryStatus {
        if self.missing {
            EntryStatus::Missing
        } else if self.needs_review {
            EntryStatus::NeedsReview
        } else if self.is_translated() {
            EntryStatus::Translated
        } else {
            EntryStatus::Untranslated
        }
    }

    /// Replace the translation after an edit or a backend result.
    pub fn set_translation(&mut self, text: impl Into<String>) {
        self.translation = text.into();
        self.missing = false;
        self.needs_review = !self.translation.is_empty() && self.translation == self.source;
    }

    /// Apply the outcome of loading a translation file for this key.
    pub(crate) fn apply_loaded(&mut self, loaded: Option<String>) {
        let present = loaded.is_some();
        let text = loaded.unwrap_or_default();
        let flags = classify(&self.source, &text, present);
        self.translation = text;
        self.needs_review = flags.needs_review;
        self.missing = flags.missing;
    }

    pub fn matches(&self, filter: &EntryFilter) -> bool {
        let key_ok = filter.key.is_empty() || self.key.to_lowercase().contains(&filter.key);
        let source_ok = filter.source.is_empty()
            || self
                .display_source(false)
                .to_lowercase()
                .contains(&filter.source);
        let target_ok =
            filter.target.is_empty() || self.translation.to_lowercase().contains(&filter.target);

        key_ok && source_ok && target_ok
    }
}

/// Three independent case-insensitive substring queries, combined with AND.
///
/// Source queries match against the display form of the source, so markup and
/// escapes never get in the way of a search.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct EntryFilter {
    key: String,
    source: String,
    target: String,
}

impl EntryFilter {
    pub fn new(key: &str, source: &str, target: &str) -> Self {
        Self {
            key: key.to_lowercase(),
            source: source.to_lowercase(),
            target: target.to_lowercase(),
        }
    }

    pub fn all() -> Self {
        Self::default()
    }

    pub fn by_key(key: &str) -> Self {
        Self::new(key, "", "")
    }

    pub fn is_empty(&self) -> bool {
        self.key.is_empty() && self.source.is_empty() && self.target.is_empty()
    }
}
