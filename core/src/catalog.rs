/// Catalog of every translatable key of the reference table
use std::collections::HashMap;

use log::{debug, info};
use serde::Serialize;
use serde_json::Value;
use thiserror::Error;

use crate::entry::{Entry, EntryFilter};
use crate::error::{ReferenceLoadError, UserFileLoadError};
use crate::flatten::{flatten, leaf_text, unflatten, FlatMap, FlattenError};

#[derive(Debug, Clone, Error, PartialEq, Eq)]
#[error("unknown key: {0}")]
pub struct UnknownKey(pub String);

/// Counts produced by one load of a user translation file.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct LoadReport {
    pub matched: usize,
    pub missing: usize,
    pub needs_review: usize,
    /// Keys in the file that the reference does not know about.
    pub ignored: usize,
}

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct CatalogSummary {
    pub total: usize,
    pub translated: usize,
    pub untranslated: usize,
    pub needs_review: usize,
    pub missing: usize,
}

#[derive(Debug, Clone)]
pub struct TranslationCatalog {
    separator: String,
    entries: Vec<Entry>,
    index: HashMap<String, usize>,
}

impl TranslationCatalog {
    /// Build one entry per leaf of the reference table, in document order.
    pub fn build(reference: &Value, separator: &str) -> Result<Self, ReferenceLoadError> {
        if !reference.is_object() {
            return Err(ReferenceLoadError::NotAnObject);
        }

        let flat = flatten(reference, separator)?;
        // Every subset of a conflict-free key set nests cleanly, so checking
        // once here keeps `serialize` infallible in practice.
        unflatten(&flat, separator)?;

        let mut entries = Vec::with_capacity(flat.len());
        let mut index = HashMap::with_capacity(flat.len());
        for (key, value) in &flat {
            index.insert(key.clone(), entries.len());
            entries.push(Entry::new(key.clone(), leaf_text(value)));
        }

        info!("built catalog with {} keys", entries.len());
        Ok(Self {
            separator: separator.to_string(),
            entries,
            index,
        })
    }

    pub fn separator(&self) -> &str {
        &self.separator
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    pub fn entries(&self) -> &[Entry] {
        &self.entries
    }

    pub fn get(&self, key: &str) -> Option<&Entry> {
        self.index.get(key).map(|&idx| &self.entries[idx])
    }

    pub fn contains(&self, key: &str) -> bool {
        self.index.contains_key(key)
    }

    /// Reclassify every key against a loaded translation tree.
    ///
    /// Overwrites in-session edits for every key. The shape check happens
    /// before any entry is touched, so a rejected tree leaves the catalog as it
    /// was.
    pub fn load_user_translations(
        &mut self,
        user_tree: &Value,
    ) -> Result<LoadReport, UserFileLoadError> {
        if !user_tree.is_object() {
            return Err(UserFileLoadError::NotAnObject);
        }

        let user_flat = flatten(user_tree, &self.separator)?;
        let mut report = LoadReport {
            ignored: user_flat
                .keys()
                .filter(|key| !self.index.contains_key(*key))
                .count(),
            ..LoadReport::default()
        };

        for entry in &mut self.entries {
            let loaded = user_flat.get(entry.key()).map(leaf_text);
            entry.apply_loaded(loaded);

            if entry.missing() {
                report.missing += 1;
            } else {
                report.matched += 1;
            }
            if entry.needs_review() {
                report.needs_review += 1;
            }
        }

        info!(
            "loaded translations: {} matched, {} missing, {} need review, {} ignored",
            report.matched, report.missing, report.needs_review, report.ignored
        );
        Ok(report)
    }

    pub fn set_translation(
        &mut self,
        key: &str,
        text: impl Into<String>,
    ) -> Result<(), UnknownKey> {
        let idx = *self
            .index
            .get(key)
            .ok_or_else(|| UnknownKey(key.to_string()))?;
        self.entries[idx].set_translation(text);
        debug!("updated translation for {key}");
        Ok(())
    }

    /// Keys passing `filter`, in catalog order.
    pub fn filter(&self, filter: &EntryFilter) -> Vec<String> {
        self.entries
            .iter()
            .filter(|entry| entry.matches(filter))
            .map(|entry| entry.key().to_string())
            .collect()
    }

    /// `(key, source)` pairs that pass `filter` and have no translation yet.
    pub fn pending(&self, filter: &EntryFilter) -> Vec<(String, String)> {
        self.entries
            .iter()
            .filter(|entry| !entry.is_translated() && entry.matches(filter))
            .map(|entry| (entry.key().to_string(), entry.source().to_string()))
            .collect()
    }

    pub fn summary(&self) -> CatalogSummary {
        let mut summary = CatalogSummary {
            total: self.entries.len(),
            ..CatalogSummary::default()
        };
        for entry in &self.entries {
            if entry.is_translated() {
                summary.translated += 1;
            } else {
                summary.untranslated += 1;
            }
            if entry.needs_review() {
                summary.needs_review += 1;
            }
            if entry.missing() {
                summary.missing += 1;
            }
        }
        summary
    }

    /// Nested tree of every non-empty translation.
    pub fn serialize(&self) -> Result<Value, FlattenError> {
        let flat: FlatMap = self
            .entries
            .iter()
            .filter(|entry| entry.is_translated())
            .map(|entry| {
                (
                    entry.key().to_string(),
                    Value::String(entry.translation().to_string()),
                )
            })
            .collect();
        unflatten(&flat, &self.separator)
    }
}
