/// Front-end facing translation session
///
/// Owns the catalog behind a single-writer lock, the translation backend and
/// the batch pipeline. Keys handed to a batch stay reserved until their result
/// is applied, so direct edits and single-entry translations never race the
/// batch for the same entry.
use std::collections::HashMap;
use std::path::Path;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Arc, Mutex, RwLock};

use log::{info, warn};
use serde_json::Value;
use tokio::sync::mpsc;
use tokio::task::JoinHandle;
use uuid::Uuid;

use crate::backend::TranslationBackend;
use crate::catalog::{CatalogSummary, LoadReport, TranslationCatalog};
use crate::config::TranslatorConfig;
use crate::entry::{Entry, EntryFilter};
use crate::error::{ReferenceLoadError, SaveError, SessionError, UserFileLoadError};
use crate::persist::{read_json, write_json, ReadError, SaveOutcome};
use crate::pipeline::{
    BatchEvent, BatchHandle, BatchItem, BatchJob, BatchPipeline, BatchSummary, PipelineError,
};
use crate::text::to_storage;

type Reservations = Arc<Mutex<HashMap<String, Uuid>>>;

/// Which entries a batch should translate.
#[derive(Debug, Clone)]
pub enum BatchSelection {
    /// Exactly these keys, in this order.
    Keys(Vec<String>),
    /// Every entry passing the filter that has no translation yet.
    Pending(EntryFilter),
}

pub struct Session {
    config: TranslatorConfig,
    catalog: Arc<RwLock<TranslationCatalog>>,
    backend: Arc<dyn TranslationBackend>,
    pipeline: BatchPipeline,
    reserved: Reservations,
    languages: Vec<String>,
}

impl Session {
    /// Open the reference table at `path`. Failure here is fatal for the session.
    pub fn load_reference<P: AsRef<Path>>(
        path: P,
        backend: Arc<dyn TranslationBackend>,
        config: TranslatorConfig,
    ) -> Result<Self, ReferenceLoadError> {
        let path = path.as_ref();
        let reference = read_json(path).map_err(|err| match err {
            ReadError::Io(source) => ReferenceLoadError::Io {
                path: path.to_path_buf(),
                source,
            },
            ReadError::Json(source) => ReferenceLoadError::Json {
                path: path.to_path_buf(),
                source,
            },
        })?;
        info!("loaded reference table {}", path.display());
        Self::from_reference(&reference, backend, config)
    }

    pub fn from_reference(
        reference: &Value,
        backend: Arc<dyn TranslationBackend>,
        config: TranslatorConfig,
    ) -> Result<Self, ReferenceLoadError> {
        let catalog = TranslationCatalog::build(reference, &config.separator)?;

        let languages = match backend.supported_languages() {
            Ok(languages) => languages,
            Err(err) => {
                warn!(
                    "{} did not report its languages, target codes are not validated: {}",
                    backend.name(),
                    err
                );
                Vec::new()
            }
        };

        let pipeline =
            BatchPipeline::with_event_buffer(Arc::clone(&backend), config.batch.event_buffer);
        Ok(Self {
            config,
            catalog: Arc::new(RwLock::new(catalog)),
            backend,
            pipeline,
            reserved: Arc::new(Mutex::new(HashMap::new())),
            languages,
        })
    }

    pub fn config(&self) -> &TranslatorConfig {
        &self.config
    }

    /// Target codes reported by the backend when the session was opened.
    pub fn languages(&self) -> &[String] {
        &self.languages
    }

    pub fn filter_languages(&self, query: &str) -> Vec<String> {
        let query = query.to_lowercase();
        self.languages
            .iter()
            .filter(|lang| lang.to_lowercase().contains(&query))
            .cloned()
            .collect()
    }

    /// Run `f` against a consistent view of the catalog.
    pub fn with_catalog<R>(
        &self,
        f: impl FnOnce(&TranslationCatalog) -> R,
    ) -> Result<R, SessionError> {
        let catalog = self.catalog.read().map_err(|_| SessionError::Lock)?;
        Ok(f(&catalog))
    }

    pub fn entry(&self, key: &str) -> Result<Option<Entry>, SessionError> {
        self.with_catalog(|catalog| catalog.get(key).cloned())
    }

    pub fn filter(&self, filter: &EntryFilter) -> Result<Vec<String>, SessionError> {
        self.with_catalog(|catalog| catalog.filter(filter))
    }

    pub fn summary(&self) -> Result<CatalogSummary, SessionError> {
        self.with_catalog(TranslationCatalog::summary)
    }

    pub fn is_batch_running(&self) -> bool {
        self.pipeline.is_running()
    }

    /// Replace the catalog state with the contents of a translation file.
    ///
    /// Read, parse and shape check all happen before the catalog is touched.
    pub fn load_user_translations<P: AsRef<Path>>(
        &self,
        path: P,
    ) -> Result<LoadReport, SessionError> {
        if self.batch_active()? {
            return Err(SessionError::BatchActive);
        }

        let path = path.as_ref();
        let tree = read_json(path).map_err(|err| match err {
            ReadError::Io(source) => UserFileLoadError::Io {
                path: path.to_path_buf(),
                source,
            },
            ReadError::Json(source) => UserFileLoadError::Json {
                path: path.to_path_buf(),
                source,
            },
        })?;

        let mut catalog = self.catalog.write().map_err(|_| SessionError::Lock)?;
        let report = catalog.load_user_translations(&tree)?;
        info!("applied translation file {}", path.display());
        Ok(report)
    }

    /// Write every non-empty translation to `path` as nested JSON.
    pub fn save<P: AsRef<Path>>(&self, path: P) -> Result<SaveOutcome, SaveError> {
        let tree = {
            let catalog = self.catalog.read().map_err(|_| SaveError::Lock)?;
            catalog.serialize()?
        };
        write_json(
            path.as_ref(),
            &tree,
            self.config.output.indent,
            self.config.output.backup_existing,
        )
    }

    pub fn set_entry_translation(&self, key: &str, text: &str) -> Result<(), SessionError> {
        let reserved = self.reserved.lock().map_err(|_| SessionError::Lock)?;
        if reserved.contains_key(key) {
            return Err(SessionError::KeyBusy(key.to_string()));
        }
        let mut catalog = self.catalog.write().map_err(|_| SessionError::Lock)?;
        catalog.set_translation(key, text)?;
        Ok(())
    }

    /// Translate one entry now with the session backend and store the result.
    ///
    /// The backend sees the display form of the source; the result is stored
    /// in storage form. On backend failure the entry keeps its previous
    /// translation.
    pub async fn translate_entry(
        &self,
        key: &str,
        target_lang: &str,
    ) -> Result<String, SessionError> {
        self.check_language(target_lang)?;
        let text = self
            .entry(key)?
            .map(|entry| entry.display_source(self.config.translate.preserve_markup))
            .ok_or_else(|| SessionError::UnknownKey(key.to_string()))?;
        let _reservation = self.reserve(key)?;

        let backend = Arc::clone(&self.backend);
        let lang = target_lang.to_string();
        let translated = tokio::task::spawn_blocking(move || backend.translate(&text, &lang))
            .await
            .map_err(PipelineError::from)?
            .map_err(|err| {
                warn!("failed to translate {key}: {err}");
                err
            })?;

        let stored = self.storage_form(translated);
        let mut catalog = self.catalog.write().map_err(|_| SessionError::Lock)?;
        catalog.set_translation(key, stored.clone())?;
        Ok(stored)
    }

    /// Start a background batch. The backend receives each raw source text and
    /// its results are applied to the catalog verbatim as they arrive; every
    /// event is forwarded to the returned handle.
    pub fn submit_batch(
        &self,
        selection: BatchSelection,
        target_lang: &str,
    ) -> Result<SessionBatch, SessionError> {
        self.check_language(target_lang)?;

        let mut reserved = self.reserved.lock().map_err(|_| SessionError::Lock)?;
        let items = {
            let catalog = self.catalog.read().map_err(|_| SessionError::Lock)?;
            match selection {
                BatchSelection::Keys(keys) => {
                    let mut items = Vec::with_capacity(keys.len());
                    for key in keys {
                        let entry = catalog
                            .get(&key)
                            .ok_or_else(|| SessionError::UnknownKey(key.clone()))?;
                        if reserved.contains_key(&key) {
                            return Err(SessionError::KeyBusy(key));
                        }
                        items.push(BatchItem::new(key, entry.source()));
                    }
                    items
                }
                BatchSelection::Pending(filter) => catalog
                    .pending(&filter)
                    .into_iter()
                    .filter(|(key, _)| !reserved.contains_key(key))
                    .map(|(key, source)| BatchItem::new(key, source))
                    .collect(),
            }
        };

        let keys: Vec<String> = items.iter().map(|item| item.key.clone()).collect();
        let handle = self.pipeline.submit(BatchJob::new(items, target_lang))?;
        let job_id = handle.job_id();
        for key in keys {
            reserved.insert(key, job_id);
        }
        drop(reserved);

        let total = handle.total();
        let cancel = handle.cancel_flag();
        let (tx, rx) = mpsc::channel(self.config.batch.event_buffer.max(1));
        let task = tokio::spawn(forward_events(
            handle,
            Arc::clone(&self.catalog),
            Arc::clone(&self.reserved),
            tx,
        ));

        Ok(SessionBatch {
            job_id,
            total,
            events: rx,
            cancel,
            task,
        })
    }

    /// Stop the running batch after its in-flight item. Returns whether a batch
    /// was running.
    pub fn cancel_batch(&self) -> bool {
        self.pipeline.cancel()
    }

    fn batch_active(&self) -> Result<bool, SessionError> {
        let reserved = self.reserved.lock().map_err(|_| SessionError::Lock)?;
        Ok(self.pipeline.is_running() || !reserved.is_empty())
    }

    fn check_language(&self, target_lang: &str) -> Result<(), SessionError> {
        if self.languages.is_empty() || self.languages.iter().any(|lang| lang == target_lang) {
            Ok(())
        } else {
            Err(SessionError::UnsupportedLanguage(target_lang.to_string()))
        }
    }

    fn reserve(&self, key: &str) -> Result<KeyReservation, SessionError> {
        let mut reserved = self.reserved.lock().map_err(|_| SessionError::Lock)?;
        if reserved.contains_key(key) {
            return Err(SessionError::KeyBusy(key.to_string()));
        }
        let owner = Uuid::new_v4();
        reserved.insert(key.to_string(), owner);
        Ok(KeyReservation {
            reserved: Arc::clone(&self.reserved),
            key: key.to_string(),
            owner,
        })
    }

    fn storage_form(&self, translated: String) -> String {
        if self.config.translate.restore_newline_escapes {
            to_storage(&translated)
        } else {
            translated
        }
    }
}

/// Event stream of a batch started through [`Session::submit_batch`].
///
/// `ItemTranslated` events carry the text as stored in the catalog.
pub struct SessionBatch {
    job_id: Uuid,
    total: usize,
    events: mpsc::Receiver<BatchEvent>,
    cancel: Arc<AtomicBool>,
    task: JoinHandle<Result<BatchSummary, PipelineError>>,
}

impl SessionBatch {
    pub fn job_id(&self) -> Uuid {
        self.job_id
    }

    pub fn total(&self) -> usize {
        self.total
    }

    pub fn cancel(&self) {
        self.cancel.store(true, Ordering::SeqCst);
    }

    pub async fn next_event(&mut self) -> Option<BatchEvent> {
        self.events.recv().await
    }

    /// Drain the remaining events and wait until every result is applied.
    pub async fn finish(mut self) -> Result<BatchSummary, SessionError> {
        while self.events.recv().await.is_some() {}
        let summary = self.task.await.map_err(PipelineError::from)??;
        Ok(summary)
    }
}

struct KeyReservation {
    reserved: Reservations,
    key: String,
    owner: Uuid,
}

impl Drop for KeyReservation {
    fn drop(&mut self) {
        release_key(&self.reserved, &self.key, self.owner);
    }
}

fn release_key(reserved: &Mutex<HashMap<String, Uuid>>, key: &str, owner: Uuid) {
    if let Ok(mut guard) = reserved.lock() {
        if guard.get(key) == Some(&owner) {
            guard.remove(key);
        }
    }
}

fn release_job(reserved: &Mutex<HashMap<String, Uuid>>, owner: Uuid) {
    if let Ok(mut guard) = reserved.lock() {
        guard.retain(|_, holder| *holder != owner);
    }
}

async fn forward_events(
    mut handle: BatchHandle,
    catalog: Arc<RwLock<TranslationCatalog>>,
    reserved: Reservations,
    tx: mpsc::Sender<BatchEvent>,
) -> Result<BatchSummary, PipelineError> {
    let job_id = handle.job_id();

    while let Some(event) = handle.next_event().await {
        let event = apply_event(event, &catalog, &reserved, job_id);
        // A dropped receiver only means nobody is watching; results still land.
        let _ = tx.send(event).await;
    }

    release_job(&reserved, job_id);
    handle.finish().await
}

fn apply_event(
    event: BatchEvent,
    catalog: &RwLock<TranslationCatalog>,
    reserved: &Mutex<HashMap<String, Uuid>>,
    job_id: Uuid,
) -> BatchEvent {
    match event {
        BatchEvent::ItemTranslated { key, text } => {
            match catalog.write() {
                Ok(mut catalog) => {
                    if let Err(err) = catalog.set_translation(&key, text.clone()) {
                        warn!("dropping batch result: {err}");
                    }
                }
                Err(_) => warn!("catalog lock poisoned, dropping batch result for {key}"),
            }
            release_key(reserved, &key, job_id);
            BatchEvent::ItemTranslated { key, text }
        }
        BatchEvent::ItemFailed { key, error } => {
            release_key(reserved, &key, job_id);
            BatchEvent::ItemFailed { key, error }
        }
        terminal @ (BatchEvent::Finished(_) | BatchEvent::Cancelled(_)) => {
            release_job(reserved, job_id);
            terminal
        }
        other => other,
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::backend::{BackendError, PseudoBackend};
    use crate::entry::EntryStatus;
    use crate::test_support::{Gate, ScriptedBackend};
    use serde_json::json;
    use std::fs;
    use std::time::Duration;
    use tempfile::tempdir;

    fn reference() -> Value {
        json!({
            "greeting": "Hello",
            "menu": {
                "start": "Start <b>now</b>",
                "quit": "Quit\\nGame",
                "help": "Help"
            },
            "footer": "Bye"
        })
    }

    fn session_with(backend: Arc<dyn TranslationBackend>) -> Session {
        Session::from_reference(&reference(), backend, TranslatorConfig::default()).unwrap()
    }

    async fn wait_for_calls(gate: &Gate, calls: usize) {
        for _ in 0..500 {
            if gate.entered() >= calls {
                return;
            }
            tokio::time::sleep(Duration::from_millis(5)).await;
        }
        panic!("backend never reached {calls} calls");
    }

    struct NoLanguages;

    impl TranslationBackend for NoLanguages {
        fn name(&self) -> &'static str {
            "NoLanguages"
        }

        fn translate(&self, text: &str, _target_lang: &str) -> Result<String, BackendError> {
            Ok(text.to_uppercase())
        }

        fn supported_languages(&self) -> Result<Vec<String>, BackendError> {
            Err(BackendError::Unavailable("offline".into()))
        }
    }

    #[test]
    fn missing_reference_file_is_fatal() {
        let dir = tempdir().unwrap();
        let result = Session::load_reference(
            dir.path().join("en.json"),
            Arc::new(PseudoBackend::default()),
            TranslatorConfig::default(),
        );
        assert!(matches!(result, Err(ReferenceLoadError::Io { .. })));
    }

    #[test]
    fn malformed_user_file_leaves_catalog_unchanged() {
        let dir = tempdir().unwrap();
        let bad = dir.path().join("fr.json");
        fs::write(&bad, "{ not json").unwrap();

        let session = session_with(Arc::new(ScriptedBackend::new()));
        session.set_entry_translation("greeting", "Salut").unwrap();
        let err = session.load_user_translations(&bad).unwrap_err();
        assert!(matches!(
            err,
            SessionError::UserFile(UserFileLoadError::Json { .. })
        ));
        assert_eq!(session.entry("greeting").unwrap().unwrap().translation(), "Salut");
    }

    #[test]
    fn languages_are_listed_and_searchable() {
        let session = session_with(Arc::new(PseudoBackend::default()));
        assert!(session.languages().contains(&"fr".to_string()));
        assert_eq!(session.filter_languages("Z"), vec!["zh-CN".to_string()]);

        let offline = session_with(Arc::new(NoLanguages));
        assert!(offline.languages().is_empty());
    }

    #[tokio::test]
    async fn unsupported_language_is_rejected_before_work_starts() {
        let session = session_with(Arc::new(ScriptedBackend::new()));
        assert!(matches!(
            session.submit_batch(BatchSelection::Pending(EntryFilter::all()), "xx"),
            Err(SessionError::UnsupportedLanguage(_))
        ));
        assert!(matches!(
            session.translate_entry("greeting", "xx").await,
            Err(SessionError::UnsupportedLanguage(_))
        ));
    }

    #[tokio::test]
    async fn translate_entry_uses_display_source_and_storage_form() {
        let session = session_with(Arc::new(NoLanguages));
        let stored = session.translate_entry("menu.quit", "fr").await.unwrap();
        assert_eq!(stored, "QUIT\\nGAME");

        let stored = session.translate_entry("menu.start", "fr").await.unwrap();
        assert_eq!(stored, "START NOW");
        let entry = session.entry("menu.start").unwrap().unwrap();
        assert_eq!(entry.status(), EntryStatus::Translated);
    }

    #[tokio::test]
    async fn failed_single_translation_keeps_previous_text() {
        let session = session_with(Arc::new(ScriptedBackend::failing_on(["Hello"])));
        session.set_entry_translation("greeting", "Salut").unwrap();
        let err = session.translate_entry("greeting", "fr").await.unwrap_err();
        assert!(matches!(err, SessionError::Backend(_)));
        assert_eq!(session.entry("greeting").unwrap().unwrap().translation(), "Salut");
        tokio_test::assert_ok!(session.set_entry_translation("greeting", "Coucou"));
    }

    #[tokio::test]
    async fn batch_applies_results_for_visible_empty_entries() {
        let session = session_with(Arc::new(ScriptedBackend::failing_on(["Help"])));
        session.set_entry_translation("menu.quit", "Quitter").unwrap();

        let batch = session
            .submit_batch(BatchSelection::Pending(EntryFilter::by_key("menu")), "fr")
            .unwrap();
        assert_eq!(batch.total(), 2);
        let summary = batch.finish().await.unwrap();
        assert_eq!(summary.succeeded, 1);
        assert_eq!(summary.failed, 1);

        assert_eq!(
            session.entry("menu.start").unwrap().unwrap().translation(),
            "fr:Start <b>now</b>"
        );
        assert_eq!(session.entry("menu.help").unwrap().unwrap().translation(), "");
        assert_eq!(session.entry("greeting").unwrap().unwrap().translation(), "");
        assert!(!session.is_batch_running());
        tokio_test::assert_ok!(session.set_entry_translation("menu.help", "Aide"));
    }

    #[tokio::test]
    async fn keys_are_locked_while_batch_runs() {
        let gate = Arc::new(Gate::closed());
        let session = session_with(Arc::new(ScriptedBackend::gated(gate.clone())));
        let batch = session
            .submit_batch(
                BatchSelection::Keys(vec!["greeting".into(), "footer".into()]),
                "de",
            )
            .unwrap();
        wait_for_calls(&gate, 1).await;

        assert!(matches!(
            session.set_entry_translation("footer", "Tschüss"),
            Err(SessionError::KeyBusy(key)) if key == "footer"
        ));
        assert!(matches!(
            session.translate_entry("greeting", "de").await,
            Err(SessionError::KeyBusy(_))
        ));
        assert!(matches!(
            session.load_user_translations("unused.json"),
            Err(SessionError::BatchActive)
        ));
        assert!(matches!(
            session.submit_batch(BatchSelection::Keys(vec!["menu.help".into()]), "de"),
            Err(SessionError::Pipeline(PipelineError::Busy { .. }))
        ));
        session
            .set_entry_translation("menu.help", "Hilfe")
            .unwrap();

        gate.open();
        batch.finish().await.unwrap();
        assert_eq!(
            session.entry("footer").unwrap().unwrap().translation(),
            "de:Bye"
        );
        tokio_test::assert_ok!(session.set_entry_translation("footer", "Tschüss"));
    }

    #[tokio::test]
    async fn cancel_keeps_applied_results_and_frees_keys() {
        let gate = Arc::new(Gate::closed());
        let session = session_with(Arc::new(ScriptedBackend::gated(gate.clone())));
        let mut batch = session
            .submit_batch(BatchSelection::Pending(EntryFilter::all()), "ko")
            .unwrap();
        assert_eq!(batch.total(), 5);
        wait_for_calls(&gate, 1).await;

        assert!(session.cancel_batch());
        gate.open();

        let mut last = None;
        while let Some(event) = batch.next_event().await {
            last = Some(event);
        }
        assert!(matches!(last, Some(BatchEvent::Cancelled(ref s)) if s.attempted == 1));
        batch.finish().await.unwrap();

        let summary = session.summary().unwrap();
        assert_eq!(summary.translated, 1);
        assert_eq!(
            session.entry("greeting").unwrap().unwrap().translation(),
            "ko:Hello"
        );
        tokio_test::assert_ok!(session.set_entry_translation("footer", "잘 가"));
    }

    #[tokio::test]
    async fn batch_keeps_markup_and_entities_of_the_source() {
        let reference = json!({"warn": "<color=red>Danger</color> &quot;x&quot;"});
        let backend = Arc::new(ScriptedBackend::new());
        let session =
            Session::from_reference(&reference, backend.clone(), TranslatorConfig::default())
                .unwrap();

        let batch = session
            .submit_batch(BatchSelection::Pending(EntryFilter::all()), "fr")
            .unwrap();
        batch.finish().await.unwrap();

        assert_eq!(
            backend.calls(),
            vec!["<color=red>Danger</color> &quot;x&quot;".to_string()]
        );
        assert_eq!(
            session.entry("warn").unwrap().unwrap().translation(),
            "fr:<color=red>Danger</color> &quot;x&quot;"
        );
    }

    #[tokio::test]
    async fn batch_stores_escaped_newlines_verbatim() {
        let session = session_with(Arc::new(ScriptedBackend::new()));
        let mut batch = session
            .submit_batch(BatchSelection::Keys(vec!["menu.quit".into()]), "fr")
            .unwrap();

        let mut forwarded = Vec::new();
        while let Some(event) = batch.next_event().await {
            if let BatchEvent::ItemTranslated { text, .. } = &event {
                forwarded.push(text.clone());
            }
        }
        assert_eq!(forwarded, vec!["fr:Quit\\nGame".to_string()]);
        assert_eq!(
            session.entry("menu.quit").unwrap().unwrap().translation(),
            "fr:Quit\\nGame"
        );
    }

    #[tokio::test]
    async fn unknown_batch_key_is_rejected() {
        let session = session_with(Arc::new(ScriptedBackend::new()));
        assert!(matches!(
            session.submit_batch(BatchSelection::Keys(vec!["nope".into()]), "fr"),
            Err(SessionError::UnknownKey(key)) if key == "nope"
        ));
        assert!(!session.is_batch_running());
    }

    #[test]
    fn save_writes_only_translated_keys() {
        let dir = tempdir().unwrap();
        let out = dir.path().join("fr.json");
        let session = session_with(Arc::new(ScriptedBackend::new()));
        session.set_entry_translation("menu.help", "Aide").unwrap();
        session.set_entry_translation("footer", "Au revoir").unwrap();
        session.set_entry_translation("footer", "").unwrap();

        let outcome = session.save(&out).unwrap();
        assert!(outcome.backup_path.is_none());
        let written: Value = serde_json::from_str(&fs::read_to_string(&out).unwrap()).unwrap();
        assert_eq!(written, json!({"menu": {"help": "Aide"}}));
    }
}
