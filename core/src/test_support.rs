//! Scripted translation backends for unit tests.

use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::{Arc, Condvar, Mutex};

use anyhow::anyhow;

use crate::backend::{BackendError, TranslationBackend};

/// Blocks backend calls until opened.
pub(crate) struct Gate {
    open: Mutex<bool>,
    cv: Condvar,
    entered: AtomicUsize,
}

impl Gate {
    pub(crate) fn closed() -> Self {
        Self {
            open: Mutex::new(false),
            cv: Condvar::new(),
            entered: AtomicUsize::new(0),
        }
    }

    pub(crate) fn open(&self) {
        *self.open.lock().unwrap() = true;
        self.cv.notify_all();
    }

    pub(crate) fn entered(&self) -> usize {
        self.entered.load(Ordering::SeqCst)
    }

    fn pass(&self) {
        self.entered.fetch_add(1, Ordering::SeqCst);
        let mut open = self.open.lock().unwrap();
        while !*open {
            open = self.cv.wait(open).unwrap();
        }
    }
}

/// Answers `"{lang}:{text}"`, failing for the configured inputs.
pub(crate) struct ScriptedBackend {
    fail_on: Vec<String>,
    gate: Option<Arc<Gate>>,
    calls: Mutex<Vec<String>>,
}

impl ScriptedBackend {
    pub(crate) fn new() -> Self {
        Self {
            fail_on: Vec::new(),
            gate: None,
            calls: Mutex::new(Vec::new()),
        }
    }

    pub(crate) fn failing_on<const N: usize>(texts: [&str; N]) -> Self {
        Self {
            fail_on: texts.iter().map(|t| t.to_string()).collect(),
            ..Self::new()
        }
    }

    pub(crate) fn gated(gate: Arc<Gate>) -> Self {
        Self {
            gate: Some(gate),
            ..Self::new()
        }
    }

    pub(crate) fn calls(&self) -> Vec<String> {
        self.calls.lock().unwrap().clone()
    }
}

impl TranslationBackend for ScriptedBackend {
    fn name(&self) -> &'static str {
        "Scripted"
    }

    fn translate(&self, text: &str, target_lang: &str) -> Result<String, BackendError> {
        self.calls.lock().unwrap().push(text.to_string());
        if let Some(gate) = &self.gate {
            gate.pass();
        }
        if self.fail_on.iter().any(|t| t == text) {
            return Err(BackendError::Other(anyhow!("scripted failure for {text}")));
        }
        Ok(format!("{target_lang}:{text}"))
    }

    fn supported_languages(&self) -> Result<Vec<String>, BackendError> {
        Ok(vec!["de".into(), "fr".into(), "ko".into()])
    }
}
