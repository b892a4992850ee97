use thiserror::Error;

#[derive(Debug, Error)]
pub enum BackendError {
    #[error("translator rejected the request: {0}")]
    Rejected(String),

    #[error("translator unavailable: {0}")]
    Unavailable(String),

    #[error("target language not supported: {0}")]
    UnsupportedLanguage(String),

    #[error(transparent)]
    Other(#[from] anyhow::Error),
}

/// Machine-translation capability consumed by the catalog tooling.
///
/// Implementations own their networking, retries and timeouts. Calls are
/// blocking; the batch pipeline moves them off the async executor.
pub trait TranslationBackend: Send + Sync {
    fn name(&self) -> &'static str;

    fn translate(&self, text: &str, target_lang: &str) -> Result<String, BackendError>;

    fn supported_languages(&self) -> Result<Vec<String>, BackendError>;
}

/// Offline pseudo-localization backend.
///
/// Marks every string with the target code instead of translating it, which is
/// enough to spot untranslated or truncated strings in a mod's UI.
#[derive(Debug, Clone)]
pub struct PseudoBackend {
    languages: Vec<String>,
}

impl PseudoBackend {
    pub fn new<I, S>(languages: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        Self {
            languages: languages.into_iter().map(Into::into).collect(),
        }
    }
}

impl Default for PseudoBackend {
    fn default() -> Self {
        Self::new(["de", "es", "fr", "it", "ja", "ko", "pl", "pt", "ru", "zh-CN"])
    }
}

impl TranslationBackend for PseudoBackend {
    fn name(&self) -> &'static str {
        "Pseudo"
    }

    fn translate(&self, text: &str, target_lang: &str) -> Result<String, BackendError> {
        if !self.languages.iter().any(|lang| lang == target_lang) {
            return Err(BackendError::UnsupportedLanguage(target_lang.to_string()));
        }
        Ok(format!("[{target_lang}] {text}"))
    }

    fn supported_languages(&self) -> Result<Vec<String>, BackendError> {
        Ok(self.languages.clone())
    }
}
