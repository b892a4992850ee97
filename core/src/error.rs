use std::io;
use std::path::PathBuf;

use thiserror::Error;

use crate::backend::BackendError;
use crate::catalog::UnknownKey;
use crate::flatten::FlattenError;
use crate::pipeline::PipelineError;

/// Failure to build the catalog from the reference table. Fatal for a session.
#[derive(Debug, Error)]
pub enum ReferenceLoadError {
    #[error("failed to read reference file {}: {source}", .path.display())]
    Io {
        path: PathBuf,
        #[source]
        source: io::Error,
    },

    #[error("reference file {} is not valid JSON: {source}", .path.display())]
    Json {
        path: PathBuf,
        #[source]
        source: serde_json::Error,
    },

    #[error("reference table must be a JSON object at the root")]
    NotAnObject,

    #[error("reference keys are ambiguous: {0}")]
    PathConflict(#[from] FlattenError),
}

/// Failure to load a user translation file. The catalog is left untouched.
#[derive(Debug, Error)]
pub enum UserFileLoadError {
    #[error("failed to read translation file {}: {source}", .path.display())]
    Io {
        path: PathBuf,
        #[source]
        source: io::Error,
    },

    #[error("translation file {} is not valid JSON: {source}", .path.display())]
    Json {
        path: PathBuf,
        #[source]
        source: serde_json::Error,
    },

    #[error("translation file must be a JSON object at the root")]
    NotAnObject,

    #[error("translation file keys are ambiguous: {0}")]
    DuplicatePath(#[from] FlattenError),
}

#[derive(Debug, Error)]
pub enum SaveError {
    #[error("failed to write {}: {source}", .path.display())]
    Io {
        path: PathBuf,
        #[source]
        source: io::Error,
    },

    #[error("failed to serialize translations: {0}")]
    Serialize(#[from] serde_json::Error),

    #[error("translations cannot be nested: {0}")]
    Structure(#[from] FlattenError),

    #[error("failed to back up {}: {source}", .path.display())]
    Backup {
        path: PathBuf,
        #[source]
        source: io::Error,
    },

    #[error("catalog lock poisoned")]
    Lock,
}

#[derive(Debug, Error)]
pub enum SessionError {
    #[error(transparent)]
    UserFile(#[from] UserFileLoadError),

    #[error(transparent)]
    Save(#[from] SaveError),

    #[error("translation failed: {0}")]
    Backend(#[from] BackendError),

    #[error(transparent)]
    Pipeline(#[from] PipelineError),

    #[error("unknown key: {0}")]
    UnknownKey(String),

    #[error("key {0} is reserved by the running batch")]
    KeyBusy(String),

    #[error("a batch translation is running")]
    BatchActive,

    #[error("unsupported target language: {0}")]
    UnsupportedLanguage(String),

    #[error("catalog lock poisoned")]
    Lock,
}

impl From<UnknownKey> for SessionError {
    fn from(err: UnknownKey) -> Self {
        SessionError::UnknownKey(err.0)
    }
}
