pub mod backend;
pub mod catalog;
pub mod config;
pub mod entry;
mod error;
pub mod flatten;
pub mod persist;
pub mod pipeline;
pub mod session;
pub mod text;

#[cfg(test)]
mod test_support;

pub use backend::{BackendError, PseudoBackend, TranslationBackend};
pub use catalog::{CatalogSummary, LoadReport, TranslationCatalog, UnknownKey};
pub use config::{
    default_config_path, BatchOptions, OutputOptions, TranslateOptions, TranslatorConfig,
};
pub use entry::{classify, Classification, Entry, EntryFilter, EntryStatus};
pub use error::{ReferenceLoadError, SaveError, SessionError, UserFileLoadError};
pub use flatten::{flatten, unflatten, FlatMap, FlattenError, DEFAULT_SEPARATOR};
pub use persist::SaveOutcome;
pub use pipeline::{
    BatchEvent, BatchHandle, BatchItem, BatchJob, BatchPipeline, BatchSummary, PipelineError,
    PipelineState,
};
pub use session::{BatchSelection, Session, SessionBatch};
pub use text::{to_display, to_storage, truncate_preview};
