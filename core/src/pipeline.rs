/// Background batch translation through an injected backend
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Arc, Mutex};

use log::{debug, info, warn};
use serde::Serialize;
use thiserror::Error;
use tokio::runtime::Handle;
use tokio::sync::mpsc;
use tokio::task::{JoinError, JoinHandle};
use uuid::Uuid;

use crate::backend::TranslationBackend;

pub const DEFAULT_EVENT_BUFFER: usize = 64;

#[derive(Debug, Error)]
pub enum PipelineError {
    #[error("batch {job_id} is still running")]
    Busy { job_id: Uuid },

    #[error("batch jobs need a running tokio runtime")]
    NoRuntime,

    #[error("batch task failed: {0}")]
    Join(#[from] JoinError),

    #[error("pipeline state lock poisoned")]
    Lock,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct BatchItem {
    pub key: String,
    pub text: String,
}

impl BatchItem {
    pub fn new(key: impl Into<String>, text: impl Into<String>) -> Self {
        Self {
            key: key.into(),
            text: text.into(),
        }
    }
}

#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct BatchJob {
    pub id: Uuid,
    pub items: Vec<BatchItem>,
    pub target_lang: String,
}

impl BatchJob {
    pub fn new(items: Vec<BatchItem>, target_lang: impl Into<String>) -> Self {
        Self {
            id: Uuid::new_v4(),
            items,
            target_lang: target_lang.into(),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct BatchSummary {
    pub job_id: Uuid,
    pub total: usize,
    /// Items whose backend call was issued, successful or not.
    pub attempted: usize,
    pub succeeded: usize,
    pub failed: usize,
    pub cancelled: bool,
}

impl BatchSummary {
    fn new(job_id: Uuid, total: usize) -> Self {
        Self {
            job_id,
            total,
            attempted: 0,
            succeeded: 0,
            failed: 0,
            cancelled: false,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum BatchEvent {
    Started {
        job_id: Uuid,
        total: usize,
        target_lang: String,
    },
    ItemTranslated {
        key: String,
        text: String,
    },
    ItemFailed {
        key: String,
        error: String,
    },
    Progress {
        completed: usize,
        total: usize,
        percent: u8,
    },
    Finished(BatchSummary),
    Cancelled(BatchSummary),
}

impl BatchEvent {
    pub fn is_terminal(&self) -> bool {
        matches!(self, BatchEvent::Finished(_) | BatchEvent::Cancelled(_))
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(tag = "state", rename_all = "snake_case")]
pub enum PipelineState {
    Idle,
    Running { job_id: Uuid },
    Completed { job_id: Uuid },
}

struct Shared {
    state: PipelineState,
    cancel: Option<Arc<AtomicBool>>,
}

/// Runs one batch job at a time; a submit while a job runs is rejected.
pub struct BatchPipeline {
    backend: Arc<dyn TranslationBackend>,
    event_buffer: usize,
    shared: Arc<Mutex<Shared>>,
}

impl BatchPipeline {
    pub fn new(backend: Arc<dyn TranslationBackend>) -> Self {
        Self::with_event_buffer(backend, DEFAULT_EVENT_BUFFER)
    }

    pub fn with_event_buffer(backend: Arc<dyn TranslationBackend>, event_buffer: usize) -> Self {
        Self {
            backend,
            event_buffer: event_buffer.max(1),
            shared: Arc::new(Mutex::new(Shared {
                state: PipelineState::Idle,
                cancel: None,
            })),
        }
    }

    pub fn state(&self) -> PipelineState {
        self.shared
            .lock()
            .map(|guard| guard.state)
            .unwrap_or(PipelineState::Idle)
    }

    pub fn is_running(&self) -> bool {
        matches!(self.state(), PipelineState::Running { .. })
    }

    /// Start `job` on the current tokio runtime.
    pub fn submit(&self, job: BatchJob) -> Result<BatchHandle, PipelineError> {
        let runtime = Handle::try_current().map_err(|_| PipelineError::NoRuntime)?;
        let cancel = Arc::new(AtomicBool::new(false));

        {
            let mut guard = self.shared.lock().map_err(|_| PipelineError::Lock)?;
            if let PipelineState::Running { job_id } = guard.state {
                return Err(PipelineError::Busy { job_id });
            }
            guard.state = PipelineState::Running { job_id: job.id };
            guard.cancel = Some(Arc::clone(&cancel));
        }

        let (tx, rx) = mpsc::channel::<BatchEvent>(self.event_buffer);
        let job_id = job.id;
        let total = job.items.len();
        info!(
            "starting batch {job_id}: {total} items -> {} via {}",
            job.target_lang,
            self.backend.name()
        );

        let task = runtime.spawn(run_batch(
            Arc::clone(&self.backend),
            job,
            Arc::clone(&cancel),
            tx,
            Arc::clone(&self.shared),
        ));

        Ok(BatchHandle {
            job_id,
            total,
            events: rx,
            cancel,
            task,
        })
    }

    /// Ask the running job to stop after its in-flight item.
    pub fn cancel(&self) -> bool {
        let Ok(guard) = self.shared.lock() else {
            return false;
        };
        match (&guard.state, &guard.cancel) {
            (PipelineState::Running { job_id }, Some(flag)) => {
                flag.store(true, Ordering::SeqCst);
                info!("cancel requested for batch {job_id}");
                true
            }
            _ => false,
        }
    }
}

/// Caller side of a submitted job: ordered event stream plus cancel control.
pub struct BatchHandle {
    job_id: Uuid,
    total: usize,
    events: mpsc::Receiver<BatchEvent>,
    cancel: Arc<AtomicBool>,
    task: JoinHandle<BatchSummary>,
}

impl BatchHandle {
    pub fn job_id(&self) -> Uuid {
        self.job_id
    }

    pub fn total(&self) -> usize {
        self.total
    }

    pub fn cancel(&self) {
        self.cancel.store(true, Ordering::SeqCst);
    }

    /// Next event in submission order; `None` once the stream is exhausted.
    pub async fn next_event(&mut self) -> Option<BatchEvent> {
        self.events.recv().await
    }

    /// Drain the remaining events and wait for the summary.
    pub async fn finish(mut self) -> Result<BatchSummary, PipelineError> {
        while self.events.recv().await.is_some() {}
        Ok(self.task.await?)
    }

    pub(crate) fn cancel_flag(&self) -> Arc<AtomicBool> {
        Arc::clone(&self.cancel)
    }
}

async fn run_batch(
    backend: Arc<dyn TranslationBackend>,
    job: BatchJob,
    cancel: Arc<AtomicBool>,
    tx: mpsc::Sender<BatchEvent>,
    shared: Arc<Mutex<Shared>>,
) -> BatchSummary {
    let total = job.items.len();
    let mut summary = BatchSummary::new(job.id, total);

    emit(
        &tx,
        BatchEvent::Started {
            job_id: job.id,
            total,
            target_lang: job.target_lang.clone(),
        },
    )
    .await;

    for item in job.items {
        if cancel.load(Ordering::SeqCst) {
            summary.cancelled = true;
            break;
        }

        let worker = Arc::clone(&backend);
        let text = item.text.clone();
        let lang = job.target_lang.clone();
        let res = tokio::task::spawn_blocking(move || worker.translate(&text, &lang)).await;
        summary.attempted += 1;

        let event = match res {
            Ok(Ok(translated)) => {
                summary.succeeded += 1;
                BatchEvent::ItemTranslated {
                    key: item.key,
                    text: translated,
                }
            }
            Ok(Err(err)) => {
                warn!("failed to translate {}: {}", item.key, err);
                summary.failed += 1;
                BatchEvent::ItemFailed {
                    key: item.key,
                    error: err.to_string(),
                }
            }
            Err(join_err) => {
                warn!("translator task for {} aborted: {}", item.key, join_err);
                summary.failed += 1;
                BatchEvent::ItemFailed {
                    key: item.key,
                    error: join_err.to_string(),
                }
            }
        };
        emit(&tx, event).await;

        let completed = summary.attempted;
        debug!("batch {}: {completed}/{total}", job.id);
        emit(
            &tx,
            BatchEvent::Progress {
                completed,
                total,
                percent: percentage(completed, total),
            },
        )
        .await;
    }

    // State flips before the terminal event so a caller reacting to it can
    // submit the next job right away.
    if let Ok(mut guard) = shared.lock() {
        guard.state = if summary.cancelled {
            PipelineState::Idle
        } else {
            PipelineState::Completed { job_id: job.id }
        };
        guard.cancel = None;
    }

    info!(
        "batch {} {}: {} of {} translated, {} failed",
        job.id,
        if summary.cancelled { "cancelled" } else { "finished" },
        summary.succeeded,
        total,
        summary.failed
    );

    let terminal = if summary.cancelled {
        BatchEvent::Cancelled(summary.clone())
    } else {
        BatchEvent::Finished(summary.clone())
    };
    emit(&tx, terminal).await;

    summary
}

async fn emit(tx: &mpsc::Sender<BatchEvent>, event: BatchEvent) {
    if tx.send(event).await.is_err() {
        debug!("batch event dropped: receiver closed");
    }
}

fn percentage(completed: usize, total: usize) -> u8 {
    if total == 0 {
        return 100;
    }
    u8::try_from(completed * 100 / total).unwrap_or(100)
}
