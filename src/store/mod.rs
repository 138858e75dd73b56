//! Pipeline persistence.
//!
//! Records final artifacts and per-run progress. The pipeline only reaches stores through
//! [`BestEffortStore`], which keeps every write off the generation path and turns failures
//! into log lines.

pub mod memory;
pub mod persistence;

pub use memory::MemoryStore;
pub use persistence::SledPipelineStore;

use crate::error::StorageError;
use crate::progress::PipelineProgress;
use crate::types::RunId;
use serde::{Deserialize, Serialize};
use std::sync::mpsc;
use std::sync::Arc;
use std::thread;
use std::time::Duration;
use tokio::sync::oneshot;
use tracing::{debug, warn};

/// One persisted final document.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ArtifactRecord {
    /// Store key: zero-padded timestamp followed by the content hash.
    pub key: String,
    pub recorded_at_ms: u64,
    /// Hex-encoded blake3 hash of the final text.
    pub content_hash: String,
    /// The caller's original message, never the compiled prompt.
    pub user_message: String,
    pub final_text: String,
}

impl ArtifactRecord {
    pub fn new(user_message: &str, final_text: &str, recorded_at_ms: u64) -> Self {
        let content_hash = hex::encode(blake3::hash(final_text.as_bytes()).as_bytes());
        Self {
            key: format!("{:020}:{}", recorded_at_ms, content_hash),
            recorded_at_ms,
            content_hash,
            user_message: user_message.to_string(),
            final_text: final_text.to_string(),
        }
    }

    pub fn chars(&self) -> usize {
        self.final_text.chars().count()
    }
}

/// Persistence collaborator.
pub trait PipelineStore: Send + Sync {
    /// Create the run's progress record with every stage flag false.
    fn start_run(&self, run_id: &RunId, stages: &[String]) -> Result<(), StorageError>;

    fn mark_stage_complete(&self, run_id: &RunId, stage: &str) -> Result<(), StorageError>;

    fn record_artifact(
        &self,
        user_message: &str,
        final_text: &str,
    ) -> Result<ArtifactRecord, StorageError>;

    fn get_progress(&self, run_id: &RunId) -> Result<Option<PipelineProgress>, StorageError>;

    /// Most recently started run.
    fn latest_run(&self) -> Result<Option<PipelineProgress>, StorageError>;

    /// Newest first.
    fn list_artifacts(&self, limit: usize) -> Result<Vec<ArtifactRecord>, StorageError>;
}

enum StoreOp {
    StartRun { run_id: RunId, stages: Vec<String> },
    MarkStage { run_id: RunId, stage: String },
    RecordArtifact { user_message: String, final_text: String },
    Flush(oneshot::Sender<()>),
}

impl StoreOp {
    fn name(&self) -> &'static str {
        match self {
            StoreOp::StartRun { .. } => "start_run",
            StoreOp::MarkStage { .. } => "mark_stage_complete",
            StoreOp::RecordArtifact { .. } => "record_artifact",
            StoreOp::Flush(_) => "flush",
        }
    }
}

fn apply(store: &dyn PipelineStore, op: StoreOp) {
    let name = op.name();
    let outcome = match op {
        StoreOp::StartRun { run_id, stages } => store.start_run(&run_id, &stages),
        StoreOp::MarkStage { run_id, stage } => store.mark_stage_complete(&run_id, &stage),
        StoreOp::RecordArtifact {
            user_message,
            final_text,
        } => store
            .record_artifact(&user_message, &final_text)
            .map(|record| {
                debug!(key = %record.key, chars = record.chars(), "Artifact recorded");
            }),
        StoreOp::Flush(done) => {
            let _ = done.send(());
            Ok(())
        }
    };
    if let Err(err) = outcome {
        warn!(operation = name, error = %err, "Persistence write failed (non-fatal)");
    }
}

/// Fire-and-forget wrapper around a [`PipelineStore`].
///
/// Writes are queued to a dedicated writer thread and applied in submission order, so a
/// stage mark never overtakes the run it belongs to. [`BestEffortStore::flush`] waits for
/// everything queued so far; [`BestEffortStore::flush_within`] gives up after a deadline and
/// leaves the writer to finish in the background.
pub struct BestEffortStore {
    inner: Arc<dyn PipelineStore>,
    sender: mpsc::Sender<StoreOp>,
}

impl BestEffortStore {
    pub fn new(inner: Arc<dyn PipelineStore>) -> Self {
        let (sender, receiver) = mpsc::channel::<StoreOp>();
        let writer = Arc::clone(&inner);
        let spawned = thread::Builder::new()
            .name("blogforge-store".to_string())
            .spawn(move || {
                for op in receiver {
                    apply(writer.as_ref(), op);
                }
            });
        if let Err(err) = spawned {
            warn!(error = %err, "Failed to start persistence writer; writes will be dropped");
        }
        Self { inner, sender }
    }

    /// Direct access for read-side commands.
    pub fn inner(&self) -> &Arc<dyn PipelineStore> {
        &self.inner
    }

    fn submit(&self, op: StoreOp) {
        let name = op.name();
        if self.sender.send(op).is_err() {
            warn!(operation = name, "Persistence writer unavailable (non-fatal)");
        }
    }

    pub fn start_run(&self, run_id: &RunId, stages: &[String]) {
        self.submit(StoreOp::StartRun {
            run_id: run_id.clone(),
            stages: stages.to_vec(),
        });
    }

    pub fn mark_stage_complete(&self, run_id: &RunId, stage: &str) {
        self.submit(StoreOp::MarkStage {
            run_id: run_id.clone(),
            stage: stage.to_string(),
        });
    }

    pub fn record_artifact(&self, user_message: &str, final_text: &str) {
        self.submit(StoreOp::RecordArtifact {
            user_message: user_message.to_string(),
            final_text: final_text.to_string(),
        });
    }

    /// Wait until every previously submitted write has been applied or dropped.
    pub async fn flush(&self) {
        let (done, wait) = oneshot::channel();
        self.submit(StoreOp::Flush(done));
        if wait.await.is_err() {
            warn!("Persistence writer stopped before flush completed");
        }
    }

    /// Like [`flush`](Self::flush), bounded by `limit`. Returns false when the deadline hit.
    pub async fn flush_within(&self, limit: Duration) -> bool {
        match tokio::time::timeout(limit, self.flush()).await {
            Ok(()) => true,
            Err(_) => {
                warn!(
                    timeout_ms = limit.as_millis() as u64,
                    "Persistence writes still pending; continuing without waiting (non-fatal)"
                );
                false
            }
        }
    }
}
