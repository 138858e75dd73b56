//! Sled-backed pipeline store.

use crate::error::StorageError;
use crate::progress::PipelineProgress;
use crate::store::{ArtifactRecord, PipelineStore};
use crate::types::{now_millis, RunId};
use sled::{Db, Tree};
use std::path::Path;

const TREE_ARTIFACTS: &str = "artifacts";
const TREE_RUNS: &str = "runs";
const TREE_RUN_INDEX: &str = "run_index";

/// Durable store with three trees:
/// - `artifacts`: `{ts:020}:{blake3 hex}` -> [`ArtifactRecord`] JSON
/// - `runs`: run id -> [`PipelineProgress`] JSON
/// - `run_index`: `{started_at:020}:{run id}` -> run id, for latest-run lookups
#[derive(Clone)]
pub struct SledPipelineStore {
    db: Db,
    artifacts: Tree,
    runs: Tree,
    run_index: Tree,
}

impl SledPipelineStore {
    /// Open (or create) a store at `path`.
    pub fn open<P: AsRef<Path>>(path: P) -> Result<Self, StorageError> {
        let db = sled::open(path.as_ref()).map_err(|e| {
            StorageError::Io(format!(
                "Failed to open sled database at {}: {}",
                path.as_ref().display(),
                e
            ))
        })?;
        Self::new(db)
    }

    pub fn new(db: Db) -> Result<Self, StorageError> {
        let artifacts = db.open_tree(TREE_ARTIFACTS)?;
        let runs = db.open_tree(TREE_RUNS)?;
        let run_index = db.open_tree(TREE_RUN_INDEX)?;
        Ok(Self {
            db,
            artifacts,
            runs,
            run_index,
        })
    }

    pub fn db(&self) -> &Db {
        &self.db
    }

    pub fn flush(&self) -> Result<(), StorageError> {
        self.db.flush()?;
        Ok(())
    }

    fn put_progress(&self, progress: &PipelineProgress) -> Result<(), StorageError> {
        let value = serde_json::to_vec(progress)?;
        self.runs.insert(progress.run_id.as_str().as_bytes(), value)?;
        Ok(())
    }
}

fn run_index_key(started_at_ms: u64, run_id: &RunId) -> String {
    format!("{:020}:{}", started_at_ms, run_id)
}

impl PipelineStore for SledPipelineStore {
    fn start_run(&self, run_id: &RunId, stages: &[String]) -> Result<(), StorageError> {
        let progress = PipelineProgress::new(run_id.clone(), stages);
        self.put_progress(&progress)?;
        self.run_index.insert(
            run_index_key(progress.started_at_ms, run_id).as_bytes(),
            run_id.as_str().as_bytes(),
        )?;
        Ok(())
    }

    fn mark_stage_complete(&self, run_id: &RunId, stage: &str) -> Result<(), StorageError> {
        let mut progress = self
            .get_progress(run_id)?
            .ok_or_else(|| StorageError::RunNotFound(run_id.to_string()))?;
        progress.mark(stage);
        self.put_progress(&progress)
    }

    fn record_artifact(
        &self,
        user_message: &str,
        final_text: &str,
    ) -> Result<ArtifactRecord, StorageError> {
        let record = ArtifactRecord::new(user_message, final_text, now_millis());
        let value = serde_json::to_vec(&record)?;
        self.artifacts.insert(record.key.as_bytes(), value)?;
        self.db.flush()?;
        Ok(record)
    }

    fn get_progress(&self, run_id: &RunId) -> Result<Option<PipelineProgress>, StorageError> {
        let Some(raw) = self.runs.get(run_id.as_str().as_bytes())? else {
            return Ok(None);
        };
        Ok(Some(serde_json::from_slice(&raw)?))
    }

    fn latest_run(&self) -> Result<Option<PipelineProgress>, StorageError> {
        let Some((_, run_id)) = self.run_index.last()? else {
            return Ok(None);
        };
        let run_id = RunId::from_string(String::from_utf8_lossy(&run_id).into_owned());
        self.get_progress(&run_id)
    }

    fn list_artifacts(&self, limit: usize) -> Result<Vec<ArtifactRecord>, StorageError> {
        let mut out = Vec::new();
        for entry in self.artifacts.iter().rev().take(limit) {
            let (_, value) = entry?;
            out.push(serde_json::from_slice(&value)?);
        }
        Ok(out)
    }
}
