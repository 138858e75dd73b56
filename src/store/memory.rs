//! In-process store for tests and `--no-store` runs.

use crate::error::StorageError;
use crate::progress::PipelineProgress;
use crate::store::{ArtifactRecord, PipelineStore};
use crate::types::{now_millis, RunId};
use parking_lot::Mutex;
use std::collections::HashMap;

#[derive(Default)]
pub struct MemoryStore {
    runs: Mutex<HashMap<RunId, PipelineProgress>>,
    /// Start order of runs.
    run_order: Mutex<Vec<RunId>>,
    artifacts: Mutex<Vec<ArtifactRecord>>,
}

impl MemoryStore {
    pub fn new() -> Self {
        Self::default()
    }

    /// Every recorded artifact, oldest first.
    pub fn artifacts(&self) -> Vec<ArtifactRecord> {
        self.artifacts.lock().clone()
    }
}

impl PipelineStore for MemoryStore {
    fn start_run(&self, run_id: &RunId, stages: &[String]) -> Result<(), StorageError> {
        self.runs
            .lock()
            .insert(run_id.clone(), PipelineProgress::new(run_id.clone(), stages));
        self.run_order.lock().push(run_id.clone());
        Ok(())
    }

    fn mark_stage_complete(&self, run_id: &RunId, stage: &str) -> Result<(), StorageError> {
        let mut runs = self.runs.lock();
        let progress = runs
            .get_mut(run_id)
            .ok_or_else(|| StorageError::RunNotFound(run_id.to_string()))?;
        progress.mark(stage);
        Ok(())
    }

    fn record_artifact(
        &self,
        user_message: &str,
        final_text: &str,
    ) -> Result<ArtifactRecord, StorageError> {
        let record = ArtifactRecord::new(user_message, final_text, now_millis());
        self.artifacts.lock().push(record.clone());
        Ok(record)
    }

    fn get_progress(&self, run_id: &RunId) -> Result<Option<PipelineProgress>, StorageError> {
        Ok(self.runs.lock().get(run_id).cloned())
    }

    fn latest_run(&self) -> Result<Option<PipelineProgress>, StorageError> {
        let latest = self.run_order.lock().last().cloned();
        match latest {
            Some(run_id) => self.get_progress(&run_id),
            None => Ok(None),
        }
    }

    fn list_artifacts(&self, limit: usize) -> Result<Vec<ArtifactRecord>, StorageError> {
        Ok(self
            .artifacts
            .lock()
            .iter()
            .rev()
            .take(limit)
            .cloned()
            .collect())
    }
}
