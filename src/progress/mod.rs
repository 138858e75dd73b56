//! Per-run stage completion flags.
//!
//! Progress is observability only: the pipeline writes it, monitoring reads it, and nothing
//! in the generation path branches on it.

use crate::store::BestEffortStore;
use crate::types::{now_millis, RunId};
use parking_lot::Mutex;
use serde::{Deserialize, Serialize};
use std::sync::Arc;

/// Completion flag for one stage.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct StageFlag {
    pub stage: String,
    pub complete: bool,
}

/// Which stages of a run have reached a terminal state.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct PipelineProgress {
    pub run_id: RunId,
    pub started_at_ms: u64,
    pub updated_at_ms: u64,
    /// In pipeline order: section stages first, compiler last.
    pub stages: Vec<StageFlag>,
}

impl PipelineProgress {
    pub fn new(run_id: RunId, stages: &[String]) -> Self {
        let now = now_millis();
        Self {
            run_id,
            started_at_ms: now,
            updated_at_ms: now,
            stages: stages
                .iter()
                .map(|stage| StageFlag {
                    stage: stage.clone(),
                    complete: false,
                })
                .collect(),
        }
    }

    /// Set `stage` complete, appending it if it was not declared at start.
    pub fn mark(&mut self, stage: &str) {
        match self.stages.iter_mut().find(|flag| flag.stage == stage) {
            Some(flag) => flag.complete = true,
            None => self.stages.push(StageFlag {
                stage: stage.to_string(),
                complete: true,
            }),
        }
        self.updated_at_ms = now_millis();
    }

    pub fn is_complete(&self, stage: &str) -> bool {
        self.stages
            .iter()
            .any(|flag| flag.stage == stage && flag.complete)
    }

    pub fn completed_count(&self) -> usize {
        self.stages.iter().filter(|flag| flag.complete).count()
    }

    pub fn all_complete(&self) -> bool {
        self.stages.iter().all(|flag| flag.complete)
    }
}

/// In-memory progress for the current run, forwarded to the store when one is attached.
pub struct ProgressTracker {
    state: Mutex<PipelineProgress>,
    store: Option<Arc<BestEffortStore>>,
}

impl ProgressTracker {
    /// Create the run's progress record with every flag false.
    pub fn start(run_id: RunId, stages: &[String], store: Option<Arc<BestEffortStore>>) -> Self {
        if let Some(store) = &store {
            store.start_run(&run_id, stages);
        }
        Self {
            state: Mutex::new(PipelineProgress::new(run_id, stages)),
            store,
        }
    }

    pub fn mark_complete(&self, stage: &str) {
        let run_id = {
            let mut state = self.state.lock();
            state.mark(stage);
            state.run_id.clone()
        };
        if let Some(store) = &self.store {
            store.mark_stage_complete(&run_id, stage);
        }
    }

    pub fn snapshot(&self) -> PipelineProgress {
        self.state.lock().clone()
    }

    pub fn run_id(&self) -> RunId {
        self.state.lock().run_id.clone()
    }
}
