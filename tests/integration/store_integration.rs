//! Integration tests for the sled-backed pipeline store

use super::support::{all_prompts, article, business_vars, pipeline, ScriptedClient};
use blogforge::progress::PipelineProgress;
use blogforge::store::{ArtifactRecord, BestEffortStore, MemoryStore, PipelineStore, SledPipelineStore};
use blogforge::{RunId, StorageError};
use std::sync::Arc;
use std::time::{Duration, Instant};
use tempfile::TempDir;

/// Test that a full run leaves one artifact and a completed progress record
#[tokio::test(flavor = "multi_thread", worker_threads = 4)]
async fn test_pipeline_run_persists_to_sled() {
    let dir = TempDir::new().unwrap();
    let store = Arc::new(SledPipelineStore::open(dir.path().join("store")).unwrap());
    let compiled = article(300);
    let pipeline = pipeline(ScriptedClient::well_behaved(compiled.clone())).with_store(store.clone());

    let text = pipeline
        .run_pipeline("Roof leaks", &business_vars(), &all_prompts(), "Rules", 0.5)
        .await
        .unwrap();

    let artifacts = store.list_artifacts(10).unwrap();
    assert_eq!(artifacts.len(), 1);
    assert_eq!(artifacts[0].final_text, text);
    assert_eq!(artifacts[0].user_message, "Roof leaks");
    assert_eq!(
        artifacts[0].content_hash,
        blake3::hash(text.as_bytes()).to_hex().to_string()
    );

    let progress = store.latest_run().unwrap().unwrap();
    assert!(progress.all_complete());
    assert!(progress.is_complete("compiler"));
}

/// Test that writes queued through the best-effort wrapper apply in order
#[tokio::test]
async fn test_best_effort_writes_apply_in_order() {
    let dir = TempDir::new().unwrap();
    let sled_store = Arc::new(SledPipelineStore::open(dir.path()).unwrap());
    let store = BestEffortStore::new(sled_store.clone());

    let run_id = RunId::from_string("run-ordered");
    let stages = vec!["intro".to_string(), "faqs".to_string(), "compiler".to_string()];
    store.start_run(&run_id, &stages);
    for stage in &stages {
        store.mark_stage_complete(&run_id, stage);
    }
    store.record_artifact("msg", "# Final");
    store.flush().await;

    let progress = sled_store.get_progress(&run_id).unwrap().unwrap();
    assert!(progress.all_complete());
    assert_eq!(sled_store.list_artifacts(5).unwrap().len(), 1);
}

/// Test that marks for unknown runs are swallowed by the wrapper
#[tokio::test]
async fn test_unknown_run_mark_is_non_fatal() {
    let dir = TempDir::new().unwrap();
    let sled_store = Arc::new(SledPipelineStore::open(dir.path()).unwrap());
    assert!(sled_store
        .mark_stage_complete(&RunId::from_string("ghost"), "intro")
        .is_err());

    let store = BestEffortStore::new(sled_store.clone());
    store.mark_stage_complete(&RunId::from_string("ghost"), "intro");
    store.flush().await;
    assert!(sled_store.latest_run().unwrap().is_none());
}

/// Test that artifacts are listed newest first and limited
#[test]
fn test_artifact_listing_order() {
    let dir = TempDir::new().unwrap();
    let store = SledPipelineStore::open(dir.path()).unwrap();
    for i in 0..5 {
        store
            .record_artifact(&format!("message {}", i), &format!("text {}", i))
            .unwrap();
        std::thread::sleep(std::time::Duration::from_millis(2));
    }
    let listed = store.list_artifacts(3).unwrap();
    let messages: Vec<_> = listed.iter().map(|a| a.user_message.as_str()).collect();
    assert_eq!(messages, vec!["message 4", "message 3", "message 2"]);
}

/// Store whose artifact writes stall for a long time.
struct StallingStore {
    inner: MemoryStore,
}

impl PipelineStore for StallingStore {
    fn start_run(&self, run_id: &RunId, stages: &[String]) -> Result<(), StorageError> {
        self.inner.start_run(run_id, stages)
    }
    fn mark_stage_complete(&self, run_id: &RunId, stage: &str) -> Result<(), StorageError> {
        self.inner.mark_stage_complete(run_id, stage)
    }
    fn record_artifact(&self, message: &str, text: &str) -> Result<ArtifactRecord, StorageError> {
        std::thread::sleep(Duration::from_millis(1500));
        self.inner.record_artifact(message, text)
    }
    fn get_progress(&self, run_id: &RunId) -> Result<Option<PipelineProgress>, StorageError> {
        self.inner.get_progress(run_id)
    }
    fn latest_run(&self) -> Result<Option<PipelineProgress>, StorageError> {
        self.inner.latest_run()
    }
    fn list_artifacts(&self, limit: usize) -> Result<Vec<ArtifactRecord>, StorageError> {
        self.inner.list_artifacts(limit)
    }
}

/// Test that a stalled store does not hold up the returned artifact
#[tokio::test(flavor = "multi_thread", worker_threads = 4)]
async fn test_slow_store_does_not_block_run() {
    let compiled = article(300);
    let store = Arc::new(StallingStore {
        inner: MemoryStore::new(),
    });
    let pipeline = pipeline(ScriptedClient::well_behaved(compiled.clone()))
        .with_store(store.clone())
        .with_flush_timeout(Duration::from_millis(100));

    let started = Instant::now();
    let text = pipeline
        .run_pipeline("Roof leaks", &business_vars(), &all_prompts(), "Rules", 0.5)
        .await
        .unwrap();

    assert_eq!(text, compiled);
    assert!(started.elapsed() < Duration::from_millis(1000));
    assert!(store.inner.artifacts().is_empty());
}
