//! Failure policies across the fan-out boundary.

use super::support::{all_prompts, article, envelope, pipeline, section_of, ScriptedClient};
use blogforge::scheduler::FailurePolicy;
use blogforge::store::MemoryStore;
use blogforge::{GenerationError, PipelineError, PipelineRequest, SectionId};
use std::sync::Arc;
use std::time::Duration;

fn request() -> PipelineRequest {
    PipelineRequest {
        user_message: "Gutter cleaning".to_string(),
        section_prompts: all_prompts(),
        requirements: "Short paragraphs.".to_string(),
        temperature: 0.5,
        ..PipelineRequest::default()
    }
}

/// `faqs` is rejected outright by the provider; everything else works.
fn client_with_permanent_faqs() -> Arc<ScriptedClient> {
    ScriptedClient::new(|request, _| {
        if request.label.starts_with("compiler/") {
            return Ok(article(300));
        }
        let section = section_of(request);
        if section == "faqs" {
            return Err(GenerationError::Permanent("HTTP 400: unknown model".to_string()));
        }
        Ok(envelope(&section, "Working draft."))
    })
}

#[tokio::test(flavor = "multi_thread", worker_threads = 4)]
async fn test_degrade_policy_substitutes_and_records_failure() {
    let client = client_with_permanent_faqs();
    let outcome = pipeline(Arc::clone(&client))
        .with_failure_policy(FailurePolicy::Degrade)
        .run(&request())
        .await
        .unwrap();

    assert_eq!(outcome.report.failures.len(), 1);
    assert_eq!(outcome.report.failures[0].section_id, SectionId::new("faqs"));
    assert!(outcome.report.get(&SectionId::new("faqs")).unwrap().is_fallback());
    assert_eq!(outcome.report.results.len(), 6);
    // Permanent errors are not retried and do not fail over.
    assert_eq!(client.calls_for("faqs/draft").len(), 1);
}

#[tokio::test(flavor = "multi_thread", worker_threads = 4)]
async fn test_abort_policy_surfaces_section_error() {
    let store = Arc::new(MemoryStore::new());
    let err = pipeline(client_with_permanent_faqs())
        .with_failure_policy(FailurePolicy::Abort)
        .with_store(store.clone())
        .run(&request())
        .await
        .unwrap_err();

    match err {
        PipelineError::SectionFailed { section, source } => {
            assert_eq!(section, SectionId::new("faqs"));
            assert!(!source.is_transient());
        }
        other => panic!("unexpected error: {}", other),
    }
    assert!(store.artifacts().is_empty(), "aborted runs record no artifact");
}

#[tokio::test(flavor = "multi_thread", worker_threads = 4)]
async fn test_phase_timeout_degrades_slow_sections() {
    let client = ScriptedClient::new(|request, _| {
        if request.label.starts_with("compiler/") {
            return Ok(article(300));
        }
        let section = section_of(request);
        if section == "intro" {
            // Blocks this worker thread well past the phase deadline.
            std::thread::sleep(Duration::from_millis(600));
        }
        Ok(envelope(&section, "Quick draft."))
    });

    let outcome = pipeline(Arc::clone(&client))
        .with_phase_timeout(Some(Duration::from_millis(200)))
        .run(&request())
        .await
        .unwrap();

    let intro = outcome.report.get(&SectionId::new("intro")).unwrap();
    assert!(intro.is_fallback());
    assert!(outcome
        .report
        .failures
        .iter()
        .any(|f| f.section_id == SectionId::new("intro")));
    assert!(!outcome.report.get(&SectionId::new("faqs")).unwrap().is_fallback());
    assert!(outcome.progress.all_complete());
}
