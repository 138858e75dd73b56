//! End-to-end runs of the full pipeline against a scripted provider.

use super::support::{
    all_prompts, article, business_vars, compiler_settings, envelope, pipeline, section_of,
    ScriptedClient,
};
use blogforge::section::fallback::fallback_content;
use blogforge::section::{SectionCatalog, SectionStatus};
use blogforge::store::{MemoryStore, PipelineStore};
use blogforge::validation::plain;
use blogforge::{GenerationError, PipelineRequest, SectionId};
use std::collections::BTreeMap;
use std::sync::Arc;

#[tokio::test(flavor = "multi_thread", worker_threads = 4)]
async fn test_all_sections_succeed_first_try() {
    let compiled = article(400);
    let client = ScriptedClient::well_behaved(compiled.clone());
    let store = Arc::new(MemoryStore::new());
    let pipeline = pipeline(Arc::clone(&client)).with_store(store.clone());

    let text = pipeline
        .run_pipeline(
            "How do I fix a leaking tap?",
            &business_vars(),
            &all_prompts(),
            "Use H2 headings for each part.",
            0.5,
        )
        .await
        .unwrap();

    // One draft call per section, no repairs, one compiler call.
    let calls = client.calls();
    assert_eq!(calls.iter().filter(|c| c.label.ends_with("/draft")).count(), 7);
    assert!(!calls.iter().any(|c| c.label.ends_with("/repair")));

    // The compiler saw all six drafts.
    let compiler_call = &client.calls_for("compiler/draft")[0];
    for spec in SectionCatalog::builtin(5).iter() {
        assert!(
            compiler_call.prompt.contains(&format!("<<{}>>", spec.block_tag)),
            "missing block {}",
            spec.block_tag
        );
    }

    let settings = compiler_settings();
    let len = text.chars().count();
    assert!(len >= settings.min_chars && len <= settings.max_chars);
    assert_eq!(text, compiled);

    let artifacts = store.artifacts();
    assert_eq!(artifacts.len(), 1, "artifact recorded exactly once");
    assert_eq!(artifacts[0].final_text, text);
    assert_eq!(artifacts[0].user_message, "How do I fix a leaking tap?");

    let progress = store.latest_run().unwrap().unwrap();
    assert!(progress.all_complete());
    assert_eq!(progress.stages.len(), 7);
}

#[tokio::test(flavor = "multi_thread", worker_threads = 4)]
async fn test_faqs_always_transient_still_compiles() {
    let compiled = article(300);
    let compiled_for_client = compiled.clone();
    let client = ScriptedClient::new(move |request, _| {
        if request.label.starts_with("compiler/") {
            return Ok(compiled_for_client.clone());
        }
        let section = section_of(request);
        if section == "faqs" {
            return Err(GenerationError::Transient("503 service unavailable".to_string()));
        }
        Ok(envelope(&section, "Solid draft text."))
    });
    let pipeline = pipeline(Arc::clone(&client));

    let request = PipelineRequest {
        user_message: "Leaking taps".to_string(),
        business_vars: BTreeMap::new(),
        section_prompts: all_prompts(),
        requirements: "Keep it practical.".to_string(),
        temperature: 0.3,
    };
    let outcome = pipeline.run(&request).await.unwrap();

    let faqs = outcome.report.get(&SectionId::new("faqs")).unwrap();
    assert!(faqs.is_fallback());
    assert_eq!(faqs.status(), SectionStatus::NeedsReview);
    assert!(outcome.report.failures.is_empty());

    // Both models were tried with the full retry budget before falling back.
    let faq_calls = client.calls_for("faqs/draft");
    assert_eq!(faq_calls.len(), 8);
    let models: std::collections::HashSet<_> = faq_calls.iter().map(|c| c.model.clone()).collect();
    assert_eq!(models.len(), 2);

    // The compiler got the fallback FAQ text, and the output says nothing about it.
    let compiler_prompt = &client.calls_for("compiler/draft")[0].prompt;
    let fallback = plain::sanitize(fallback_content(&SectionId::new("faqs")));
    assert!(compiler_prompt.contains(&fallback));
    let lower = outcome.artifact.text.to_lowercase();
    for word in ["fallback", "unavailable", "failed", "503"] {
        assert!(!lower.contains(word), "leaked '{}'", word);
    }
    assert_eq!(outcome.artifact.text, compiled);
}

#[tokio::test]
async fn test_transient_errors_below_ceiling_recover() {
    let client = ScriptedClient::new(|request, nth| {
        if request.label.starts_with("compiler/") {
            return Ok(article(200));
        }
        // Three failures, then success: still within the four-attempt ceiling.
        if nth <= 3 {
            return Err(GenerationError::Transient("timeout".to_string()));
        }
        Ok(envelope(&section_of(request), "Recovered draft."))
    });

    let mut prompts = std::collections::HashMap::new();
    prompts.insert(SectionId::new("intro"), "Write an intro.".to_string());
    let request = PipelineRequest {
        user_message: "Taps".to_string(),
        section_prompts: prompts,
        temperature: 0.2,
        ..PipelineRequest::default()
    };
    let outcome = pipeline(Arc::clone(&client)).run(&request).await.unwrap();

    let intro = outcome.report.get(&SectionId::new("intro")).unwrap();
    assert!(!intro.is_fallback());
    assert_eq!(intro.content(), "Recovered draft.");
    assert_eq!(client.calls_for("intro/draft").len(), 4);
}

#[tokio::test]
async fn test_invalid_section_output_is_repaired_once() {
    let client = ScriptedClient::new(|request, _| {
        if request.label.starts_with("compiler/") {
            return Ok(article(200));
        }
        if request.label.ends_with("/repair") {
            return Ok(envelope(&section_of(request), "Clean repaired text."));
        }
        Ok("Sure! Here is the section:\n```json\n{\"oops\": true}\n```".to_string())
    });

    let mut prompts = std::collections::HashMap::new();
    prompts.insert(SectionId::new("short_cta"), "Write a CTA.".to_string());
    let request = PipelineRequest {
        user_message: "Taps".to_string(),
        section_prompts: prompts,
        temperature: 0.2,
        ..PipelineRequest::default()
    };
    let outcome = pipeline(Arc::clone(&client)).run(&request).await.unwrap();

    let cta = outcome.report.get(&SectionId::new("short_cta")).unwrap();
    assert_eq!(cta.content(), "Clean repaired text.");
    assert_eq!(client.calls_for("short_cta/repair").len(), 1);
    let repair_prompt = &client.calls_for("short_cta/repair")[0].prompt;
    assert!(repair_prompt.contains("Write a CTA."));
}

#[tokio::test]
async fn test_compiler_output_never_contains_forbidden_shapes() {
    let client = ScriptedClient::new(|request, _| {
        if request.label.starts_with("compiler/") {
            return Ok(format!(
                "Here is the final blog:\n```markdown\n{}\nCOMPANY_NAME = Acme\n```",
                article(300)
            ));
        }
        Ok(envelope(&section_of(request), "Draft."))
    });
    let text = pipeline(client)
        .run_pipeline(
            "Taps",
            &business_vars(),
            &all_prompts(),
            "Rules",
            0.4,
        )
        .await
        .unwrap();

    assert!(!text.contains("```"));
    assert!(!text.lines().any(plain::is_assignment_line));
    assert!(!text.to_lowercase().contains("here is the final"));
    assert!(text.starts_with("# Fixing a Leaking Tap"));
}

#[tokio::test]
async fn test_store_failure_does_not_affect_result() {
    use blogforge::progress::PipelineProgress;
    use blogforge::store::ArtifactRecord;
    use blogforge::{RunId, StorageError};

    struct FailingStore;

    impl PipelineStore for FailingStore {
        fn start_run(&self, _: &RunId, _: &[String]) -> Result<(), StorageError> {
            Err(StorageError::Io("read-only filesystem".to_string()))
        }
        fn mark_stage_complete(&self, _: &RunId, _: &str) -> Result<(), StorageError> {
            Err(StorageError::Io("read-only filesystem".to_string()))
        }
        fn record_artifact(&self, _: &str, _: &str) -> Result<ArtifactRecord, StorageError> {
            Err(StorageError::Io("read-only filesystem".to_string()))
        }
        fn get_progress(&self, _: &RunId) -> Result<Option<PipelineProgress>, StorageError> {
            Ok(None)
        }
        fn latest_run(&self) -> Result<Option<PipelineProgress>, StorageError> {
            Ok(None)
        }
        fn list_artifacts(&self, _: usize) -> Result<Vec<ArtifactRecord>, StorageError> {
            Ok(Vec::new())
        }
    }

    let compiled = article(250);
    let client = ScriptedClient::well_behaved(compiled.clone());
    let text = pipeline(client)
        .with_store(Arc::new(FailingStore))
        .run_pipeline("Taps", &business_vars(), &all_prompts(), "Rules", 0.4)
        .await
        .unwrap();
    assert_eq!(text, compiled);
}
