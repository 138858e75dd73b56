//! Configuration driving a pipeline end to end.

use super::support::{article, ScriptedClient};
use blogforge::config::ConfigLoader;
use blogforge::scheduler::FailurePolicy;
use blogforge::section::OutputContract;
use blogforge::{Pipeline, PipelineRequest, SectionId};
use std::collections::HashMap;
use std::sync::Arc;
use tempfile::TempDir;

const CONFIG: &str = r#"
[retry]
primary_attempts = 2
repair_attempts = 1
base_delay_ms = 0
max_jitter_ms = 0

[budget]
chars_per_token = 4

[compiler]
model = "compiler-x"
min_tokens = 10
max_tokens = 500

[scheduler]
failure_policy = "abort"

[[sections]]
id = "tips"
primary_model = "tips-a"
fallback_model = "tips-b"
min_tokens = 5
max_tokens = 10
contract = "plain"
"#;

#[tokio::test]
async fn test_configured_plain_section_runs() {
    let dir = TempDir::new().unwrap();
    let path = dir.path().join("blogforge.toml");
    std::fs::write(&path, CONFIG).unwrap();
    let config = ConfigLoader::load_from_file(&path).unwrap();
    config.validate().unwrap();
    assert_eq!(config.scheduler.failure_policy, FailurePolicy::Abort);

    let catalog = config.catalog();
    let tips = catalog.get(&SectionId::new("tips")).unwrap();
    assert_eq!(tips.contract, OutputContract::PlainText);
    assert_eq!((tips.min_chars, tips.max_chars), (20, 40));

    let client = ScriptedClient::new(|request, _| {
        if request.label.starts_with("compiler/") {
            assert_eq!(request.model, "compiler-x");
            return Ok(article(100));
        }
        Ok("Clear the gutters twice a year and check the downpipes after storms.".to_string())
    });
    let pipeline = Pipeline::from_config(&config, client.clone(), None);

    let mut prompts = HashMap::new();
    prompts.insert(SectionId::new("tips"), "Give one tip.".to_string());
    let request = PipelineRequest {
        user_message: "Gutters".to_string(),
        section_prompts: prompts,
        temperature: 0.1,
        ..PipelineRequest::default()
    };
    let outcome = pipeline.run(&request).await.unwrap();

    let tips_result = outcome.report.get(&SectionId::new("tips")).unwrap();
    assert!(tips_result.chars() <= 40);
    assert!(tips_result
        .warnings()
        .iter()
        .any(|w| w.contains("trimmed to max_chars=40")));
    assert_eq!(client.calls_for("tips/draft")[0].model, "tips-a");
    assert!(outcome.artifact.chars() <= 2000);
}

#[test]
fn test_builtin_catalog_when_no_sections_configured() {
    let dir = TempDir::new().unwrap();
    let path = dir.path().join("blogforge.toml");
    std::fs::write(&path, "[budget]\nchars_per_token = 3\n").unwrap();
    let config = ConfigLoader::load_from_file(&path).unwrap();
    let catalog = config.catalog();
    assert_eq!(catalog.len(), 6);
    let faqs = catalog.get(&SectionId::new("faqs")).unwrap();
    assert_eq!((faqs.min_chars, faqs.max_chars), (1536, 3072));
    assert_eq!(faqs.block_tag, "DRAFT_BODY_FAQS");
}
