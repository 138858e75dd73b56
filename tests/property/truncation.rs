//! Size budget invariants

use async_trait::async_trait;
use blogforge::provider::{ModelSelector, RetryPolicy};
use blogforge::section::{OutputContract, SectionJob, SectionJobRunner, SectionSpec};
use blogforge::validation::budget;
use blogforge::{GenerationClient, GenerationError, GenerationRequest};
use proptest::prelude::*;
use std::sync::Arc;

/// Answers every draft and repair with the same envelope around `content`.
struct FixedContent {
    content: String,
}

#[async_trait]
impl GenerationClient for FixedContent {
    async fn generate(&self, request: &GenerationRequest) -> Result<String, GenerationError> {
        let section = request.label.split('/').next().unwrap_or_default();
        Ok(serde_json::json!({
            "section_id": section,
            "status": "ok",
            "content_md": self.content,
            "warnings": [],
        })
        .to_string())
    }

    fn provider_name(&self) -> &str {
        "fixed"
    }
}

/// Test that truncation never exceeds the character ceiling
#[test]
fn test_truncate_chars_respects_ceiling() {
    let mut runner = proptest::test_runner::TestRunner::default();

    runner
        .run(&(any::<String>(), 0usize..300), |(text, max)| {
            let cut = budget::truncate_chars(&text, max);
            prop_assert!(cut.chars().count() <= max);
            prop_assert!(text.starts_with(&cut));
            Ok(())
        })
        .unwrap();
}

/// Test that budget enforcement never returns content over max_chars
#[test]
fn test_enforce_respects_ceiling() {
    let mut runner = proptest::test_runner::TestRunner::default();

    runner
        .run(
            &(any::<String>(), 0usize..100, 0usize..300),
            |(text, min, max)| {
                let mut warnings = Vec::new();
                let len = text.chars().count();
                let out = budget::enforce(text, min, max, &mut warnings);
                prop_assert!(out.chars().count() <= max);
                if len > max {
                    prop_assert!(warnings.iter().any(|w| w.contains("trimmed")));
                }
                Ok(())
            },
        )
        .unwrap();
}

/// Test that section results stay within max_chars for any generated text
#[test]
fn test_section_result_respects_ceiling() {
    let runtime = tokio::runtime::Builder::new_current_thread()
        .enable_all()
        .build()
        .unwrap();
    let mut runner = proptest::test_runner::TestRunner::new(ProptestConfig {
        cases: 64,
        ..ProptestConfig::default()
    });

    runner
        .run(
            &("[a-zA-Z0-9 .,=`{}<>\\n]{0,2000}", 1u32..40),
            |(content, max_tokens)| {
                let spec = SectionSpec::from_token_budget(
                    "intro",
                    "DRAFT_INTRO",
                    "model-a",
                    Some("model-b"),
                    1,
                    max_tokens,
                    5,
                    OutputContract::JsonEnvelope,
                );
                let max_chars = spec.max_chars;
                let runner = SectionJobRunner::new(
                    Arc::new(FixedContent { content }),
                    Arc::new(ModelSelector::new()),
                )
                .with_retry(RetryPolicy::immediate(1), RetryPolicy::immediate(1));
                let job = SectionJob::new(spec, "Write an intro.", 0.5);

                let result = runtime.block_on(runner.run(&job)).unwrap();
                prop_assert!(result.chars() <= max_chars);
                Ok(())
            },
        )
        .unwrap();
}
