//! Compiler output shape invariants

use async_trait::async_trait;
use blogforge::compiler::{CompilerInput, CompilerSettings, CompilerStage};
use blogforge::provider::RetryPolicy;
use blogforge::section::{DraftSource, SectionCatalog, SectionDraft, SectionResult};
use blogforge::validation::plain;
use blogforge::{GenerationClient, GenerationError, GenerationRequest, SectionId};
use proptest::prelude::*;
use std::collections::{BTreeMap, HashMap};
use std::sync::Arc;

/// Returns the same adversarial text for every compiler pass.
struct Hostile {
    reply: String,
}

#[async_trait]
impl GenerationClient for Hostile {
    async fn generate(&self, _request: &GenerationRequest) -> Result<String, GenerationError> {
        Ok(self.reply.clone())
    }

    fn provider_name(&self) -> &str {
        "hostile"
    }
}

fn fragment() -> impl Strategy<Value = String> {
    prop_oneof![
        Just("```".to_string()),
        Just("```json".to_string()),
        Just("~~~".to_string()),
        Just("~~~markdown".to_string()),
        Just("~~".to_string()),
        Just("COMPANY_NAME = Acme".to_string()),
        Just("  rate=5%".to_string()),
        Just("{\"content_md\": \"x\"}".to_string()),
        Just("<<DRAFT_INTRO>>".to_string()),
        Just("<</DRAFT_INTRO>>".to_string()),
        Just("Here is the final blog:".to_string()),
        Just("``".to_string()),
        Just("`".to_string()),
        Just(String::new()),
        "[A-Za-z ,.#]{1,40}",
    ]
}

fn adversarial_text() -> impl Strategy<Value = String> {
    prop::collection::vec(fragment(), 0..24).prop_map(|parts| parts.join("\n"))
}

fn draft(id: &str, content: String) -> SectionResult {
    SectionResult {
        section_id: SectionId::new(id),
        draft: SectionDraft::Ok {
            content,
            warnings: Vec::new(),
        },
        source: DraftSource::Generated,
        model: Some("m".to_string()),
    }
}

/// Test that no compiler path emits a fence marker or an assignment line
#[test]
fn test_compiler_output_has_no_fences_or_assignments() {
    let runtime = tokio::runtime::Builder::new_current_thread()
        .enable_all()
        .build()
        .unwrap();
    let catalog = SectionCatalog::builtin(5);
    let mut runner = proptest::test_runner::TestRunner::new(ProptestConfig {
        cases: 128,
        ..ProptestConfig::default()
    });

    runner
        .run(
            &(adversarial_text(), adversarial_text(), adversarial_text()),
            |(intro, faqs, reply)| {
                let mut results = HashMap::new();
                results.insert(SectionId::new("intro"), draft("intro", intro));
                results.insert(SectionId::new("faqs"), draft("faqs", faqs));
                let input = CompilerInput::build(
                    "COMPANY_NAME = keep placeholders",
                    &BTreeMap::new(),
                    "```user message```",
                    &catalog,
                    &results,
                );

                let stage = CompilerStage::new(
                    Arc::new(Hostile { reply }),
                    CompilerSettings::from_token_budget("compiler", 10, 40, 5),
                )
                .with_retry(RetryPolicy::immediate(1), RetryPolicy::immediate(1));

                let artifact = runtime.block_on(stage.compile(&input, 0.5)).unwrap();
                prop_assert!(!plain::has_fence(&artifact.text));
                prop_assert!(!artifact.text.lines().any(plain::is_assignment_line));
                prop_assert!(!artifact.text.trim().is_empty());
                prop_assert!(artifact.chars() <= 200);
                Ok(())
            },
        )
        .unwrap();
}

/// Test that sanitizing already clean text changes nothing
#[test]
fn test_sanitize_is_a_fixpoint() {
    let mut runner = proptest::test_runner::TestRunner::default();

    runner
        .run(&adversarial_text(), |text| {
            let once = plain::sanitize(&text);
            let twice = plain::sanitize(&once);
            prop_assert_eq!(&once, &twice);
            prop_assert!(!plain::has_fence(&once));
            Ok(())
        })
        .unwrap();
}
