//! Validator idempotence: valid content passes through unchanged

use blogforge::section::OutputContract;
use blogforge::validation::{plain, validate};
use blogforge::SectionId;
use proptest::prelude::*;

fn paragraph() -> impl Strategy<Value = String> {
    prop::collection::vec("[A-Z][a-z]{1,12}( [a-z]{1,12}){0,10}[.?!]", 1..6)
        .prop_map(|lines| lines.join("\n"))
}

fn envelope(section: &str, content: &str) -> String {
    serde_json::json!({
        "section_id": section,
        "status": "ok",
        "content_md": content,
        "warnings": [],
    })
    .to_string()
}

/// Test that re-validating accepted envelope content yields the same content
#[test]
fn test_envelope_revalidation_is_stable() {
    let mut runner = proptest::test_runner::TestRunner::default();
    let id = SectionId::new("intro");

    runner
        .run(&paragraph(), |content| {
            prop_assume!(plain::violations(&content).is_empty());

            let first = validate(OutputContract::JsonEnvelope, &id, &envelope("intro", &content))
                .unwrap();
            prop_assert_eq!(first.content(), content.as_str());

            let second = validate(
                OutputContract::JsonEnvelope,
                &id,
                &envelope("intro", first.content()),
            )
            .unwrap();
            prop_assert_eq!(second.content(), first.content());
            prop_assert!(second.warnings().is_empty());
            Ok(())
        })
        .unwrap();
}

/// Test that plain-text validation of accepted output is a fixpoint
#[test]
fn test_plain_revalidation_is_stable() {
    let mut runner = proptest::test_runner::TestRunner::default();
    let id = SectionId::new("tips");

    runner
        .run(&paragraph(), |content| {
            prop_assume!(plain::violations(&content).is_empty());

            let first = validate(OutputContract::PlainText, &id, &content).unwrap();
            let second = validate(OutputContract::PlainText, &id, first.content()).unwrap();
            prop_assert_eq!(first.content(), content.as_str());
            prop_assert_eq!(second.content(), first.content());
            prop_assert_eq!(plain::sanitize(first.content()), first.content());
            Ok(())
        })
        .unwrap();
}
