//! Output validation and cleaning.
//!
//! Raw generated text is checked against the section's [`OutputContract`] once, at this
//! boundary, and turned into a typed [`SectionDraft`]. The size budget is applied separately
//! by [`budget::enforce`] so it also covers repaired and fallback content.

use crate::section::{OutputContract, SectionDraft, SectionStatus};
use crate::types::SectionId;
use thiserror::Error;

pub mod budget;
pub mod envelope;
pub mod plain;

pub use plain::Violation;

/// Why a piece of raw output was rejected.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum ValidationFailure {
    #[error("output is empty")]
    Empty,

    #[error("output is not a JSON object: {0}")]
    NotJson(String),

    #[error("envelope is missing field `{0}`")]
    MissingField(&'static str),

    #[error("envelope field `content_md` is not a string")]
    ContentNotString,

    #[error("output contains forbidden patterns: {}", describe(.0))]
    Forbidden(Vec<Violation>),
}

fn describe(violations: &[Violation]) -> String {
    violations
        .iter()
        .map(|v| v.to_string())
        .collect::<Vec<_>>()
        .join("; ")
}

/// Validate raw output for `section` against `contract`.
pub fn validate(
    contract: OutputContract,
    section: &SectionId,
    raw: &str,
) -> Result<SectionDraft, ValidationFailure> {
    match contract {
        OutputContract::JsonEnvelope => {
            let parsed = envelope::parse(section, raw)?;
            Ok(SectionDraft::new(parsed.status, parsed.content, parsed.warnings))
        }
        OutputContract::PlainText => {
            let content = plain::validate(raw)?;
            Ok(SectionDraft::new(SectionStatus::Ok, content, Vec::new()))
        }
    }
}
