//! JSON envelope contract for section output.
//!
//! ```text
//! { "status": "ok" | "needs_review", "section_id": string, "content_md": string, "warnings": [string] }
//! ```
//!
//! Parsing is lenient where the intent is unambiguous: a mismatched `section_id` is
//! overwritten, an unknown `status` becomes `needs_review`, a non-list `warnings` is replaced
//! by a note, and a single surrounding code fence is unwrapped. Anything else is rejected.

use super::{plain, ValidationFailure};
use crate::section::SectionStatus;
use crate::types::SectionId;
use serde_json::{Map, Value};

const REQUIRED_FIELDS: [&str; 4] = ["status", "section_id", "content_md", "warnings"];

/// Validated envelope contents.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Envelope {
    pub section_id: SectionId,
    pub status: SectionStatus,
    pub content: String,
    pub warnings: Vec<String>,
}

/// Strip one ```` ```json ... ``` ```` wrapper if the whole text is fenced.
fn unwrap_fence(raw: &str) -> Option<&str> {
    let inner = [plain::FENCE, plain::TILDE_FENCE]
        .iter()
        .find_map(|fence| raw.strip_prefix(fence)?.strip_suffix(fence))?;
    let inner = match inner.split_once('\n') {
        Some((hint, rest)) if !hint.trim_start().starts_with('{') => rest,
        _ => inner,
    };
    Some(inner.trim())
}

fn field<'a>(
    object: &'a Map<String, Value>,
    name: &'static str,
) -> Result<&'a Value, ValidationFailure> {
    object.get(name).ok_or(ValidationFailure::MissingField(name))
}

/// Parse and normalize raw section output for `section`.
pub fn parse(section: &SectionId, raw: &str) -> Result<Envelope, ValidationFailure> {
    let trimmed = raw.trim();
    if trimmed.is_empty() {
        return Err(ValidationFailure::Empty);
    }

    let mut warnings = Vec::new();
    let body = match unwrap_fence(trimmed) {
        Some(inner) => {
            warnings.push("envelope was wrapped in a code fence; unwrapped.".to_string());
            inner
        }
        None => trimmed,
    };

    let value: Value =
        serde_json::from_str(body).map_err(|e| ValidationFailure::NotJson(e.to_string()))?;
    let Value::Object(object) = value else {
        return Err(ValidationFailure::NotJson("top-level value is not an object".to_string()));
    };
    for name in REQUIRED_FIELDS {
        field(&object, name)?;
    }

    let content = match field(&object, "content_md")? {
        Value::String(content) => content.trim().to_string(),
        _ => return Err(ValidationFailure::ContentNotString),
    };
    if content.is_empty() {
        return Err(ValidationFailure::Empty);
    }
    let found = plain::violations(&content);
    if !found.is_empty() {
        return Err(ValidationFailure::Forbidden(found));
    }

    let status = match field(&object, "status")?.as_str() {
        Some("ok") => SectionStatus::Ok,
        _ => SectionStatus::NeedsReview,
    };

    match field(&object, "warnings")? {
        Value::Array(items) => warnings.extend(items.iter().map(|item| match item {
            Value::String(s) => s.clone(),
            other => other.to_string(),
        })),
        _ => warnings.push("warnings field was not a list; normalised.".to_string()),
    }

    Ok(Envelope {
        section_id: section.clone(),
        status,
        content,
        warnings,
    })
}
