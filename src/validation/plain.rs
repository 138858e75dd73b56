//! Plain-text shape rules and sanitizing.
//!
//! Forbidden shapes: code fences (backtick or tilde), JSON-looking top-level structure, a
//! leaked preamble or sign-off, leaked `<<TAG>>` delimiters and raw `IDENTIFIER = value` lines.

use super::ValidationFailure;
use once_cell::sync::Lazy;
use regex::Regex;
use std::fmt;

pub const FENCE: &str = "```";
pub const TILDE_FENCE: &str = "~~~";

static ASSIGNMENT_LINE: Lazy<Regex> =
    Lazy::new(|| Regex::new(r"^\s*[A-Za-z_][A-Za-z0-9_]*\s*=\s*\S").unwrap());

/// Opening lines that introduce the output instead of being part of it.
static PREAMBLE: Lazy<Regex> = Lazy::new(|| {
    Regex::new(
        r"(?i)^\s*(?:(?:sure|certainly|absolutely|of course|okay)[,!.]?\s*)?(?:(?:here is|here's|below is) (?:the|your|a|an) (?:revised|final|compiled|rewritten|updated|requested|corrected|complete|blog|article|draft|output|markdown|json|section)\b[^.!?:]{0,60}[:.!]?\s*$|(?:sure|certainly|absolutely|of course|okay)[,!.]?(?:\s*(?:here you go|here it is|here you are))?[.!:]?\s*$|as an ai\b.*|note to (?:the )?(?:editor|user)\b.*)$",
    )
    .unwrap()
});

/// Closing lines addressed to the requester.
static SIGN_OFF: Lazy<Regex> = Lazy::new(|| {
    Regex::new(
        r"(?i)^\s*(?:i hope this (?:helps|meets)|let me know if (?:you|this|there)|feel free to (?:ask|adjust|modify)|as an ai\b|note to (?:the )?(?:editor|user)\b)",
    )
    .unwrap()
});

static BLOCK_TAG: Lazy<Regex> = Lazy::new(|| Regex::new(r"<</?[A-Z][A-Z0-9_]*>>").unwrap());

/// A single forbidden shape found in a text.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Violation {
    CodeFence,
    StructuredTopLevel,
    MetaCommentary(String),
    AssignmentLine(String),
    LeakedBlockTag(String),
}

impl fmt::Display for Violation {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Violation::CodeFence => write!(f, "code fence marker"),
            Violation::StructuredTopLevel => write!(f, "JSON-looking top-level structure"),
            Violation::MetaCommentary(line) => write!(f, "meta-commentary line `{}`", line),
            Violation::AssignmentLine(line) => write!(f, "assignment line `{}`", line),
            Violation::LeakedBlockTag(tag) => write!(f, "leaked block tag `{}`", tag),
        }
    }
}

pub fn is_assignment_line(line: &str) -> bool {
    ASSIGNMENT_LINE.is_match(line)
}

pub fn is_preamble(line: &str) -> bool {
    PREAMBLE.is_match(line)
}

pub fn is_sign_off(line: &str) -> bool {
    SIGN_OFF.is_match(line)
}

pub fn has_fence(text: &str) -> bool {
    text.contains(FENCE) || text.contains(TILDE_FENCE)
}

/// True when the text opens like a JSON object or array.
///
/// A leading `[` alone is not enough, since markdown links and numbered citations start
/// with one.
pub fn looks_structured(text: &str) -> bool {
    let trimmed = text.trim();
    if trimmed.starts_with('{') {
        return true;
    }
    let Some(rest) = trimmed.strip_prefix('[') else {
        return false;
    };
    if matches!(rest.trim_start().chars().next(), None | Some('{' | '"' | ']')) {
        return true;
    }
    matches!(
        serde_json::from_str::<serde_json::Value>(trimmed),
        Ok(serde_json::Value::Array(_))
    )
}

/// Indices of the first and last non-blank lines.
fn edge_lines(lines: &[&str]) -> Option<(usize, usize)> {
    let first = lines.iter().position(|l| !l.trim().is_empty())?;
    let last = lines.iter().rposition(|l| !l.trim().is_empty())?;
    Some((first, last))
}

/// Every forbidden shape in `text`, in order of appearance.
///
/// Meta-commentary only counts on the first line (preamble) or the last line (sign-off).
pub fn violations(text: &str) -> Vec<Violation> {
    let mut found = Vec::new();
    if has_fence(text) {
        found.push(Violation::CodeFence);
    }
    if looks_structured(text) {
        found.push(Violation::StructuredTopLevel);
    }
    let lines: Vec<&str> = text.lines().collect();
    let edges = edge_lines(&lines);
    for (i, line) in lines.iter().enumerate() {
        if let Some(tag) = BLOCK_TAG.find(line) {
            found.push(Violation::LeakedBlockTag(tag.as_str().to_string()));
        }
        let meta = edges.map_or(false, |(first, last)| {
            (i == first && is_preamble(line)) || (i == last && is_sign_off(line))
        });
        if meta {
            found.push(Violation::MetaCommentary(line.trim().to_string()));
        } else if is_assignment_line(line) {
            found.push(Violation::AssignmentLine(line.trim().to_string()));
        }
    }
    found
}

/// Validate plain-text output; returns the trimmed text.
pub fn validate(raw: &str) -> Result<String, ValidationFailure> {
    let text = raw.trim();
    if text.is_empty() {
        return Err(ValidationFailure::Empty);
    }
    let found = violations(text);
    if !found.is_empty() {
        return Err(ValidationFailure::Forbidden(found));
    }
    Ok(text.to_string())
}

/// Remove `<<TAG>>` / `<</TAG>>` delimiters, including ones spliced together by removal.
pub fn strip_block_tags(text: &str) -> String {
    let mut current = text.to_string();
    while BLOCK_TAG.is_match(&current) {
        current = BLOCK_TAG.replace_all(&current, "").into_owned();
    }
    current
}

/// Remove forbidden shapes instead of rejecting them.
///
/// Fence markers and block tags are removed repeatedly until none are left, since removing
/// one can splice its neighbours into a new one. Assignment lines are dropped whole, then
/// preambles are peeled off the start and sign-offs off the end. Runs of blank lines are
/// collapsed.
pub fn sanitize(text: &str) -> String {
    let mut current = text.to_string();
    loop {
        let next = BLOCK_TAG
            .replace_all(&current, "")
            .replace(FENCE, "")
            .replace(TILDE_FENCE, "");
        if next == current {
            break;
        }
        current = next;
    }

    let mut kept: Vec<&str> = Vec::new();
    for line in current.lines() {
        let line = line.trim_end();
        if is_assignment_line(line) {
            continue;
        }
        // Drop the language hint left behind by an opening fence.
        if matches!(line.trim(), "json" | "markdown" | "md" | "text") {
            continue;
        }
        kept.push(line);
    }

    while let Some((first, last)) = edge_lines(&kept) {
        if is_preamble(kept[first]) {
            kept.remove(first);
        } else if is_sign_off(kept[last]) {
            kept.remove(last);
        } else {
            break;
        }
    }

    let mut out: Vec<&str> = Vec::new();
    for line in kept {
        if line.is_empty() && out.last().map_or(true, |prev| prev.is_empty()) {
            continue;
        }
        out.push(line);
    }
    out.join("\n").trim().to_string()
}
