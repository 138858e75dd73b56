//! Shared identifiers, timestamps and the token-to-character budget heuristic.

use serde::{Deserialize, Serialize};
use std::fmt;
use std::sync::atomic::{AtomicU64, Ordering};
use std::time::{SystemTime, UNIX_EPOCH};

static RUN_COUNTER: AtomicU64 = AtomicU64::new(1);

/// Coarse characters-per-token ratio used to turn token budgets into size budgets.
pub const DEFAULT_CHARS_PER_TOKEN: usize = 5;

/// Stage name recorded for the compiler in pipeline progress.
pub const COMPILER_STAGE: &str = "compiler";

/// Identifier of a section task type (e.g. `intro`, `faqs`).
#[derive(Debug, Clone, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(transparent)]
pub struct SectionId(String);

impl SectionId {
    pub fn new(id: impl Into<String>) -> Self {
        Self(id.into())
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl fmt::Display for SectionId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

impl From<&str> for SectionId {
    fn from(value: &str) -> Self {
        Self::new(value)
    }
}

impl From<String> for SectionId {
    fn from(value: String) -> Self {
        Self(value)
    }
}

/// Identifier of one pipeline invocation.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(transparent)]
pub struct RunId(String);

impl RunId {
    /// Generate a unique run id.
    pub fn generate() -> Self {
        let ts = now_millis();
        let pid = std::process::id();
        let seq = RUN_COUNTER.fetch_add(1, Ordering::Relaxed);
        Self(format!("run-{ts}-{pid}-{seq}"))
    }

    pub fn from_string(id: impl Into<String>) -> Self {
        Self(id.into())
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl fmt::Display for RunId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

/// Current time as milliseconds since Unix epoch.
pub fn now_millis() -> u64 {
    SystemTime::now()
        .duration_since(UNIX_EPOCH)
        .map(|d| d.as_millis() as u64)
        .unwrap_or(0)
}

/// Convert a token budget to a character budget.
pub fn tokens_to_chars(tokens: u32, chars_per_token: usize) -> usize {
    (tokens as usize).saturating_mul(chars_per_token)
}

/// Length in characters (not bytes); all size budgets are expressed in characters.
pub fn char_len(text: &str) -> usize {
    text.chars().count()
}
