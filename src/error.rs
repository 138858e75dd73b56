//! Error types for the blogforge generation pipeline.

use crate::types::SectionId;
use thiserror::Error;

const TRANSIENT_MARKERS: &[&str] = &[
    "500",
    "service unavailable",
    "timeout",
    "timed out",
    "temporarily",
    "rate limit",
    "overloaded",
];

/// Classified failure of a single generation call.
///
/// Only `Transient` failures are retried; `Permanent` ones propagate immediately.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum GenerationError {
    #[error("Transient provider failure: {0}")]
    Transient(String),

    #[error("Permanent provider failure: {0}")]
    Permanent(String),
}

impl GenerationError {
    pub fn is_transient(&self) -> bool {
        matches!(self, GenerationError::Transient(_))
    }

    /// Classify a raw provider message the way provider SDK errors are usually worded.
    pub fn classify_message(message: impl Into<String>) -> Self {
        let message = message.into();
        let lowered = message.to_lowercase();
        let transient = TRANSIENT_MARKERS
            .iter()
            .any(|needle| lowered.contains(needle));
        if transient {
            GenerationError::Transient(message)
        } else {
            GenerationError::Permanent(message)
        }
    }

    /// Classify an HTTP status returned by a provider.
    pub fn from_status(status: u16, body: &str) -> Self {
        let message = format!("HTTP {}: {}", status, body);
        match status {
            408 | 409 | 425 | 429 => GenerationError::Transient(message),
            500..=599 => GenerationError::Transient(message),
            _ => GenerationError::Permanent(message),
        }
    }
}

/// Storage-related errors
#[derive(Debug, Error)]
pub enum StorageError {
    #[error("Store I/O error: {0}")]
    Io(String),

    #[error("Stored record could not be decoded: {0}")]
    Corrupt(String),

    #[error("Run not found: {0}")]
    RunNotFound(String),
}

impl From<sled::Error> for StorageError {
    fn from(err: sled::Error) -> Self {
        StorageError::Io(err.to_string())
    }
}

impl From<serde_json::Error> for StorageError {
    fn from(err: serde_json::Error) -> Self {
        StorageError::Corrupt(err.to_string())
    }
}

/// Pipeline-level errors surfaced to the caller of `run_pipeline`.
#[derive(Debug, Error)]
pub enum PipelineError {
    #[error("Invalid input: {0}")]
    InvalidInput(String),

    #[error("Configuration error: {0}")]
    ConfigError(String),

    #[error("Section {section} failed: {source}")]
    SectionFailed {
        section: SectionId,
        #[source]
        source: GenerationError,
    },

    #[error("Compiler stage failed: {0}")]
    CompilerFailed(#[source] GenerationError),

    #[error("Storage error: {0}")]
    Storage(#[from] StorageError),
}

impl From<config::ConfigError> for PipelineError {
    fn from(err: config::ConfigError) -> Self {
        PipelineError::ConfigError(err.to_string())
    }
}
