//! blogforge: concurrent section generation and compilation of long-form documents
//!
//! A pipeline fans out one generation job per document section, validates and repairs
//! each draft, and merges the drafts in a final compiler pass. Section failures degrade to
//! deterministic fallback content; persistence and progress tracking are best effort.

pub mod cli;
pub mod compiler;
pub mod config;
pub mod error;
pub mod logging;
pub mod pipeline;
pub mod progress;
pub mod provider;
pub mod scheduler;
pub mod section;
pub mod store;
pub mod types;
pub mod validation;

pub use error::{GenerationError, PipelineError, StorageError};
pub use pipeline::{Pipeline, PipelineOutcome, PipelineRequest};
pub use provider::{GenerationClient, GenerationRequest};
pub use types::{RunId, SectionId};
