//! CLI output: error mapping from domain errors to stable CLI surface.

use crate::error::{GenerationError, PipelineError};

/// Map pipeline errors to a string for CLI output.
pub fn map_error(e: &PipelineError) -> String {
    match e {
        PipelineError::CompilerFailed(GenerationError::Permanent(msg))
        | PipelineError::SectionFailed {
            source: GenerationError::Permanent(msg),
            ..
        } => format!("{}\nhint: check the provider settings and API key ({})", e, msg),
        _ => e.to_string(),
    }
}
