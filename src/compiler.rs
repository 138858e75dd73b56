//! Compiler stage: merges all section drafts into the final document.

pub mod input;
pub mod stage;

pub use input::{CompilerBlock, CompilerInput};
pub use stage::{CompilerPass, CompilerSettings, CompilerStage, FinalArtifact};
