//! Tagged-block compiler input.
//!
//! Blocks use fixed delimiters known to both sides:
//!
//! ```text
//! <<TAG>>
//! body
//! <</TAG>>
//! ```
//!
//! Bodies are stripped of anything that looks like a delimiter before rendering, so a block
//! can never be closed early or spoofed by its own content.

use crate::section::{render_business_context, SectionCatalog, SectionResult};
use crate::types::SectionId;
use crate::validation::plain;
use std::collections::{BTreeMap, HashMap};

pub const REQUIREMENTS_TAG: &str = "BLOG_REQUIREMENTS";
pub const BUSINESS_CONTEXT_TAG: &str = "BUSINESS_CONTEXT";
pub const USER_MESSAGE_TAG: &str = "USER_MESSAGE";

const REQUIREMENTS_PREAMBLE: &str = "The following are constraints for the final document. \
Apply them. Do not repeat, quote or summarise them in the output.";

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CompilerBlock {
    pub tag: String,
    pub body: String,
}

/// Immutable, deterministic compiler input for one run.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CompilerInput {
    requirements: String,
    blocks: Vec<CompilerBlock>,
    draft_count: usize,
}

impl CompilerInput {
    /// Assemble the blocks: requirements, business context, user message, then one draft
    /// block per catalog section that has a result, in catalog order.
    pub fn build(
        requirements: &str,
        business_vars: &BTreeMap<String, String>,
        user_message: &str,
        catalog: &SectionCatalog,
        results: &HashMap<SectionId, SectionResult>,
    ) -> Self {
        let requirements = plain::strip_block_tags(requirements).trim().to_string();
        let mut blocks = vec![
            CompilerBlock {
                tag: REQUIREMENTS_TAG.to_string(),
                body: format!("{}\n\n{}", REQUIREMENTS_PREAMBLE, requirements),
            },
            CompilerBlock {
                tag: BUSINESS_CONTEXT_TAG.to_string(),
                body: plain::strip_block_tags(&render_business_context(business_vars))
                    .trim()
                    .to_string(),
            },
            CompilerBlock {
                tag: USER_MESSAGE_TAG.to_string(),
                body: plain::strip_block_tags(user_message).trim().to_string(),
            },
        ];

        let mut draft_count = 0;
        for spec in catalog.iter() {
            if let Some(result) = results.get(&spec.id) {
                blocks.push(CompilerBlock {
                    tag: spec.block_tag.clone(),
                    body: plain::sanitize(result.content()),
                });
                draft_count += 1;
            }
        }

        Self {
            requirements,
            blocks,
            draft_count,
        }
    }

    pub fn blocks(&self) -> &[CompilerBlock] {
        &self.blocks
    }

    pub fn block(&self, tag: &str) -> Option<&str> {
        self.blocks
            .iter()
            .find(|block| block.tag == tag)
            .map(|block| block.body.as_str())
    }

    /// Draft bodies in block order.
    pub fn drafts(&self) -> Vec<&str> {
        self.blocks[self.blocks.len() - self.draft_count..]
            .iter()
            .map(|block| block.body.as_str())
            .collect()
    }

    /// Requirements text without the preamble.
    pub fn requirements(&self) -> &str {
        &self.requirements
    }

    pub fn render(&self) -> String {
        let mut out = String::new();
        for block in &self.blocks {
            out.push_str(&format!("<<{}>>\n{}\n<</{}>>\n\n", block.tag, block.body, block.tag));
        }
        out.trim_end().to_string()
    }
}
