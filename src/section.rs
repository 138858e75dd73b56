//! Section task types, jobs and results.
//!
//! A [`SectionSpec`] is fixed at startup; a [`SectionJob`] is one rendered request for a run;
//! a [`SectionResult`] is what the runner hands to the compiler.

use crate::types::{char_len, tokens_to_chars, SectionId};
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;

pub mod fallback;
pub mod runner;

pub use runner::SectionJobRunner;

/// Structural contract a section's raw output must satisfy.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, Default)]
#[serde(rename_all = "snake_case")]
pub enum OutputContract {
    /// A single JSON object with `status`, `section_id`, `content_md` and `warnings`.
    #[default]
    #[serde(alias = "json")]
    JsonEnvelope,
    /// Free markdown checked against the forbidden-pattern list.
    #[serde(alias = "plain")]
    PlainText,
}

/// Immutable description of one section task type.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SectionSpec {
    pub id: SectionId,
    /// Compiler block tag the section's content is placed under (e.g. `DRAFT_INTRO`).
    pub block_tag: String,
    pub primary_model: String,
    pub fallback_model: Option<String>,
    pub min_chars: usize,
    pub max_chars: usize,
    /// Generation ceiling passed to the provider.
    pub max_tokens: u32,
    pub contract: OutputContract,
}

impl SectionSpec {
    /// Build a spec from token budgets, converting them to character budgets.
    #[allow(clippy::too_many_arguments)]
    pub fn from_token_budget(
        id: impl Into<SectionId>,
        block_tag: impl Into<String>,
        primary_model: impl Into<String>,
        fallback_model: Option<&str>,
        min_tokens: u32,
        max_tokens: u32,
        chars_per_token: usize,
        contract: OutputContract,
    ) -> Self {
        Self {
            id: id.into(),
            block_tag: block_tag.into(),
            primary_model: primary_model.into(),
            fallback_model: fallback_model.map(str::to_string),
            min_chars: tokens_to_chars(min_tokens, chars_per_token),
            max_chars: tokens_to_chars(max_tokens, chars_per_token),
            max_tokens,
            contract,
        }
    }
}

/// Ordered set of section specs. Iteration order is the compiler block order.
#[derive(Debug, Clone, PartialEq, Eq, Default)]
pub struct SectionCatalog {
    specs: Vec<SectionSpec>,
}

impl SectionCatalog {
    pub fn new(specs: Vec<SectionSpec>) -> Self {
        Self { specs }
    }

    /// The six standard blog sections.
    pub fn builtin(chars_per_token: usize) -> Self {
        let json = OutputContract::JsonEnvelope;
        let spec = |id: &str, tag: &str, a: &str, b: Option<&str>, min: u32, max: u32| {
            SectionSpec::from_token_budget(id, tag, a, b, min, max, chars_per_token, json)
        };
        Self::new(vec![
            spec(
                "intro",
                "DRAFT_INTRO",
                "Qwen/Qwen3-Next-80B-A3B-Instruct",
                Some("deepseek-ai/DeepSeek-R1-0528-tput"),
                128,
                640,
            ),
            spec(
                "faqs",
                "DRAFT_BODY_FAQS",
                "deepseek-ai/DeepSeek-V3.1",
                Some("Qwen/Qwen2.5-72B-Instruct-Turbo"),
                512,
                1024,
            ),
            spec(
                "business_description",
                "DRAFT_BUSINESS_DESCRIPTION",
                "Qwen/Qwen3-Next-80B-A3B-Instruct",
                Some("Qwen/Qwen2.5-7B-Instruct-Turbo"),
                128,
                1024,
            ),
            spec("short_cta", "DRAFT_SHORT_CTA", "google/gemma-3n-E4B-it", None, 64, 256),
            spec(
                "final_cta",
                "DRAFT_FINAL_CTA",
                "openai/gpt-oss-120b",
                Some("meta-llama/Meta-Llama-3-8B-Instruct-Lite"),
                128,
                512,
            ),
            spec(
                "integrate_references",
                "DRAFT_REFERENCES",
                "openai/gpt-oss-20B",
                Some("openai/gpt-oss-120b"),
                128,
                512,
            ),
        ])
    }

    pub fn get(&self, id: &SectionId) -> Option<&SectionSpec> {
        self.specs.iter().find(|spec| &spec.id == id)
    }

    pub fn iter(&self) -> impl Iterator<Item = &SectionSpec> {
        self.specs.iter()
    }

    pub fn ids(&self) -> Vec<SectionId> {
        self.specs.iter().map(|spec| spec.id.clone()).collect()
    }

    pub fn len(&self) -> usize {
        self.specs.len()
    }

    pub fn is_empty(&self) -> bool {
        self.specs.is_empty()
    }
}

/// Render a section prompt from its template, the user message and business context.
///
/// Context lines are `KEY: value`, sorted by key so the rendering is deterministic.
pub fn render_prompt(
    template: &str,
    user_message: &str,
    business_vars: &BTreeMap<String, String>,
) -> String {
    format!(
        "{}\n\nUser message:\n{}\n\nBusiness context:\n{}",
        template.trim_end(),
        user_message.trim(),
        render_business_context(business_vars)
    )
}

pub fn render_business_context(business_vars: &BTreeMap<String, String>) -> String {
    business_vars
        .iter()
        .map(|(key, value)| format!("{}: {}\n", key, value))
        .collect()
}

/// One instantiated section request for a single pipeline run.
#[derive(Debug, Clone)]
pub struct SectionJob {
    pub spec: SectionSpec,
    pub prompt: String,
    pub temperature: f32,
}

impl SectionJob {
    pub fn new(spec: SectionSpec, prompt: impl Into<String>, temperature: f32) -> Self {
        Self {
            spec,
            prompt: prompt.into(),
            temperature,
        }
    }

    pub fn id(&self) -> &SectionId {
        &self.spec.id
    }
}

/// Section outcome status as written in the JSON envelope.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum SectionStatus {
    Ok,
    NeedsReview,
}

impl SectionStatus {
    pub fn as_str(&self) -> &'static str {
        match self {
            SectionStatus::Ok => "ok",
            SectionStatus::NeedsReview => "needs_review",
        }
    }
}

/// Validated section content.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "status", rename_all = "snake_case")]
pub enum SectionDraft {
    Ok {
        content: String,
        warnings: Vec<String>,
    },
    NeedsReview {
        content: String,
        warnings: Vec<String>,
    },
}

impl SectionDraft {
    pub fn new(status: SectionStatus, content: String, warnings: Vec<String>) -> Self {
        match status {
            SectionStatus::Ok => SectionDraft::Ok { content, warnings },
            SectionStatus::NeedsReview => SectionDraft::NeedsReview { content, warnings },
        }
    }

    pub fn status(&self) -> SectionStatus {
        match self {
            SectionDraft::Ok { .. } => SectionStatus::Ok,
            SectionDraft::NeedsReview { .. } => SectionStatus::NeedsReview,
        }
    }

    pub fn content(&self) -> &str {
        match self {
            SectionDraft::Ok { content, .. } | SectionDraft::NeedsReview { content, .. } => content,
        }
    }

    pub fn warnings(&self) -> &[String] {
        match self {
            SectionDraft::Ok { warnings, .. } | SectionDraft::NeedsReview { warnings, .. } => {
                warnings
            }
        }
    }

    pub fn into_parts(self) -> (SectionStatus, String, Vec<String>) {
        let status = self.status();
        match self {
            SectionDraft::Ok { content, warnings }
            | SectionDraft::NeedsReview { content, warnings } => (status, content, warnings),
        }
    }
}

/// How a section's final content was obtained.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum DraftSource {
    Generated,
    Repaired,
    Fallback,
}

/// Terminal output of a section job.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct SectionResult {
    pub section_id: SectionId,
    pub draft: SectionDraft,
    pub source: DraftSource,
    /// Model that produced the content; `None` for fallback content.
    pub model: Option<String>,
}

impl SectionResult {
    pub fn content(&self) -> &str {
        self.draft.content()
    }

    pub fn warnings(&self) -> &[String] {
        self.draft.warnings()
    }

    pub fn status(&self) -> SectionStatus {
        self.draft.status()
    }

    pub fn is_fallback(&self) -> bool {
        self.source == DraftSource::Fallback
    }

    pub fn chars(&self) -> usize {
        char_len(self.content())
    }
}
