//! Final merge pass with the same validate/repair discipline as section jobs.
//!
//! Passes, in order:
//! 1. initial generation over the rendered [`CompilerInput`] (failure here is fatal)
//! 2. sanitize: fences, meta-commentary, leaked blocks, assignment lines, echoed requirements
//! 3. one repair pass if the result is empty or opens like JSON
//! 4. compression (then hard truncation) when too long, expansion when too short
//! 5. final sanitize and max-length guard; deterministic placeholder if nothing is left
//!
//! Only step 1 can fail the run. Later passes that error keep the best text so far.

use super::input::CompilerInput;
use crate::error::PipelineError;
use crate::provider::{GenerationClient, GenerationRequest, RetryPolicy};
use crate::section::fallback::placeholder_document;
use crate::types::{char_len, tokens_to_chars, DEFAULT_CHARS_PER_TOKEN};
use crate::validation::{budget, plain};
use serde::{Deserialize, Serialize};
use std::collections::HashSet;
use std::sync::Arc;
use std::time::Instant;
use tracing::{debug, info, warn};

pub const DEFAULT_COMPILER_MODEL: &str = "deepseek-ai/DeepSeek-V3";
pub const DEFAULT_MIN_TOKENS: u32 = 1792;
pub const DEFAULT_MAX_TOKENS: u32 = 3584;

/// Requirement lines shorter than this are not treated as echoes (headings, bullets).
const ECHO_MIN_CHARS: usize = 24;

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CompilerSettings {
    pub model: String,
    /// Generation ceiling for every compiler call.
    pub max_tokens: u32,
    pub min_chars: usize,
    pub max_chars: usize,
}

impl CompilerSettings {
    pub fn from_token_budget(
        model: impl Into<String>,
        min_tokens: u32,
        max_tokens: u32,
        chars_per_token: usize,
    ) -> Self {
        Self {
            model: model.into(),
            max_tokens,
            min_chars: tokens_to_chars(min_tokens, chars_per_token),
            max_chars: tokens_to_chars(max_tokens, chars_per_token),
        }
    }
}

impl Default for CompilerSettings {
    fn default() -> Self {
        Self::from_token_budget(
            DEFAULT_COMPILER_MODEL,
            DEFAULT_MIN_TOKENS,
            DEFAULT_MAX_TOKENS,
            DEFAULT_CHARS_PER_TOKEN,
        )
    }
}

/// Passes that changed the document, in the order they ran.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum CompilerPass {
    Initial,
    Repair,
    Compression,
    Expansion,
    HardTruncate,
    Placeholder,
}

/// The finished document.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct FinalArtifact {
    pub text: String,
    pub warnings: Vec<String>,
    pub passes: Vec<CompilerPass>,
}

impl FinalArtifact {
    pub fn chars(&self) -> usize {
        char_len(&self.text)
    }
}

fn compiler_directive(settings: &CompilerSettings) -> String {
    format!(
        r#"You are the final compiler agent in a multi-agent writing pipeline.

HIGHEST PRIORITY RULES:
- Output MUST be plain Markdown ONLY (not JSON).
- No code blocks, no HTML tags, no templating syntax.
- No lines of the form NAME = value.
- Do not invent facts beyond what the user message and drafts contain.
- Preserve placeholders exactly as they appear (e.g. COMPANY_NAME, CALL_NUMBER, LINK).
- BLOG_REQUIREMENTS are constraints: follow them, never repeat or quote them.
- Remove repetition, normalise tone and make the piece read as one coherent article.
- Do not mention internal pipeline mechanics, drafts or agent names.
- Use a clean structure with headings and subheadings where appropriate.

LENGTH TARGET:
- Aim for {}-{} characters.
"#,
        settings.min_chars, settings.max_chars
    )
}

fn pass_prompt(mode: &str, instruction: &str, previous: &str, source: &str) -> String {
    format!(
        "{} MODE:\n{}\nReturn Markdown only.\n\nORIGINAL_OUTPUT:\n{}\n\nSOURCE_PROMPT:\n{}",
        mode, instruction, previous, source
    )
}

/// Drop output lines that repeat a requirement line verbatim.
fn strip_echoed_requirements(text: &str, requirements: &str) -> String {
    let echoes: HashSet<String> = requirements
        .lines()
        .map(|line| line.trim().to_lowercase())
        .filter(|line| char_len(line) >= ECHO_MIN_CHARS)
        .collect();
    if echoes.is_empty() {
        return text.to_string();
    }
    text.lines()
        .filter(|line| !echoes.contains(&line.trim().to_lowercase()))
        .collect::<Vec<_>>()
        .join("\n")
}

fn clean(raw: &str, input: &CompilerInput) -> String {
    let text = plain::sanitize(raw);
    plain::sanitize(&strip_echoed_requirements(&text, input.requirements()))
}

fn structurally_invalid(text: &str) -> bool {
    text.trim().is_empty() || plain::looks_structured(text) || plain::has_fence(text)
}

pub struct CompilerStage {
    client: Arc<dyn GenerationClient>,
    primary_retry: RetryPolicy,
    repair_retry: RetryPolicy,
    settings: CompilerSettings,
}

impl CompilerStage {
    pub fn new(client: Arc<dyn GenerationClient>, settings: CompilerSettings) -> Self {
        Self {
            client,
            primary_retry: RetryPolicy::primary(),
            repair_retry: RetryPolicy::repair(),
            settings,
        }
    }

    pub fn with_retry(mut self, primary: RetryPolicy, repair: RetryPolicy) -> Self {
        self.primary_retry = primary;
        self.repair_retry = repair;
        self
    }

    pub fn settings(&self) -> &CompilerSettings {
        &self.settings
    }

    fn request(&self, label: &str, prompt: String, temperature: f32) -> GenerationRequest {
        GenerationRequest::new(
            label,
            prompt,
            temperature,
            self.settings.model.clone(),
            self.settings.max_tokens,
        )
        .with_system(compiler_directive(&self.settings))
    }

    /// Run a follow-up pass. Returns the cleaned text when it is usable, `None` otherwise.
    async fn follow_up(
        &self,
        pass: CompilerPass,
        prompt: String,
        temperature: f32,
        input: &CompilerInput,
        warnings: &mut Vec<String>,
    ) -> Option<String> {
        let label = match pass {
            CompilerPass::Repair => "compiler/repair",
            CompilerPass::Compression => "compiler/compress",
            _ => "compiler/expand",
        };
        let request = self.request(label, prompt, temperature);
        match self.repair_retry.generate(self.client.as_ref(), &request).await {
            Ok(raw) => {
                let text = clean(&raw, input);
                if structurally_invalid(&text) {
                    warnings.push(format!("{:?} pass returned unusable output; ignored.", pass));
                    None
                } else {
                    debug!(pass = ?pass, chars = char_len(&text), "Compiler pass applied");
                    Some(text)
                }
            }
            Err(err) => {
                warn!(pass = ?pass, error = %err, "Compiler pass failed, keeping previous text");
                warnings.push(format!("{:?} pass failed: {}", pass, err));
                None
            }
        }
    }

    /// Compile the final document.
    pub async fn compile(
        &self,
        input: &CompilerInput,
        temperature: f32,
    ) -> Result<FinalArtifact, PipelineError> {
        let started = Instant::now();
        let source = input.render();
        let (min_chars, max_chars) = (self.settings.min_chars, self.settings.max_chars);
        let mut warnings = Vec::new();
        let mut passes = vec![CompilerPass::Initial];

        let request = self.request("compiler/draft", source.clone(), temperature);
        let raw = self
            .primary_retry
            .generate(self.client.as_ref(), &request)
            .await
            .map_err(PipelineError::CompilerFailed)?;
        let mut text = clean(&raw, input);

        if structurally_invalid(&text) {
            let prompt = pass_prompt(
                "REPAIR",
                "Your output violated the output rules (JSON, code blocks or no content). \
                 Rewrite it as plain Markdown without code fences, HTML or JSON. Keep the same \
                 meaning and structure.",
                &raw,
                &source,
            );
            match self
                .follow_up(CompilerPass::Repair, prompt, temperature, input, &mut warnings)
                .await
            {
                Some(repaired) => {
                    text = repaired;
                    passes.push(CompilerPass::Repair);
                }
                None if plain::looks_structured(&text) => text.clear(),
                None => {}
            }
        }

        let len = char_len(&text);
        if len > max_chars {
            let prompt = pass_prompt(
                "COMPRESSION",
                &format!(
                    "Your output is too long ({} chars). Rewrite it to fit within {} chars. Keep \
                     key information, remove redundancy, shorten examples, tighten phrasing.",
                    len, max_chars
                ),
                &text,
                &source,
            );
            if let Some(shorter) = self
                .follow_up(CompilerPass::Compression, prompt, temperature, input, &mut warnings)
                .await
            {
                text = shorter;
                passes.push(CompilerPass::Compression);
            }
        } else if len < min_chars && !text.is_empty() {
            let prompt = pass_prompt(
                "EXPANSION",
                &format!(
                    "Your output is too short ({} chars). Expand it to at least {} chars. Add \
                     helpful detail, clarifying sentences and structure, but do NOT invent new \
                     facts.",
                    len, min_chars
                ),
                &text,
                &source,
            );
            if let Some(longer) = self
                .follow_up(CompilerPass::Expansion, prompt, temperature, input, &mut warnings)
                .await
            {
                text = longer;
                passes.push(CompilerPass::Expansion);
            }
            if char_len(&text) < min_chars {
                warnings.push(format!(
                    "document shorter than target ({} < {}).",
                    char_len(&text),
                    min_chars
                ));
            }
        }

        if char_len(&text) > max_chars {
            text = plain::sanitize(&budget::truncate_chars(&text, max_chars));
            passes.push(CompilerPass::HardTruncate);
            warnings.push(format!("document trimmed to max_chars={}.", max_chars));
        }

        if text.trim().is_empty() {
            warn!("Compiler produced no usable text, substituting placeholder document");
            text = budget::truncate_chars(&placeholder_document(&input.drafts()), max_chars);
            passes.push(CompilerPass::Placeholder);
            warnings.push("compiler output empty; placeholder document used.".to_string());
        }

        info!(
            model = %self.settings.model,
            chars = char_len(&text),
            passes = ?passes,
            elapsed_ms = started.elapsed().as_millis() as u64,
            "Compiler stage completed"
        );
        Ok(FinalArtifact {
            text,
            warnings,
            passes,
        })
    }
}
