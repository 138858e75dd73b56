//! Section job runner: generate, validate, repair once, fall back.
//!
//! One [`SectionJobRunner::run`] call drives a job through
//! `Pending -> Generating -> Validating -> (RepairAttempt) -> Done` and always ends in a
//! [`SectionResult`], except for Permanent provider errors which are returned to the caller.
//! If an attempt on the selected model ends with only Transient errors, the whole attempt is
//! run once more on the invocation's fallback model.

use crate::error::{GenerationError, PipelineError};
use crate::provider::{GenerationClient, GenerationRequest, ModelSelector, RetryPolicy};
use crate::section::fallback::fallback_content;
use crate::section::{
    DraftSource, OutputContract, SectionDraft, SectionJob, SectionResult, SectionSpec,
    SectionStatus,
};
use crate::validation::{self, budget, ValidationFailure};
use std::fmt;
use std::sync::Arc;
use std::time::Instant;
use tracing::{debug, info, warn};

/// Runner states, logged on every transition.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum JobState {
    Pending,
    Generating,
    Validating,
    RepairAttempt,
    Done,
}

impl fmt::Display for JobState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            JobState::Pending => "pending",
            JobState::Generating => "generating",
            JobState::Validating => "validating",
            JobState::RepairAttempt => "repair_attempt",
            JobState::Done => "done",
        };
        f.write_str(name)
    }
}

const ENVELOPE_DIRECTIVE: &str = r#"You are a section-writing sub-agent in a multi-agent pipeline.

HIGHEST PRIORITY RULES:
- Output MUST be a SINGLE valid JSON object and NOTHING ELSE.
- Do NOT wrap the JSON in markdown fences.
- JSON schema:
{
  "status": "ok" | "needs_review",
  "section_id": string,
  "content_md": string,
  "warnings": [string]
}
- content_md must be compiler-safe markdown: no HTML, no code blocks, no templating syntax.
- Do not reference other sections (no "as above" or "see below").
- If information is missing, write best-effort content and add a warning.

Token discipline:
- Keep content_md concise and within the section's expected size.
"#;

const PLAIN_DIRECTIVE: &str = r#"You are a section-writing sub-agent in a multi-agent pipeline.

HIGHEST PRIORITY RULES:
- Output plain markdown for this section ONLY.
- No code blocks, no HTML, no JSON, no templating syntax.
- No lines of the form NAME = value.
- No commentary about the task (no "Here is ...", no "Sure!").
- Do not reference other sections (no "as above" or "see below").
- Keep the section concise and within its expected size.
"#;

fn section_directive(spec: &SectionSpec) -> String {
    let base = match spec.contract {
        OutputContract::JsonEnvelope => ENVELOPE_DIRECTIVE,
        OutputContract::PlainText => PLAIN_DIRECTIVE,
    };
    format!(
        "{}\nSection: {} (target {}-{} characters)\n",
        base, spec.id, spec.min_chars, spec.max_chars
    )
}

fn repair_directive(spec: &SectionSpec) -> String {
    let instruction = match spec.contract {
        OutputContract::JsonEnvelope => format!(
            "You will be given invalid output. Convert it into a SINGLE valid JSON object matching \
             the schema exactly. Preserve meaning. Do not add new facts. section_id must be \
             \"{}\". Return JSON only.",
            spec.id
        ),
        OutputContract::PlainText => "You will be given invalid output. Rewrite it as plain \
             markdown that follows every rule above. Preserve meaning. Do not add new facts. \
             Return the section text only."
            .to_string(),
    };
    format!("{}\nREPAIR MODE:\n{}\n", section_directive(spec), instruction)
}

fn repair_prompt(raw: &str, failure: &ValidationFailure, original_prompt: &str) -> String {
    format!(
        "INVALID_OUTPUT:\n{}\n\nPROBLEM:\n{}\n\nORIGINAL_REQUEST:\n{}",
        raw, failure, original_prompt
    )
}

/// Executes single section jobs.
pub struct SectionJobRunner {
    client: Arc<dyn GenerationClient>,
    selector: Arc<ModelSelector>,
    primary_retry: RetryPolicy,
    repair_retry: RetryPolicy,
}

impl SectionJobRunner {
    pub fn new(client: Arc<dyn GenerationClient>, selector: Arc<ModelSelector>) -> Self {
        Self {
            client,
            selector,
            primary_retry: RetryPolicy::primary(),
            repair_retry: RetryPolicy::repair(),
        }
    }

    pub fn with_retry(mut self, primary: RetryPolicy, repair: RetryPolicy) -> Self {
        self.primary_retry = primary;
        self.repair_retry = repair;
        self
    }

    pub fn selector(&self) -> &Arc<ModelSelector> {
        &self.selector
    }

    fn transition(&self, job: &SectionJob, from: JobState, to: JobState) {
        debug!(section = %job.spec.id, from = %from, to = %to, "Section job state change");
    }

    /// Run `job` to a terminal result.
    pub async fn run(&self, job: &SectionJob) -> Result<SectionResult, PipelineError> {
        let started = Instant::now();
        let choice = self.selector.select(&job.spec);

        let outcome = match self.attempt(job, &choice.primary).await {
            Err(err) if err.is_transient() => match choice.fallback.as_deref() {
                Some(fallback) => {
                    warn!(
                        section = %job.spec.id,
                        model = %choice.primary,
                        fallback = %fallback,
                        error = %err,
                        "Primary model unavailable, failing over"
                    );
                    self.attempt(job, fallback).await
                }
                None => Err(err),
            },
            other => other,
        };

        let result = match outcome {
            Ok(result) => result,
            Err(GenerationError::Transient(message)) => {
                warn!(
                    section = %job.spec.id,
                    error = %message,
                    "Generation unavailable, substituting fallback content"
                );
                self.fallback_result(
                    job,
                    format!("generation unavailable after retries: {}", message),
                )
            }
            Err(err @ GenerationError::Permanent(_)) => {
                return Err(PipelineError::SectionFailed {
                    section: job.spec.id.clone(),
                    source: err,
                });
            }
        };

        info!(
            section = %job.spec.id,
            model = result.model.as_deref().unwrap_or("-"),
            status = result.status().as_str(),
            source = ?result.source,
            chars = result.chars(),
            elapsed_ms = started.elapsed().as_millis() as u64,
            "Section job completed"
        );
        Ok(result)
    }

    /// One end-to-end attempt on `model`. Only provider errors escape; structural failures
    /// end in fallback content.
    async fn attempt(
        &self,
        job: &SectionJob,
        model: &str,
    ) -> Result<SectionResult, GenerationError> {
        let spec = &job.spec;
        self.transition(job, JobState::Pending, JobState::Generating);

        let request = GenerationRequest::new(
            format!("{}/draft", spec.id),
            job.prompt.clone(),
            job.temperature,
            model,
            spec.max_tokens,
        )
        .with_system(section_directive(spec));
        let raw = self.primary_retry.generate(self.client.as_ref(), &request).await?;

        self.transition(job, JobState::Generating, JobState::Validating);
        let failure = match validation::validate(spec.contract, &spec.id, &raw) {
            Ok(draft) => {
                self.transition(job, JobState::Validating, JobState::Done);
                return Ok(self.finish(job, draft, DraftSource::Generated, Some(model)));
            }
            Err(failure) => failure,
        };

        debug!(section = %spec.id, model, error = %failure, "Section output failed validation");
        self.transition(job, JobState::Validating, JobState::RepairAttempt);

        let repair = GenerationRequest::new(
            format!("{}/repair", spec.id),
            repair_prompt(&raw, &failure, &job.prompt),
            job.temperature,
            model,
            spec.max_tokens,
        )
        .with_system(repair_directive(spec));
        let repaired = self.repair_retry.generate(self.client.as_ref(), &repair).await?;

        self.transition(job, JobState::RepairAttempt, JobState::Done);
        match validation::validate(spec.contract, &spec.id, &repaired) {
            Ok(draft) => Ok(self.finish(job, draft, DraftSource::Repaired, Some(model))),
            Err(second) => {
                warn!(
                    section = %spec.id,
                    model,
                    error = %second,
                    "Repair attempt still invalid, substituting fallback content"
                );
                Ok(self.fallback_result(
                    job,
                    format!("output could not be repaired into a valid section: {}", second),
                ))
            }
        }
    }

    fn fallback_result(&self, job: &SectionJob, reason: String) -> SectionResult {
        let draft = SectionDraft::NeedsReview {
            content: fallback_content(&job.spec.id).to_string(),
            warnings: vec![reason],
        };
        self.finish(job, draft, DraftSource::Fallback, None)
    }

    /// Apply the size budget and build the terminal result.
    fn finish(
        &self,
        job: &SectionJob,
        draft: SectionDraft,
        source: DraftSource,
        model: Option<&str>,
    ) -> SectionResult {
        let (status, content, mut warnings) = draft.into_parts();
        let content = budget::enforce(
            content,
            job.spec.min_chars,
            job.spec.max_chars,
            &mut warnings,
        );
        let status = if source == DraftSource::Fallback {
            SectionStatus::NeedsReview
        } else {
            status
        };
        SectionResult {
            section_id: job.spec.id.clone(),
            draft: SectionDraft::new(status, content, warnings),
            source,
            model: model.map(str::to_string),
        }
    }
}
