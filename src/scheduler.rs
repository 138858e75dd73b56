//! Fan-out scheduler: runs every section job of a pipeline run concurrently and joins them.
//!
//! Jobs run as spawned tasks behind a semaphore sized to the number of distinct sections.
//! Results are collected in completion order; the compiler consumes them keyed by section,
//! so arrival order never matters.

use crate::error::PipelineError;
use crate::progress::ProgressTracker;
use crate::section::fallback::fallback_content;
use crate::section::{DraftSource, SectionDraft, SectionJob, SectionJobRunner, SectionResult};
use crate::types::{RunId, SectionId};
use crate::validation::budget;
use futures::stream::{FuturesUnordered, StreamExt};
use serde::{Deserialize, Serialize};
use std::collections::{HashMap, HashSet};
use std::sync::Arc;
use std::time::{Duration, Instant};
use tokio::sync::Semaphore;
use tokio::task::JoinHandle;
use tracing::{error, info, info_span, warn, Instrument};

/// What to do when a section job fails with a Permanent error.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum FailurePolicy {
    /// Record the failure, substitute fallback content, keep going.
    #[default]
    Degrade,
    /// Fail the run with the first section error. Siblings already running finish on their
    /// own; their results are discarded.
    Abort,
}

/// A section that did not produce generated content.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SectionFailure {
    pub section_id: SectionId,
    pub message: String,
}

/// Joined outcome of the fan-out phase.
#[derive(Debug, Clone, Default)]
pub struct FanOutReport {
    pub results: HashMap<SectionId, SectionResult>,
    pub failures: Vec<SectionFailure>,
    /// Section ids in the order their jobs reached a terminal state.
    pub completion_order: Vec<SectionId>,
}

impl FanOutReport {
    pub fn get(&self, section: &SectionId) -> Option<&SectionResult> {
        self.results.get(section)
    }

    pub fn fallback_count(&self) -> usize {
        self.results.values().filter(|r| r.is_fallback()).count()
    }
}

fn degraded_result(section: &SectionId, max_chars: usize, reason: String) -> SectionResult {
    SectionResult {
        section_id: section.clone(),
        draft: SectionDraft::NeedsReview {
            content: budget::truncate_chars(fallback_content(section), max_chars),
            warnings: vec![reason],
        },
        source: DraftSource::Fallback,
        model: None,
    }
}

pub struct FanOutScheduler {
    runner: Arc<SectionJobRunner>,
    policy: FailurePolicy,
    phase_timeout: Option<Duration>,
    max_workers: Option<usize>,
}

impl FanOutScheduler {
    pub fn new(runner: Arc<SectionJobRunner>) -> Self {
        Self {
            runner,
            policy: FailurePolicy::default(),
            phase_timeout: None,
            max_workers: None,
        }
    }

    pub fn with_policy(mut self, policy: FailurePolicy) -> Self {
        self.policy = policy;
        self
    }

    /// Bound the whole fan-out phase. Jobs still running at the deadline get fallback content.
    pub fn with_phase_timeout(mut self, timeout: Option<Duration>) -> Self {
        self.phase_timeout = timeout;
        self
    }

    pub fn with_max_workers(mut self, max_workers: Option<usize>) -> Self {
        self.max_workers = max_workers;
        self
    }

    pub fn policy(&self) -> FailurePolicy {
        self.policy
    }

    /// Run every job to a terminal state.
    pub async fn run_all(
        &self,
        run_id: &RunId,
        jobs: Vec<SectionJob>,
        progress: Option<&ProgressTracker>,
    ) -> Result<FanOutReport, PipelineError> {
        let started = Instant::now();
        let distinct: HashSet<&SectionId> = jobs.iter().map(|job| job.id()).collect();
        let workers = self.max_workers.unwrap_or(distinct.len()).max(1);
        let semaphore = Arc::new(Semaphore::new(workers));
        let expected: Vec<SectionId> = jobs.iter().map(|job| job.id().clone()).collect();
        let budgets: HashMap<SectionId, usize> = jobs
            .iter()
            .map(|job| (job.id().clone(), job.spec.max_chars))
            .collect();
        let max_chars_for =
            |section: &SectionId| budgets.get(section).copied().unwrap_or(usize::MAX);

        info!(
            run_id = %run_id,
            jobs = jobs.len(),
            workers,
            "Launching section jobs"
        );

        let mut pending: FuturesUnordered<_> = jobs
            .into_iter()
            .map(|job| {
                let section = job.id().clone();
                let runner = Arc::clone(&self.runner);
                let semaphore = Arc::clone(&semaphore);
                let span = info_span!("section", run_id = %run_id, section = %section);
                let handle: JoinHandle<Result<SectionResult, PipelineError>> = tokio::spawn(
                    async move {
                        let _permit = semaphore.acquire_owned().await.map_err(|_| {
                            PipelineError::InvalidInput("worker pool closed".to_string())
                        })?;
                        runner.run(&job).await
                    }
                    .instrument(span),
                );
                async move { (section, handle.await) }
            })
            .collect();

        let mut report = FanOutReport::default();
        let deadline = self.phase_timeout.map(|t| tokio::time::Instant::now() + t);

        loop {
            let next = match deadline {
                Some(deadline) => match tokio::time::timeout_at(deadline, pending.next()).await {
                    Ok(next) => next,
                    Err(_) => {
                        warn!(
                            run_id = %run_id,
                            outstanding = pending.len(),
                            "Fan-out phase timed out"
                        );
                        break;
                    }
                },
                None => pending.next().await,
            };
            let Some((section, joined)) = next else {
                break;
            };

            let result = match joined {
                Ok(Ok(result)) => result,
                Ok(Err(err)) => {
                    error!(run_id = %run_id, section = %section, error = %err, "Section job failed");
                    if self.policy == FailurePolicy::Abort {
                        return Err(err);
                    }
                    report.failures.push(SectionFailure {
                        section_id: section.clone(),
                        message: err.to_string(),
                    });
                    degraded_result(
                        &section,
                        max_chars_for(&section),
                        format!("section failed: {}", err),
                    )
                }
                Err(join_err) => {
                    error!(
                        run_id = %run_id,
                        section = %section,
                        error = %join_err,
                        "Section task panicked"
                    );
                    report.failures.push(SectionFailure {
                        section_id: section.clone(),
                        message: join_err.to_string(),
                    });
                    degraded_result(
                        &section,
                        max_chars_for(&section),
                        format!("section task aborted: {}", join_err),
                    )
                }
            };

            if let Some(progress) = progress {
                progress.mark_complete(section.as_str());
            }
            report.completion_order.push(section.clone());
            report.results.insert(section, result);
        }

        // Anything not joined by now timed out; it keeps running detached and is ignored.
        for section in expected {
            if !report.results.contains_key(&section) {
                report.failures.push(SectionFailure {
                    section_id: section.clone(),
                    message: "fan-out phase timed out".to_string(),
                });
                report.results.insert(
                    section.clone(),
                    degraded_result(
                        &section,
                        max_chars_for(&section),
                        "section timed out".to_string(),
                    ),
                );
                if let Some(progress) = progress {
                    progress.mark_complete(section.as_str());
                }
            }
        }

        info!(
            run_id = %run_id,
            completed = report.completion_order.len(),
            failures = report.failures.len(),
            fallbacks = report.fallback_count(),
            elapsed_ms = started.elapsed().as_millis() as u64,
            "Section jobs finished"
        );
        Ok(report)
    }
}
