//! Pipeline entry point: fan out the section jobs, join, compile, record.

use crate::compiler::{CompilerInput, CompilerSettings, CompilerStage, FinalArtifact};
use crate::config::BlogforgeConfig;
use crate::error::PipelineError;
use crate::progress::{PipelineProgress, ProgressTracker};
use crate::provider::{GenerationClient, ModelSelector, RetryPolicy};
use crate::scheduler::{FailurePolicy, FanOutReport, FanOutScheduler};
use crate::section::{render_prompt, SectionCatalog, SectionJob, SectionJobRunner};
use crate::store::{BestEffortStore, PipelineStore};
use crate::types::{RunId, SectionId, COMPILER_STAGE};
use std::collections::{BTreeMap, HashMap};
use std::sync::Arc;
use std::time::{Duration, Instant};
use tracing::{info, info_span, warn, Instrument};

/// Inputs of one pipeline run.
#[derive(Debug, Clone, Default)]
pub struct PipelineRequest {
    pub user_message: String,
    pub business_vars: BTreeMap<String, String>,
    /// Prompt template per section; sections without a prompt are not run
    pub section_prompts: HashMap<SectionId, String>,
    pub requirements: String,
    pub temperature: f32,
}

impl PipelineRequest {
    fn check(&self, catalog: &SectionCatalog) -> Result<(), PipelineError> {
        if !(0.0..=1.0).contains(&self.temperature) {
            return Err(PipelineError::InvalidInput(format!(
                "temperature must be within [0, 1], got {}",
                self.temperature
            )));
        }
        if self.user_message.trim().is_empty() {
            return Err(PipelineError::InvalidInput(
                "user message cannot be empty".to_string(),
            ));
        }
        if let Some(unknown) = self
            .section_prompts
            .keys()
            .find(|id| catalog.get(id).is_none())
        {
            return Err(PipelineError::InvalidInput(format!(
                "unknown section '{}'",
                unknown
            )));
        }
        if self.section_prompts.values().all(|p| p.trim().is_empty()) {
            return Err(PipelineError::InvalidInput(
                "at least one section prompt is required".to_string(),
            ));
        }
        Ok(())
    }

    /// One job per catalog section with a non-blank prompt, in catalog order.
    fn jobs(&self, catalog: &SectionCatalog) -> Vec<SectionJob> {
        catalog
            .iter()
            .filter_map(|spec| {
                let template = self.section_prompts.get(&spec.id)?;
                if template.trim().is_empty() {
                    return None;
                }
                let prompt = render_prompt(template, &self.user_message, &self.business_vars);
                Some(SectionJob::new(spec.clone(), prompt, self.temperature))
            })
            .collect()
    }
}

/// Everything a run produced.
#[derive(Debug, Clone)]
pub struct PipelineOutcome {
    pub run_id: RunId,
    pub artifact: FinalArtifact,
    pub report: FanOutReport,
    pub progress: PipelineProgress,
}

pub struct Pipeline {
    client: Arc<dyn GenerationClient>,
    selector: Arc<ModelSelector>,
    catalog: SectionCatalog,
    compiler_settings: CompilerSettings,
    primary_retry: RetryPolicy,
    repair_retry: RetryPolicy,
    failure_policy: FailurePolicy,
    phase_timeout: Option<Duration>,
    max_workers: Option<usize>,
    store: Option<Arc<BestEffortStore>>,
    flush_timeout: Duration,
}

/// Default bound on waiting for queued persistence writes at the end of a run.
pub const DEFAULT_FLUSH_TIMEOUT: Duration = Duration::from_secs(2);

impl Pipeline {
    pub fn new(
        client: Arc<dyn GenerationClient>,
        catalog: SectionCatalog,
        compiler_settings: CompilerSettings,
    ) -> Self {
        Self {
            client,
            selector: Arc::new(ModelSelector::new()),
            catalog,
            compiler_settings,
            primary_retry: RetryPolicy::primary(),
            repair_retry: RetryPolicy::repair(),
            failure_policy: FailurePolicy::default(),
            phase_timeout: None,
            max_workers: None,
            store: None,
            flush_timeout: DEFAULT_FLUSH_TIMEOUT,
        }
    }

    /// Build a pipeline from loaded configuration.
    pub fn from_config(
        config: &BlogforgeConfig,
        client: Arc<dyn GenerationClient>,
        store: Option<Arc<dyn PipelineStore>>,
    ) -> Self {
        let pipeline = Self::new(client, config.catalog(), config.compiler_settings())
            .with_retry(config.retry.primary_policy(), config.retry.repair_policy())
            .with_failure_policy(config.scheduler.failure_policy)
            .with_phase_timeout(config.scheduler.phase_timeout())
            .with_max_workers(config.scheduler.max_workers)
            .with_flush_timeout(config.storage.flush_timeout());
        match store {
            Some(store) => pipeline.with_store(store),
            None => pipeline,
        }
    }

    pub fn with_store(mut self, store: Arc<dyn PipelineStore>) -> Self {
        self.store = Some(Arc::new(BestEffortStore::new(store)));
        self
    }

    pub fn with_retry(mut self, primary: RetryPolicy, repair: RetryPolicy) -> Self {
        self.primary_retry = primary;
        self.repair_retry = repair;
        self
    }

    pub fn with_failure_policy(mut self, policy: FailurePolicy) -> Self {
        self.failure_policy = policy;
        self
    }

    pub fn with_phase_timeout(mut self, timeout: Option<Duration>) -> Self {
        self.phase_timeout = timeout;
        self
    }

    pub fn with_max_workers(mut self, max_workers: Option<usize>) -> Self {
        self.max_workers = max_workers;
        self
    }

    pub fn with_flush_timeout(mut self, timeout: Duration) -> Self {
        self.flush_timeout = timeout;
        self
    }

    /// Shared across runs, so alternation continues from one run to the next.
    pub fn selector(&self) -> &Arc<ModelSelector> {
        &self.selector
    }

    pub fn catalog(&self) -> &SectionCatalog {
        &self.catalog
    }

    fn scheduler(&self) -> FanOutScheduler {
        let runner = SectionJobRunner::new(Arc::clone(&self.client), Arc::clone(&self.selector))
            .with_retry(self.primary_retry, self.repair_retry);
        FanOutScheduler::new(Arc::new(runner))
            .with_policy(self.failure_policy)
            .with_phase_timeout(self.phase_timeout)
            .with_max_workers(self.max_workers)
    }

    fn compiler(&self) -> CompilerStage {
        CompilerStage::new(Arc::clone(&self.client), self.compiler_settings.clone())
            .with_retry(self.primary_retry, self.repair_retry)
    }

    async fn flush_store(&self) {
        if let Some(store) = &self.store {
            store.flush_within(self.flush_timeout).await;
        }
    }

    /// Run the whole pipeline once.
    pub async fn run(&self, request: &PipelineRequest) -> Result<PipelineOutcome, PipelineError> {
        request.check(&self.catalog)?;
        let run_id = RunId::generate();
        let span = info_span!("pipeline", run_id = %run_id);
        let outcome = self.run_inner(run_id, request).instrument(span).await;
        self.flush_store().await;
        outcome
    }

    async fn run_inner(
        &self,
        run_id: RunId,
        request: &PipelineRequest,
    ) -> Result<PipelineOutcome, PipelineError> {
        let started = Instant::now();
        let jobs = request.jobs(&self.catalog);
        let mut stages: Vec<String> = jobs.iter().map(|job| job.id().to_string()).collect();
        stages.push(COMPILER_STAGE.to_string());
        let progress = ProgressTracker::start(run_id.clone(), &stages, self.store.clone());

        info!(run_id = %run_id, sections = jobs.len(), "Pipeline run started");

        let report = self
            .scheduler()
            .run_all(&run_id, jobs, Some(&progress))
            .await?;
        if !report.failures.is_empty() {
            warn!(
                run_id = %run_id,
                failures = report.failures.len(),
                "Some sections degraded to fallback content"
            );
        }

        let input = CompilerInput::build(
            &request.requirements,
            &request.business_vars,
            &request.user_message,
            &self.catalog,
            &report.results,
        );
        let artifact = self.compiler().compile(&input, request.temperature).await?;

        if let Some(store) = &self.store {
            store.record_artifact(&request.user_message, &artifact.text);
        }
        progress.mark_complete(COMPILER_STAGE);

        info!(
            run_id = %run_id,
            chars = artifact.chars(),
            fallbacks = report.fallback_count(),
            elapsed_ms = started.elapsed().as_millis() as u64,
            "Pipeline run finished"
        );

        Ok(PipelineOutcome {
            run_id,
            artifact,
            report,
            progress: progress.snapshot(),
        })
    }

    /// Run the pipeline and return only the final document text.
    pub async fn run_pipeline(
        &self,
        user_message: &str,
        business_vars: &HashMap<String, String>,
        section_prompts: &HashMap<SectionId, String>,
        requirements: &str,
        temperature: f32,
    ) -> Result<String, PipelineError> {
        let request = PipelineRequest {
            user_message: user_message.to_string(),
            business_vars: business_vars
                .iter()
                .map(|(k, v)| (k.clone(), v.clone()))
                .collect(),
            section_prompts: section_prompts.clone(),
            requirements: requirements.to_string(),
            temperature,
        };
        self.run(&request).await.map(|outcome| outcome.artifact.text)
    }
}
