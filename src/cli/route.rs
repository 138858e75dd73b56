//! CLI route: single route table and run context. Dispatches to the pipeline and stores.

use crate::cli::parse::Commands;
use crate::cli::presentation::{
    format_artifacts, format_progress, format_run_summary, format_sections,
};
use crate::cli::request::RequestFile;
use crate::config::{BlogforgeConfig, ConfigLoader};
use crate::error::{PipelineError, StorageError};
use crate::pipeline::Pipeline;
use crate::provider::HttpGenerationClient;
use crate::store::{PipelineStore, SledPipelineStore};
use crate::types::RunId;
use once_cell::sync::OnceCell;
use std::path::{Path, PathBuf};
use std::sync::Arc;
use std::time::Instant;
use tracing::{info, warn};

/// Runtime context for CLI execution: workspace, loaded configuration and the store,
/// opened on first use.
pub struct RunContext {
    workspace_root: PathBuf,
    config: BlogforgeConfig,
    store: OnceCell<Arc<SledPipelineStore>>,
}

impl RunContext {
    /// Create run context from workspace root and optional config path. Uses ConfigLoader only.
    pub fn new(workspace_root: PathBuf, config_path: Option<PathBuf>) -> Result<Self, PipelineError> {
        let config = match config_path {
            Some(ref path) => ConfigLoader::load_from_file(path)?,
            None => ConfigLoader::load(&workspace_root)?,
        };
        Self::from_config(workspace_root, config)
    }

    pub fn from_config(
        workspace_root: PathBuf,
        config: BlogforgeConfig,
    ) -> Result<Self, PipelineError> {
        config.validate().map_err(|errors| {
            let joined: Vec<String> = errors.iter().map(|e| e.to_string()).collect();
            PipelineError::ConfigError(joined.join("; "))
        })?;
        Ok(Self {
            workspace_root,
            config,
            store: OnceCell::new(),
        })
    }

    pub fn config(&self) -> &BlogforgeConfig {
        &self.config
    }

    fn store_path(&self) -> PathBuf {
        let path = self.config.storage.resolved_path();
        if path.is_relative() {
            self.workspace_root.join(path)
        } else {
            path
        }
    }

    fn open_store(&self) -> Result<Arc<SledPipelineStore>, StorageError> {
        self.store
            .get_or_try_init(|| {
                let path = self.store_path();
                std::fs::create_dir_all(&path).map_err(|e| {
                    StorageError::Io(format!("Failed to create {}: {}", path.display(), e))
                })?;
                SledPipelineStore::open(&path).map(Arc::new)
            })
            .map(Arc::clone)
    }

    /// Execute a CLI command via the single route table.
    pub fn execute(&self, command: &Commands) -> Result<String, PipelineError> {
        let started = Instant::now();
        let result = match command {
            Commands::Run {
                request,
                message,
                vars,
                temperature,
                output,
                no_store,
            } => self.handle_run(
                request,
                message.clone(),
                vars,
                *temperature,
                output.as_deref(),
                *no_store,
            ),
            Commands::Sections => Ok(format_sections(&self.config.catalog())),
            Commands::Progress { run_id } => self.handle_progress(run_id.as_deref()),
            Commands::Artifacts { limit } => self.handle_artifacts(*limit),
        };
        info!(
            elapsed_ms = started.elapsed().as_millis() as u64,
            ok = result.is_ok(),
            "Command finished"
        );
        result
    }

    fn handle_run(
        &self,
        request_path: &Path,
        message: Option<String>,
        vars: &[(String, String)],
        temperature: Option<f32>,
        output: Option<&Path>,
        no_store: bool,
    ) -> Result<String, PipelineError> {
        let request = RequestFile::load(request_path)?.into_request(message, vars, temperature);

        let client = HttpGenerationClient::from_settings(&self.config.provider)
            .map_err(|e| PipelineError::ConfigError(e.to_string()))?;

        // Persistence is best effort: an unavailable store only disables recording.
        let store: Option<Arc<dyn PipelineStore>> = if no_store || !self.config.storage.enabled {
            None
        } else {
            match self.open_store() {
                Ok(store) => Some(store as Arc<dyn PipelineStore>),
                Err(err) => {
                    warn!(error = %err, "Store unavailable; continuing without persistence");
                    None
                }
            }
        };

        let pipeline = Pipeline::from_config(&self.config, Arc::new(client), store);
        let runtime = tokio::runtime::Builder::new_multi_thread()
            .enable_all()
            .build()
            .map_err(|e| PipelineError::ConfigError(format!("Failed to start runtime: {}", e)))?;
        let outcome = runtime.block_on(pipeline.run(&request))?;

        match output {
            Some(path) => {
                std::fs::write(path, &outcome.artifact.text).map_err(|e| {
                    StorageError::Io(format!("Failed to write {}: {}", path.display(), e))
                })?;
                Ok(format_run_summary(&outcome, path))
            }
            None => Ok(outcome.artifact.text),
        }
    }

    fn handle_progress(&self, run_id: Option<&str>) -> Result<String, PipelineError> {
        let store = self.open_store()?;
        let progress = match run_id {
            Some(id) => store
                .get_progress(&RunId::from_string(id))?
                .ok_or_else(|| StorageError::RunNotFound(id.to_string()))?,
            None => match store.latest_run()? {
                Some(progress) => progress,
                None => return Ok("No runs recorded.".to_string()),
            },
        };
        Ok(format_progress(&progress))
    }

    fn handle_artifacts(&self, limit: usize) -> Result<String, PipelineError> {
        let store = self.open_store()?;
        Ok(format_artifacts(&store.list_artifacts(limit)?))
    }
}
