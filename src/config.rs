//! Configuration System
//!
//! Layered configuration: built-in defaults, then the global file, then workspace files,
//! then `BLOGFORGE__SECTION__KEY` environment variables. Validation collects every problem
//! instead of stopping at the first.

use crate::compiler::CompilerSettings;
use crate::logging::LoggingConfig;
use crate::provider::RetryPolicy;
use crate::scheduler::FailurePolicy;
use crate::section::{OutputContract, SectionCatalog, SectionSpec};
use crate::types::DEFAULT_CHARS_PER_TOKEN;
use config::{Config, ConfigError, Environment, File};
use serde::{Deserialize, Serialize};
use std::collections::HashSet;
use std::path::{Path, PathBuf};
use std::time::Duration;

mod merge;
mod sources;

/// Root configuration structure
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct BlogforgeConfig {
    #[serde(default)]
    pub provider: ProviderSettings,

    #[serde(default)]
    pub retry: RetrySettings,

    #[serde(default)]
    pub budget: BudgetSettings,

    #[serde(default)]
    pub compiler: CompilerConfig,

    #[serde(default)]
    pub scheduler: SchedulerSettings,

    /// Replaces the built-in section catalog when non-empty
    #[serde(default)]
    pub sections: Vec<SectionConfig>,

    #[serde(default)]
    pub storage: StorageSettings,

    #[serde(default)]
    pub logging: LoggingConfig,
}

/// OpenAI-compatible endpoint settings
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ProviderSettings {
    #[serde(default = "default_base_url")]
    pub base_url: String,

    /// Name of the environment variable holding the API key
    #[serde(default = "default_api_key_env")]
    pub api_key_env: String,

    #[serde(default = "default_connect_timeout")]
    pub connect_timeout_secs: u64,

    #[serde(default = "default_request_timeout")]
    pub request_timeout_secs: u64,
}

fn default_base_url() -> String {
    "https://api.together.xyz/v1".to_string()
}

fn default_api_key_env() -> String {
    "TOGETHER_API_KEY".to_string()
}

fn default_connect_timeout() -> u64 {
    10
}

fn default_request_timeout() -> u64 {
    120
}

impl Default for ProviderSettings {
    fn default() -> Self {
        Self {
            base_url: default_base_url(),
            api_key_env: default_api_key_env(),
            connect_timeout_secs: default_connect_timeout(),
            request_timeout_secs: default_request_timeout(),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct RetrySettings {
    #[serde(default = "default_primary_attempts")]
    pub primary_attempts: u32,

    #[serde(default = "default_repair_attempts")]
    pub repair_attempts: u32,

    #[serde(default = "default_base_delay_ms")]
    pub base_delay_ms: u64,

    #[serde(default = "default_max_jitter_ms")]
    pub max_jitter_ms: u64,
}

fn default_primary_attempts() -> u32 {
    RetryPolicy::PRIMARY_ATTEMPTS
}

fn default_repair_attempts() -> u32 {
    RetryPolicy::REPAIR_ATTEMPTS
}

fn default_base_delay_ms() -> u64 {
    400
}

fn default_max_jitter_ms() -> u64 {
    250
}

impl Default for RetrySettings {
    fn default() -> Self {
        Self {
            primary_attempts: default_primary_attempts(),
            repair_attempts: default_repair_attempts(),
            base_delay_ms: default_base_delay_ms(),
            max_jitter_ms: default_max_jitter_ms(),
        }
    }
}

impl RetrySettings {
    fn policy(&self, attempts: u32) -> RetryPolicy {
        RetryPolicy::new(
            attempts,
            Duration::from_millis(self.base_delay_ms),
            Duration::from_millis(self.max_jitter_ms),
        )
    }

    pub fn primary_policy(&self) -> RetryPolicy {
        self.policy(self.primary_attempts)
    }

    pub fn repair_policy(&self) -> RetryPolicy {
        self.policy(self.repair_attempts)
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct BudgetSettings {
    /// Coarse token-to-character ratio used for every size budget
    #[serde(default = "default_chars_per_token")]
    pub chars_per_token: usize,
}

fn default_chars_per_token() -> usize {
    DEFAULT_CHARS_PER_TOKEN
}

impl Default for BudgetSettings {
    fn default() -> Self {
        Self {
            chars_per_token: default_chars_per_token(),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct CompilerConfig {
    #[serde(default = "default_compiler_model")]
    pub model: String,

    #[serde(default = "default_compiler_min_tokens")]
    pub min_tokens: u32,

    #[serde(default = "default_compiler_max_tokens")]
    pub max_tokens: u32,
}

fn default_compiler_model() -> String {
    crate::compiler::stage::DEFAULT_COMPILER_MODEL.to_string()
}

fn default_compiler_min_tokens() -> u32 {
    crate::compiler::stage::DEFAULT_MIN_TOKENS
}

fn default_compiler_max_tokens() -> u32 {
    crate::compiler::stage::DEFAULT_MAX_TOKENS
}

impl Default for CompilerConfig {
    fn default() -> Self {
        Self {
            model: default_compiler_model(),
            min_tokens: default_compiler_min_tokens(),
            max_tokens: default_compiler_max_tokens(),
        }
    }
}

#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct SchedulerSettings {
    #[serde(default)]
    pub failure_policy: FailurePolicy,

    /// Deadline for the whole fan-out phase; unset means wait for every job
    #[serde(default)]
    pub phase_timeout_secs: Option<u64>,

    /// Defaults to the number of distinct sections in the run
    #[serde(default)]
    pub max_workers: Option<usize>,
}

impl SchedulerSettings {
    pub fn phase_timeout(&self) -> Option<Duration> {
        self.phase_timeout_secs.map(Duration::from_secs)
    }
}

/// One `[[sections]]` entry
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct SectionConfig {
    pub id: String,

    /// Compiler block tag; defaults to `DRAFT_{ID}`
    #[serde(default)]
    pub block_tag: Option<String>,

    pub primary_model: String,

    #[serde(default)]
    pub fallback_model: Option<String>,

    pub min_tokens: u32,

    pub max_tokens: u32,

    #[serde(default)]
    pub contract: OutputContract,
}

impl SectionConfig {
    pub fn to_spec(&self, chars_per_token: usize) -> SectionSpec {
        let block_tag = self
            .block_tag
            .clone()
            .unwrap_or_else(|| format!("DRAFT_{}", self.id.to_uppercase()));
        SectionSpec::from_token_budget(
            self.id.as_str(),
            block_tag,
            self.primary_model.clone(),
            self.fallback_model.as_deref(),
            self.min_tokens,
            self.max_tokens,
            chars_per_token,
            self.contract,
        )
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct StorageSettings {
    #[serde(default = "default_true")]
    pub enabled: bool,

    /// Defaults to `<XDG data dir>/blogforge/store`
    #[serde(default)]
    pub path: Option<PathBuf>,

    /// Longest a run waits for queued writes before returning
    #[serde(default = "default_flush_timeout_ms")]
    pub flush_timeout_ms: u64,
}

fn default_true() -> bool {
    true
}

fn default_flush_timeout_ms() -> u64 {
    2_000
}

impl Default for StorageSettings {
    fn default() -> Self {
        Self {
            enabled: true,
            path: None,
            flush_timeout_ms: default_flush_timeout_ms(),
        }
    }
}

impl StorageSettings {
    pub fn flush_timeout(&self) -> Duration {
        Duration::from_millis(self.flush_timeout_ms)
    }

    pub fn resolved_path(&self) -> PathBuf {
        if let Some(path) = &self.path {
            return path.clone();
        }
        directories::ProjectDirs::from("", "", "blogforge")
            .map(|dirs| dirs.data_dir().join("store"))
            .unwrap_or_else(|| PathBuf::from(".blogforge/store"))
    }
}

/// Configuration validation errors
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ValidationError {
    Provider(String),
    Retry(String),
    Budget(String),
    Compiler(String),
    Section(String, String),
    Storage(String),
}

impl std::fmt::Display for ValidationError {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            ValidationError::Provider(msg) => write!(f, "Provider: {}", msg),
            ValidationError::Retry(msg) => write!(f, "Retry: {}", msg),
            ValidationError::Budget(msg) => write!(f, "Budget: {}", msg),
            ValidationError::Compiler(msg) => write!(f, "Compiler: {}", msg),
            ValidationError::Section(id, msg) => write!(f, "Section '{}': {}", id, msg),
            ValidationError::Storage(msg) => write!(f, "Storage: {}", msg),
        }
    }
}

impl std::error::Error for ValidationError {}

impl BlogforgeConfig {
    /// Validate the entire configuration
    pub fn validate(&self) -> Result<(), Vec<ValidationError>> {
        let mut errors = Vec::new();

        if self.provider.base_url.trim().is_empty() {
            errors.push(ValidationError::Provider("base_url cannot be empty".to_string()));
        }
        if self.provider.api_key_env.trim().is_empty() {
            errors.push(ValidationError::Provider("api_key_env cannot be empty".to_string()));
        }

        if self.retry.primary_attempts == 0 {
            errors.push(ValidationError::Retry("primary_attempts must be at least 1".to_string()));
        }
        if self.retry.repair_attempts == 0 {
            errors.push(ValidationError::Retry("repair_attempts must be at least 1".to_string()));
        }

        if self.budget.chars_per_token == 0 {
            errors.push(ValidationError::Budget("chars_per_token must be positive".to_string()));
        }

        if self.compiler.model.trim().is_empty() {
            errors.push(ValidationError::Compiler("model cannot be empty".to_string()));
        }
        if self.compiler.max_tokens == 0 {
            errors.push(ValidationError::Compiler("max_tokens must be positive".to_string()));
        }
        if self.compiler.min_tokens > self.compiler.max_tokens {
            errors.push(ValidationError::Compiler(format!(
                "min_tokens ({}) exceeds max_tokens ({})",
                self.compiler.min_tokens, self.compiler.max_tokens
            )));
        }

        let mut seen = HashSet::new();
        for section in &self.sections {
            if section.id.trim().is_empty() {
                errors.push(ValidationError::Section(
                    section.id.clone(),
                    "id cannot be empty".to_string(),
                ));
            }
            if !seen.insert(section.id.as_str()) {
                errors.push(ValidationError::Section(
                    section.id.clone(),
                    "duplicate section id".to_string(),
                ));
            }
            if section.primary_model.trim().is_empty() {
                errors.push(ValidationError::Section(
                    section.id.clone(),
                    "primary_model cannot be empty".to_string(),
                ));
            }
            if section.max_tokens == 0 {
                errors.push(ValidationError::Section(
                    section.id.clone(),
                    "max_tokens must be positive".to_string(),
                ));
            }
            if section.min_tokens > section.max_tokens {
                errors.push(ValidationError::Section(
                    section.id.clone(),
                    format!(
                        "min_tokens ({}) exceeds max_tokens ({})",
                        section.min_tokens, section.max_tokens
                    ),
                ));
            }
        }

        if let Some(path) = &self.storage.path {
            if path.as_os_str().is_empty() {
                errors.push(ValidationError::Storage("path cannot be empty".to_string()));
            }
        }

        if errors.is_empty() {
            Ok(())
        } else {
            Err(errors)
        }
    }

    /// Effective section catalog
    pub fn catalog(&self) -> SectionCatalog {
        if self.sections.is_empty() {
            return SectionCatalog::builtin(self.budget.chars_per_token);
        }
        SectionCatalog::new(
            self.sections
                .iter()
                .map(|section| section.to_spec(self.budget.chars_per_token))
                .collect(),
        )
    }

    pub fn compiler_settings(&self) -> CompilerSettings {
        CompilerSettings::from_token_budget(
            self.compiler.model.clone(),
            self.compiler.min_tokens,
            self.compiler.max_tokens,
            self.budget.chars_per_token,
        )
    }
}

/// Loads [`BlogforgeConfig`] from its layered sources.
pub struct ConfigLoader;

impl ConfigLoader {
    const ENV_PREFIX: &'static str = "BLOGFORGE";

    fn environment() -> Environment {
        Environment::with_prefix(Self::ENV_PREFIX)
            .separator("__")
            .try_parsing(true)
    }

    /// Load configuration for a workspace.
    ///
    /// Precedence (lowest to highest): defaults, global file, `config/config.toml`,
    /// `config/{BLOGFORGE_ENV}.toml`, environment.
    pub fn load(workspace_root: &Path) -> Result<BlogforgeConfig, ConfigError> {
        let builder = merge::merge_policy::builder_with_defaults()?;
        let builder = sources::global_file::add_to_builder(builder)?;
        let builder = sources::workspace_file::add_to_builder(builder, workspace_root)?;
        builder
            .add_source(Self::environment())
            .build()?
            .try_deserialize()
    }

    /// Load a single explicit file on top of the defaults (environment still applies).
    pub fn load_from_file(path: &Path) -> Result<BlogforgeConfig, ConfigError> {
        if !path.exists() {
            return Err(ConfigError::NotFound(path.display().to_string()));
        }
        merge::merge_policy::builder_with_defaults()?
            .add_source(File::from(path).required(true))
            .add_source(Self::environment())
            .build()?
            .try_deserialize()
    }

    /// Defaults only.
    pub fn defaults() -> Result<BlogforgeConfig, ConfigError> {
        Config::builder().build()?.try_deserialize()
    }
}
