//! Request files for `blogforge run`.

use crate::error::PipelineError;
use crate::pipeline::PipelineRequest;
use crate::types::SectionId;
use serde::Deserialize;
use std::collections::{BTreeMap, HashMap};
use std::path::Path;

fn default_temperature() -> f32 {
    0.7
}

/// On-disk request; `[prompts]` maps section ids to prompt templates.
#[derive(Debug, Clone, Deserialize)]
pub struct RequestFile {
    #[serde(default)]
    pub user_message: String,

    #[serde(default)]
    pub requirements: String,

    #[serde(default = "default_temperature")]
    pub temperature: f32,

    #[serde(default)]
    pub variables: BTreeMap<String, String>,

    #[serde(default)]
    pub prompts: HashMap<String, String>,
}

impl RequestFile {
    pub fn load(path: &Path) -> Result<Self, PipelineError> {
        let raw = std::fs::read_to_string(path).map_err(|e| {
            PipelineError::InvalidInput(format!(
                "Failed to read request file {}: {}",
                path.display(),
                e
            ))
        })?;
        Self::parse(&raw)
    }

    pub fn parse(raw: &str) -> Result<Self, PipelineError> {
        toml::from_str(raw)
            .map_err(|e| PipelineError::InvalidInput(format!("Invalid request file: {}", e)))
    }

    /// Apply command-line overrides and convert.
    pub fn into_request(
        self,
        message: Option<String>,
        vars: &[(String, String)],
        temperature: Option<f32>,
    ) -> PipelineRequest {
        let mut business_vars = self.variables;
        for (key, value) in vars {
            business_vars.insert(key.clone(), value.clone());
        }
        PipelineRequest {
            user_message: message.unwrap_or(self.user_message),
            business_vars,
            section_prompts: self
                .prompts
                .into_iter()
                .map(|(id, prompt)| (SectionId::new(id), prompt))
                .collect(),
            requirements: self.requirements,
            temperature: temperature.unwrap_or(self.temperature),
        }
    }
}
