//! Shared fakes for integration tests.

use async_trait::async_trait;
use blogforge::compiler::CompilerSettings;
use blogforge::provider::RetryPolicy;
use blogforge::section::SectionCatalog;
use blogforge::{GenerationClient, GenerationError, GenerationRequest, Pipeline, SectionId};
use parking_lot::Mutex;
use std::collections::HashMap;
use std::sync::Arc;

/// One observed generation call.
#[derive(Debug, Clone)]
pub struct Call {
    pub label: String,
    pub model: String,
    pub prompt: String,
}

type Script = dyn Fn(&GenerationRequest, usize) -> Result<String, GenerationError> + Send + Sync;

/// Generation client driven by a closure of `(request, nth call for this label)`.
pub struct ScriptedClient {
    script: Box<Script>,
    calls: Mutex<Vec<Call>>,
    per_label: Mutex<HashMap<String, usize>>,
}

impl ScriptedClient {
    pub fn new<F>(script: F) -> Arc<Self>
    where
        F: Fn(&GenerationRequest, usize) -> Result<String, GenerationError> + Send + Sync + 'static,
    {
        Arc::new(Self {
            script: Box::new(script),
            calls: Mutex::new(Vec::new()),
            per_label: Mutex::new(HashMap::new()),
        })
    }

    /// Every section answers with a valid envelope; the compiler answers `compiled`.
    pub fn well_behaved(compiled: String) -> Arc<Self> {
        Self::new(move |request, _| {
            if request.label.starts_with("compiler/") {
                return Ok(compiled.clone());
            }
            let section = section_of(request);
            Ok(envelope(&section, &format!("Helpful {} content.", section)))
        })
    }

    pub fn calls(&self) -> Vec<Call> {
        self.calls.lock().clone()
    }

    pub fn calls_for(&self, label: &str) -> Vec<Call> {
        self.calls()
            .into_iter()
            .filter(|call| call.label == label)
            .collect()
    }
}

#[async_trait]
impl GenerationClient for ScriptedClient {
    async fn generate(&self, request: &GenerationRequest) -> Result<String, GenerationError> {
        let nth = {
            let mut per_label = self.per_label.lock();
            let count = per_label.entry(request.label.clone()).or_insert(0);
            *count += 1;
            *count
        };
        self.calls.lock().push(Call {
            label: request.label.clone(),
            model: request.model.clone(),
            prompt: request.prompt.clone(),
        });
        (self.script)(request, nth)
    }

    fn provider_name(&self) -> &str {
        "scripted"
    }
}

/// Section id from a `{section}/{step}` label.
pub fn section_of(request: &GenerationRequest) -> String {
    request
        .label
        .split('/')
        .next()
        .unwrap_or_default()
        .to_string()
}

pub fn envelope(section: &str, content: &str) -> String {
    serde_json::json!({
        "section_id": section,
        "status": "ok",
        "content_md": content,
        "warnings": [],
    })
    .to_string()
}

/// Prompts for every built-in section.
pub fn all_prompts() -> HashMap<SectionId, String> {
    SectionCatalog::builtin(5)
        .ids()
        .into_iter()
        .map(|id| {
            let prompt = format!("Write the {} section.", id);
            (id, prompt)
        })
        .collect()
}

/// Compiler window of [100, 1000] characters.
pub fn compiler_settings() -> CompilerSettings {
    CompilerSettings::from_token_budget("compiler-model", 20, 200, 5)
}

/// Built-in catalog, retries without sleeping.
pub fn pipeline(client: Arc<ScriptedClient>) -> Pipeline {
    Pipeline::new(client, SectionCatalog::builtin(5), compiler_settings())
        .with_retry(RetryPolicy::immediate(4), RetryPolicy::immediate(3))
}

pub fn business_vars() -> HashMap<String, String> {
    let mut vars = HashMap::new();
    vars.insert("COMPANY_NAME".to_string(), "Acme Plumbing".to_string());
    vars.insert("CALL_NUMBER".to_string(), "555-0100".to_string());
    vars
}

/// A markdown article of roughly `chars` characters.
pub fn article(chars: usize) -> String {
    let mut text = String::from("# Fixing a Leaking Tap\n\n");
    while text.chars().count() < chars {
        text.push_str("Turn off the water supply before you start any repair. ");
    }
    text.trim_end().to_string()
}
