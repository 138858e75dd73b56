//! Generation Provider Abstraction
//!
//! The pipeline only ever talks to a [`GenerationClient`]: one prompt in, raw text out, or a
//! classified [`GenerationError`]. Validation of the returned text is a separate concern.
//! The HTTP backend speaks the OpenAI-compatible chat completions protocol (Together, OpenAI,
//! vLLM and most local servers expose it).

use crate::config::ProviderSettings;
use crate::error::GenerationError;
use async_trait::async_trait;
use reqwest::Client;
use serde::{Deserialize, Serialize};
use std::time::Duration;

pub mod retry;
pub mod selector;

pub use retry::RetryPolicy;
pub use selector::{ModelChoice, ModelSelector};

/// One generation call.
#[derive(Debug, Clone, PartialEq)]
pub struct GenerationRequest {
    /// Short label used in logs and by test doubles (e.g. `faqs/draft`, `compiler/repair`).
    pub label: String,
    /// Optional system directive sent ahead of the prompt.
    pub system: Option<String>,
    pub prompt: String,
    /// Sampling temperature in `[0, 1]`.
    pub temperature: f32,
    pub model: String,
    /// Positive ceiling on generated length.
    pub max_tokens: u32,
}

impl GenerationRequest {
    pub fn new(
        label: impl Into<String>,
        prompt: impl Into<String>,
        temperature: f32,
        model: impl Into<String>,
        max_tokens: u32,
    ) -> Self {
        Self {
            label: label.into(),
            system: None,
            prompt: prompt.into(),
            temperature,
            model: model.into(),
            max_tokens,
        }
    }

    pub fn with_system(mut self, system: impl Into<String>) -> Self {
        self.system = Some(system.into());
        self
    }

    /// Check the call contract before anything goes on the wire.
    pub fn check(&self) -> Result<(), GenerationError> {
        if self.prompt.trim().is_empty() {
            return Err(GenerationError::Permanent("prompt must not be empty".to_string()));
        }
        if !(0.0..=1.0).contains(&self.temperature) {
            return Err(GenerationError::Permanent(format!(
                "temperature {} outside [0, 1]",
                self.temperature
            )));
        }
        if self.max_tokens == 0 {
            return Err(GenerationError::Permanent(
                "max_tokens must be positive".to_string(),
            ));
        }
        if self.model.trim().is_empty() {
            return Err(GenerationError::Permanent("model must not be empty".to_string()));
        }
        Ok(())
    }
}

/// Text generation capability.
#[async_trait]
pub trait GenerationClient: Send + Sync {
    async fn generate(&self, request: &GenerationRequest) -> Result<String, GenerationError>;

    /// Backend name for logs.
    fn provider_name(&self) -> &str;
}

#[derive(Serialize)]
struct ChatCompletionRequest<'a> {
    model: &'a str,
    messages: Vec<ChatMessage<'a>>,
    temperature: f32,
    max_tokens: u32,
    stream: bool,
}

#[derive(Serialize)]
struct ChatMessage<'a> {
    role: &'static str,
    content: &'a str,
}

#[derive(Deserialize)]
struct ChatCompletionResponse {
    choices: Vec<Choice>,
}

#[derive(Deserialize)]
struct Choice {
    message: ResponseMessage,
}

#[derive(Deserialize)]
struct ResponseMessage {
    #[serde(default)]
    content: Option<String>,
}

fn map_http_error(error: reqwest::Error) -> GenerationError {
    if let Some(status) = error.status() {
        GenerationError::from_status(status.as_u16(), &error.to_string())
    } else if error.is_timeout() {
        GenerationError::Transient(format!("Request timeout: {}", error))
    } else if error.is_connect() {
        GenerationError::Transient(format!("Connection error: {}", error))
    } else if error.is_builder() {
        GenerationError::Permanent(format!("Malformed request: {}", error))
    } else {
        GenerationError::classify_message(format!("HTTP error: {}", error))
    }
}

/// OpenAI-compatible chat completions backend.
pub struct HttpGenerationClient {
    client: Client,
    base_url: String,
    api_key: String,
}

impl HttpGenerationClient {
    pub fn new(
        base_url: impl Into<String>,
        api_key: impl Into<String>,
        connect_timeout: Duration,
        request_timeout: Duration,
    ) -> Result<Self, GenerationError> {
        let client = Client::builder()
            .connect_timeout(connect_timeout)
            .timeout(request_timeout)
            .build()
            .map_err(|e| GenerationError::Permanent(format!("Failed to create HTTP client: {}", e)))?;
        Ok(Self {
            client,
            base_url: base_url.into().trim_end_matches('/').to_string(),
            api_key: api_key.into(),
        })
    }

    /// Build a client from provider settings, reading the API key from the configured env var.
    pub fn from_settings(settings: &ProviderSettings) -> Result<Self, GenerationError> {
        let api_key = std::env::var(&settings.api_key_env).map_err(|_| {
            GenerationError::Permanent(format!("{} is not set in environment", settings.api_key_env))
        })?;
        if api_key.trim().is_empty() {
            return Err(GenerationError::Permanent(format!(
                "{} is empty",
                settings.api_key_env
            )));
        }
        Self::new(
            settings.base_url.clone(),
            api_key,
            Duration::from_secs(settings.connect_timeout_secs),
            Duration::from_secs(settings.request_timeout_secs),
        )
    }
}

#[async_trait]
impl GenerationClient for HttpGenerationClient {
    async fn generate(&self, request: &GenerationRequest) -> Result<String, GenerationError> {
        request.check()?;

        let mut messages = Vec::with_capacity(2);
        if let Some(system) = request.system.as_deref() {
            messages.push(ChatMessage {
                role: "system",
                content: system,
            });
        }
        messages.push(ChatMessage {
            role: "user",
            content: &request.prompt,
        });

        let body = ChatCompletionRequest {
            model: &request.model,
            messages,
            temperature: request.temperature,
            max_tokens: request.max_tokens,
            stream: false,
        };

        let url = format!("{}/chat/completions", self.base_url);
        let response = self
            .client
            .post(&url)
            .header("Authorization", format!("Bearer {}", self.api_key))
            .header("Content-Type", "application/json")
            .json(&body)
            .send()
            .await
            .map_err(map_http_error)?;

        if !response.status().is_success() {
            let status = response.status();
            let error_text = response
                .text()
                .await
                .unwrap_or_else(|_| "Unknown error".to_string());
            return Err(GenerationError::from_status(status.as_u16(), &error_text));
        }

        let completion: ChatCompletionResponse = response.json().await.map_err(|e| {
            GenerationError::Transient(format!("Failed to parse response: {}", e))
        })?;

        let content = completion
            .choices
            .into_iter()
            .next()
            .and_then(|choice| choice.message.content)
            .ok_or_else(|| GenerationError::Transient("No choices in response".to_string()))?;

        Ok(content)
    }

    fn provider_name(&self) -> &str {
        "openai-compatible"
    }
}
