//! Generic HTTP model client for OpenAI-compatible APIs.
//!
//! The agent loop needs plain text completion only, so the request is a
//! single user message and the response is the first choice's content.

use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use tracing::{debug, error};

use mcpilot_core::config::{ModelConfig, ModelsConfig};
use mcpilot_core::{Error, Result};

use crate::registry::{apply_model_overrides, resolve_model_name, BackendSpec};
use crate::traits::{CompletionConfig, LanguageModel};

// ─────────────────────────────────────────────
// Wire types
// ─────────────────────────────────────────────

#[derive(Debug, Serialize)]
struct ChatMessage<'a> {
    role: &'static str,
    content: &'a str,
}

#[derive(Debug, Serialize)]
struct ChatCompletionRequest<'a> {
    model: String,
    messages: Vec<ChatMessage<'a>>,
    max_tokens: u32,
    temperature: f64,
}

#[derive(Debug, Deserialize)]
struct ChatCompletionResponse {
    #[serde(default)]
    choices: Vec<Choice>,
}

#[derive(Debug, Deserialize)]
struct Choice {
    message: ChoiceMessage,
    #[serde(default)]
    finish_reason: Option<String>,
}

#[derive(Debug, Deserialize)]
struct ChoiceMessage {
    #[serde(default)]
    content: Option<String>,
}

// ─────────────────────────────────────────────
// HttpModel
// ─────────────────────────────────────────────

/// A language model reached over an OpenAI-compatible HTTP API.
pub struct HttpModel {
    /// HTTP client (shared, connection-pooled).
    client: reqwest::Client,
    /// API base URL (e.g. `"https://api.openai.com/v1"`).
    api_base: String,
    /// API key for Bearer authentication; empty for local backends.
    api_key: String,
    /// Model identifier as configured.
    model: String,
    spec: &'static BackendSpec,
}

impl std::fmt::Debug for HttpModel {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("HttpModel")
            .field("api_base", &self.api_base)
            .field("model", &self.model)
            .field("backend", &self.spec.display_name)
            .finish()
    }
}

impl HttpModel {
    /// Create a client for `model` on the backend `spec`.
    ///
    /// The base URL comes from the config, else the backend default.
    pub fn new(config: &ModelConfig, spec: &'static BackendSpec, model: &str) -> Result<Self> {
        let api_base = config
            .api_base
            .clone()
            .unwrap_or_else(|| spec.default_api_base.to_string());

        let client = reqwest::Client::builder()
            .timeout(std::time::Duration::from_secs(120))
            .build()
            .map_err(|e| Error::Model(format!("failed to build HTTP client: {e}")))?;

        Ok(HttpModel {
            client,
            api_base,
            api_key: config.api_key.clone(),
            model: model.to_string(),
            spec,
        })
    }

    /// Build the full chat completions URL.
    fn completions_url(&self) -> String {
        let base = self.api_base.trim_end_matches('/');
        format!("{}/chat/completions", base)
    }
}

#[async_trait]
impl LanguageModel for HttpModel {
    async fn complete(&self, prompt: &str, config: &CompletionConfig) -> Result<String> {
        let resolved_model = resolve_model_name(&self.model, self.spec);
        let temperature = apply_model_overrides(&self.model, self.spec, config.temperature);

        debug!(
            backend = self.spec.display_name,
            model = %resolved_model,
            prompt_chars = prompt.len(),
            "Calling model"
        );

        let body = ChatCompletionRequest {
            model: resolved_model,
            messages: vec![ChatMessage {
                role: "user",
                content: prompt,
            }],
            max_tokens: config.max_tokens,
            temperature,
        };

        let mut request = self.client.post(self.completions_url()).json(&body);
        if !self.api_key.is_empty() {
            request = request.bearer_auth(&self.api_key);
        }

        let response = request.send().await.map_err(|e| {
            error!(backend = self.spec.display_name, error = %e, "HTTP request failed");
            Error::Model(format!("request to {} failed: {e}", self.spec.display_name))
        })?;

        let status = response.status();
        if !status.is_success() {
            let error_text = response
                .text()
                .await
                .unwrap_or_else(|_| "Failed to read error body".to_string());
            error!(
                backend = self.spec.display_name,
                status = %status,
                body = %error_text,
                "API error"
            );
            return Err(Error::Model(format!(
                "{} returned {}: {}",
                self.spec.display_name, status, error_text
            )));
        }

        let parsed: ChatCompletionResponse = response.json().await.map_err(|e| {
            error!(backend = self.spec.display_name, error = %e, "Failed to parse model response");
            Error::Model(format!("unreadable response from {}: {e}", self.spec.display_name))
        })?;

        let choice = parsed
            .choices
            .into_iter()
            .next()
            .ok_or_else(|| Error::Model(format!("{} returned no choices", self.spec.display_name)))?;

        debug!(
            backend = self.spec.display_name,
            finish_reason = choice.finish_reason.as_deref().unwrap_or("?"),
            "Model response received"
        );

        Ok(choice.message.content.unwrap_or_default())
    }

    fn model(&self) -> &str {
        &self.model
    }

    fn display_name(&self) -> &str {
        self.spec.display_name
    }
}

// ─────────────────────────────────────────────
// Builder (convenience)
// ─────────────────────────────────────────────

/// Build an `HttpModel` from a model name and the backend configs.
///
/// Matches the model to a backend, falls back to the backend's conventional
/// key variable, and creates the client.
pub fn create_model(model: &str, models: &ModelsConfig) -> Result<HttpModel> {
    let (config, spec) = crate::registry::match_backend(model, models).ok_or_else(|| {
        Error::Config(format!(
            "no configured backend for model '{model}'. \
             Set an API key (e.g. GEMINI_API_KEY, OPENROUTER_API_KEY) or models.<name>.apiKey"
        ))
    })?;

    debug!(
        backend = spec.display_name,
        model = model,
        api_base = config.api_base.as_deref().unwrap_or(spec.default_api_base),
        "Creating model client"
    );

    HttpModel::new(&config, spec, model)
}

// ─────────────────────────────────────────────
// Tests
// ─────────────────────────────────────────────
