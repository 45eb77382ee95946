//! Language model trait.

use async_trait::async_trait;
use mcpilot_core::config::AgentConfig;
use mcpilot_core::Result;

/// Sampling parameters for one completion.
#[derive(Clone, Debug)]
pub struct CompletionConfig {
    /// Maximum tokens to generate.
    pub max_tokens: u32,
    /// Sampling temperature (0.0 – 2.0).
    pub temperature: f64,
}

impl Default for CompletionConfig {
    fn default() -> Self {
        Self {
            max_tokens: 1024,
            temperature: 0.2,
        }
    }
}

impl From<&AgentConfig> for CompletionConfig {
    fn from(agent: &AgentConfig) -> Self {
        Self {
            max_tokens: agent.max_tokens,
            temperature: agent.temperature,
        }
    }
}

/// A model that turns one prompt into one block of text.
///
/// Implementations do not enforce the per-call timeout; the agent loop
/// wraps every call in its own bound and abandons the future on expiry.
#[async_trait]
pub trait LanguageModel: Send + Sync {
    /// Complete `prompt`. Transport and API failures are `Error::Model`.
    async fn complete(&self, prompt: &str, config: &CompletionConfig) -> Result<String>;

    /// Model identifier as configured.
    fn model(&self) -> &str;

    /// Display name for logging.
    fn display_name(&self) -> &str;
}
