//! Configuration schema.
//!
//! Hierarchy: `Config` → `AgentConfig`, `ModelsConfig`, `[ServerConfig]`.
//!
//! JSON on disk uses **camelCase** keys; Rust uses snake_case.
//! We use `#[serde(rename_all = "camelCase")]` to handle the conversion.

use serde::{Deserialize, Serialize};
use std::collections::{BTreeMap, HashMap, HashSet};
use std::time::Duration;

use crate::error::{Error, Result};
use crate::utils::{expand_env_vars, expand_home};

// ─────────────────────────────────────────────
// Root Config
// ─────────────────────────────────────────────

/// Root configuration: loaded from `~/.mcpilot/config.json` + env vars.
#[derive(Clone, Debug, Default, Serialize, Deserialize)]
#[serde(rename_all = "camelCase", default)]
pub struct Config {
    pub agent: AgentConfig,
    pub models: ModelsConfig,
    /// Tool-provider processes, in registration order.
    pub servers: Vec<ServerConfig>,
}

impl Config {
    /// Reject configurations the loop cannot run with.
    pub fn validate(&self) -> Result<()> {
        if self.agent.max_iterations == 0 {
            return Err(Error::Config("agent.maxIterations must be at least 1".into()));
        }
        if self.agent.model_timeout_secs == 0 {
            return Err(Error::Config("agent.modelTimeoutSecs must be at least 1".into()));
        }

        let mut seen = HashSet::new();
        for server in &self.servers {
            if server.id.trim().is_empty() {
                return Err(Error::Config("every server needs a non-empty id".into()));
            }
            if !seen.insert(server.id.as_str()) {
                return Err(Error::Config(format!("duplicate server id '{}'", server.id)));
            }
            if server.command.trim().is_empty() {
                return Err(Error::Config(format!("server '{}' has an empty command", server.id)));
            }
            if server.startup_timeout_secs == 0 {
                return Err(Error::Config(format!(
                    "server '{}': startupTimeoutSecs must be at least 1",
                    server.id
                )));
            }
            if server.call_timeout_secs == Some(0) {
                return Err(Error::Config(format!(
                    "server '{}': callTimeoutSecs must be at least 1 (or null for no bound)",
                    server.id
                )));
            }
        }
        Ok(())
    }

    /// Servers that should be launched, in order.
    pub fn enabled_servers(&self) -> impl Iterator<Item = &ServerConfig> {
        self.servers.iter().filter(|s| s.enabled)
    }
}

// ─────────────────────────────────────────────
// Agent
// ─────────────────────────────────────────────

/// Iteration controller settings.
#[derive(Clone, Debug, Serialize, Deserialize)]
#[serde(rename_all = "camelCase", default)]
pub struct AgentConfig {
    /// Model identifier (matched against the backend table).
    pub model: String,
    /// Maximum model calls per run.
    pub max_iterations: usize,
    /// Protocol failures (malformed output, model timeout) tolerated per run.
    pub retry_limit: u32,
    /// Bound on a single model call, in seconds.
    pub model_timeout_secs: u64,
    /// Maximum tokens to generate per response.
    pub max_tokens: u32,
    /// Sampling temperature (0.0 – 2.0).
    pub temperature: f64,
    /// Replaces the default preamble of the system prompt.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub instructions: Option<String>,
}

impl Default for AgentConfig {
    fn default() -> Self {
        Self {
            model: "gemini-2.0-flash".to_string(),
            max_iterations: 10,
            retry_limit: 2,
            model_timeout_secs: 10,
            max_tokens: 1024,
            temperature: 0.2,
            instructions: None,
        }
    }
}

impl AgentConfig {
    pub fn model_timeout(&self) -> Duration {
        Duration::from_secs(self.model_timeout_secs)
    }
}

// ─────────────────────────────────────────────
// Model backends
// ─────────────────────────────────────────────

/// Credentials and endpoint for one model backend.
#[derive(Clone, Debug, Default, Serialize, Deserialize)]
#[serde(rename_all = "camelCase", default)]
pub struct ModelConfig {
    /// API key for bearer authentication.
    #[serde(default)]
    pub api_key: String,
    /// Custom API base URL (overrides the backend default).
    #[serde(skip_serializing_if = "Option::is_none")]
    pub api_base: Option<String>,
}

impl ModelConfig {
    /// Whether this backend has a configured API key.
    pub fn is_configured(&self) -> bool {
        !self.api_key.is_empty()
    }
}

/// All model backend configurations.
#[derive(Clone, Debug, Default, Serialize, Deserialize)]
#[serde(rename_all = "camelCase", default)]
pub struct ModelsConfig {
    #[serde(default)]
    pub gemini: ModelConfig,
    #[serde(default)]
    pub openai: ModelConfig,
    #[serde(default)]
    pub openrouter: ModelConfig,
    #[serde(default)]
    pub deepseek: ModelConfig,
    #[serde(default)]
    pub groq: ModelConfig,
    #[serde(default)]
    pub ollama: ModelConfig,
}

impl ModelsConfig {
    /// Get a backend config by name (e.g. `"gemini"`).
    pub fn get_by_name(&self, name: &str) -> Option<&ModelConfig> {
        match name {
            "gemini" => Some(&self.gemini),
            "openai" => Some(&self.openai),
            "openrouter" => Some(&self.openrouter),
            "deepseek" => Some(&self.deepseek),
            "groq" => Some(&self.groq),
            "ollama" => Some(&self.ollama),
            _ => None,
        }
    }

    /// Mutable access by name, used by env overrides.
    pub fn get_by_name_mut(&mut self, name: &str) -> Option<&mut ModelConfig> {
        match name {
            "gemini" => Some(&mut self.gemini),
            "openai" => Some(&mut self.openai),
            "openrouter" => Some(&mut self.openrouter),
            "deepseek" => Some(&mut self.deepseek),
            "groq" => Some(&mut self.groq),
            "ollama" => Some(&mut self.ollama),
            _ => None,
        }
    }

    /// Convert to a map keyed by backend name.
    pub fn to_map(&self) -> HashMap<String, ModelConfig> {
        ["gemini", "openai", "openrouter", "deepseek", "groq", "ollama"]
            .iter()
            .filter_map(|name| self.get_by_name(name).map(|c| (name.to_string(), c.clone())))
            .collect()
    }
}

// ─────────────────────────────────────────────
// Tool provider servers
// ─────────────────────────────────────────────

/// Launch configuration for one tool-provider process.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase", default)]
pub struct ServerConfig {
    /// Provider id, unique within the config.
    pub id: String,
    /// Executable to launch.
    pub command: String,
    /// Arguments; `${VAR}` references are expanded at launch.
    pub args: Vec<String>,
    /// Extra environment; values support `${VAR}` too.
    pub env: BTreeMap<String, String>,
    pub enabled: bool,
    /// Bound on process start + handshake + tool discovery.
    pub startup_timeout_secs: u64,
    /// Bound on one tool call; `null` waits for the transport.
    pub call_timeout_secs: Option<u64>,
}

impl Default for ServerConfig {
    fn default() -> Self {
        Self {
            id: String::new(),
            command: String::new(),
            args: Vec::new(),
            env: BTreeMap::new(),
            enabled: true,
            startup_timeout_secs: 20,
            call_timeout_secs: Some(60),
        }
    }
}

impl ServerConfig {
    /// Convenience constructor used by tests and `onboard`.
    pub fn new(id: impl Into<String>, command: impl Into<String>, args: &[&str]) -> Self {
        Self {
            id: id.into(),
            command: command.into(),
            args: args.iter().map(|a| a.to_string()).collect(),
            ..Default::default()
        }
    }

    pub fn startup_timeout(&self) -> Duration {
        Duration::from_secs(self.startup_timeout_secs)
    }

    pub fn call_timeout(&self) -> Option<Duration> {
        self.call_timeout_secs.map(Duration::from_secs)
    }

    /// Copy with `${VAR}` references in `command`, `args` and `env` expanded,
    /// and a leading `~` in `command` resolved to the home directory.
    pub fn resolved(&self) -> Result<ServerConfig> {
        let expand = |value: &str| {
            expand_env_vars(value).map_err(|var| {
                Error::Config(format!(
                    "server '{}' references unset environment variable '{var}'",
                    self.id
                ))
            })
        };

        let args = self
            .args
            .iter()
            .map(|a| expand(a))
            .collect::<Result<Vec<_>>>()?;
        let env = self
            .env
            .iter()
            .map(|(k, v)| Ok((k.clone(), expand(v)?)))
            .collect::<Result<BTreeMap<_, _>>>()?;

        let command = expand_home(&expand(&self.command)?)
            .to_string_lossy()
            .into_owned();

        Ok(ServerConfig {
            command,
            args,
            env,
            ..self.clone()
        })
    }
}

// ─────────────────────────────────────────────
// Tests
// ─────────────────────────────────────────────
