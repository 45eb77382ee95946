//! Model backend registry: static specs for the supported backends.
//!
//! Each `BackendSpec` describes how to reach one OpenAI-compatible endpoint:
//! keywords for model matching, the conventional API-key variable, the
//! default base URL, and per-model quirks.

use mcpilot_core::config::{ModelConfig, ModelsConfig};

// ─────────────────────────────────────────────
// BackendSpec: static metadata for one backend
// ─────────────────────────────────────────────

/// Static specification describing one model backend.
#[derive(Clone, Debug)]
pub struct BackendSpec {
    /// Internal name, also the key under `models` in the config.
    pub name: &'static str,
    /// Keywords to match in model names (lowercase).
    pub keywords: &'static [&'static str],
    /// Conventional environment variable for the API key.
    pub env_key: &'static str,
    /// Human-readable name for logs.
    pub display_name: &'static str,
    /// Routing prefixes users may write (`groq/llama-3.3-70b`); stripped
    /// before the request since the endpoint already implies the backend.
    pub strip_prefixes: &'static [&'static str],
    /// Gateways serve many vendors and are only used as a fallback.
    pub is_gateway: bool,
    /// Local backends need no API key.
    pub is_local: bool,
    /// If the API key starts with this prefix, the key belongs here.
    pub detect_by_key_prefix: Option<&'static str>,
    /// Base URL used when the config sets none.
    pub default_api_base: &'static str,
    /// Per-model parameter overrides.
    pub model_overrides: &'static [ModelOverride],
}

/// A per-model parameter override.
#[derive(Clone, Debug)]
pub struct ModelOverride {
    /// Substring to match in the lowercase model name.
    pub pattern: &'static str,
    pub field: OverrideField,
    pub value: f64,
}

/// Fields that can be overridden per model.
#[derive(Clone, Debug)]
pub enum OverrideField {
    Temperature,
}

// ─────────────────────────────────────────────
// Supported backends (matching priority order)
// ─────────────────────────────────────────────

pub static MODEL_BACKENDS: &[BackendSpec] = &[
    // Gemini through its OpenAI-compatible surface
    BackendSpec {
        name: "gemini",
        keywords: &["gemini"],
        env_key: "GEMINI_API_KEY",
        display_name: "Gemini",
        strip_prefixes: &["gemini/"],
        is_gateway: false,
        is_local: false,
        detect_by_key_prefix: None,
        default_api_base: "https://generativelanguage.googleapis.com/v1beta/openai",
        model_overrides: &[],
    },
    // OpenAI: gpt-5 family accepts only the default temperature
    BackendSpec {
        name: "openai",
        keywords: &["openai", "gpt"],
        env_key: "OPENAI_API_KEY",
        display_name: "OpenAI",
        strip_prefixes: &["openai/"],
        is_gateway: false,
        is_local: false,
        detect_by_key_prefix: None,
        default_api_base: "https://api.openai.com/v1",
        model_overrides: &[ModelOverride {
            pattern: "gpt-5",
            field: OverrideField::Temperature,
            value: 1.0,
        }],
    },
    BackendSpec {
        name: "deepseek",
        keywords: &["deepseek"],
        env_key: "DEEPSEEK_API_KEY",
        display_name: "DeepSeek",
        strip_prefixes: &["deepseek/"],
        is_gateway: false,
        is_local: false,
        detect_by_key_prefix: None,
        default_api_base: "https://api.deepseek.com/v1",
        model_overrides: &[],
    },
    BackendSpec {
        name: "groq",
        keywords: &["groq"],
        env_key: "GROQ_API_KEY",
        display_name: "Groq",
        strip_prefixes: &["groq/"],
        is_gateway: false,
        is_local: false,
        detect_by_key_prefix: Some("gsk_"),
        default_api_base: "https://api.groq.com/openai/v1",
        model_overrides: &[],
    },
    // Ollama: local, no key
    BackendSpec {
        name: "ollama",
        keywords: &["ollama"],
        env_key: "OLLAMA_API_KEY",
        display_name: "Ollama",
        strip_prefixes: &["ollama/"],
        is_gateway: false,
        is_local: true,
        detect_by_key_prefix: None,
        default_api_base: "http://localhost:11434/v1",
        model_overrides: &[],
    },
    // OpenRouter: gateway, keeps `vendor/model` names as written
    BackendSpec {
        name: "openrouter",
        keywords: &["openrouter"],
        env_key: "OPENROUTER_API_KEY",
        display_name: "OpenRouter",
        strip_prefixes: &["openrouter/"],
        is_gateway: true,
        is_local: false,
        detect_by_key_prefix: Some("sk-or-"),
        default_api_base: "https://openrouter.ai/api/v1",
        model_overrides: &[],
    },
];

// ─────────────────────────────────────────────
// Matching functions
// ─────────────────────────────────────────────

/// Find a backend by keyword match on the model name. Gateways are skipped.
pub fn find_by_model(model: &str) -> Option<&'static BackendSpec> {
    let model_lower = model.to_lowercase();
    MODEL_BACKENDS.iter().find(|spec| {
        !spec.is_gateway && spec.keywords.iter().any(|kw| model_lower.contains(kw))
    })
}

/// Find a backend spec by exact name.
pub fn find_by_name(name: &str) -> Option<&'static BackendSpec> {
    MODEL_BACKENDS.iter().find(|spec| spec.name == name)
}

/// Find the backend an API key belongs to, by its prefix.
pub fn find_by_key_prefix(api_key: &str) -> Option<&'static BackendSpec> {
    MODEL_BACKENDS.iter().find(|s| {
        s.detect_by_key_prefix
            .is_some_and(|pfx| api_key.starts_with(pfx))
    })
}

/// Strip a routing prefix the endpoint already implies.
pub fn resolve_model_name(model: &str, spec: &BackendSpec) -> String {
    spec.strip_prefixes
        .iter()
        .find_map(|p| model.strip_prefix(p))
        .unwrap_or(model)
        .to_string()
}

/// Apply per-model overrides to the sampling temperature.
pub fn apply_model_overrides(model: &str, spec: &BackendSpec, temperature: f64) -> f64 {
    let model_lower = model.to_lowercase();
    let mut temp = temperature;

    for ovr in spec.model_overrides {
        if model_lower.contains(ovr.pattern) {
            match ovr.field {
                OverrideField::Temperature => temp = ovr.value,
            }
        }
    }

    temp
}

/// Effective config for a backend: the configured key, or the backend's
/// conventional env var when the config leaves it empty.
pub fn effective_config(spec: &BackendSpec, models: &ModelsConfig) -> ModelConfig {
    let mut config = models.get_by_name(spec.name).cloned().unwrap_or_default();
    if config.api_key.is_empty() {
        if let Ok(key) = std::env::var(spec.env_key) {
            config.api_key = key;
        }
    }
    config
}

/// Whether a backend can be used with this config.
fn usable(spec: &BackendSpec, config: &ModelConfig) -> bool {
    spec.is_local || config.is_configured()
}

/// Match a model name to a usable backend.
///
/// 1. Keyword match, if that backend has a key (or is local).
/// 2. The first gateway that has a key.
pub fn match_backend(
    model: &str,
    models: &ModelsConfig,
) -> Option<(ModelConfig, &'static BackendSpec)> {
    if let Some(spec) = find_by_model(model) {
        let config = effective_config(spec, models);
        if usable(spec, &config) {
            return Some((config, spec));
        }
    }

    MODEL_BACKENDS
        .iter()
        .filter(|s| s.is_gateway)
        .find_map(|spec| {
            let config = effective_config(spec, models);
            usable(spec, &config).then_some((config, spec))
        })
}

// ─────────────────────────────────────────────
// Tests
// ─────────────────────────────────────────────
