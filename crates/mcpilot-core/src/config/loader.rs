//! Config loader: reads `~/.mcpilot/config.json`, merges env vars, and
//! normalises the legacy map form of `servers`.
//!
//! # Loading precedence
//! 1. Defaults (from `Config::default()`)
//! 2. JSON file at `~/.mcpilot/config.json`
//! 3. Environment variables `MCPILOT_<SECTION>__<FIELD>` (override JSON)

use std::path::{Path, PathBuf};
use tracing::{debug, info, warn};

use super::schema::Config;

/// Default config file path.
pub fn get_config_path() -> PathBuf {
    crate::utils::get_data_path().join("config.json")
}

/// Load configuration from the default path + env vars.
///
/// Falls back to `Config::default()` if the file doesn't exist or can't be parsed.
pub fn load_config(path: Option<&Path>) -> Config {
    let config_path = path.map(PathBuf::from).unwrap_or_else(get_config_path);

    load_config_from_path(&config_path)
}

/// Load config from a specific file path.
fn load_config_from_path(path: &Path) -> Config {
    if !path.exists() {
        info!("No config file found at {}, using defaults", path.display());
        return apply_env_overrides(Config::default());
    }

    debug!("Loading config from {}", path.display());

    let content = match std::fs::read_to_string(path) {
        Ok(c) => c,
        Err(e) => {
            warn!("Failed to read config file {}: {}", path.display(), e);
            return apply_env_overrides(Config::default());
        }
    };

    // Parse JSON → Value first for migration
    let mut raw: serde_json::Value = match serde_json::from_str(&content) {
        Ok(v) => v,
        Err(e) => {
            warn!("Failed to parse config JSON: {}", e);
            return apply_env_overrides(Config::default());
        }
    };

    migrate_config(&mut raw);

    let config: Config = match serde_json::from_value(raw) {
        Ok(c) => c,
        Err(e) => {
            warn!("Failed to deserialize config: {}", e);
            return apply_env_overrides(Config::default());
        }
    };

    apply_env_overrides(config)
}

/// Save configuration to disk (pretty-printed JSON with camelCase keys).
pub fn save_config(config: &Config, path: Option<&Path>) -> std::io::Result<()> {
    let config_path = path.map(PathBuf::from).unwrap_or_else(get_config_path);

    if let Some(parent) = config_path.parent() {
        std::fs::create_dir_all(parent)?;
    }

    let json = serde_json::to_string_pretty(config).map_err(std::io::Error::other)?;

    std::fs::write(&config_path, json)?;
    debug!("Config saved to {}", config_path.display());
    Ok(())
}

/// Rewrite `servers: {"math": {...}}` into `servers: [{"id": "math", ...}]`.
///
/// Key order is kept, so the map order becomes the registration order.
fn migrate_config(raw: &mut serde_json::Value) {
    let Some(servers) = raw.get_mut("servers") else {
        return;
    };
    let Some(map) = servers.as_object() else {
        return;
    };

    let list: Vec<serde_json::Value> = map
        .iter()
        .map(|(id, entry)| {
            let mut entry = entry.clone();
            if let Some(obj) = entry.as_object_mut() {
                obj.entry("id").or_insert_with(|| serde_json::Value::String(id.clone()));
            }
            entry
        })
        .collect();

    debug!(count = list.len(), "Migrated servers map → ordered list");
    *servers = serde_json::Value::Array(list);
}

/// Apply environment variable overrides on top of a loaded config.
///
/// Env var format: `MCPILOT_<SECTION>__<FIELD>` (double underscore as delimiter).
///
/// Supported overrides:
/// - `MCPILOT_AGENT__MODEL` → `agent.model`
/// - `MCPILOT_AGENT__MAX_ITERATIONS` → `agent.max_iterations`
/// - `MCPILOT_AGENT__RETRY_LIMIT` → `agent.retry_limit`
/// - `MCPILOT_AGENT__MODEL_TIMEOUT_SECS` → `agent.model_timeout_secs`
/// - `MCPILOT_MODELS__<NAME>__API_KEY` → `models.<name>.api_key`
/// - `MCPILOT_MODELS__<NAME>__API_BASE` → `models.<name>.api_base`
fn apply_env_overrides(mut config: Config) -> Config {
    if let Ok(val) = std::env::var("MCPILOT_AGENT__MODEL") {
        config.agent.model = val;
    }
    if let Ok(val) = std::env::var("MCPILOT_AGENT__MAX_ITERATIONS") {
        if let Ok(n) = val.parse::<usize>() {
            config.agent.max_iterations = n;
        }
    }
    if let Ok(val) = std::env::var("MCPILOT_AGENT__RETRY_LIMIT") {
        if let Ok(n) = val.parse::<u32>() {
            config.agent.retry_limit = n;
        }
    }
    if let Ok(val) = std::env::var("MCPILOT_AGENT__MODEL_TIMEOUT_SECS") {
        if let Ok(n) = val.parse::<u64>() {
            config.agent.model_timeout_secs = n;
        }
    }

    for name in ["gemini", "openai", "openrouter", "deepseek", "groq", "ollama"] {
        let upper = name.to_uppercase();
        if let Some(model) = config.models.get_by_name_mut(name) {
            if let Ok(val) = std::env::var(format!("MCPILOT_MODELS__{upper}__API_KEY")) {
                model.api_key = val;
            }
            if let Ok(val) = std::env::var(format!("MCPILOT_MODELS__{upper}__API_BASE")) {
                model.api_base = Some(val);
            }
        }
    }

    config
}

// ─────────────────────────────────────────────
// Tests
// ─────────────────────────────────────────────
