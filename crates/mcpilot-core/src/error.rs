//! Error taxonomy for mcpilot.
//!
//! One enum covers both sides of the loop. Tool-side faults (unknown tool,
//! bad argument, provider error) are recoverable: the agent loop records them
//! in history and lets the model react. Protocol-side faults (malformed
//! output, model timeout, model transport failure) are retried up to a bound.
//! Everything else ends the run.

use std::time::Duration;

use thiserror::Error;

/// The error type shared by every mcpilot crate.
#[derive(Debug, Error)]
pub enum Error {
    // --- Provider lifecycle ---
    #[error("provider '{provider}' failed to launch: {reason}")]
    ProviderLaunch { provider: String, reason: String },

    #[error("unknown provider '{0}'")]
    UnknownProvider(String),

    #[error("provider '{0}' closed its connection")]
    ProviderClosed(String),

    // --- Tool side ---
    #[error("tool '{tool}' on provider '{provider}' failed: {message}")]
    ToolExecution {
        provider: String,
        tool: String,
        message: String,
    },

    #[error("tool '{tool}' not found")]
    NotFound { tool: String },

    #[error("tool '{tool}' is declared by both '{existing}' and '{incoming}'")]
    DuplicateTool {
        tool: String,
        existing: String,
        incoming: String,
    },

    #[error("argument '{value}' for parameter '{parameter}' of '{tool}' is not a valid {expected}: {reason}")]
    ParameterType {
        tool: String,
        parameter: String,
        expected: String,
        value: String,
        reason: String,
    },

    // --- Protocol side ---
    #[error("malformed model response ({reason}): {raw:?}")]
    MalformedResponse { reason: String, raw: String },

    #[error("model call timed out after {}s", .timeout.as_secs_f64())]
    ModelTimeout { timeout: Duration },

    #[error("model call failed: {0}")]
    Model(String),

    // --- Terminal outcomes ---
    #[error("model reported an error: {0}")]
    ModelReported(String),

    #[error("iteration budget exhausted after {iterations} iterations")]
    BudgetExhausted { iterations: usize },

    // --- Ambient ---
    #[error("configuration error: {0}")]
    Config(String),

    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),

    #[error("JSON error: {0}")]
    Json(#[from] serde_json::Error),
}

/// Result alias used across the workspace.
pub type Result<T> = std::result::Result<T, Error>;

impl Error {
    /// Faults the model can react to: recorded in history, never terminal.
    pub fn is_tool_side(&self) -> bool {
        matches!(
            self,
            Error::ToolExecution { .. } | Error::NotFound { .. } | Error::ParameterType { .. }
        )
    }

    /// Faults retried up to the configured retry limit.
    pub fn is_protocol_side(&self) -> bool {
        matches!(
            self,
            Error::MalformedResponse { .. } | Error::ModelTimeout { .. } | Error::Model(_)
        )
    }

    /// Shorthand for a `ProviderLaunch` error.
    pub fn launch(provider: impl Into<String>, reason: impl std::fmt::Display) -> Self {
        Error::ProviderLaunch {
            provider: provider.into(),
            reason: reason.to_string(),
        }
    }

    /// Shorthand for a `MalformedResponse` error.
    pub fn malformed(reason: impl Into<String>, raw: impl Into<String>) -> Self {
        Error::MalformedResponse {
            reason: reason.into(),
            raw: raw.into(),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn tool_side_classification() {
        let err = Error::NotFound { tool: "add".into() };
        assert!(err.is_tool_side());
        assert!(!err.is_protocol_side());

        let err = Error::ToolExecution {
            provider: "math".into(),
            tool: "add".into(),
            message: "boom".into(),
        };
        assert!(err.is_tool_side());
    }

    #[test]
    fn protocol_side_classification() {
        assert!(Error::malformed("no keyword", "hello").is_protocol_side());
        assert!(Error::ModelTimeout { timeout: Duration::from_secs(10) }.is_protocol_side());
        assert!(Error::Model("503".into()).is_protocol_side());
        assert!(!Error::ModelReported("nope".into()).is_protocol_side());
    }

    #[test]
    fn launch_errors_are_neither() {
        let err = Error::launch("mail", "spawn failed");
        assert!(!err.is_tool_side());
        assert!(!err.is_protocol_side());
        assert_eq!(err.to_string(), "provider 'mail' failed to launch: spawn failed");
    }

    #[test]
    fn timeout_display_in_seconds() {
        let err = Error::ModelTimeout { timeout: Duration::from_millis(1500) };
        assert_eq!(err.to_string(), "model call timed out after 1.5s");
    }

    #[test]
    fn duplicate_tool_names_both_providers() {
        let err = Error::DuplicateTool {
            tool: "add".into(),
            existing: "math".into(),
            incoming: "calc".into(),
        };
        let text = err.to_string();
        assert!(text.contains("math"));
        assert!(text.contains("calc"));
    }
}
