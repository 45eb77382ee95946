//! Model layer for mcpilot.
//!
//! - [`traits::LanguageModel`]: plain text completion, the only thing the
//!   agent loop needs from a model
//! - [`registry`]: static specs for the supported backends + matching logic
//! - [`http_model::HttpModel`]: OpenAI-compatible `/chat/completions` client
//! - [`http_model::create_model`]: builder from model name + config

pub mod http_model;
pub mod registry;
pub mod traits;

pub use http_model::{create_model, HttpModel};
pub use registry::{BackendSpec, MODEL_BACKENDS};
pub use traits::{CompletionConfig, LanguageModel};
