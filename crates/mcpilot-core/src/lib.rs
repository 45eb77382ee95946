//! mcpilot core: data model, error taxonomy, config, and utilities shared
//! by the provider pool, the model clients, and the agent loop.

pub mod config;
pub mod error;
pub mod types;
pub mod utils;

pub use error::{Error, Result};
pub use types::{
    Attempt, Instruction, IterationRecord, ParamSpec, ParamType, ToolDescriptor, ToolFault,
    ToolOutcome,
};
