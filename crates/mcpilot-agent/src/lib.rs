//! mcpilot agent: the iterate-until-done loop.
//!
//! This crate contains:
//! - **tools**: registry of discovered tools and positional argument coercion
//! - **parser**: the single-line instruction grammar
//! - **context**: system prompt (capability catalogue) and transcript rendering
//! - **state**: run state, outcome, and report
//! - **agent_loop**: the model ↔ tool iteration controller

pub mod agent_loop;
pub mod context;
pub mod parser;
pub mod state;
pub mod tools;

pub use agent_loop::{AgentLoop, LoopSettings};
pub use context::PromptBuilder;
pub use parser::parse;
pub use state::{RunOutcome, RunReport, RunState};
pub use tools::{coerce_args, ToolRegistry};
