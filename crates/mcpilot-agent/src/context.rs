//! Prompt builder: renders the capability catalogue and the run transcript
//! into the single text block sent to the model.

use mcpilot_core::utils::truncate_string;
use mcpilot_core::{Attempt, Instruction, IterationRecord, ToolFault, ToolOutcome};
use tracing::debug;

use crate::tools::ToolRegistry;

/// Preamble used when the config does not supply `agent.instructions`.
pub const DEFAULT_INSTRUCTIONS: &str = "You are an agent that solves the user's query step by step. \
You cannot compute or look things up yourself: you work only by calling the tools listed below, \
one call per turn. The result of every call is reported back to you on the next turn.";

/// The response grammar, quoted verbatim in every system prompt.
pub const GRAMMAR: &str = "FUNCTION_CALL: <name>|<arg1>|<arg2>|...
FINAL_ANSWER: <value>
ERROR: <message>
UNCERTAIN: <message>";

/// Longest echo of a malformed reply kept in the transcript.
const MAX_ECHO_CHARS: usize = 300;

// ─────────────────────────────────────────────
// Prompt builder
// ─────────────────────────────────────────────

/// Builds prompts for the agent loop.
///
/// The system prompt is fixed once the registry is built; only the
/// transcript grows between iterations.
#[derive(Clone, Debug)]
pub struct PromptBuilder {
    system_prompt: String,
}

impl PromptBuilder {
    /// Render the system prompt for `registry`.
    pub fn new(registry: &ToolRegistry, instructions: Option<&str>) -> Self {
        let system_prompt = build_system_prompt(registry, instructions.unwrap_or(DEFAULT_INSTRUCTIONS));
        debug!(chars = system_prompt.len(), tools = registry.len(), "system prompt built");
        Self { system_prompt }
    }

    pub fn system_prompt(&self) -> &str {
        &self.system_prompt
    }

    /// Full prompt for the next model call.
    pub fn build(&self, query: &str, history: &[IterationRecord]) -> String {
        format!("{}\n\n{}", self.system_prompt, transcript(query, history))
    }
}

fn build_system_prompt(registry: &ToolRegistry, instructions: &str) -> String {
    let mut parts: Vec<String> = Vec::new();

    parts.push(instructions.trim().to_string());

    let catalogue = registry.describe_all();
    let mut tools = String::from("Available tools:");
    if catalogue.is_empty() {
        tools.push_str("\n(none)");
    }
    for (i, line) in catalogue.iter().enumerate() {
        tools.push_str(&format!("\n{}. {}", i + 1, line));
    }
    parts.push(tools);

    parts.push(format!(
        "Respond with exactly one line in one of these forms:\n{GRAMMAR}"
    ));

    parts.push(
        "Rules:
- Pass arguments by position, in the order the tool declares them.
- Write arrays as [1,2,3] and objects as JSON.
- Arguments cannot contain the | character.
- Use ERROR: <kind>|<detail> when the query cannot be completed with these tools.
- Use UNCERTAIN: <kind>|<detail> when you are unsure how to proceed.
- Give FINAL_ANSWER only after every call you need has returned."
            .to_string(),
    );

    parts.push(
        "Examples:
FUNCTION_CALL: add|5|3
FUNCTION_CALL: send_email|someone@example.com|Subject|Body text
FINAL_ANSWER: 42
UNCERTAIN: AMBIGUOUS|the query does not say which unit to use"
            .to_string(),
    );

    parts.push(
        "Your entire response must be a single line starting with \
FUNCTION_CALL:, FINAL_ANSWER:, ERROR: or UNCERTAIN:. Do not add explanations."
            .to_string(),
    );

    parts.join("\n\n")
}

// ─────────────────────────────────────────────
// Transcript
// ─────────────────────────────────────────────

/// `Query: ...` followed by one sentence per record and a closing question.
pub fn transcript(query: &str, history: &[IterationRecord]) -> String {
    let mut out = format!("Query: {query}");
    if history.is_empty() {
        return out;
    }

    out.push('\n');
    for record in history {
        out.push('\n');
        out.push_str(&describe_record(record));
    }
    out.push_str("\n\nWhat should I do next?");
    out
}

/// One human-readable sentence for a history entry.
pub fn describe_record(record: &IterationRecord) -> String {
    let n = record.index + 1;
    match &record.attempt {
        Attempt::Parsed(instruction) => match instruction {
            Instruction::FunctionCall { name, args } => {
                let call = format!("{name}({})", args.join(", "));
                match &record.tool_result {
                    Some(ToolOutcome::Output(out)) => {
                        format!("In iteration {n} you called {call} and it returned {out}.")
                    }
                    Some(ToolOutcome::Failed { fault, message }) => {
                        let hint = match fault {
                            ToolFault::NotFound => "Pick a tool from the list.",
                            ToolFault::ParameterType => "Check the number and types of the arguments.",
                            ToolFault::Execution => "You may retry or try another approach.",
                        };
                        format!("In iteration {n} you called {call} but it failed: {message}. {hint}")
                    }
                    None => format!("In iteration {n} you called {call}."),
                }
            }
            Instruction::Uncertain { .. } => {
                let (kind, detail) = instruction.detail_parts().unwrap_or_default();
                if detail.is_empty() {
                    format!("In iteration {n} you were uncertain ({kind}). Re-read the query and the results so far.")
                } else {
                    format!(
                        "In iteration {n} you were uncertain ({kind}: {detail}). Re-read the query and the results so far."
                    )
                }
            }
            Instruction::Error { message } => {
                format!("In iteration {n} you reported an error: {message}.")
            }
            Instruction::FinalAnswer { value } => {
                format!("In iteration {n} you answered {value}.")
            }
        },
        Attempt::Malformed { raw, reason } => format!(
            "In iteration {n} your reply {:?} was not valid ({reason}). Reply with exactly one line in one of the allowed forms.",
            truncate_string(raw, MAX_ECHO_CHARS)
        ),
        Attempt::TimedOut { timeout_secs } => {
            format!("In iteration {n} no reply arrived within {timeout_secs}s.")
        }
        Attempt::ModelFailed { message } => {
            format!("In iteration {n} the model call failed ({message}).")
        }
    }
}
