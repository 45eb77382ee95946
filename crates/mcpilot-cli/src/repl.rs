//! Interactive REPL.
//!
//! Uses `rustyline` for readline-style editing with persistent history. Each
//! line is an independent run over the same connected provider pool.

use anyhow::Result;
use rustyline::config::Configurer;
use rustyline::history::DefaultHistory;
use rustyline::{DefaultEditor, Editor};
use tracing::debug;

use mcpilot_agent::AgentLoop;

use crate::helpers;

/// Exit commands (case-insensitive match).
const EXIT_COMMANDS: &[&str] = &["exit", "quit", "/exit", "/quit", ":q"];

/// Run the interactive REPL loop.
pub async fn run(agent: &AgentLoop, show_history: bool) -> Result<()> {
    helpers::print_banner(agent.model_name(), agent.registry().len());

    let mut editor = create_editor()?;

    loop {
        let input = match editor.readline("Query: ") {
            Ok(line) => line,
            Err(rustyline::error::ReadlineError::Interrupted) => break,
            Err(rustyline::error::ReadlineError::Eof) => break,
            Err(e) => {
                eprintln!("Input error: {e}");
                break;
            }
        };

        let trimmed = input.trim();
        if trimmed.is_empty() {
            continue;
        }

        if is_exit_command(trimmed) {
            println!("\nGoodbye!");
            break;
        }

        let _ = editor.add_history_entry(&input);

        if trimmed.eq_ignore_ascii_case("/tools") {
            println!();
            for line in agent.registry().describe_all() {
                println!("  {line}");
            }
            println!();
            continue;
        }

        debug!(input = trimmed, "processing query");
        helpers::print_thinking();
        let report = agent.run(trimmed).await;
        helpers::clear_thinking();
        helpers::print_report(&report, show_history);
    }

    save_history(&mut editor);

    Ok(())
}

/// Create a rustyline editor with history.
fn create_editor() -> Result<Editor<(), DefaultHistory>> {
    let mut editor = DefaultEditor::new()?;
    editor.set_max_history_size(1000)?;

    let history_path = history_path();
    if history_path.exists() {
        let _ = editor.load_history(&history_path);
        debug!("loaded REPL history from {}", history_path.display());
    }

    Ok(editor)
}

/// Save history to disk.
fn save_history(editor: &mut Editor<(), DefaultHistory>) {
    let path = history_path();
    if let Some(parent) = path.parent() {
        let _ = std::fs::create_dir_all(parent);
    }
    if let Err(e) = editor.save_history(&path) {
        debug!("failed to save history: {e}");
    }
}

/// `~/.mcpilot/history/queries`
fn history_path() -> std::path::PathBuf {
    mcpilot_core::utils::get_data_path()
        .join("history")
        .join("queries")
}

fn is_exit_command(input: &str) -> bool {
    let lower = input.to_lowercase();
    EXIT_COMMANDS.contains(&lower.as_str())
}

// ─────────────────────────────────────────────
// Tests
// ─────────────────────────────────────────────
