//! Shared CLI helpers: path expansion, report printing, banners.

use std::path::PathBuf;

use colored::Colorize;

use mcpilot_agent::context::describe_record;
use mcpilot_agent::{RunOutcome, RunReport, ToolRegistry};
use mcpilot_providers::{ConnectionState, ProviderSession, ProviderSessionPool};

/// Resolve a `--config` argument, expanding a leading `~`.
pub fn expand_tilde(path: &str) -> PathBuf {
    match (path.strip_prefix('~'), dirs_next::home_dir()) {
        (Some(""), Some(home)) => home,
        (Some(rest), Some(home)) if rest.starts_with('/') => home.join(&rest[1..]),
        _ => PathBuf::from(path),
    }
}

/// Process exit status for a finished run: 0 success, 1 failure,
/// 2 iteration budget exhausted.
pub fn exit_status(outcome: &RunOutcome) -> u8 {
    match outcome {
        RunOutcome::Success { .. } => 0,
        RunOutcome::Failed { .. } => 1,
        RunOutcome::BudgetExhausted { .. } => 2,
    }
}

/// Print a run report. The answer goes to stdout, failures to stderr.
pub fn print_report(report: &RunReport, show_history: bool) {
    if show_history {
        eprintln!();
        for record in &report.history {
            eprintln!("  {}", describe_record(record).dimmed());
        }
    }

    let summary = format!(
        "({} iteration(s), {} retr{})",
        report.iterations,
        report.retries,
        if report.retries == 1 { "y" } else { "ies" }
    );

    match &report.outcome {
        RunOutcome::Success { value } => {
            println!();
            println!("{} {}", "mcpilot".cyan().bold(), summary.dimmed());
            println!("{value}");
            println!();
        }
        RunOutcome::Failed { error, .. } => {
            eprintln!();
            eprintln!("{} {error} {}", "✗ run failed:".red().bold(), summary.dimmed());
            eprintln!();
        }
        RunOutcome::BudgetExhausted { .. } => {
            eprintln!();
            eprintln!(
                "{} {} {}",
                "✗".red().bold(),
                report.outcome,
                "without a final answer".dimmed()
            );
            eprintln!();
        }
    }
}

/// Print the tool catalogue and any provider that is not ready.
pub fn print_catalogue(registry: &ToolRegistry, pool: &ProviderSessionPool) {
    println!();
    println!("{}", "Tools".cyan().bold());
    if registry.is_empty() {
        println!("  {}", "(none)".dimmed());
    }
    for (i, line) in registry.describe_all().iter().enumerate() {
        println!("  {:>2}. {line}", i + 1);
    }

    let down: Vec<&ProviderSession> = pool
        .sessions()
        .iter()
        .filter(|s| s.state() == ConnectionState::Failed)
        .collect();
    if !down.is_empty() {
        println!();
        for session in down {
            println!("  {} {}", "✗".red(), unavailable_line(session.id(), session.failure()));
        }
    }
    println!();
}

/// `id (failed: reason)` for a provider that is down.
fn unavailable_line(id: &str, reason: Option<&str>) -> String {
    match reason {
        Some(reason) => format!("{id} (failed: {reason})"),
        None => format!("{id} (failed)"),
    }
}

/// Print a warning line to stderr.
pub fn print_warning(message: &str) {
    eprintln!("{} {message}", "warning:".yellow().bold());
}

/// Print the banner shown at REPL start.
pub fn print_banner(model: &str, tools: usize) {
    let version = env!("CARGO_PKG_VERSION");
    println!();
    println!("{}  v{}", "mcpilot".cyan().bold(), version.dimmed());
    println!("{}", format!("model: {model} | tools: {tools}").dimmed());
    println!(
        "{}",
        "Type a query, \"/tools\" for the catalogue, or \"exit\" to quit.".dimmed()
    );
    println!();
}

/// Print a "thinking" placeholder (for non-log mode).
pub fn print_thinking() {
    eprint!("{}", "⠿ thinking...".dimmed());
}

/// Clear the "thinking" placeholder.
pub fn clear_thinking() {
    eprint!("\r{}\r", " ".repeat(40));
}

// ─────────────────────────────────────────────
// Tests
// ─────────────────────────────────────────────
