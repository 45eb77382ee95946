//! `mcpilot status`: show configuration, model backends and servers.
//!
//! Reads the config only; no server is launched.

use std::path::PathBuf;

use anyhow::Result;
use colored::Colorize;

use mcpilot_core::config::{get_config_path, load_config, ServerConfig};
use mcpilot_models::registry::{effective_config, match_backend};
use mcpilot_models::MODEL_BACKENDS;

/// Run the status command.
pub fn run(config_path: Option<PathBuf>) -> Result<()> {
    let config_path = config_path.unwrap_or_else(get_config_path);
    let config = load_config(Some(&config_path));

    println!();
    println!("{}", "mcpilot status".cyan().bold());
    println!();

    println!(
        "  {:<18} {} {}",
        "Config:".bold(),
        config_path.display(),
        if config_path.exists() {
            "✓".green().to_string()
        } else {
            "(not found)".red().to_string()
        }
    );

    if let Err(e) = config.validate() {
        println!("  {:<18} {}", "".bold(), e.to_string().red());
    }

    // Model
    let backend = match match_backend(&config.agent.model, &config.models) {
        Some((_, spec)) => spec.display_name.green().to_string(),
        None => "no usable backend".red().to_string(),
    };
    println!(
        "  {:<18} {} ({})",
        "Model:".bold(),
        config.agent.model,
        backend
    );

    let agent = &config.agent;
    println!(
        "  {:<18} {}",
        "Loop:".bold(),
        format!(
            "max_iterations: {} | retry_limit: {} | model_timeout: {}s",
            agent.max_iterations, agent.retry_limit, agent.model_timeout_secs
        )
        .dimmed(),
    );
    println!(
        "  {:<18} {}",
        "Parameters:".bold(),
        format!("temp: {} | max_tokens: {}", agent.temperature, agent.max_tokens).dimmed(),
    );

    // Backends
    println!();
    println!("  {}", "Model backends:".bold());
    for spec in MODEL_BACKENDS {
        let effective = effective_config(spec, &config.models);
        let status = if spec.is_local {
            format!("{} (local)", "✓".green())
        } else if effective.is_configured() {
            format!("{} (key set)", "✓".green())
        } else {
            format!("{}", format!("· not configured ({})", spec.env_key).dimmed())
        };
        println!("    {:<20} {}", spec.display_name, status);
    }

    // Servers
    println!();
    println!("  {}", "Tool servers:".bold());
    if config.servers.is_empty() {
        println!("    {}", "(none)".dimmed());
    }
    for server in &config.servers {
        println!("    {}", describe_server(server));
    }

    println!();

    Ok(())
}

fn describe_server(server: &ServerConfig) -> String {
    let marker = if server.enabled {
        "✓".green().to_string()
    } else {
        "·".dimmed().to_string()
    };
    let mut command = server.command.clone();
    for arg in &server.args {
        command.push(' ');
        command.push_str(arg);
    }
    let call_timeout = match server.call_timeout_secs {
        Some(secs) => format!("{secs}s"),
        None => "none".to_string(),
    };
    format!(
        "{marker} {:<18} {} {}",
        server.id,
        command,
        format!(
            "(startup {}s, call {call_timeout})",
            server.startup_timeout_secs
        )
        .dimmed()
    )
}
