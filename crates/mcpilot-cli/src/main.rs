//! mcpilot CLI: entry point.
//!
//! # Commands
//!
//! - `mcpilot agent [-m QUERY] [--logs]`: run one query, or a REPL without `-m`
//! - `mcpilot tools`: connect every server and print the tool catalogue
//! - `mcpilot status`: show configuration, backends and servers
//! - `mcpilot onboard`: write a default config

mod helpers;
mod onboard;
mod repl;
mod status;

use std::path::PathBuf;
use std::process::ExitCode;
use std::sync::Arc;

use anyhow::{Context, Result};
use clap::{Parser, Subcommand};
use tracing::{info, warn};

use mcpilot_agent::{AgentLoop, LoopSettings, ToolRegistry};
use mcpilot_core::config::{load_config, Config};
use mcpilot_models::{create_model, LanguageModel};
use mcpilot_providers::ProviderSessionPool;

// ─────────────────────────────────────────────
// CLI definition
// ─────────────────────────────────────────────

/// mcpilot: drive an LLM through tool servers, one call at a time
#[derive(Parser)]
#[command(name = "mcpilot", version, about, long_about = None)]
struct Cli {
    /// Config file (default: ~/.mcpilot/config.json)
    #[arg(short, long, global = true)]
    config: Option<String>,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Run a query through the agent loop (single-shot or interactive REPL)
    Agent {
        /// Single query (non-interactive). Omit for REPL mode.
        #[arg(short, long)]
        message: Option<String>,

        /// Override `agent.model` from the config
        #[arg(long)]
        model: Option<String>,

        /// Print every iteration of the run
        #[arg(long, default_value_t = false)]
        history: bool,

        /// Enable debug logging
        #[arg(long, default_value_t = false)]
        logs: bool,
    },

    /// Connect every server and list the discovered tools
    Tools {
        /// Enable debug logging
        #[arg(long, default_value_t = false)]
        logs: bool,
    },

    /// Show configuration, model backends and servers
    Status,

    /// Write a default configuration
    Onboard,
}

// ─────────────────────────────────────────────
// Entrypoint
// ─────────────────────────────────────────────

#[tokio::main]
async fn main() -> Result<ExitCode> {
    let cli = Cli::parse();
    let config_path = cli.config.as_deref().map(helpers::expand_tilde);

    match cli.command {
        Commands::Agent {
            message,
            model,
            history,
            logs,
        } => {
            init_logging(logs);
            run_agent(config_path, message, model, history).await
        }
        Commands::Tools { logs } => {
            init_logging(logs);
            run_tools(config_path).await
        }
        Commands::Status => status::run(config_path).map(|_| ExitCode::SUCCESS),
        Commands::Onboard => onboard::run(config_path).map(|_| ExitCode::SUCCESS),
    }
}

// ─────────────────────────────────────────────
// Agent command
// ─────────────────────────────────────────────

async fn run_agent(
    config_path: Option<PathBuf>,
    message: Option<String>,
    model_override: Option<String>,
    show_history: bool,
) -> Result<ExitCode> {
    let mut config = load_config(config_path.as_deref());
    if let Some(model) = model_override {
        config.agent.model = model;
    }
    config.validate().context("invalid configuration")?;

    let model: Arc<dyn LanguageModel> = Arc::new(
        create_model(&config.agent.model, &config.models)
            .with_context(|| format!("no usable backend for model '{}'", config.agent.model))?,
    );

    let pool = Arc::new(connect_pool(&config).await);

    let result: Result<ExitCode> = async {
        let agent = AgentLoop::new(model, pool.clone(), LoopSettings::from(&config.agent))
            .context("failed to build the tool registry")?;

        match message {
            Some(query) => {
                info!(query = %query, "single-shot run");
                let report = agent.run(&query).await;
                helpers::print_report(&report, show_history);
                Ok(ExitCode::from(helpers::exit_status(&report.outcome)))
            }
            None => {
                repl::run(&agent, show_history).await?;
                Ok(ExitCode::SUCCESS)
            }
        }
    }
    .await;

    pool.close_all().await;
    result
}

// ─────────────────────────────────────────────
// Tools command
// ─────────────────────────────────────────────

async fn run_tools(config_path: Option<PathBuf>) -> Result<ExitCode> {
    let config = load_config(config_path.as_deref());
    config.validate().context("invalid configuration")?;

    let pool = connect_pool(&config).await;
    let registry = ToolRegistry::from_pool(&pool);
    pool.close_all().await;

    let registry = registry.context("failed to build the tool registry")?;
    helpers::print_catalogue(&registry, &pool);
    Ok(ExitCode::SUCCESS)
}

/// Launch every enabled server. A server that fails to start is reported
/// and skipped; the rest of the pool stays usable.
async fn connect_pool(config: &Config) -> ProviderSessionPool {
    let mut pool = ProviderSessionPool::new();
    if config.enabled_servers().next().is_none() {
        warn!("no tool servers configured");
        helpers::print_warning("no tool servers configured (see `mcpilot onboard`)");
        return pool;
    }

    let failures = pool.connect_all(config.enabled_servers()).await;
    for failure in &failures {
        helpers::print_warning(&failure.to_string());
    }
    info!(
        providers = pool.len(),
        failed = failures.len(),
        "provider pool connected"
    );
    pool
}

/// Initialize tracing/logging. Logs go to stderr so stdout only carries results.
fn init_logging(verbose: bool) {
    use tracing_subscriber::EnvFilter;

    let filter = if verbose {
        EnvFilter::new("mcpilot=debug,info")
    } else {
        EnvFilter::new("warn")
    };

    tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_writer(std::io::stderr)
        .with_target(false)
        .compact()
        .init();
}
