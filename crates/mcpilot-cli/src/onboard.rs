//! `mcpilot onboard`: write a default configuration.
//!
//! - Creates `~/.mcpilot/config.json` with defaults and one example server
//! - Creates the REPL history directory

use std::path::{Path, PathBuf};

use anyhow::{Context, Result};
use colored::Colorize;

use mcpilot_core::config::{get_config_path, save_config, Config, ServerConfig};
use mcpilot_core::utils::get_data_path;

/// Run the onboard command.
pub fn run(config_path: Option<PathBuf>) -> Result<()> {
    println!();
    println!("{}", "mcpilot setup".cyan().bold());
    println!();

    let config_path = config_path.unwrap_or_else(get_config_path);
    if write_default_config(&config_path)? {
        println!("  {} created config at {}", "✓".green(), config_path.display());
    } else {
        println!("  {} config already exists at {}", "✓".green(), config_path.display());
    }

    let history_dir = get_data_path().join("history");
    std::fs::create_dir_all(&history_dir)
        .with_context(|| format!("failed to create {}", history_dir.display()))?;

    println!();
    println!(
        "{}",
        "  Add your tool servers under \"servers\" and an API key under \"models\",".green()
    );
    println!(
        "{}",
        "  then run `mcpilot tools` to check discovery and `mcpilot agent` to start.".green()
    );
    println!();

    Ok(())
}

/// Default config: every default setting plus one disabled example server.
fn default_config() -> Config {
    let mut example = ServerConfig::new("math", "python", &["math_server.py"]);
    example.enabled = false;

    Config {
        servers: vec![example],
        ..Config::default()
    }
}

/// Write the default config unless one exists. Returns whether it wrote.
fn write_default_config(path: &Path) -> Result<bool> {
    if path.exists() {
        return Ok(false);
    }
    save_config(&default_config(), Some(path))
        .with_context(|| format!("failed to write {}", path.display()))?;
    Ok(true)
}

// ─────────────────────────────────────────────
// Tests
// ─────────────────────────────────────────────

#[cfg(test)]
mod tests {
    use super::*;
    use mcpilot_core::config::load_config;

    #[test]
    fn writes_loadable_config() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("config.json");

        assert!(write_default_config(&path).unwrap());
        let text = std::fs::read_to_string(&path).unwrap();
        assert!(text.contains("\"maxIterations\""));
        assert!(text.contains("\"servers\""));

        let config = load_config(Some(&path));
        config.validate().unwrap();
        assert_eq!(config.servers.len(), 1);
        assert!(!config.servers[0].enabled);
    }

    #[test]
    fn existing_config_is_kept() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("config.json");
        std::fs::write(&path, "{}").unwrap();

        assert!(!write_default_config(&path).unwrap());
        assert_eq!(std::fs::read_to_string(&path).unwrap(), "{}");
    }
}
