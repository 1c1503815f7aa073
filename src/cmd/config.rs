//! Configuration view and validation commands: `grwm config`.

use anyhow::{Context, Result};
use std::path::Path;

use super::super::ConfigCommands;
use grwm::config::{Config, DEFAULT_CONFIG_FILE};

pub fn cmd_config(config_path: Option<&Path>, command: Option<ConfigCommands>) -> Result<()> {
    match command {
        None | Some(ConfigCommands::Show) => {
            let config = Config::load(config_path)?;
            let rendered =
                toml::to_string_pretty(&config).context("Failed to render configuration")?;

            println!("# Effective configuration (defaults, file, environment)");
            match config_path {
                Some(path) => println!("# Config file: {}", path.display()),
                None if Path::new(DEFAULT_CONFIG_FILE).exists() => {
                    println!("# Config file: {}", DEFAULT_CONFIG_FILE)
                }
                None => println!("# No config file, using defaults"),
            }
            println!(
                "# GitHub token: {}",
                if config.github.token.is_some() {
                    "set"
                } else {
                    "not set (60 requests/hour)"
                }
            );
            println!(
                "# Writer: {}",
                if config.llm.enabled() {
                    format!("{} ({} key(s))", config.llm.model, config.llm.api_keys.len())
                } else {
                    "built-in templates (no GOOGLE_API_KEY)".to_string()
                }
            );
            println!();
            print!("{}", rendered);
        }
        Some(ConfigCommands::Validate) => {
            Config::load(config_path)?;
            println!("Configuration is valid.");
        }
        Some(ConfigCommands::Init) => {
            let target = config_path.unwrap_or(Path::new(DEFAULT_CONFIG_FILE));
            if target.exists() {
                anyhow::bail!("{} already exists", target.display());
            }
            let rendered = toml::to_string_pretty(&Config::default())
                .context("Failed to render default configuration")?;
            std::fs::write(target, rendered)
                .with_context(|| format!("Failed to write {}", target.display()))?;
            println!("Created {}", target.display());
        }
    }
    Ok(())
}
