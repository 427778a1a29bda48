//! Configuration view and validation: `waypoint config`.

use anyhow::Result;
use std::path::Path;

use super::super::{Cli, ConfigCommands};
use super::load_config;

pub fn cmd_config(cli: &Cli, project_dir: &Path, command: Option<ConfigCommands>) -> Result<()> {
    let config = load_config(cli, project_dir)?;

    match command {
        None | Some(ConfigCommands::Show) => {
            println!();
            println!("Waypoint Configuration");
            println!("======================");
            println!();
            if config.config_file.exists() {
                println!("Config file: {}", config.config_file.display());
            } else {
                println!(
                    "Config file: {} (not found, using defaults)",
                    config.config_file.display()
                );
            }
            println!("Changes dir: {}", config.changes_dir.display());
            println!();
            print!("{}", toml::to_string_pretty(&config.settings)?);
        }
        Some(ConfigCommands::Validate) => {
            let warnings = config.settings.validate();
            if warnings.is_empty() {
                println!("Configuration is valid.");
            } else {
                println!("Configuration warnings:");
                for w in &warnings {
                    println!("  - {}", w);
                }
                anyhow::bail!("{} configuration warning(s)", warnings.len());
            }
        }
    }
    Ok(())
}
