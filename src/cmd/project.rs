//! Project initialization and change creation: `waypoint init`, `waypoint new`.

use anyhow::Result;
use std::path::Path;

use super::super::Cli;
use super::load_config;

pub fn cmd_init(project_dir: &Path) -> Result<()> {
    use waypoint::init::init_project;

    let result = init_project(project_dir)?;

    if result.created {
        println!(
            "Initialized waypoint project at {}",
            result.state_dir.display()
        );
        println!();
        println!("Created directory structure:");
        println!("  .waypoint/");
        println!("  ├── waypoint.toml   # Lanes, gate tools, hooks");
        println!("  └── logs/           # waypoint.log");
        println!("  changes/            # One directory per change");
        println!();
        println!("Next steps:");
        println!("  1. Configure gate tools in .waypoint/waypoint.toml");
        println!("  2. Run `waypoint new <change-id> --title \"...\"`");
        println!("  3. Run `waypoint run <change-id>`");
    } else {
        println!(
            "Waypoint project already initialized at {}",
            result.state_dir.display()
        );
        if result.config_written {
            println!("Wrote missing waypoint.toml.");
        }
        println!("Directory structure verified.");
    }

    Ok(())
}

pub fn cmd_new(
    cli: &Cli,
    project_dir: &Path,
    change_id: &str,
    title: &str,
    owner: Option<&str>,
    description: &str,
) -> Result<()> {
    use waypoint::change::Change;
    use waypoint::init::is_initialized;

    if !is_initialized(project_dir) {
        anyhow::bail!("Project not initialized. Run 'waypoint init' first.");
    }
    let config = load_config(cli, project_dir)?;
    config.ensure_directories()?;

    let owner = match owner {
        Some(o) => o.to_string(),
        None => std::env::var("USER").unwrap_or_else(|_| "unknown".to_string()),
    };
    let change = Change::new(change_id, title, &owner, description)?;
    let dir = Change::create(&config, &change)?;
    tracing::info!(change = change_id, "created change");

    println!("Created change {} at {}", change.id, dir.display());
    println!("Run `waypoint run {}` to start its pipeline.", change.id);
    Ok(())
}
