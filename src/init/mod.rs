//! `waypoint init`: create the project state directory.
//!
//! ```text
//! .waypoint/
//! ├── waypoint.toml    # Project configuration (defaults written on first init)
//! └── logs/            # waypoint.log
//! changes/             # One directory per change
//! ```
//!
//! Re-running init on an initialized project only fills in what is missing;
//! an existing `waypoint.toml` is never overwritten.

use anyhow::{Context, Result};
use std::path::{Path, PathBuf};

use crate::util::STATE_DIR;
use crate::waypoint_config::{CONFIG_FILE, WaypointToml};

#[derive(Debug)]
pub struct InitResult {
    pub state_dir: PathBuf,
    /// False when `.waypoint/` already existed.
    pub created: bool,
    pub config_written: bool,
}

/// Initialize waypoint in `project_dir`.
pub fn init_project(project_dir: &Path) -> Result<InitResult> {
    let state_dir = project_dir.join(STATE_DIR);
    let created = !state_dir.exists();

    std::fs::create_dir_all(state_dir.join("logs"))
        .with_context(|| format!("Failed to create directory: {}", state_dir.display()))?;

    let config_path = state_dir.join(CONFIG_FILE);
    let config_written = if config_path.exists() {
        false
    } else {
        WaypointToml::default().save(&config_path)?;
        true
    };

    let settings = WaypointToml::load(&config_path)?;
    let changes_dir = project_dir.join(&settings.project.changes_dir);
    std::fs::create_dir_all(&changes_dir).with_context(|| {
        format!(
            "Failed to create changes directory: {}",
            changes_dir.display()
        )
    })?;

    Ok(InitResult {
        state_dir,
        created,
        config_written,
    })
}

/// Check if a project is already initialized.
pub fn is_initialized(project_dir: &Path) -> bool {
    project_dir.join(STATE_DIR).is_dir()
}
