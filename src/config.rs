use anyhow::{Context, Result};
use std::path::{Path, PathBuf};

use crate::util::STATE_DIR;
use crate::waypoint_config::{CONFIG_FILE, WaypointToml};

/// Runtime configuration for waypoint.
///
/// Resolves every path the orchestrator touches from the project directory
/// and carries the parsed `waypoint.toml`.
#[derive(Debug, Clone)]
pub struct Config {
    pub project_dir: PathBuf,
    pub state_dir: PathBuf,
    pub config_file: PathBuf,
    pub log_dir: PathBuf,
    pub changes_dir: PathBuf,
    pub verbose: bool,
    /// Answer yes to confirmations and pick default options at prompts.
    pub assume_yes: bool,
    pub settings: WaypointToml,
}

impl Config {
    pub fn new(project_dir: PathBuf, verbose: bool, assume_yes: bool) -> Result<Self> {
        let project_dir = project_dir
            .canonicalize()
            .context("Failed to resolve project directory")?;
        let state_dir = project_dir.join(STATE_DIR);
        let settings = WaypointToml::load_or_default(&state_dir)?;
        Ok(Self::with_settings(project_dir, settings, verbose, assume_yes))
    }

    /// Build from already-loaded settings (no filesystem access).
    pub fn with_settings(
        project_dir: PathBuf,
        settings: WaypointToml,
        verbose: bool,
        assume_yes: bool,
    ) -> Self {
        let state_dir = project_dir.join(STATE_DIR);
        let changes_dir = project_dir.join(&settings.project.changes_dir);
        Self {
            config_file: state_dir.join(CONFIG_FILE),
            log_dir: state_dir.join("logs"),
            state_dir,
            changes_dir,
            project_dir,
            verbose,
            assume_yes,
            settings,
        }
    }

    /// Working directory of one change.
    pub fn change_dir(&self, change_id: &str) -> PathBuf {
        self.changes_dir.join(change_id)
    }

    /// Engine state directory of one change (excluded from checkpoints).
    pub fn change_state_dir(&self, change_id: &str) -> PathBuf {
        self.change_dir(change_id).join(STATE_DIR)
    }

    pub fn is_initialized(&self) -> bool {
        self.state_dir.is_dir()
    }

    pub fn ensure_directories(&self) -> Result<()> {
        for dir in [&self.state_dir, &self.log_dir, &self.changes_dir] {
            std::fs::create_dir_all(dir)
                .with_context(|| format!("Failed to create directory: {}", dir.display()))?;
        }
        Ok(())
    }

    /// Ids of every change directory that holds a change record.
    pub fn list_change_ids(&self) -> Result<Vec<String>> {
        list_change_ids(&self.changes_dir)
    }
}

fn list_change_ids(changes_dir: &Path) -> Result<Vec<String>> {
    if !changes_dir.is_dir() {
        return Ok(Vec::new());
    }
    let mut ids: Vec<String> = std::fs::read_dir(changes_dir)
        .with_context(|| format!("Failed to read {}", changes_dir.display()))?
        .filter_map(|e| e.ok())
        .filter(|e| e.path().join(STATE_DIR).join(crate::change::CHANGE_FILE).exists())
        .map(|e| e.file_name().to_string_lossy().into_owned())
        .collect();
    ids.sort();
    Ok(ids)
}
