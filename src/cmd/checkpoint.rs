//! Checkpoint commands: `list-checkpoints`, `rollback`, `cleanup-checkpoints`.

use anyhow::Result;
use console::style;
use std::path::Path;

use waypoint::change::Change;
use waypoint::checkpoint::CheckpointStore;
use waypoint::config::Config;
use waypoint::errors::WorkflowError;
use waypoint::lock::ChangeLock;
use waypoint::tracker::StatusTracker;

use super::super::Cli;
use super::{interactive, load_config};

fn store_for(config: &Config, change_id: &str) -> CheckpointStore {
    CheckpointStore::new(
        config.change_dir(change_id),
        config.settings.checkpoints.exclude_patterns(),
    )
}

pub fn cmd_list_checkpoints(cli: &Cli, project_dir: &Path, change_id: &str) -> Result<()> {
    let config = load_config(cli, project_dir)?;
    Change::load(&config, change_id)?;
    let checkpoints = store_for(&config, change_id).list_checkpoints();

    if checkpoints.is_empty() {
        println!("No checkpoints for change {}.", change_id);
        return Ok(());
    }

    println!(
        "{:<36} {:<20} {:<8} {:>5}  {:<10} NOTES",
        "ID", "STAGE", "STATUS", "FILES", "REVISION"
    );
    for cp in &checkpoints {
        let status = if cp.success {
            style("success").green()
        } else {
            style("pending").yellow()
        };
        let revision = cp
            .revision_hash
            .as_deref()
            .map(|r| r.chars().take(10).collect::<String>())
            .unwrap_or_else(|| "-".to_string());
        let notes = match (&cp.rollback_of, &cp.notes) {
            (Some(target), _) => format!("backup before rollback to {}", target),
            (None, Some(notes)) => notes.clone(),
            (None, None) => String::new(),
        };
        println!(
            "{:<36} {:<20} {:<8} {:>5}  {:<10} {}",
            cp.id,
            format!("{:02} {}", cp.stage_number, cp.stage_name),
            status,
            cp.file_list.len(),
            revision,
            notes
        );
    }
    println!();
    println!("{} checkpoint(s)", checkpoints.len());
    Ok(())
}

/// Find the one change owning `checkpoint_id`.
fn locate_change(config: &Config, checkpoint_id: &str) -> Result<String, WorkflowError> {
    let ids = config.list_change_ids().map_err(WorkflowError::Other)?;
    let mut owners: Vec<String> = ids
        .into_iter()
        .filter(|id| {
            store_for(config, id)
                .load_state()
                .get(checkpoint_id)
                .is_some()
        })
        .collect();
    match owners.len() {
        0 => Err(WorkflowError::CheckpointNotFound(checkpoint_id.to_string())),
        1 => Ok(owners.remove(0)),
        _ => Err(WorkflowError::AmbiguousCheckpoint {
            id: checkpoint_id.to_string(),
            changes: owners,
        }),
    }
}

pub fn cmd_rollback(
    cli: &Cli,
    project_dir: &Path,
    checkpoint_id: &str,
    change: Option<&str>,
) -> Result<()> {
    use dialoguer::Confirm;
    use waypoint::capabilities::RevisionSource;
    use waypoint::tracker::GitTracker;

    let config = load_config(cli, project_dir)?;
    let change_id = match change {
        Some(id) => {
            Change::load(&config, id)?;
            id.to_string()
        }
        None => locate_change(&config, checkpoint_id)?,
    };
    let store = store_for(&config, &change_id);
    let preview = store.preview_rollback(checkpoint_id)?;

    println!(
        "Rolling back change {} to {} (stage {:02} {})",
        style(&change_id).bold(),
        style(&preview.target.id).cyan(),
        preview.target.stage_number,
        preview.target.stage_name
    );
    println!("  {} file(s) restored", preview.restore.len());
    for f in &preview.restore {
        println!("    {} {}", style("~").yellow(), f.display());
    }
    if !preview.remove.is_empty() {
        println!("  {} file(s) removed", preview.remove.len());
        for f in &preview.remove {
            println!("    {} {}", style("-").red(), f.display());
        }
    }
    println!("  The current files are saved in a backup checkpoint first.");

    if !config.assume_yes {
        if !interactive() {
            anyhow::bail!("Rollback needs confirmation. Re-run with --yes to proceed.");
        }
        let confirm = Confirm::new()
            .with_prompt("Proceed with rollback?")
            .default(false)
            .interact()?;
        if !confirm {
            println!("Rollback cancelled.");
            return Ok(());
        }
    }

    let _lock = ChangeLock::acquire(&config.change_state_dir(&change_id), &change_id)?;
    let revision = GitTracker::open(&config.project_dir).and_then(|g| g.current_revision());
    let report = store.rollback(checkpoint_id, revision)?;
    StatusTracker::new(&config.change_dir(&change_id), &change_id)
        .sync_checkpoints(&store.load_state())?;

    println!(
        "Restored {} file(s) and removed {} from {}.",
        report.restored.len(),
        report.removed.len(),
        report.target.id
    );
    println!("Backup checkpoint: {}", style(&report.backup.id).green());
    println!("Resume with: waypoint run {}", change_id);
    Ok(())
}

pub fn cmd_cleanup_checkpoints(
    cli: &Cli,
    project_dir: &Path,
    change_id: &str,
    keep: Option<usize>,
) -> Result<()> {
    let config = load_config(cli, project_dir)?;
    Change::load(&config, change_id)?;
    let keep = keep.unwrap_or(config.settings.checkpoints.retention);

    let _lock = ChangeLock::acquire(&config.change_state_dir(change_id), change_id)?;
    let store = store_for(&config, change_id);
    let removed = store.cleanup(keep)?;
    StatusTracker::new(&config.change_dir(change_id), change_id)
        .sync_checkpoints(&store.load_state())?;

    if removed.is_empty() {
        println!("Nothing to clean up (keeping {}).", keep);
    } else {
        println!("Removed {} checkpoint(s), kept the newest {}:", removed.len(), keep);
        for id in &removed {
            println!("  {}", id);
        }
    }
    Ok(())
}
