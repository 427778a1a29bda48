//! Status projections: `waypoint status <change-id>`.

use anyhow::Result;
use std::path::Path;

use super::super::Cli;
use super::load_config;

pub fn cmd_status(cli: &Cli, project_dir: &Path, change_id: &str, format: &str) -> Result<()> {
    use waypoint::change::Change;
    use waypoint::checkpoint::CheckpointStore;
    use waypoint::tracker::{StatusSummary, StatusTracker, StatusView, render};

    let view: StatusView = format.parse()?;
    let config = load_config(cli, project_dir)?;
    Change::load(&config, change_id)?;

    let change_dir = config.change_dir(change_id);
    let record = StatusTracker::new(&change_dir, change_id).load();
    let checkpoints =
        CheckpointStore::new(&change_dir, config.settings.checkpoints.exclude_patterns())
            .load_state();

    let summary = StatusSummary::build(&record, &checkpoints);
    print!("{}", render(&summary, view));
    Ok(())
}
