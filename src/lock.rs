//! Advisory per-change lock.
//!
//! Checkpoint and status documents are rewritten whole, so two processes
//! working on the same change would lose updates. Mutating commands hold an
//! exclusive `fs2` lock on `<change>/.waypoint/lock` for their duration.

use fs2::FileExt;
use std::fs::{File, OpenOptions};
use std::path::{Path, PathBuf};

use crate::errors::WorkflowError;

const LOCK_FILE: &str = "lock";

/// Held while a process mutates a change. Released on drop.
#[derive(Debug)]
pub struct ChangeLock {
    file: File,
    path: PathBuf,
}

impl ChangeLock {
    /// Try to take the lock without blocking.
    pub fn acquire(state_dir: &Path, change_id: &str) -> Result<Self, WorkflowError> {
        std::fs::create_dir_all(state_dir)
            .map_err(|e| WorkflowError::checkpoint_io("lock", state_dir, e))?;
        let path = state_dir.join(LOCK_FILE);
        let file = OpenOptions::new()
            .create(true)
            .truncate(false)
            .write(true)
            .open(&path)
            .map_err(|e| WorkflowError::checkpoint_io("lock", &path, e))?;

        match FileExt::try_lock_exclusive(&file) {
            Ok(()) => {
                tracing::debug!(change = change_id, path = %path.display(), "acquired change lock");
                Ok(Self { file, path })
            }
            Err(_) => Err(WorkflowError::ChangeLocked {
                change_id: change_id.to_string(),
                path,
            }),
        }
    }

    pub fn path(&self) -> &Path {
        &self.path
    }
}

impl Drop for ChangeLock {
    fn drop(&mut self) {
        let _ = FileExt::unlock(&self.file);
    }
}
