//! Durable checkpoint storage for one change.
//!
//! Every mutation is read-modify-write of `checkpoints.json`, persisted with
//! temp-file-then-rename. Snapshot directories are built under a `.partial`
//! name and renamed into place before the record that points at them is
//! written, so a crash never leaves a record without its snapshot.

use chrono::Utc;
use std::collections::BTreeSet;
use std::fs;
use std::path::{Path, PathBuf};
use tracing::{debug, info, warn};

use super::{Checkpoint, CheckpointState};
use crate::errors::WorkflowError;
use crate::util::{
    STATE_DIR, copy_relative, list_working_files, prune_empty_dirs, quarantine, read_json,
    write_json_atomic,
};

const STATE_FILE: &str = "checkpoints.json";
const SNAPSHOTS_DIR: &str = "snapshots";
const RESTORE_STAGING: &str = "restore.partial";

fn rollback_io(path: &Path, e: std::io::Error) -> WorkflowError {
    WorkflowError::checkpoint_io("rollback", path, e)
}

/// What a rollback would do, without doing it.
#[derive(Debug, Clone, PartialEq)]
pub struct RollbackPreview {
    pub target: Checkpoint,
    /// Files that will be written from the snapshot.
    pub restore: Vec<PathBuf>,
    /// Current files absent from the snapshot, removed (after backup).
    pub remove: Vec<PathBuf>,
}

/// Outcome of a completed rollback.
#[derive(Debug, Clone, PartialEq)]
pub struct RollbackReport {
    pub target: Checkpoint,
    /// Backup of the working files as they were before the rollback.
    pub backup: Checkpoint,
    pub restored: Vec<PathBuf>,
    pub removed: Vec<PathBuf>,
}

/// Checkpoint log and snapshots for a single change directory.
#[derive(Debug, Clone)]
pub struct CheckpointStore {
    work_dir: PathBuf,
    state_dir: PathBuf,
    exclude: Vec<glob::Pattern>,
}

impl CheckpointStore {
    /// `work_dir` is the change directory; state lives in `work_dir/.waypoint`.
    pub fn new(work_dir: impl Into<PathBuf>, exclude: Vec<glob::Pattern>) -> Self {
        let work_dir = work_dir.into();
        let state_dir = work_dir.join(STATE_DIR);
        Self {
            work_dir,
            state_dir,
            exclude,
        }
    }

    pub fn work_dir(&self) -> &Path {
        &self.work_dir
    }

    fn state_file(&self) -> PathBuf {
        self.state_dir.join(STATE_FILE)
    }

    fn snapshot_dir(&self, id: &str) -> PathBuf {
        self.state_dir.join(SNAPSHOTS_DIR).join(id)
    }

    /// Read the state. A malformed document is reported and treated as empty.
    pub fn load_state(&self) -> CheckpointState {
        match self.read_state() {
            Ok(state) => state,
            Err(e) => {
                warn!("{e}; treating checkpoint history as empty");
                CheckpointState::default()
            }
        }
    }

    fn read_state(&self) -> Result<CheckpointState, WorkflowError> {
        let path = self.state_file();
        match read_json::<CheckpointState>(&path) {
            Ok(Some(mut state)) => {
                state.sort();
                Ok(state)
            }
            Ok(None) => Ok(CheckpointState::default()),
            Err(e) => Err(WorkflowError::StateParse {
                path,
                message: format!("{e:#}"),
            }),
        }
    }

    /// Read for an update. A malformed document is moved aside first so the
    /// next write cannot destroy what a human might still recover by hand.
    fn load_for_update(&self) -> Result<CheckpointState, WorkflowError> {
        match self.read_state() {
            Ok(state) => Ok(state),
            Err(e) => {
                let path = self.state_file();
                let moved = quarantine(&path)
                    .map_err(|q| WorkflowError::checkpoint_io("quarantine", &path, q))?;
                warn!(
                    "{e}; moved to {} and starting a fresh checkpoint history",
                    moved.display()
                );
                Ok(CheckpointState::default())
            }
        }
    }

    fn persist(&self, state: &CheckpointState) -> Result<(), WorkflowError> {
        let path = self.state_file();
        write_json_atomic(&path, state).map_err(|e| WorkflowError::checkpoint_io("persist", path, e))
    }

    /// Snapshot the working files before `stage_number` runs.
    pub fn create_checkpoint(
        &self,
        stage_number: u8,
        stage_name: &str,
        revision_hash: Option<String>,
    ) -> Result<Checkpoint, WorkflowError> {
        self.create_inner(stage_number, stage_name, revision_hash, None, None)
    }

    fn create_inner(
        &self,
        stage_number: u8,
        stage_name: &str,
        revision_hash: Option<String>,
        notes: Option<String>,
        rollback_of: Option<String>,
    ) -> Result<Checkpoint, WorkflowError> {
        let files = list_working_files(&self.work_dir, &self.exclude)
            .map_err(|e| WorkflowError::checkpoint_io("capture", &self.work_dir, e))?;

        let mut state = self.load_for_update()?;
        let now = Utc::now();
        let id = state.next_id(now, stage_number);

        let final_dir = self.snapshot_dir(&id);
        let partial = final_dir.with_extension("partial");
        if partial.exists() {
            fs::remove_dir_all(&partial)
                .map_err(|e| WorkflowError::checkpoint_io("snapshot", &partial, e))?;
        }
        fs::create_dir_all(&partial)
            .map_err(|e| WorkflowError::checkpoint_io("snapshot", &partial, e))?;

        for rel in &files {
            if let Err(e) = copy_relative(&self.work_dir, &partial, rel) {
                let _ = fs::remove_dir_all(&partial);
                return Err(WorkflowError::checkpoint_io("snapshot", self.work_dir.join(rel), e));
            }
        }
        if let Err(e) = fs::rename(&partial, &final_dir) {
            let _ = fs::remove_dir_all(&partial);
            return Err(WorkflowError::checkpoint_io("snapshot", &final_dir, e));
        }

        let checkpoint = Checkpoint {
            id,
            stage_number,
            stage_name: stage_name.to_string(),
            timestamp: now,
            file_list: files,
            revision_hash,
            success: false,
            notes,
            rollback_of,
        };
        state.checkpoints.push(checkpoint.clone());
        if let Err(e) = self.persist(&state) {
            let _ = fs::remove_dir_all(&final_dir);
            return Err(e);
        }

        info!(
            checkpoint = %checkpoint.id,
            files = checkpoint.file_list.len(),
            "created checkpoint"
        );
        Ok(checkpoint)
    }

    /// Flip `success` on a checkpoint.
    pub fn mark_success(&self, checkpoint_id: &str) -> Result<Checkpoint, WorkflowError> {
        let mut state = self.load_for_update()?;
        let checkpoint = state
            .get_mut(checkpoint_id)
            .ok_or_else(|| WorkflowError::CheckpointNotFound(checkpoint_id.to_string()))?;
        checkpoint.success = true;
        let updated = checkpoint.clone();
        self.persist(&state)?;
        debug!(checkpoint = checkpoint_id, "marked checkpoint successful");
        Ok(updated)
    }

    /// All checkpoints in creation order.
    pub fn list_checkpoints(&self) -> Vec<Checkpoint> {
        self.load_state().checkpoints
    }

    pub fn get_latest(&self) -> Option<Checkpoint> {
        self.load_state().latest().cloned()
    }

    pub fn get(&self, checkpoint_id: &str) -> Result<Checkpoint, WorkflowError> {
        self.load_state()
            .get(checkpoint_id)
            .cloned()
            .ok_or_else(|| WorkflowError::CheckpointNotFound(checkpoint_id.to_string()))
    }

    /// Describe what `rollback` would change.
    pub fn preview_rollback(&self, checkpoint_id: &str) -> Result<RollbackPreview, WorkflowError> {
        let target = self.get(checkpoint_id)?;
        let current = list_working_files(&self.work_dir, &self.exclude)
            .map_err(|e| WorkflowError::checkpoint_io("capture", &self.work_dir, e))?;
        let keep: BTreeSet<&PathBuf> = target.file_list.iter().collect();
        let remove = current.into_iter().filter(|f| !keep.contains(f)).collect();
        Ok(RollbackPreview {
            restore: target.file_list.clone(),
            remove,
            target,
        })
    }

    /// Restore the working files to exactly the snapshot of `checkpoint_id`.
    ///
    /// The current files are captured in a new backup checkpoint first, so
    /// the rollback itself can be rolled back.
    pub fn rollback(
        &self,
        checkpoint_id: &str,
        revision_hash: Option<String>,
    ) -> Result<RollbackReport, WorkflowError> {
        let target = self.get(checkpoint_id)?;
        let snapshot = self.snapshot_dir(&target.id);
        if !snapshot.is_dir() {
            return Err(WorkflowError::checkpoint_io(
                "rollback",
                &snapshot,
                anyhow::anyhow!("snapshot directory is missing"),
            ));
        }

        // Stage every file first; the working tree is untouched if this fails.
        let staging = self.state_dir.join(RESTORE_STAGING);
        if staging.exists() {
            fs::remove_dir_all(&staging)
                .map_err(|e| WorkflowError::checkpoint_io("rollback", &staging, e))?;
        }
        for rel in &target.file_list {
            if let Err(e) = copy_relative(&snapshot, &staging, rel) {
                let _ = fs::remove_dir_all(&staging);
                return Err(WorkflowError::checkpoint_io("rollback", snapshot.join(rel), e));
            }
        }

        let backup = match self.create_inner(
            target.stage_number,
            &target.stage_name,
            revision_hash,
            Some(format!("pre-rollback backup before restoring {}", target.id)),
            Some(target.id.clone()),
        ) {
            Ok(b) => b,
            Err(e) => {
                let _ = fs::remove_dir_all(&staging);
                return Err(e);
            }
        };

        let result = self.place_files(&staging, &target.file_list, &backup.file_list, true);
        let _ = fs::remove_dir_all(&staging);
        let removed = match result {
            Ok(removed) => removed,
            Err(e) => {
                // Put back what was there before the rollback started.
                warn!(backup = %backup.id, "{e}; restoring the pre-rollback files");
                let current = list_working_files(&self.work_dir, &self.exclude).unwrap_or_default();
                let backup_dir = self.snapshot_dir(&backup.id);
                if let Err(undo) = self.place_files(&backup_dir, &backup.file_list, &current, false) {
                    warn!(backup = %backup.id, "could not restore pre-rollback files: {undo}");
                }
                return Err(e);
            }
        };

        info!(
            target = %target.id,
            backup = %backup.id,
            restored = target.file_list.len(),
            removed = removed.len(),
            "rolled back working files"
        );
        Ok(RollbackReport {
            restored: target.file_list.clone(),
            target,
            backup,
            removed,
        })
    }

    /// Make the working tree hold exactly `files` from `source`. Files in
    /// `current` but not in `files` are removed, as is anything sitting where
    /// a file or its parent directory must go. Staged files are moved, snapshot
    /// files copied. Returns the removed paths.
    fn place_files(
        &self,
        source: &Path,
        files: &[PathBuf],
        current: &[PathBuf],
        move_files: bool,
    ) -> Result<Vec<PathBuf>, WorkflowError> {
        let keep: BTreeSet<&PathBuf> = files.iter().collect();
        let mut removed = Vec::new();
        for rel in current {
            if keep.contains(rel) {
                continue;
            }
            let path = self.work_dir.join(rel);
            match fs::remove_file(&path) {
                Ok(()) => removed.push(rel.clone()),
                Err(e) if e.kind() == std::io::ErrorKind::NotFound => {}
                Err(e) => return Err(rollback_io(&path, e)),
            }
        }
        prune_empty_dirs(&self.work_dir);

        for rel in files {
            let dst = self.work_dir.join(rel);
            // A directory where a file belongs holds only excluded or already
            // backed-up files.
            if dst.is_dir() {
                fs::remove_dir_all(&dst).map_err(|e| rollback_io(&dst, e))?;
            }
            if let Some(parent) = dst.parent() {
                for ancestor in parent.ancestors() {
                    if ancestor == self.work_dir.as_path() {
                        break;
                    }
                    if ancestor.is_file() {
                        fs::remove_file(ancestor).map_err(|e| rollback_io(ancestor, e))?;
                    }
                }
                fs::create_dir_all(parent).map_err(|e| rollback_io(parent, e))?;
            }
            let src = source.join(rel);
            if move_files {
                fs::rename(&src, &dst).map_err(|e| rollback_io(&dst, e))?;
            } else {
                fs::copy(&src, &dst).map_err(|e| rollback_io(&dst, e))?;
            }
        }
        prune_empty_dirs(&self.work_dir);
        Ok(removed)
    }

    /// Keep the `keep_count` most recent checkpoints, deleting older snapshots
    /// and their records. Returns the removed ids, oldest first.
    pub fn cleanup(&self, keep_count: usize) -> Result<Vec<String>, WorkflowError> {
        let mut state = self.load_for_update()?;
        if keep_count >= state.len() {
            return Ok(Vec::new());
        }
        let drop_count = state.len() - keep_count;
        let dropped: Vec<Checkpoint> = state.checkpoints.drain(..drop_count).collect();

        for checkpoint in &dropped {
            let dir = self.snapshot_dir(&checkpoint.id);
            match fs::remove_dir_all(&dir) {
                Ok(()) => {}
                Err(e) if e.kind() == std::io::ErrorKind::NotFound => {}
                Err(e) => return Err(WorkflowError::checkpoint_io("cleanup", dir, e)),
            }
        }
        self.persist(&state)?;

        let ids: Vec<String> = dropped.into_iter().map(|c| c.id).collect();
        info!(removed = ids.len(), kept = state.len(), "cleaned up checkpoints");
        Ok(ids)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::{TempDir, tempdir};

    fn setup() -> (CheckpointStore, TempDir) {
        let dir = tempdir().unwrap();
        let store = CheckpointStore::new(dir.path(), Vec::new());
        (store, dir)
    }

    fn write(dir: &Path, rel: &str, content: &str) {
        let path = dir.join(rel);
        fs::create_dir_all(path.parent().unwrap()).unwrap();
        fs::write(path, content).unwrap();
    }

    #[test]
    fn test_empty_history() {
        let (store, _dir) = setup();
        assert!(store.list_checkpoints().is_empty());
        assert!(store.get_latest().is_none());
    }

    #[test]
    fn test_create_captures_files_and_persists_unsuccessful_record() {
        let (store, dir) = setup();
        write(dir.path(), "proposal.md", "p");
        write(dir.path(), "notes/a.md", "a");

        let cp = store
            .create_checkpoint(1, "proposal", Some("abc123".into()))
            .unwrap();
        assert!(!cp.success);
        assert_eq!(
            cp.file_list,
            vec![PathBuf::from("notes/a.md"), PathBuf::from("proposal.md")]
        );
        assert_eq!(cp.revision_hash.as_deref(), Some("abc123"));
        assert!(store.snapshot_dir(&cp.id).join("notes/a.md").exists());

        // Reopen: record survives.
        let reopened = CheckpointStore::new(dir.path(), Vec::new());
        assert_eq!(reopened.list_checkpoints(), vec![cp]);
    }

    #[test]
    fn test_snapshots_never_include_state_dir() {
        let (store, dir) = setup();
        write(dir.path(), "a.md", "a");
        store.create_checkpoint(0, "setup", None).unwrap();
        let second = store.create_checkpoint(1, "proposal", None).unwrap();
        assert_eq!(second.file_list, vec![PathBuf::from("a.md")]);
    }

    #[test]
    fn test_ids_strictly_increase_under_rapid_calls() {
        let (store, dir) = setup();
        write(dir.path(), "a.md", "a");
        let ids: Vec<String> = (0..5)
            .map(|i| store.create_checkpoint(i, "s", None).unwrap().id)
            .collect();
        for pair in ids.windows(2) {
            assert!(pair[0] < pair[1], "{} !< {}", pair[0], pair[1]);
        }
    }

    #[test]
    fn test_mark_success_and_unknown_id() {
        let (store, _dir) = setup();
        let cp = store.create_checkpoint(0, "setup", None).unwrap();
        assert!(store.mark_success(&cp.id).unwrap().success);
        assert!(store.get(&cp.id).unwrap().success);
        assert!(matches!(
            store.mark_success("checkpoint-nope"),
            Err(WorkflowError::CheckpointNotFound(_))
        ));
    }

    #[test]
    fn test_rollback_restores_exactly_and_creates_one_backup() {
        let (store, dir) = setup();
        write(dir.path(), "proposal.md", "v1");
        write(dir.path(), "spec.md", "s1");
        let target = store.create_checkpoint(2, "spec", None).unwrap();

        write(dir.path(), "proposal.md", "v2");
        write(dir.path(), "extra/new.md", "n");
        fs::remove_file(dir.path().join("spec.md")).unwrap();
        let before = store.list_checkpoints().len();

        let preview = store.preview_rollback(&target.id).unwrap();
        assert_eq!(preview.remove, vec![PathBuf::from("extra/new.md")]);

        let report = store.rollback(&target.id, None).unwrap();
        assert_eq!(store.list_checkpoints().len(), before + 1);
        assert!(report.backup.id > target.id);
        assert_eq!(report.backup.rollback_of.as_deref(), Some(target.id.as_str()));
        assert_eq!(report.removed, vec![PathBuf::from("extra/new.md")]);

        let files = list_working_files(dir.path(), &[]).unwrap();
        assert_eq!(files, target.file_list);
        assert_eq!(fs::read_to_string(dir.path().join("proposal.md")).unwrap(), "v1");
        assert_eq!(fs::read_to_string(dir.path().join("spec.md")).unwrap(), "s1");
        assert!(!dir.path().join("extra").exists());

        // The backup holds the pre-rollback state and can itself be restored.
        store.rollback(&report.backup.id, None).unwrap();
        assert_eq!(fs::read_to_string(dir.path().join("proposal.md")).unwrap(), "v2");
        assert!(dir.path().join("extra/new.md").exists());
    }

    #[test]
    fn test_rollback_over_directory_where_file_was() {
        let (store, dir) = setup();
        write(dir.path(), "a.md", "a1");
        write(dir.path(), "notes", "plain notes");
        write(dir.path(), "docs/guide.md", "g1");
        let target = store.create_checkpoint(3, "design", None).unwrap();

        fs::remove_file(dir.path().join("notes")).unwrap();
        write(dir.path(), "notes/x.md", "x");
        fs::remove_dir_all(dir.path().join("docs")).unwrap();
        write(dir.path(), "docs", "now a file");
        write(dir.path(), "a.md", "a2");

        let report = store.rollback(&target.id, None).unwrap();
        assert_eq!(
            report.removed,
            vec![PathBuf::from("docs"), PathBuf::from("notes/x.md")]
        );
        assert_eq!(fs::read_to_string(dir.path().join("a.md")).unwrap(), "a1");
        assert_eq!(fs::read_to_string(dir.path().join("notes")).unwrap(), "plain notes");
        assert_eq!(fs::read_to_string(dir.path().join("docs/guide.md")).unwrap(), "g1");
        assert_eq!(list_working_files(dir.path(), &[]).unwrap(), target.file_list);
        assert!(!dir.path().join(STATE_DIR).join(RESTORE_STAGING).exists());

        store.rollback(&report.backup.id, None).unwrap();
        assert_eq!(fs::read_to_string(dir.path().join("notes/x.md")).unwrap(), "x");
        assert_eq!(fs::read_to_string(dir.path().join("docs")).unwrap(), "now a file");
    }

    #[test]
    fn test_rollback_unknown_checkpoint() {
        let (store, _dir) = setup();
        assert!(matches!(
            store.rollback("checkpoint-20250101-000000-step00", None),
            Err(WorkflowError::CheckpointNotFound(_))
        ));
    }

    #[test]
    fn test_cleanup_keeps_most_recent() {
        let (store, dir) = setup();
        write(dir.path(), "a.md", "a");
        let ids: Vec<String> = (0..8)
            .map(|i| store.create_checkpoint(i, "s", None).unwrap().id)
            .collect();

        let removed = store.cleanup(5).unwrap();
        assert_eq!(removed, ids[..3].to_vec());
        let remaining: Vec<String> = store.list_checkpoints().into_iter().map(|c| c.id).collect();
        assert_eq!(remaining, ids[3..].to_vec());
        for id in &ids[..3] {
            assert!(!store.snapshot_dir(id).exists());
        }
        for id in &ids[3..] {
            assert!(store.snapshot_dir(id).exists());
        }
    }

    #[test]
    fn test_cleanup_noop_and_zero() {
        let (store, _dir) = setup();
        store.create_checkpoint(0, "s", None).unwrap();
        store.create_checkpoint(1, "s", None).unwrap();
        assert!(store.cleanup(2).unwrap().is_empty());
        assert!(store.cleanup(10).unwrap().is_empty());
        assert_eq!(store.cleanup(0).unwrap().len(), 2);
        assert!(store.list_checkpoints().is_empty());
    }

    #[test]
    fn test_malformed_state_is_empty_then_quarantined() {
        let (store, dir) = setup();
        let state_file = dir.path().join(STATE_DIR).join(STATE_FILE);
        fs::create_dir_all(state_file.parent().unwrap()).unwrap();
        fs::write(&state_file, "[{ broken").unwrap();

        assert!(store.list_checkpoints().is_empty());
        // Reads leave the file alone.
        assert_eq!(fs::read_to_string(&state_file).unwrap(), "[{ broken");

        store.create_checkpoint(0, "setup", None).unwrap();
        assert_eq!(store.list_checkpoints().len(), 1);
        let corrupt: Vec<_> = fs::read_dir(state_file.parent().unwrap())
            .unwrap()
            .filter_map(|e| e.ok())
            .filter(|e| e.file_name().to_string_lossy().contains("corrupt"))
            .collect();
        assert_eq!(corrupt.len(), 1);
    }
}
