use anyhow::{Context, Result};
use git2::{Delta, DiffOptions, Repository};
use std::path::{Path, PathBuf};

use crate::capabilities::RevisionSource;
use crate::lane::ChangeScope;

/// Version-control collaborator backed by `git2`.
pub struct GitTracker {
    repo: Repository,
}

impl GitTracker {
    pub fn new(project_dir: &Path) -> Result<Self> {
        let repo = Repository::open(project_dir).context("Failed to open git repository")?;
        Ok(Self { repo })
    }

    /// Open the repository if `project_dir` is one. Absence is not an error.
    pub fn open(project_dir: &Path) -> Option<Self> {
        match Self::new(project_dir) {
            Ok(tracker) => Some(tracker),
            Err(e) => {
                tracing::debug!("no git repository at {}: {e:#}", project_dir.display());
                None
            }
        }
    }

    /// Get the HEAD commit if it exists (returns None for unborn branches)
    fn get_head_commit(&self) -> Option<git2::Commit<'_>> {
        self.repo
            .head()
            .ok()
            .and_then(|head| head.peel_to_commit().ok())
    }

    /// Get current HEAD SHA (returns None for unborn branches)
    pub fn head_sha(&self) -> Option<String> {
        self.get_head_commit().map(|c| c.id().to_string())
    }

    /// Changed paths and lines between HEAD (or the empty tree) and the
    /// working directory, untracked files included. Paths under any of
    /// `excluded` (relative to the repository root) are ignored.
    pub fn compute_scope(&self, excluded: &[PathBuf]) -> Result<ChangeScope> {
        let head_tree = match self.get_head_commit() {
            Some(commit) => Some(commit.tree()?),
            None => None,
        };

        let mut opts = DiffOptions::new();
        opts.include_untracked(true).recurse_untracked_dirs(true);

        let diff = self
            .repo
            .diff_tree_to_workdir_with_index(head_tree.as_ref(), Some(&mut opts))?;

        let keep = |path: &Path| !excluded.iter().any(|e| path.starts_with(e));
        let mut paths: Vec<PathBuf> = Vec::new();
        let mut untracked: Vec<PathBuf> = Vec::new();
        let mut lines = 0usize;

        diff.foreach(
            &mut |delta, _progress| {
                let path = delta.new_file().path().or_else(|| delta.old_file().path());
                if let Some(path) = path
                    && keep(path)
                {
                    match delta.status() {
                        Delta::Untracked => {
                            untracked.push(path.to_path_buf());
                            paths.push(path.to_path_buf());
                        }
                        Delta::Added | Delta::Modified | Delta::Deleted | Delta::Renamed => {
                            paths.push(path.to_path_buf());
                        }
                        _ => {}
                    }
                }
                true
            },
            None,
            None,
            Some(&mut |delta, _hunk, line| {
                let counted = delta
                    .new_file()
                    .path()
                    .or_else(|| delta.old_file().path())
                    .is_some_and(keep);
                if counted && matches!(line.origin(), '+' | '-') {
                    lines += 1;
                }
                true
            }),
        )?;

        // The tree-to-workdir diff carries no line data for untracked files.
        if let Some(workdir) = self.repo.workdir() {
            for path in &untracked {
                if let Ok(content) = std::fs::read(workdir.join(path)) {
                    lines += String::from_utf8_lossy(&content).lines().count();
                }
            }
        }

        Ok(ChangeScope::from_paths(
            paths.iter().map(PathBuf::as_path),
            lines,
        ))
    }
}

impl RevisionSource for GitTracker {
    fn current_revision(&self) -> Option<String> {
        self.head_sha()
    }
}
