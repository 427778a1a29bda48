//! Shared filesystem helpers for the waypoint crate.

use anyhow::{Context, Result};
use serde::Serialize;
use serde::de::DeserializeOwned;
use std::fs;
use std::path::{Path, PathBuf};
use walkdir::WalkDir;

/// Name of the per-change and per-project engine state directory.
pub const STATE_DIR: &str = ".waypoint";

/// Write `contents` to `path` by writing a sibling temp file and renaming it
/// over the target, so readers never observe a partial document.
pub fn write_atomic(path: &Path, contents: &[u8]) -> Result<()> {
    let dir = path.parent().unwrap_or(Path::new("."));
    fs::create_dir_all(dir)
        .with_context(|| format!("Failed to create directory: {}", dir.display()))?;

    let file_name = path
        .file_name()
        .map(|n| n.to_string_lossy().into_owned())
        .unwrap_or_else(|| "state".to_string());
    let tmp = dir.join(format!(".{}.tmp", file_name));

    fs::write(&tmp, contents)
        .with_context(|| format!("Failed to write temp file: {}", tmp.display()))?;
    if let Err(e) = fs::rename(&tmp, path) {
        let _ = fs::remove_file(&tmp);
        return Err(e).with_context(|| format!("Failed to move {} into place", path.display()));
    }
    Ok(())
}

/// Serialize `value` as pretty JSON and write it atomically.
pub fn write_json_atomic<T: Serialize>(path: &Path, value: &T) -> Result<()> {
    let json = serde_json::to_string_pretty(value).context("Failed to serialize JSON document")?;
    write_atomic(path, json.as_bytes())
}

/// Read a JSON document. `Ok(None)` when the file does not exist.
pub fn read_json<T: DeserializeOwned>(path: &Path) -> Result<Option<T>> {
    if !path.exists() {
        return Ok(None);
    }
    let content = fs::read_to_string(path)
        .with_context(|| format!("Failed to read {}", path.display()))?;
    if content.trim().is_empty() {
        return Ok(None);
    }
    let value = serde_json::from_str(&content)
        .with_context(|| format!("Failed to parse {}", path.display()))?;
    Ok(Some(value))
}

/// Move an unreadable document aside so a later write does not destroy it.
///
/// Returns the path it was moved to.
pub fn quarantine(path: &Path) -> Result<PathBuf> {
    let stamp = chrono::Utc::now().format("%Y%m%dT%H%M%S");
    let file_name = path
        .file_name()
        .map(|n| n.to_string_lossy().into_owned())
        .unwrap_or_default();
    let target = path.with_file_name(format!("{}.corrupt-{}", file_name, stamp));
    fs::rename(path, &target)
        .with_context(|| format!("Failed to move aside {}", path.display()))?;
    Ok(target)
}

/// List files under `root` as sorted relative paths, skipping the engine state
/// directory and anything matching one of `exclude` (glob patterns).
pub fn list_working_files(root: &Path, exclude: &[glob::Pattern]) -> Result<Vec<PathBuf>> {
    if !root.exists() {
        return Ok(Vec::new());
    }

    let mut files = Vec::new();
    let walker = WalkDir::new(root)
        .follow_links(false)
        .into_iter()
        .filter_entry(|e| e.depth() == 0 || e.file_name() != STATE_DIR);

    for entry in walker {
        let entry = entry.with_context(|| format!("Failed to walk {}", root.display()))?;
        if !entry.file_type().is_file() {
            continue;
        }
        let rel = entry
            .path()
            .strip_prefix(root)
            .with_context(|| format!("{} is outside {}", entry.path().display(), root.display()))?
            .to_path_buf();
        if exclude.iter().any(|p| p.matches_path(&rel)) {
            continue;
        }
        files.push(rel);
    }

    files.sort();
    Ok(files)
}

/// Copy `rel` from `from_root` to `to_root`, creating parent directories.
pub fn copy_relative(from_root: &Path, to_root: &Path, rel: &Path) -> Result<()> {
    let src = from_root.join(rel);
    let dst = to_root.join(rel);
    if let Some(parent) = dst.parent() {
        fs::create_dir_all(parent)
            .with_context(|| format!("Failed to create directory: {}", parent.display()))?;
    }
    fs::copy(&src, &dst)
        .with_context(|| format!("Failed to copy {} to {}", src.display(), dst.display()))?;
    Ok(())
}

/// Remove now-empty directories below `root` (never `root` itself or the state dir).
pub fn prune_empty_dirs(root: &Path) {
    let dirs: Vec<PathBuf> = WalkDir::new(root)
        .min_depth(1)
        .contents_first(true)
        .into_iter()
        .filter_entry(|e| e.file_name() != STATE_DIR)
        .filter_map(|e| e.ok())
        .filter(|e| e.file_type().is_dir())
        .map(|e| e.into_path())
        .collect();
    for dir in dirs {
        // Fails on non-empty directories, which is the point.
        let _ = fs::remove_dir(&dir);
    }
}
