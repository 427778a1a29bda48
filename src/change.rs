//! The Change record: one unit of work driven through the pipeline.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};

use crate::config::Config;
use crate::errors::WorkflowError;
use crate::lane::LaneName;
use crate::util::{read_json, write_json_atomic};

/// File name of the change record inside the change state directory.
pub const CHANGE_FILE: &str = "change.json";

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Change {
    pub id: String,
    pub title: String,
    #[serde(default)]
    pub owner: String,
    #[serde(default)]
    pub description: String,
    /// Chosen on the first run; fixed once a stage has executed.
    #[serde(default)]
    pub lane: Option<LaneName>,
    /// Why the lane was chosen (decision-tree reason or "override").
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub lane_reason: Option<String>,
    pub created_at: DateTime<Utc>,
}

/// Validate that a change id is safe to use as a directory name.
pub fn validate_change_id(id: &str) -> Result<(), WorkflowError> {
    let valid = !id.is_empty()
        && !id.starts_with('.')
        && id.len() <= 128
        && id
            .chars()
            .all(|c| c.is_ascii_alphanumeric() || matches!(c, '-' | '_' | '.'));
    if valid {
        Ok(())
    } else {
        Err(WorkflowError::InvalidChangeId(id.to_string()))
    }
}

impl Change {
    pub fn new(id: &str, title: &str, owner: &str, description: &str) -> Result<Self, WorkflowError> {
        validate_change_id(id)?;
        Ok(Self {
            id: id.to_string(),
            title: title.to_string(),
            owner: owner.to_string(),
            description: description.to_string(),
            lane: None,
            lane_reason: None,
            created_at: Utc::now(),
        })
    }

    fn record_path(config: &Config, id: &str) -> PathBuf {
        config.change_state_dir(id).join(CHANGE_FILE)
    }

    /// Create the change directory and its record. Fails if it already exists.
    pub fn create(config: &Config, change: &Change) -> Result<PathBuf, WorkflowError> {
        let path = Self::record_path(config, &change.id);
        if path.exists() {
            return Err(WorkflowError::ChangeExists(change.id.clone()));
        }
        change.save_to(&path)?;
        Ok(config.change_dir(&change.id))
    }

    /// Load a change by id.
    pub fn load(config: &Config, id: &str) -> Result<Change, WorkflowError> {
        validate_change_id(id).map_err(|_| WorkflowError::ChangeNotFound(id.to_string()))?;
        let path = Self::record_path(config, id);
        match read_json::<Change>(&path) {
            Ok(Some(change)) => Ok(change),
            Ok(None) => Err(WorkflowError::ChangeNotFound(id.to_string())),
            Err(e) => Err(WorkflowError::StateParse {
                path,
                message: format!("{e:#}"),
            }),
        }
    }

    pub fn save(&self, config: &Config) -> Result<(), WorkflowError> {
        self.save_to(&Self::record_path(config, &self.id))
    }

    fn save_to(&self, path: &Path) -> Result<(), WorkflowError> {
        write_json_atomic(path, self).map_err(WorkflowError::from)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::tempdir;

    fn config(dir: &Path) -> Config {
        Config::new(dir.to_path_buf(), false, true).unwrap()
    }

    #[test]
    fn test_validate_change_id() {
        assert!(validate_change_id("add-auth_v2.1").is_ok());
        for bad in ["", ".hidden", "../escape", "a/b", "with space"] {
            assert!(validate_change_id(bad).is_err(), "{bad}");
        }
    }

    #[test]
    fn test_create_and_load_roundtrip() {
        let dir = tempdir().unwrap();
        let config = config(dir.path());
        let change = Change::new("c1", "Add auth", "sam", "login flow").unwrap();
        let change_dir = Change::create(&config, &change).unwrap();
        assert!(change_dir.is_dir());

        let loaded = Change::load(&config, "c1").unwrap();
        assert_eq!(loaded, change);
        assert!(loaded.lane.is_none());
    }

    #[test]
    fn test_create_twice_is_change_exists() {
        let dir = tempdir().unwrap();
        let config = config(dir.path());
        let change = Change::new("c1", "t", "", "").unwrap();
        Change::create(&config, &change).unwrap();
        assert!(matches!(
            Change::create(&config, &change),
            Err(WorkflowError::ChangeExists(_))
        ));
    }

    #[test]
    fn test_load_unknown_is_change_not_found() {
        let dir = tempdir().unwrap();
        let config = config(dir.path());
        assert!(matches!(
            Change::load(&config, "missing"),
            Err(WorkflowError::ChangeNotFound(_))
        ));
        assert!(matches!(
            Change::load(&config, "../etc"),
            Err(WorkflowError::ChangeNotFound(_))
        ));
    }

    #[test]
    fn test_malformed_record_is_state_parse() {
        let dir = tempdir().unwrap();
        let config = config(dir.path());
        let path = config.change_state_dir("c1").join(CHANGE_FILE);
        std::fs::create_dir_all(path.parent().unwrap()).unwrap();
        std::fs::write(&path, "{not json").unwrap();
        assert!(matches!(
            Change::load(&config, "c1"),
            Err(WorkflowError::StateParse { .. })
        ));
    }
}
