//! Checkpoints: snapshots of a change's working files taken before each stage.
//!
//! # Layout
//!
//! ```text
//! <change>/.waypoint/
//! ├── checkpoints.json          # CheckpointState (JSON array)
//! └── snapshots/
//!     └── checkpoint-20251020-143025-step02/
//!         ├── proposal.md
//!         └── spec.md
//! ```
//!
//! # Ids
//!
//! `checkpoint-<YYYYMMDD-HHMMSS>-step<NN>`. The timestamp part is a logical
//! clock: when the wall clock has not advanced past the newest recorded id
//! (sub-second successive calls, clock skew), it is bumped to one second after
//! that id. Lexicographic id order therefore equals creation order.

pub mod store;

pub use store::{CheckpointStore, RollbackPreview, RollbackReport};

use chrono::{DateTime, Duration, NaiveDateTime, TimeZone, Utc};
use serde::{Deserialize, Serialize};
use std::path::PathBuf;

const ID_PREFIX: &str = "checkpoint-";
const ID_TIME_FORMAT: &str = "%Y%m%d-%H%M%S";

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Checkpoint {
    pub id: String,
    pub stage_number: u8,
    pub stage_name: String,
    pub timestamp: DateTime<Utc>,
    /// Captured files, relative to the change directory, sorted.
    pub file_list: Vec<PathBuf>,
    #[serde(default)]
    pub revision_hash: Option<String>,
    /// Set only after the guarded stage and its gates succeed.
    #[serde(default)]
    pub success: bool,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub notes: Option<String>,
    /// For backups taken by a rollback: the checkpoint that was restored.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub rollback_of: Option<String>,
}

/// Format a checkpoint id.
pub fn format_checkpoint_id(time: DateTime<Utc>, stage: u8) -> String {
    format!("{}{}-step{:02}", ID_PREFIX, time.format(ID_TIME_FORMAT), stage)
}

/// Extract the (logical) time encoded in a checkpoint id.
pub fn parse_checkpoint_time(id: &str) -> Option<DateTime<Utc>> {
    let rest = id.strip_prefix(ID_PREFIX)?;
    let (time, _) = rest.rsplit_once("-step")?;
    NaiveDateTime::parse_from_str(time, ID_TIME_FORMAT)
        .ok()
        .map(|t| Utc.from_utc_datetime(&t))
}

/// Per-change, append-only sequence of checkpoint records.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(transparent)]
pub struct CheckpointState {
    pub checkpoints: Vec<Checkpoint>,
}

impl CheckpointState {
    pub fn len(&self) -> usize {
        self.checkpoints.len()
    }

    pub fn is_empty(&self) -> bool {
        self.checkpoints.is_empty()
    }

    /// Sort by id, which is creation order.
    pub fn sort(&mut self) {
        self.checkpoints.sort_by(|a, b| a.id.cmp(&b.id));
    }

    pub fn get(&self, id: &str) -> Option<&Checkpoint> {
        self.checkpoints.iter().find(|c| c.id == id)
    }

    pub fn get_mut(&mut self, id: &str) -> Option<&mut Checkpoint> {
        self.checkpoints.iter_mut().find(|c| c.id == id)
    }

    pub fn latest(&self) -> Option<&Checkpoint> {
        self.checkpoints.iter().max_by(|a, b| a.id.cmp(&b.id))
    }

    /// Next id for `stage`, strictly greater than every existing id.
    pub fn next_id(&self, now: DateTime<Utc>, stage: u8) -> String {
        let mut time = now;
        if let Some(last) = self
            .checkpoints
            .iter()
            .filter_map(|c| parse_checkpoint_time(&c.id))
            .max()
        {
            let now_secs = now.timestamp();
            if now_secs <= last.timestamp() {
                time = last + Duration::seconds(1);
            }
        }
        format_checkpoint_id(time, stage)
    }

    /// Checkpoint of the highest-numbered stage with `success == true`.
    pub fn last_successful(&self) -> Option<&Checkpoint> {
        self.checkpoints
            .iter()
            .filter(|c| c.success)
            .max_by(|a, b| a.stage_number.cmp(&b.stage_number).then(a.id.cmp(&b.id)))
    }

    pub fn success_count(&self) -> usize {
        self.checkpoints.iter().filter(|c| c.success).count()
    }
}
