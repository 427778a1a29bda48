use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use std::path::{Path, PathBuf};
use tracing::{info, warn};

use crate::checkpoint::CheckpointState;
use crate::errors::WorkflowError;
use crate::lane::{LaneConfig, LaneName};
use crate::stage::get_stage;
use crate::util::{STATE_DIR, quarantine, read_json, write_json_atomic};

const STATUS_FILE: &str = "status.json";

/// Free-form per-stage metrics.
pub type Metrics = BTreeMap<String, serde_json::Value>;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum StageState {
    #[default]
    Pending,
    Running,
    Success,
    Failed,
    Skipped,
}

impl StageState {
    pub fn as_str(&self) -> &'static str {
        match self {
            StageState::Pending => "pending",
            StageState::Running => "running",
            StageState::Success => "success",
            StageState::Failed => "failed",
            StageState::Skipped => "skipped",
        }
    }
}

impl std::fmt::Display for StageState {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.as_str())
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct StageStatus {
    pub stage_name: String,
    #[serde(default)]
    pub description: String,
    pub status: StageState,
    #[serde(default)]
    pub start_time: Option<DateTime<Utc>>,
    #[serde(default)]
    pub end_time: Option<DateTime<Utc>>,
    #[serde(default)]
    pub duration_secs: Option<f64>,
    #[serde(default)]
    pub sla_compliant: bool,
    #[serde(default, skip_serializing_if = "BTreeMap::is_empty")]
    pub metrics: Metrics,
}

/// `duration < sla_target AND status == success`.
pub fn sla_compliant(duration_secs: f64, sla_target_secs: u64, status: StageState) -> bool {
    status == StageState::Success && duration_secs < sla_target_secs as f64
}

/// Durable per-change execution record.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct StatusRecord {
    pub change_id: String,
    #[serde(default)]
    pub lane: Option<LaneName>,
    #[serde(default)]
    pub sla_target_secs: u64,
    /// Keyed by stage number.
    #[serde(default)]
    pub stages: BTreeMap<u8, StageStatus>,
    #[serde(default)]
    pub checkpoint_count: usize,
    #[serde(default)]
    pub last_checkpoint_time: Option<DateTime<Utc>>,
}

impl StatusRecord {
    pub fn new(change_id: &str) -> Self {
        Self {
            change_id: change_id.to_string(),
            lane: None,
            sla_target_secs: 0,
            stages: BTreeMap::new(),
            checkpoint_count: 0,
            last_checkpoint_time: None,
        }
    }

    /// Stage currently marked running, if any (at most one by construction).
    pub fn running_stage(&self) -> Option<u8> {
        self.stages
            .iter()
            .find(|(_, s)| s.status == StageState::Running)
            .map(|(n, _)| *n)
    }

    /// True once any stage has started, succeeded or failed.
    pub fn has_started(&self) -> bool {
        self.stages.values().any(|s| {
            matches!(
                s.status,
                StageState::Running | StageState::Success | StageState::Failed
            )
        })
    }

    pub fn state_of(&self, stage: u8) -> StageState {
        self.stages
            .get(&stage)
            .map(|s| s.status)
            .unwrap_or_default()
    }
}

/// Records stage transitions for one change into `status.json`.
#[derive(Debug, Clone)]
pub struct StatusTracker {
    change_id: String,
    path: PathBuf,
}

impl StatusTracker {
    /// `change_dir` is the change working directory.
    pub fn new(change_dir: &Path, change_id: &str) -> Self {
        Self {
            change_id: change_id.to_string(),
            path: change_dir.join(STATE_DIR).join(STATUS_FILE),
        }
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    /// Current record. Absent means no history; malformed is reported and
    /// treated as no history.
    pub fn load(&self) -> StatusRecord {
        match read_json::<StatusRecord>(&self.path) {
            Ok(Some(record)) => record,
            Ok(None) => StatusRecord::new(&self.change_id),
            Err(e) => {
                warn!(
                    "{}; treating status history as empty",
                    WorkflowError::StateParse {
                        path: self.path.clone(),
                        message: format!("{e:#}"),
                    }
                );
                StatusRecord::new(&self.change_id)
            }
        }
    }

    fn load_for_update(&self) -> Result<StatusRecord, WorkflowError> {
        match read_json::<StatusRecord>(&self.path) {
            Ok(Some(record)) => Ok(record),
            Ok(None) => Ok(StatusRecord::new(&self.change_id)),
            Err(e) => {
                let moved = quarantine(&self.path)
                    .map_err(|q| WorkflowError::checkpoint_io("quarantine", &self.path, q))?;
                warn!(
                    "malformed status document ({e:#}); moved to {}",
                    moved.display()
                );
                Ok(StatusRecord::new(&self.change_id))
            }
        }
    }

    fn update<F>(&self, f: F) -> Result<StatusRecord, WorkflowError>
    where
        F: FnOnce(&mut StatusRecord),
    {
        let mut record = self.load_for_update()?;
        f(&mut record);
        write_json_atomic(&self.path, &record)
            .map_err(|e| WorkflowError::checkpoint_io("status write", &self.path, e))?;
        Ok(record)
    }

    /// Record the lane for the change.
    pub fn set_lane(&self, lane: &LaneConfig) -> Result<(), WorkflowError> {
        self.update(|r| {
            r.lane = Some(lane.name);
            r.sla_target_secs = lane.sla_target_secs;
        })?;
        Ok(())
    }

    pub fn start_stage(&self, stage: u8, description: &str) -> Result<(), WorkflowError> {
        let name = stage_name(stage);
        self.update(|r| {
            r.stages.insert(
                stage,
                StageStatus {
                    stage_name: name,
                    description: description.to_string(),
                    status: StageState::Running,
                    start_time: Some(Utc::now()),
                    end_time: None,
                    duration_secs: None,
                    sla_compliant: false,
                    metrics: Metrics::new(),
                },
            );
        })?;
        info!(change = %self.change_id, stage, "stage started");
        Ok(())
    }

    pub fn complete_stage(
        &self,
        stage: u8,
        success: bool,
        metrics: Metrics,
    ) -> Result<StageStatus, WorkflowError> {
        self.complete_stage_at(stage, success, metrics, Utc::now())
    }

    /// `complete_stage` with an explicit end time.
    pub fn complete_stage_at(
        &self,
        stage: u8,
        success: bool,
        metrics: Metrics,
        end_time: DateTime<Utc>,
    ) -> Result<StageStatus, WorkflowError> {
        let name = stage_name(stage);
        let record = self.update(|r| {
            let sla_target = r.sla_target_secs;
            let entry = r.stages.entry(stage).or_insert_with(|| StageStatus {
                stage_name: name,
                description: String::new(),
                status: StageState::Running,
                start_time: Some(end_time),
                end_time: None,
                duration_secs: None,
                sla_compliant: false,
                metrics: Metrics::new(),
            });
            let start = entry.start_time.unwrap_or(end_time);
            let duration = (end_time - start).num_milliseconds().max(0) as f64 / 1000.0;
            entry.status = if success {
                StageState::Success
            } else {
                StageState::Failed
            };
            entry.end_time = Some(end_time);
            entry.duration_secs = Some(duration);
            entry.sla_compliant = sla_compliant(duration, sla_target, entry.status);
            entry.metrics.extend(metrics);
        })?;

        let status = record.stages[&stage].clone();
        info!(
            change = %self.change_id,
            stage,
            status = %status.status,
            duration_secs = status.duration_secs.unwrap_or_default(),
            sla_compliant = status.sla_compliant,
            "stage completed"
        );
        Ok(status)
    }

    /// Record a stage the lane leaves out. Never checkpointed.
    pub fn skip_stage(&self, stage: u8, reason: &str) -> Result<(), WorkflowError> {
        let name = stage_name(stage);
        self.update(|r| {
            let mut metrics = Metrics::new();
            metrics.insert("reason".into(), reason.into());
            r.stages.insert(
                stage,
                StageStatus {
                    stage_name: name,
                    description: String::new(),
                    status: StageState::Skipped,
                    start_time: None,
                    end_time: None,
                    duration_secs: None,
                    sla_compliant: false,
                    metrics,
                },
            );
        })?;
        Ok(())
    }

    /// Copy checkpoint totals into the record.
    pub fn sync_checkpoints(&self, state: &CheckpointState) -> Result<(), WorkflowError> {
        let count = state.len();
        let last = state.latest().map(|c| c.timestamp);
        self.update(|r| {
            r.checkpoint_count = count;
            r.last_checkpoint_time = last;
        })?;
        Ok(())
    }
}

fn stage_name(stage: u8) -> String {
    get_stage(stage)
        .map(|s| s.name.to_string())
        .unwrap_or_else(|| format!("stage-{stage}"))
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::lane::LaneSelector;
    use chrono::Duration;
    use tempfile::{TempDir, tempdir};

    fn setup() -> (StatusTracker, TempDir) {
        let dir = tempdir().unwrap();
        (StatusTracker::new(dir.path(), "c1"), dir)
    }

    #[test]
    fn test_absent_document_is_empty_history() {
        let (tracker, _dir) = setup();
        let record = tracker.load();
        assert_eq!(record.change_id, "c1");
        assert!(record.stages.is_empty());
        assert!(!record.has_started());
    }

    #[test]
    fn test_start_then_complete_records_duration_and_sla() {
        let (tracker, _dir) = setup();
        let lane = LaneSelector::default().config_for(LaneName::Standard);
        tracker.set_lane(&lane).unwrap();

        tracker.start_stage(1, "Write proposal").unwrap();
        let record = tracker.load();
        assert_eq!(record.running_stage(), Some(1));
        let start = record.stages[&1].start_time.unwrap();

        let status = tracker
            .complete_stage_at(1, true, Metrics::new(), start + Duration::seconds(12))
            .unwrap();
        assert_eq!(status.status, StageState::Success);
        assert_eq!(status.duration_secs, Some(12.0));
        assert!(status.sla_compliant);
        assert_eq!(tracker.load().running_stage(), None);
    }

    #[test]
    fn test_sla_breach_and_failure_are_not_compliant() {
        let (tracker, _dir) = setup();
        let mut lane = LaneSelector::default().config_for(LaneName::Docs);
        lane.sla_target_secs = 10;
        tracker.set_lane(&lane).unwrap();

        tracker.start_stage(2, "").unwrap();
        let start = tracker.load().stages[&2].start_time.unwrap();
        let slow = tracker
            .complete_stage_at(2, true, Metrics::new(), start + Duration::seconds(10))
            .unwrap();
        assert!(!slow.sla_compliant, "duration equal to target is a breach");

        tracker.start_stage(3, "").unwrap();
        let start = tracker.load().stages[&3].start_time.unwrap();
        let failed = tracker
            .complete_stage_at(3, false, Metrics::new(), start + Duration::seconds(1))
            .unwrap();
        assert_eq!(failed.status, StageState::Failed);
        assert!(!failed.sla_compliant);
    }

    #[test]
    fn test_sla_rule() {
        for status in [
            StageState::Pending,
            StageState::Running,
            StageState::Failed,
            StageState::Skipped,
        ] {
            assert!(!sla_compliant(0.0, 100, status));
        }
        assert!(sla_compliant(99.9, 100, StageState::Success));
        assert!(!sla_compliant(100.0, 100, StageState::Success));
    }

    #[test]
    fn test_skip_and_metrics() {
        let (tracker, _dir) = setup();
        tracker.skip_stage(4, "not in docs lane").unwrap();
        assert_eq!(tracker.load().state_of(4), StageState::Skipped);
        assert_eq!(tracker.load().state_of(5), StageState::Pending);

        tracker.start_stage(5, "").unwrap();
        let mut metrics = Metrics::new();
        metrics.insert("checkpoint_count".into(), 3.into());
        let status = tracker.complete_stage(5, true, metrics).unwrap();
        assert_eq!(status.metrics["checkpoint_count"], 3);
    }

    #[test]
    fn test_malformed_status_recovers() {
        let (tracker, _dir) = setup();
        std::fs::create_dir_all(tracker.path().parent().unwrap()).unwrap();
        std::fs::write(tracker.path(), "{{{").unwrap();
        assert!(tracker.load().stages.is_empty());
        tracker.start_stage(0, "").unwrap();
        assert_eq!(tracker.load().running_stage(), Some(0));
    }
}
