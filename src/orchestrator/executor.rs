//! Running one stage: hooks, checkpoint, logic, status, success mark.

use serde_json::json;
use std::path::{Path, PathBuf};
use tracing::{info, warn};

use crate::capabilities::{Capabilities, DocumentContext};
use crate::change::Change;
use crate::checkpoint::CheckpointStore;
use crate::config::Config;
use crate::errors::WorkflowError;
use crate::gates::{QualityGateResult, QualityGateRunner, all_passed, failures};
use crate::hooks::{HookContext, PreStepHookRegistry};
use crate::lane::LaneConfig;
use crate::process::run_command;
use crate::stage::{Stage, StageKind, VALIDATION_STAGE};
use crate::tracker::{Metrics, StatusTracker};
use crate::util::write_atomic;

/// What happened to one stage.
#[derive(Debug, Clone)]
pub struct StageReport {
    pub stage: u8,
    pub success: bool,
    /// Checkpoint guarding the stage, when one was taken.
    pub checkpoint: Option<String>,
    /// Failure reason, or a short result line.
    pub detail: String,
    pub gate_results: Vec<QualityGateResult>,
}

struct LogicResult {
    success: bool,
    detail: String,
    metrics: Metrics,
    gate_results: Vec<QualityGateResult>,
}

impl LogicResult {
    fn ok(detail: impl Into<String>) -> Self {
        Self {
            success: true,
            detail: detail.into(),
            metrics: Metrics::new(),
            gate_results: Vec::new(),
        }
    }

    fn failed(detail: impl Into<String>) -> Self {
        Self {
            success: false,
            ..Self::ok(detail)
        }
    }
}

/// Everything one stage needs, borrowed from the orchestrator.
pub struct StageExecutor<'a> {
    pub config: &'a Config,
    pub change: &'a Change,
    pub change_dir: PathBuf,
    pub lane: &'a LaneConfig,
    /// `None` when checkpoints are disabled for the run.
    pub store: Option<&'a CheckpointStore>,
    pub tracker: &'a StatusTracker,
    pub hooks: &'a PreStepHookRegistry,
    pub gates: &'a QualityGateRunner,
    pub caps: &'a Capabilities,
}

impl StageExecutor<'_> {
    /// Run `stage`. Stage failures are reported in the `StageReport`;
    /// `Err` means checkpoint or status persistence itself failed.
    pub async fn execute(&self, stage: &Stage) -> Result<StageReport, WorkflowError> {
        let status_before = self.tracker.load();
        self.tracker.start_stage(stage.number, stage.description)?;

        let ctx = HookContext {
            stage: stage.number,
            change: self.change.clone(),
            change_dir: self.change_dir.clone(),
            project_dir: self.config.project_dir.clone(),
            status: status_before,
        };
        let hooks = self.hooks.run_hooks(stage.number, &ctx).await;
        if !hooks.ok {
            let mut metrics = Metrics::new();
            metrics.insert("hook".into(), json!(hooks.hook));
            if let Some(remediation) = &hooks.remediation {
                metrics.insert("remediation".into(), json!(remediation));
            }
            self.tracker.complete_stage(stage.number, false, metrics)?;
            let mut detail = hooks.describe();
            if let Some(remediation) = hooks.remediation {
                detail = format!("{} (remediation: {})", detail, remediation);
            }
            return Ok(StageReport {
                stage: stage.number,
                success: false,
                checkpoint: None,
                detail,
                gate_results: Vec::new(),
            });
        }

        let revision = self.caps.revisions.current_revision();
        let checkpoint = match self.store {
            Some(store) => Some(store.create_checkpoint(stage.number, stage.name, revision.clone())?),
            None => None,
        };

        let mut result = self.run_logic(stage, revision).await;
        if let Some(cp) = &checkpoint {
            result.metrics.insert("checkpoint".into(), json!(cp.id));
        }
        self.tracker
            .complete_stage(stage.number, result.success, result.metrics)?;

        if result.success
            && let (Some(store), Some(cp)) = (self.store, &checkpoint)
        {
            store.mark_success(&cp.id)?;
        }

        if result.success {
            info!(stage = stage.number, name = stage.name, "{}", result.detail);
        } else {
            warn!(stage = stage.number, name = stage.name, "stage failed: {}", result.detail);
        }

        Ok(StageReport {
            stage: stage.number,
            success: result.success,
            checkpoint: checkpoint.map(|c| c.id),
            detail: result.detail,
            gate_results: result.gate_results,
        })
    }

    async fn run_logic(&self, stage: &Stage, revision: Option<String>) -> LogicResult {
        match stage.kind {
            StageKind::Setup => self.setup(),
            StageKind::Document { file } => self.write_document(stage, file, revision).await,
            StageKind::Implementation => self.implement().await,
            StageKind::QualityGates => self.run_gates().await,
        }
    }

    fn setup(&self) -> LogicResult {
        if let Err(e) = std::fs::create_dir_all(&self.change_dir) {
            return LogicResult::failed(format!(
                "cannot create {}: {}",
                self.change_dir.display(),
                e
            ));
        }
        LogicResult::ok(format!("workspace ready at {}", self.change_dir.display()))
    }

    /// Gate summaries recorded by the validation stage, for review documents.
    fn gate_notes(&self) -> Vec<String> {
        let record = self.tracker.load();
        record
            .stages
            .get(&VALIDATION_STAGE)
            .and_then(|s| s.metrics.get("gates"))
            .and_then(|v| serde_json::from_value::<Vec<QualityGateResult>>(v.clone()).ok())
            .map(|results| results.iter().map(QualityGateResult::summary).collect())
            .unwrap_or_default()
    }

    async fn write_document(
        &self,
        stage: &Stage,
        file: &str,
        revision: Option<String>,
    ) -> LogicResult {
        let ctx = DocumentContext {
            change: self.change,
            lane: self.lane,
            revision,
            notes: self.gate_notes(),
        };
        let content = match self.caps.documents.generate(stage, &ctx).await {
            Ok(content) => content,
            Err(e) => return LogicResult::failed(format!("document generation failed: {e:#}")),
        };
        let path = self.change_dir.join(file);
        if let Err(e) = write_atomic(&path, content.as_bytes()) {
            return LogicResult::failed(format!("cannot write {}: {e:#}", path.display()));
        }
        let mut result = LogicResult::ok(format!("wrote {}", file));
        result.metrics.insert("artifact".into(), json!(file));
        result.metrics.insert("bytes".into(), json!(content.len()));
        result
    }

    async fn implement(&self) -> LogicResult {
        let section = &self.config.settings.implementation;
        if section.command.is_empty() {
            let mut result = LogicResult::ok("no implementation command configured");
            result.metrics.insert("command".into(), json!(null));
            return result;
        }
        let env = env_for(self.change, &self.change_dir, &self.config.project_dir);
        match run_command(
            "implementation",
            &section.command,
            &self.config.project_dir,
            section.timeout_secs,
            &env,
        )
        .await
        {
            Ok(outcome) if outcome.success() => {
                let mut result = LogicResult::ok("implementation command succeeded");
                result.metrics.insert("exit_code".into(), json!(0));
                result
            }
            Ok(outcome) => {
                let mut result = LogicResult::failed(format!(
                    "implementation command {}",
                    outcome.describe_failure(section.timeout_secs)
                ));
                result
                    .metrics
                    .insert("exit_code".into(), json!(outcome.exit_code));
                result
                    .metrics
                    .insert("timed_out".into(), json!(outcome.timed_out));
                result
            }
            Err(e) => LogicResult::failed(e.to_string()),
        }
    }

    async fn run_gates(&self) -> LogicResult {
        let results = self.gates.run(self.lane, &self.config.project_dir).await;
        for r in &results {
            self.caps.progress.gate_result(r);
        }
        let passed = all_passed(&results);
        let failed: Vec<&str> = failures(&results)
            .into_iter()
            .map(|r| r.gate_name.as_str())
            .collect();
        let detail = if passed {
            "all quality gates passed".to_string()
        } else {
            let reasons: Vec<String> = failures(&results).into_iter().map(|r| r.summary()).collect();
            format!("quality gates failed: {}", reasons.join("; "))
        };

        let mut metrics = Metrics::new();
        metrics.insert("gates".into(), json!(results));
        metrics.insert("failed_gates".into(), json!(failed));
        LogicResult {
            success: passed,
            detail,
            metrics,
            gate_results: results,
        }
    }
}

fn env_for(change: &Change, change_dir: &Path, project_dir: &Path) -> Vec<(&'static str, String)> {
    vec![
        ("WAYPOINT_CHANGE", change.id.clone()),
        ("WAYPOINT_CHANGE_DIR", change_dir.display().to_string()),
        ("WAYPOINT_PROJECT_DIR", project_dir.display().to_string()),
    ]
}
