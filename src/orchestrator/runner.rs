use std::future::Future;
use std::path::PathBuf;
use tracing::{info, warn};

use super::executor::{StageExecutor, StageReport};
use super::resume::{ResumeOption, ResumptionDecision, ResumptionPlanner, last_good_checkpoint};
use crate::capabilities::Capabilities;
use crate::change::Change;
use crate::checkpoint::{Checkpoint, CheckpointState, CheckpointStore};
use crate::config::Config;
use crate::errors::WorkflowError;
use crate::gates::QualityGateRunner;
use crate::hooks::PreStepHookRegistry;
use crate::lane::{ChangeScope, LaneConfig, LaneSelector};
use crate::lock::ChangeLock;
use crate::stage::{LAST_STAGE, get_stage, stages_from};
use crate::tracker::{GitTracker, Metrics, StatusTracker};
use crate::util::STATE_DIR;

#[derive(Debug, Clone, Default)]
pub struct RunOptions {
    pub lane_override: Option<String>,
    pub dry_run: bool,
    pub no_checkpoints: bool,
}

/// Terminal state of a run.
#[derive(Debug, Clone)]
pub enum RunOutcome {
    /// Every remaining included stage succeeded.
    Completed {
        lane: LaneConfig,
        executed: Vec<u8>,
        skipped: Vec<u8>,
    },
    /// A stage failed or was interrupted.
    Halted {
        stage: u8,
        stage_name: String,
        reason: String,
        interrupted: bool,
        /// Rollback target: the last successful checkpoint.
        last_good: Option<Checkpoint>,
    },
    /// The user chose to abort at the resumption prompt.
    Aborted,
    /// Nothing executed; the plan that would have run.
    DryRun {
        lane: LaneConfig,
        lane_reason: String,
        start: u8,
        run: Vec<u8>,
        skip: Vec<u8>,
        /// Pre-step hooks per stage in `run`, in run order.
        hooks: Vec<(u8, Vec<String>)>,
    },
}

impl RunOutcome {
    pub fn is_success(&self) -> bool {
        matches!(self, RunOutcome::Completed { .. } | RunOutcome::DryRun { .. })
    }
}

/// Picks one option when a run was interrupted mid-stage.
pub type ResumeChooser<'a> = dyn Fn(&[ResumeOption], Option<u8>) -> Result<ResumeOption, WorkflowError> + 'a;

/// Drives one change through its lane's stages.
pub struct Orchestrator<'a> {
    config: &'a Config,
    caps: &'a Capabilities,
    hooks: PreStepHookRegistry,
    gates: QualityGateRunner,
    selector: LaneSelector,
}

impl<'a> Orchestrator<'a> {
    pub fn new(config: &'a Config, caps: &'a Capabilities) -> Self {
        Self {
            config,
            caps,
            hooks: PreStepHookRegistry::from_config(&config.settings.hooks),
            gates: QualityGateRunner::new(&config.settings.gates),
            selector: LaneSelector::new(config.settings.lanes.clone()),
        }
    }

    /// Replace the hook registry (extensions register their own hooks).
    pub fn with_hooks(mut self, hooks: PreStepHookRegistry) -> Self {
        self.hooks = hooks;
        self
    }

    fn store_for(&self, change_id: &str) -> CheckpointStore {
        CheckpointStore::new(
            self.config.change_dir(change_id),
            self.config.settings.checkpoints.exclude_patterns(),
        )
    }

    /// Scope of the project's uncommitted work, with the change description's
    /// risk markers. No repository yields an empty scope.
    fn change_scope(&self, change: &Change) -> ChangeScope {
        let excluded: Vec<PathBuf> = [&self.config.changes_dir, &self.config.state_dir]
            .iter()
            .filter_map(|p| p.strip_prefix(&self.config.project_dir).ok())
            .map(|p| p.to_path_buf())
            .collect();
        let scope = match GitTracker::open(&self.config.project_dir) {
            Some(git) => git.compute_scope(&excluded).unwrap_or_else(|e| {
                warn!("could not compute change scope: {e:#}");
                ChangeScope::default()
            }),
            None => ChangeScope::default(),
        };
        scope.with_description(&format!("{} {}", change.title, change.description))
    }

    /// Resolve the lane, honouring the lock once stages have run.
    fn resolve_lane(
        &self,
        change: &Change,
        started: bool,
        lane_override: Option<&str>,
    ) -> Result<(LaneConfig, String), WorkflowError> {
        if started && let Some(current) = change.lane {
            if let Some(raw) = lane_override {
                let requested = raw.parse::<crate::lane::LaneName>()?;
                if requested != current {
                    return Err(WorkflowError::LaneLocked {
                        change_id: change.id.clone(),
                        current: current.to_string(),
                        requested: requested.to_string(),
                    });
                }
            }
            let reason = change
                .lane_reason
                .clone()
                .unwrap_or_else(|| "recorded lane".to_string());
            return Ok((self.selector.config_for(current), reason));
        }

        if let Some(raw) = lane_override {
            let lane = self.selector.select(&ChangeScope::default(), Some(raw))?;
            match change.lane {
                Some(previous) if previous != lane.name => {
                    warn!(change = %change.id, from = %previous, to = %lane.name, "lane overridden before any stage ran");
                }
                _ => info!(change = %change.id, lane = %lane.name, "lane set by override"),
            }
            return Ok((lane, "override".to_string()));
        }
        if let Some(current) = change.lane {
            let reason = change
                .lane_reason
                .clone()
                .unwrap_or_else(|| "recorded lane".to_string());
            return Ok((self.selector.config_for(current), reason));
        }

        let scope = self.change_scope(change);
        let (name, reason) = LaneSelector::decide(&scope);
        info!(
            change = %change.id,
            lane = %name,
            files = scope.files_changed,
            lines = scope.lines_changed,
            "selected lane: {}",
            reason
        );
        Ok((self.selector.config_for(name), reason.to_string()))
    }

    /// Run with Ctrl-C as the interrupt and `choose` for resumption prompts.
    pub async fn run(
        &self,
        change_id: &str,
        opts: &RunOptions,
        choose: &ResumeChooser<'_>,
    ) -> Result<RunOutcome, WorkflowError> {
        let interrupt = async {
            if tokio::signal::ctrl_c().await.is_err() {
                std::future::pending::<()>().await;
            }
        };
        self.run_with_interrupt(change_id, opts, choose, interrupt)
            .await
    }

    /// Run until completion, a failed stage, or `interrupt` resolving.
    pub async fn run_with_interrupt<F>(
        &self,
        change_id: &str,
        opts: &RunOptions,
        choose: &ResumeChooser<'_>,
        interrupt: F,
    ) -> Result<RunOutcome, WorkflowError>
    where
        F: Future<Output = ()>,
    {
        Change::load(self.config, change_id)?;
        let change_dir = self.config.change_dir(change_id);
        // Planning reads the status and checkpoint history, so a real run
        // holds the lock before loading either.
        let _lock = if opts.dry_run {
            None
        } else {
            Some(ChangeLock::acquire(&change_dir.join(STATE_DIR), change_id)?)
        };
        let mut change = Change::load(self.config, change_id)?;
        let tracker = StatusTracker::new(&change_dir, change_id);
        let store = self.store_for(change_id);
        let use_checkpoints = !opts.no_checkpoints && self.config.settings.checkpoints.enabled;

        let status = tracker.load();
        let (lane, lane_reason) =
            self.resolve_lane(&change, status.has_started(), opts.lane_override.as_deref())?;
        let history = store.load_state();
        let decision = ResumptionPlanner::plan(&history, &status);

        if opts.dry_run {
            let start = match &decision {
                ResumptionDecision::FreshStart => 0,
                ResumptionDecision::ResumeFrom(n) => *n,
                ResumptionDecision::PromptUser {
                    interrupted_stage, ..
                } => *interrupted_stage,
            };
            let run: Vec<u8> = stages_from(start)
                .map(|s| s.number)
                .filter(|n| lane.includes(*n))
                .collect();
            let skip = lane
                .skipped_stages()
                .into_iter()
                .filter(|n| *n >= start)
                .collect();
            let hooks = run
                .iter()
                .map(|n| {
                    let names: Vec<String> =
                        self.hooks.hook_names(*n).into_iter().map(String::from).collect();
                    (*n, names)
                })
                .collect();
            return Ok(RunOutcome::DryRun {
                lane,
                lane_reason,
                start,
                run,
                skip,
                hooks,
            });
        }

        if change.lane != Some(lane.name) {
            change.lane = Some(lane.name);
            change.lane_reason = Some(lane_reason.clone());
            change.save(self.config)?;
        }
        tracker.set_lane(&lane)?;

        let start = match decision {
            ResumptionDecision::FreshStart => 0,
            ResumptionDecision::ResumeFrom(n) => n,
            ResumptionDecision::PromptUser {
                interrupted_stage,
                last_success,
                options,
            } => {
                info!(
                    change = change_id,
                    interrupted_stage, ?last_success, "previous run was interrupted"
                );
                let choice = choose(&options, last_success)?;
                let mut metrics = Metrics::new();
                metrics.insert("interrupted".into(), true.into());
                tracker.complete_stage(interrupted_stage, false, metrics)?;
                match choice {
                    ResumeOption::ResumeInterrupted { stage } => stage,
                    ResumeOption::RollbackTo {
                        checkpoint_id,
                        stage,
                    } => {
                        let report =
                            store.rollback(&checkpoint_id, self.caps.revisions.current_revision())?;
                        info!(
                            target = %report.target.id,
                            backup = %report.backup.id,
                            "rolled back before resuming"
                        );
                        stage
                    }
                    ResumeOption::Abort => return Ok(RunOutcome::Aborted),
                }
            }
        };

        if start > LAST_STAGE {
            info!(change = change_id, "all stages already complete");
            return Ok(RunOutcome::Completed {
                lane,
                executed: Vec::new(),
                skipped: Vec::new(),
            });
        }

        let executor = StageExecutor {
            config: self.config,
            change: &change,
            change_dir: change_dir.clone(),
            lane: &lane,
            store: use_checkpoints.then_some(&store),
            tracker: &tracker,
            hooks: &self.hooks,
            gates: &self.gates,
            caps: self.caps,
        };

        self.caps.progress.run_started(change_id, &lane, start);
        info!(change = change_id, lane = %lane.name, start, "run started");

        tokio::pin!(interrupt);
        let mut executed = Vec::new();
        let mut skipped = Vec::new();

        for stage in stages_from(start) {
            if !lane.includes(stage.number) {
                let reason = format!("not included in {} lane", lane.name);
                tracker.skip_stage(stage.number, &reason)?;
                self.caps.progress.stage_skipped(stage, &reason);
                skipped.push(stage.number);
                continue;
            }

            self.caps.progress.stage_started(stage);
            let report: StageReport = tokio::select! {
                report = executor.execute(stage) => report?,
                _ = &mut interrupt => {
                    warn!(change = change_id, stage = stage.number, "interrupted");
                    let mut metrics = Metrics::new();
                    metrics.insert("interrupted".into(), true.into());
                    tracker.complete_stage(stage.number, false, metrics)?;
                    tracker.sync_checkpoints(&store.load_state())?;
                    self.caps.progress.stage_finished(stage, false, "interrupted");
                    self.caps.progress.run_finished(false);
                    return Ok(halted(stage.number, "interrupted by user".into(), true, &store.load_state()));
                }
            };
            tracker.sync_checkpoints(&store.load_state())?;
            self.caps
                .progress
                .stage_finished(stage, report.success, &report.detail);

            if !report.success {
                self.caps.progress.run_finished(false);
                return Ok(halted(stage.number, report.detail, false, &store.load_state()));
            }
            executed.push(stage.number);
        }

        self.caps.progress.run_finished(true);
        info!(change = change_id, executed = executed.len(), skipped = skipped.len(), "run completed");
        Ok(RunOutcome::Completed {
            lane,
            executed,
            skipped,
        })
    }
}

fn halted(stage: u8, reason: String, interrupted: bool, state: &CheckpointState) -> RunOutcome {
    RunOutcome::Halted {
        stage,
        stage_name: get_stage(stage)
            .map(|s| s.name.to_string())
            .unwrap_or_default(),
        reason,
        interrupted,
        last_good: last_good_checkpoint(state).cloned(),
    }
}
