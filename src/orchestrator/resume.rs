//! Deciding where a (re)invoked run starts.
//!
//! History is read from the checkpoint log, falling back to the status
//! record when checkpoints were disabled. A rollback resets history: only
//! checkpoints created after the most recent rollback backup count, and with
//! none of those the run resumes at the stage whose snapshot was restored.

use crate::checkpoint::{Checkpoint, CheckpointState};
use crate::tracker::{StageState, StatusRecord};

/// One choice offered after an unclean termination.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ResumeOption {
    /// Run the interrupted stage again from its current files.
    ResumeInterrupted { stage: u8 },
    /// Restore a checkpoint, then resume at its stage.
    RollbackTo { checkpoint_id: String, stage: u8 },
    Abort,
}

impl ResumeOption {
    pub fn label(&self) -> String {
        match self {
            ResumeOption::ResumeInterrupted { stage } => {
                format!("Resume at interrupted stage {:02}", stage)
            }
            ResumeOption::RollbackTo {
                checkpoint_id,
                stage,
            } => format!("Roll back to {} and resume at stage {:02}", checkpoint_id, stage),
            ResumeOption::Abort => "Abort".to_string(),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ResumptionDecision {
    FreshStart,
    /// Next stage to run. Past the last stage means nothing is left.
    ResumeFrom(u8),
    PromptUser {
        interrupted_stage: u8,
        last_success: Option<u8>,
        /// Default first.
        options: Vec<ResumeOption>,
    },
}

/// Checkpoints that still describe the working tree: those after the most
/// recent rollback backup, or all of them.
fn current_epoch(state: &CheckpointState) -> (Option<&Checkpoint>, Vec<&Checkpoint>) {
    let backup = state
        .checkpoints
        .iter()
        .filter(|c| c.rollback_of.is_some())
        .max_by(|a, b| a.id.cmp(&b.id));
    let epoch = state
        .checkpoints
        .iter()
        .filter(|c| backup.is_none_or(|b| c.id > b.id))
        .collect();
    (backup, epoch)
}

/// Highest-stage successful checkpoint of the current epoch. This is the
/// rollback target printed when a run halts.
pub fn last_good_checkpoint(state: &CheckpointState) -> Option<&Checkpoint> {
    let (_, epoch) = current_epoch(state);
    epoch
        .into_iter()
        .filter(|c| c.success)
        .max_by(|a, b| a.stage_number.cmp(&b.stage_number).then(a.id.cmp(&b.id)))
}

pub struct ResumptionPlanner;

impl ResumptionPlanner {
    pub fn plan(checkpoints: &CheckpointState, status: &StatusRecord) -> ResumptionDecision {
        let last_success = Self::last_success_stage(checkpoints, status);

        if let Some(stage) = status.running_stage() {
            let mut options = vec![ResumeOption::ResumeInterrupted { stage }];
            if let Some(target) = Self::rollback_target(checkpoints, stage) {
                options.push(ResumeOption::RollbackTo {
                    checkpoint_id: target.id.clone(),
                    stage: target.stage_number,
                });
            }
            options.push(ResumeOption::Abort);
            return ResumptionDecision::PromptUser {
                interrupted_stage: stage,
                last_success,
                options,
            };
        }

        if let Some(stage) = last_success {
            return ResumptionDecision::ResumeFrom(stage + 1);
        }
        let (backup, _) = current_epoch(checkpoints);
        if let Some(target) = backup
            .and_then(|b| b.rollback_of.as_deref())
            .and_then(|id| checkpoints.get(id))
        {
            return ResumptionDecision::ResumeFrom(target.stage_number);
        }
        ResumptionDecision::FreshStart
    }

    fn last_success_stage(checkpoints: &CheckpointState, status: &StatusRecord) -> Option<u8> {
        if checkpoints.is_empty() {
            // Checkpoints disabled: the status record is the only history.
            return status
                .stages
                .iter()
                .filter(|(_, s)| s.status == StageState::Success)
                .map(|(n, _)| *n)
                .max();
        }
        last_good_checkpoint(checkpoints).map(|c| c.stage_number)
    }

    /// The interrupted stage's own pre-stage checkpoint, else the last good one.
    fn rollback_target(checkpoints: &CheckpointState, stage: u8) -> Option<&Checkpoint> {
        let (_, epoch) = current_epoch(checkpoints);
        epoch
            .iter()
            .copied()
            .filter(|c| c.stage_number == stage && c.rollback_of.is_none())
            .max_by(|a, b| a.id.cmp(&b.id))
            .or_else(|| last_good_checkpoint(checkpoints))
    }
}
