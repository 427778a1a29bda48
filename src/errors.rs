//! Typed error hierarchy for the waypoint orchestrator.
//!
//! `WorkflowError` is the only error type that crosses a component boundary
//! into the orchestrator. Component internals use `anyhow` with context and
//! translate at the edge (`CheckpointStore`, `QualityGateRunner`, `StatusTracker`).

use std::path::PathBuf;
use thiserror::Error;

/// Process exit code for a failed stage, failed tool, or I/O failure.
pub const EXIT_FAILURE: u8 = 1;
/// Process exit code for invalid user input (unknown ids, bad lane names).
pub const EXIT_INVALID_INVOCATION: u8 = 2;
/// Process exit code for a user-initiated interrupt.
pub const EXIT_USER_ABORT: u8 = 130;

/// Errors surfaced by waypoint components.
#[derive(Debug, Error)]
pub enum WorkflowError {
    #[error("Tool '{tool}' failed: {message}")]
    ToolInvocation { tool: String, message: String },

    #[error("Checkpoint {operation} failed at {path}: {source}")]
    CheckpointIo {
        operation: &'static str,
        path: PathBuf,
        #[source]
        source: anyhow::Error,
    },

    #[error("Failed to parse state document {path}: {message}")]
    StateParse { path: PathBuf, message: String },

    #[error("Invalid lane '{0}'. Valid values: docs, standard, heavy")]
    InvalidLaneOverride(String),

    #[error(
        "Lane for change '{change_id}' is fixed to '{current}' because stages have already run (requested '{requested}')"
    )]
    LaneLocked {
        change_id: String,
        current: String,
        requested: String,
    },

    #[error("Checkpoint '{0}' not found")]
    CheckpointNotFound(String),

    #[error("Checkpoint '{id}' exists in several changes ({}); pass --change to pick one", .changes.join(", "))]
    AmbiguousCheckpoint { id: String, changes: Vec<String> },

    #[error("Change '{0}' not found")]
    ChangeNotFound(String),

    #[error("Change '{0}' already exists")]
    ChangeExists(String),

    #[error("Invalid change id '{0}': use letters, digits, '.', '_' or '-' and do not start with '.'")]
    InvalidChangeId(String),

    #[error("Change '{change_id}' is locked by another waypoint process ({path})")]
    ChangeLocked { change_id: String, path: PathBuf },

    #[error("Stage {stage} ({name}) failed: {reason}")]
    StageFailed {
        stage: u8,
        name: &'static str,
        reason: String,
    },

    #[error("Interrupted by user")]
    UserAbort,

    #[error(transparent)]
    Other(#[from] anyhow::Error),
}

impl WorkflowError {
    /// Wrap a filesystem failure from a checkpoint operation.
    pub fn checkpoint_io(
        operation: &'static str,
        path: impl Into<PathBuf>,
        source: impl Into<anyhow::Error>,
    ) -> Self {
        WorkflowError::CheckpointIo {
            operation,
            path: path.into(),
            source: source.into(),
        }
    }

    /// True for errors caused by user input that must never be retried.
    pub fn is_invalid_invocation(&self) -> bool {
        matches!(
            self,
            WorkflowError::InvalidLaneOverride(_)
                | WorkflowError::LaneLocked { .. }
                | WorkflowError::CheckpointNotFound(_)
                | WorkflowError::AmbiguousCheckpoint { .. }
                | WorkflowError::ChangeNotFound(_)
                | WorkflowError::ChangeExists(_)
                | WorkflowError::InvalidChangeId(_)
                | WorkflowError::ChangeLocked { .. }
        )
    }

    pub fn exit_code(&self) -> u8 {
        if self.is_invalid_invocation() {
            EXIT_INVALID_INVOCATION
        } else if matches!(self, WorkflowError::UserAbort) {
            EXIT_USER_ABORT
        } else {
            EXIT_FAILURE
        }
    }
}

/// Pick the exit code for an arbitrary error chain.
///
/// Walks the `anyhow` chain looking for a `WorkflowError`; anything else is a
/// plain failure.
pub fn exit_code_for(err: &anyhow::Error) -> u8 {
    err.chain()
        .find_map(|cause| cause.downcast_ref::<WorkflowError>())
        .map(WorkflowError::exit_code)
        .unwrap_or(EXIT_FAILURE)
}
