//! Hook types for the pre-step hook system.
//!
//! - `HookContext`: what a hook sees about the change and its progress
//! - `HookResult`: a single hook's verdict
//! - `HookOutcome`: the aggregate verdict for one stage
//! - `PreStepHook`: the extension trait

use anyhow::Result;
use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use std::path::PathBuf;

use crate::change::Change;
use crate::tracker::StatusRecord;

/// Context passed to hooks before a stage runs.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct HookContext {
    pub stage: u8,
    pub change: Change,
    pub change_dir: PathBuf,
    pub project_dir: PathBuf,
    /// Status as of just before the stage starts.
    pub status: StatusRecord,
}

/// Result of one hook.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct HookResult {
    pub ok: bool,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub message: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub remediation: Option<String>,
}

impl HookResult {
    pub fn pass() -> Self {
        Self {
            ok: true,
            ..Default::default()
        }
    }

    pub fn fail(message: impl Into<String>, remediation: impl Into<String>) -> Self {
        Self {
            ok: false,
            message: Some(message.into()),
            remediation: Some(remediation.into()),
        }
    }
}

/// Aggregate of every hook registered for a stage.
#[derive(Debug, Clone, PartialEq)]
pub struct HookOutcome {
    pub ok: bool,
    /// Name of the hook that failed.
    pub hook: Option<String>,
    pub message: Option<String>,
    pub remediation: Option<String>,
}

impl HookOutcome {
    pub fn passed() -> Self {
        Self {
            ok: true,
            hook: None,
            message: None,
            remediation: None,
        }
    }

    pub fn failed(hook: &str, result: HookResult) -> Self {
        Self {
            ok: false,
            hook: Some(hook.to_string()),
            message: result.message,
            remediation: result.remediation,
        }
    }

    /// `hook: message` for a failed outcome.
    pub fn describe(&self) -> String {
        match (&self.hook, &self.message) {
            (Some(hook), Some(message)) => format!("pre-step hook '{}' failed: {}", hook, message),
            (Some(hook), None) => format!("pre-step hook '{}' failed", hook),
            _ => "pre-step hooks passed".to_string(),
        }
    }
}

/// A check run immediately before a stage.
#[async_trait]
pub trait PreStepHook: Send + Sync {
    fn name(&self) -> &str;

    async fn run(&self, ctx: &HookContext) -> Result<HookResult>;
}
