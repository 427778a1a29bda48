//! Hooks registered by default.

use anyhow::Result;
use async_trait::async_trait;

use super::types::{HookContext, HookResult, PreStepHook};
use crate::change::validate_change_id;
use crate::stage::VALIDATION_STAGE;
use crate::tracker::StageState;

/// Pre-stage-0: the project and change directories are usable.
pub struct SanityCheckHook;

#[async_trait]
impl PreStepHook for SanityCheckHook {
    fn name(&self) -> &str {
        "sanity-check"
    }

    async fn run(&self, ctx: &HookContext) -> Result<HookResult> {
        if !ctx.project_dir.is_dir() {
            return Ok(HookResult::fail(
                format!("project directory {} is missing", ctx.project_dir.display()),
                "run waypoint from an initialized project (waypoint init)",
            ));
        }
        if let Err(e) = validate_change_id(&ctx.change.id) {
            return Ok(HookResult::fail(
                e.to_string(),
                "create the change again with a filesystem-safe id",
            ));
        }
        if ctx.change.title.trim().is_empty() {
            return Ok(HookResult::fail(
                "change has no title",
                format!("set a title in {}/.waypoint/change.json", ctx.change_dir.display()),
            ));
        }
        if !ctx.change_dir.is_dir() {
            return Ok(HookResult::fail(
                format!("change directory {} is missing", ctx.change_dir.display()),
                format!("waypoint new {} --title <title>", ctx.change.id),
            ));
        }
        Ok(HookResult::pass())
    }
}

/// Pre-stage-10: the validation stage succeeded, or the lane skipped it.
pub struct ReviewGateHook;

#[async_trait]
impl PreStepHook for ReviewGateHook {
    fn name(&self) -> &str {
        "review-gate"
    }

    async fn run(&self, ctx: &HookContext) -> Result<HookResult> {
        match ctx.status.state_of(VALIDATION_STAGE) {
            StageState::Success | StageState::Skipped => Ok(HookResult::pass()),
            other => Ok(HookResult::fail(
                format!("quality gates (stage {VALIDATION_STAGE:02}) are {other}"),
                format!(
                    "fix the gate failures and re-run: waypoint run {}",
                    ctx.change.id
                ),
            )),
        }
    }
}
