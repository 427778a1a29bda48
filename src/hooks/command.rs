//! Hooks backed by an external command from `[[hooks]]` in waypoint.toml.
//!
//! The command runs in the change directory with the context in
//! environment variables. Exit 0 passes; any other exit, a timeout, or a
//! spawn failure fails the hook with the command's last output line as the
//! remediation hint.

use anyhow::Result;
use async_trait::async_trait;

use super::types::{HookContext, HookResult, PreStepHook};
use crate::process::run_command;
use crate::waypoint_config::HookSection;

pub struct CommandHook {
    name: String,
    command: Vec<String>,
    timeout_secs: u64,
}

impl CommandHook {
    pub fn new(name: impl Into<String>, command: Vec<String>, timeout_secs: u64) -> Self {
        Self {
            name: name.into(),
            command,
            timeout_secs,
        }
    }

    pub fn from_config(section: &HookSection) -> Self {
        let name = section.name.clone().unwrap_or_else(|| {
            section
                .command
                .first()
                .cloned()
                .unwrap_or_else(|| format!("stage-{}-hook", section.stage))
        });
        Self::new(name, section.command.clone(), section.timeout_secs)
    }
}

#[async_trait]
impl PreStepHook for CommandHook {
    fn name(&self) -> &str {
        &self.name
    }

    async fn run(&self, ctx: &HookContext) -> Result<HookResult> {
        let env = [
            ("WAYPOINT_CHANGE", ctx.change.id.clone()),
            ("WAYPOINT_STAGE", ctx.stage.to_string()),
            ("WAYPOINT_CHANGE_DIR", ctx.change_dir.display().to_string()),
            ("WAYPOINT_PROJECT_DIR", ctx.project_dir.display().to_string()),
        ];
        let outcome = match run_command(
            &self.name,
            &self.command,
            &ctx.change_dir,
            self.timeout_secs,
            &env,
        )
        .await
        {
            Ok(outcome) => outcome,
            Err(e) => {
                return Ok(HookResult::fail(
                    e.to_string(),
                    format!("check the command configured for hook '{}'", self.name),
                ));
            }
        };

        if outcome.success() {
            return Ok(HookResult::pass());
        }
        let remediation = outcome
            .last_line()
            .map(str::to_string)
            .unwrap_or_else(|| format!("resolve the condition checked by hook '{}'", self.name));
        Ok(HookResult::fail(
            outcome.describe_failure(self.timeout_secs),
            remediation,
        ))
    }
}
