//! Bounded subprocess execution from an argument vector.
//!
//! Commands are never assembled into shell strings. The child is spawned with
//! `kill_on_drop`, so dropping the future (timeout, or an interrupt racing the
//! stage) terminates it.

use std::path::Path;
use std::process::Stdio;
use std::time::Duration;
use tokio::process::Command;
use tokio::time::timeout;

use crate::errors::WorkflowError;

/// What a finished (or timed out) command produced.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CommandOutcome {
    /// `None` when killed by a signal or by the timeout.
    pub exit_code: Option<i32>,
    pub stdout: String,
    pub stderr: String,
    pub timed_out: bool,
}

impl CommandOutcome {
    pub fn success(&self) -> bool {
        !self.timed_out && self.exit_code == Some(0)
    }

    /// Last non-empty line of stderr, else of stdout.
    pub fn last_line(&self) -> Option<&str> {
        [&self.stderr, &self.stdout]
            .into_iter()
            .find_map(|s| s.lines().rev().map(str::trim).find(|l| !l.is_empty()))
    }

    /// One-line description of a failure.
    pub fn describe_failure(&self, timeout_secs: u64) -> String {
        if self.timed_out {
            return format!("timed out after {}s", timeout_secs);
        }
        let code = match self.exit_code {
            Some(code) => format!("exited with code {}", code),
            None => "terminated by signal".to_string(),
        };
        match self.last_line() {
            Some(line) => format!("{}: {}", code, line),
            None => code,
        }
    }
}

/// Run `argv` in `working_dir`, waiting at most `timeout_secs`.
///
/// A command that cannot be spawned (empty argv, missing executable) is a
/// `ToolInvocation` error; a nonzero exit or timeout is reported in the
/// outcome for the caller to classify.
pub async fn run_command(
    tool: &str,
    argv: &[String],
    working_dir: &Path,
    timeout_secs: u64,
    env: &[(&str, String)],
) -> Result<CommandOutcome, WorkflowError> {
    let Some((program, args)) = argv.split_first() else {
        return Err(WorkflowError::ToolInvocation {
            tool: tool.to_string(),
            message: "no command configured".to_string(),
        });
    };

    tracing::debug!(tool, ?argv, dir = %working_dir.display(), timeout_secs, "spawning command");

    let mut command = Command::new(program);
    command
        .args(args)
        .current_dir(working_dir)
        .stdin(Stdio::null())
        .stdout(Stdio::piped())
        .stderr(Stdio::piped())
        .kill_on_drop(true);
    for (key, value) in env {
        command.env(key, value);
    }

    let child = command.spawn().map_err(|e| WorkflowError::ToolInvocation {
        tool: tool.to_string(),
        message: format!("failed to start '{}': {}", program, e),
    })?;

    match timeout(Duration::from_secs(timeout_secs), child.wait_with_output()).await {
        Ok(Ok(output)) => {
            let outcome = CommandOutcome {
                exit_code: output.status.code(),
                stdout: String::from_utf8_lossy(&output.stdout).into_owned(),
                stderr: String::from_utf8_lossy(&output.stderr).into_owned(),
                timed_out: false,
            };
            tracing::debug!(tool, exit_code = ?outcome.exit_code, "command finished");
            Ok(outcome)
        }
        Ok(Err(e)) => Err(WorkflowError::ToolInvocation {
            tool: tool.to_string(),
            message: format!("failed to wait for '{}': {}", program, e),
        }),
        Err(_) => {
            tracing::warn!(tool, timeout_secs, "command timed out; killed");
            Ok(CommandOutcome {
                exit_code: None,
                stdout: String::new(),
                stderr: String::new(),
                timed_out: true,
            })
        }
    }
}
