//! Pipeline execution: `waypoint run <change-id>`.

use anyhow::Result;
use console::style;
use std::path::Path;

use waypoint::checkpoint::CheckpointStore;
use waypoint::config::Config;
use waypoint::errors::WorkflowError;
use waypoint::orchestrator::{ResumeOption, RunOutcome, last_good_checkpoint};
use waypoint::stage::{get_stage, label};

use super::super::Cli;
use super::{interactive, load_config};

pub async fn cmd_run(
    cli: &Cli,
    project_dir: &Path,
    change_id: &str,
    lane: Option<String>,
    dry_run: bool,
    no_checkpoints: bool,
) -> Result<()> {
    use waypoint::capabilities::{Capabilities, NoProgress, ProgressReporter};
    use waypoint::orchestrator::{Orchestrator, RunOptions};
    use waypoint::ui::PipelineUI;

    let config = load_config(cli, project_dir)?;
    let progress: Box<dyn ProgressReporter> = if dry_run {
        Box::new(NoProgress)
    } else {
        Box::new(PipelineUI::new(cli.verbose))
    };
    let caps = Capabilities::detect(&config.project_dir).with_progress(progress);
    let orchestrator = Orchestrator::new(&config, &caps);

    let opts = RunOptions {
        lane_override: lane,
        dry_run,
        no_checkpoints,
    };
    let assume_yes = config.assume_yes;
    let choose = move |options: &[ResumeOption], last_success: Option<u8>| {
        choose_resume(options, last_success, assume_yes)
    };

    let outcome = match orchestrator.run(change_id, &opts, &choose).await {
        Ok(outcome) => outcome,
        Err(e) => {
            if !e.is_invalid_invocation() {
                print_recovery(&config, change_id, None);
            }
            return Err(e.into());
        }
    };

    match outcome {
        RunOutcome::DryRun {
            lane,
            lane_reason,
            start,
            skip,
            hooks,
            ..
        } => {
            println!("Dry run for change {}", style(change_id).bold());
            println!("  Lane:   {} ({})", style(lane.name).cyan(), lane_reason);
            println!("  Start:  stage {:02}", start);
            println!("  Run:");
            for (n, names) in &hooks {
                if names.is_empty() {
                    println!("    {}", label(*n));
                } else {
                    println!("    {}  (hooks: {})", label(*n), names.join(", "));
                }
            }
            if !skip.is_empty() {
                println!("  Skip:");
                for n in &skip {
                    println!("    {}", label(*n));
                }
            }
            Ok(())
        }
        RunOutcome::Completed {
            lane,
            executed,
            skipped,
        } => {
            if executed.is_empty() && skipped.is_empty() {
                println!("Change {} has already completed every stage.", change_id);
            } else {
                println!(
                    "Change {} complete in the {} lane: {} stage(s) run, {} skipped.",
                    style(change_id).bold(),
                    lane.name,
                    executed.len(),
                    skipped.len()
                );
            }
            Ok(())
        }
        RunOutcome::Halted {
            stage,
            stage_name,
            reason,
            interrupted,
            last_good,
        } => {
            println!();
            println!(
                "{} Stage {:02} ({}) {}: {}",
                style("Halted.").red().bold(),
                stage,
                stage_name,
                if interrupted { "was interrupted" } else { "failed" },
                reason
            );
            print_recovery(&config, change_id, Some(last_good.map(|c| c.id)));
            if interrupted {
                Err(WorkflowError::UserAbort.into())
            } else {
                Err(WorkflowError::StageFailed {
                    stage,
                    name: get_stage(stage).map(|s| s.name).unwrap_or("unknown"),
                    reason,
                }
                .into())
            }
        }
        RunOutcome::Aborted => {
            println!("Aborted. Nothing was run.");
            print_recovery(&config, change_id, None);
            Err(WorkflowError::UserAbort.into())
        }
    }
}

/// Resumption prompt: the default option under `--yes`, a `dialoguer`
/// selection on a terminal, an error otherwise.
fn choose_resume(
    options: &[ResumeOption],
    last_success: Option<u8>,
    assume_yes: bool,
) -> Result<ResumeOption, WorkflowError> {
    use dialoguer::{Select, theme::ColorfulTheme};

    let default = options.first().cloned().ok_or(WorkflowError::UserAbort)?;
    if assume_yes {
        return Ok(default);
    }
    if !interactive() {
        return Err(WorkflowError::Other(anyhow::anyhow!(
            "the previous run stopped mid-stage and no terminal is available to choose how to continue; \
             re-run with --yes to {}",
            default.label().to_lowercase()
        )));
    }

    println!(
        "The previous run stopped mid-stage. Last successful stage: {}",
        last_success.map(label).unwrap_or_else(|| "none".to_string())
    );
    let labels: Vec<String> = options.iter().map(ResumeOption::label).collect();
    let selection = Select::with_theme(&ColorfulTheme::default())
        .with_prompt("How do you want to continue?")
        .items(&labels)
        .default(0)
        .interact()
        .map_err(|e| WorkflowError::Other(e.into()))?;
    Ok(options[selection].clone())
}

/// Print the last good checkpoint and the commands that continue from here.
/// `known` skips reloading when the caller already has the answer.
fn print_recovery(config: &Config, change_id: &str, known: Option<Option<String>>) {
    let last_good = known.unwrap_or_else(|| {
        let store = CheckpointStore::new(
            config.change_dir(change_id),
            config.settings.checkpoints.exclude_patterns(),
        );
        last_good_checkpoint(&store.load_state()).map(|c| c.id.clone())
    });

    println!();
    match &last_good {
        Some(id) => println!("Last good checkpoint: {}", style(id).green()),
        None => println!("Last good checkpoint: none"),
    }
    println!("Next steps:");
    println!("  Resume:    waypoint run {}", change_id);
    if let Some(id) = last_good {
        println!("  Roll back: waypoint rollback {} --change {}", id, change_id);
    }
    println!("  Inspect:   waypoint status {} --format detailed", change_id);
}
