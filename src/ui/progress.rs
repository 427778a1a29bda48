use console::style;
use indicatif::{MultiProgress, ProgressBar, ProgressStyle};
use std::time::Duration;

use crate::capabilities::ProgressReporter;
use crate::gates::{GateStatus, QualityGateResult};
use crate::lane::LaneConfig;
use crate::stage::{Stage, stages_from};
use crate::ui::icons::{CHECK, CROSS, GATE, RUNNING, SKIP, SPARKLE};

/// Terminal UI for a pipeline run, rendered via `indicatif` progress bars.
///
/// Two bars are stacked vertically:
/// - Stage bar: how many of the lane's remaining stages have finished
/// - Step bar: spinner with the stage currently running
///
/// Per-stage lines are printed above the bars through `MultiProgress`.
pub struct PipelineUI {
    multi: MultiProgress,
    stage_bar: ProgressBar,
    step_bar: ProgressBar,
    verbose: bool,
}

impl PipelineUI {
    pub fn new(verbose: bool) -> Self {
        let multi = MultiProgress::new();

        let stage_style = ProgressStyle::default_bar()
            .template("{prefix:.bold.dim} [{bar:40.cyan/blue}] {pos}/{len} {msg}")
            .expect("progress bar template is a valid static string")
            .progress_chars("█▓▒░");

        let stage_bar = multi.add(ProgressBar::new(0));
        stage_bar.set_style(stage_style);
        stage_bar.set_prefix("Stages");

        let step_style = ProgressStyle::default_spinner()
            .template("{prefix:.bold.dim} {spinner} {msg}")
            .expect("progress bar template is a valid static string");

        let step_bar = multi.add(ProgressBar::new_spinner());
        step_bar.set_style(step_style);
        step_bar.set_prefix("   Now");

        Self {
            multi,
            stage_bar,
            step_bar,
            verbose,
        }
    }

    /// Print a line via `MultiProgress`, falling back to `eprintln!` if the rich UI fails.
    fn print_line(&self, msg: impl AsRef<str>) {
        if self.multi.println(msg.as_ref()).is_err() {
            eprintln!("{}", msg.as_ref());
        }
    }

    fn stage_tag(stage: &Stage) -> String {
        format!("{:02}", stage.number)
    }
}

impl ProgressReporter for PipelineUI {
    fn run_started(&self, change_id: &str, lane: &LaneConfig, first_stage: u8) {
        let remaining = stages_from(first_stage)
            .filter(|s| lane.includes(s.number))
            .count();
        self.stage_bar.set_length(remaining as u64);
        self.stage_bar.set_position(0);
        self.stage_bar
            .set_message(format!("{} [{}]", style(change_id).bold(), lane.name));
        self.print_line(format!("{}", style("═".repeat(70)).cyan()));
        self.print_line(format!(
            "{} Change {} in the {} lane, starting at stage {:02}",
            style("▶").green().bold(),
            style(change_id).yellow().bold(),
            style(lane.name).cyan(),
            first_stage
        ));
        self.print_line(format!("{}", style("═".repeat(70)).cyan()));
    }

    fn stage_started(&self, stage: &Stage) {
        self.step_bar.set_message(format!(
            "{} {} {}",
            style(Self::stage_tag(stage)).yellow(),
            stage.name,
            style(format!("({})", stage.description)).dim()
        ));
        self.step_bar.enable_steady_tick(Duration::from_millis(100));
        if self.verbose {
            self.print_line(format!(
                "    {}{} {}",
                RUNNING,
                Self::stage_tag(stage),
                style(stage.description).dim()
            ));
        }
    }

    fn stage_skipped(&self, stage: &Stage, reason: &str) {
        if self.verbose {
            self.print_line(format!(
                "    {}{} {} {}",
                SKIP,
                Self::stage_tag(stage),
                stage.name,
                style(format!("({})", reason)).dim()
            ));
        }
    }

    fn stage_finished(&self, stage: &Stage, success: bool, detail: &str) {
        self.step_bar.disable_steady_tick();
        if success {
            self.stage_bar.inc(1);
            self.print_line(format!(
                "  {}Stage {} {} {}",
                CHECK,
                style(Self::stage_tag(stage)).green(),
                stage.name,
                style(detail).dim()
            ));
        } else {
            self.print_line(format!(
                "  {}Stage {} {} failed: {}",
                CROSS,
                style(Self::stage_tag(stage)).red().bold(),
                stage.name,
                detail
            ));
        }
    }

    fn gate_result(&self, result: &QualityGateResult) {
        let status = match result.status {
            GateStatus::Pass => style(result.status.to_string()).green(),
            GateStatus::Fail => style(result.status.to_string()).red().bold(),
            GateStatus::Skip => style(result.status.to_string()).dim(),
        };
        self.print_line(format!(
            "    {}{:<10} {} {}",
            GATE,
            result.gate_name,
            status,
            style(&result.message).dim()
        ));
        if result.status == GateStatus::Fail
            && let Some(hint) = &result.remediation_hint
        {
            self.print_line(format!("      {} {}", style("hint:").yellow(), hint));
        }
    }

    fn run_finished(&self, completed: bool) {
        if completed {
            self.step_bar
                .finish_with_message(format!("{}all stages complete", SPARKLE));
            self.stage_bar.finish();
        } else {
            self.step_bar.abandon_with_message(format!("{}run halted", CROSS));
            self.stage_bar.abandon();
        }
    }
}
