//! Static stage table for the change pipeline.
//!
//! Thirteen stages, numbered 0 through 12. Lanes select a subset; the order
//! here is the only execution order.

use serde::{Deserialize, Serialize};

/// Highest stage number.
pub const LAST_STAGE: u8 = 12;

/// Stage number of the quality-gate validation stage.
pub const VALIDATION_STAGE: u8 = 8;

/// Stage number guarded by the built-in review gate hook.
pub const PULL_REQUEST_STAGE: u8 = 10;

/// Whether a stage runs in every lane or only when the lane includes it.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum StageCategory {
    Always,
    Conditional,
}

/// What a stage does when it runs.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum StageKind {
    /// Prepare the change working directory.
    Setup,
    /// Ask the document generator for an artifact and write it to `file`.
    Document { file: &'static str },
    /// Run the configured implementation script.
    Implementation,
    /// Run the quality gates for the lane.
    QualityGates,
}

/// One numbered step of the pipeline.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Stage {
    pub number: u8,
    pub name: &'static str,
    pub description: &'static str,
    pub category: StageCategory,
    pub kind: StageKind,
}

const fn stage(
    number: u8,
    name: &'static str,
    description: &'static str,
    category: StageCategory,
    kind: StageKind,
) -> Stage {
    Stage {
        number,
        name,
        description,
        category,
        kind,
    }
}

use StageCategory::{Always, Conditional};

static STAGES: [Stage; 13] = [
    stage(0, "setup", "Prepare change workspace", Always, StageKind::Setup),
    stage(1, "proposal", "Write change proposal", Always, StageKind::Document { file: "proposal.md" }),
    stage(2, "spec", "Write spec delta", Always, StageKind::Document { file: "spec.md" }),
    stage(3, "tasks", "Break down tasks", Always, StageKind::Document { file: "tasks.md" }),
    stage(4, "test-plan", "Plan tests", Conditional, StageKind::Document { file: "test-plan.md" }),
    stage(5, "implementation", "Run scripted implementation", Conditional, StageKind::Implementation),
    stage(6, "security-review", "Review security impact", Conditional, StageKind::Document { file: "security-review.md" }),
    stage(7, "docs", "Update documentation", Always, StageKind::Document { file: "docs.md" }),
    stage(8, "quality-gates", "Run quality gates", Conditional, StageKind::QualityGates),
    stage(9, "review", "Prepare review notes", Conditional, StageKind::Document { file: "review.md" }),
    stage(10, "pull-request", "Draft pull request", Conditional, StageKind::Document { file: "pull-request.md" }),
    stage(11, "merge", "Record merge", Conditional, StageKind::Document { file: "merge.md" }),
    stage(12, "archive", "Archive change", Always, StageKind::Document { file: "archive.md" }),
];

/// All stages in execution order.
pub fn all_stages() -> &'static [Stage] {
    &STAGES
}

/// Look up a stage by number.
pub fn get_stage(number: u8) -> Option<&'static Stage> {
    STAGES.get(number as usize)
}

/// Stages with `number >= start`, in order.
pub fn stages_from(start: u8) -> impl Iterator<Item = &'static Stage> {
    STAGES.iter().filter(move |s| s.number >= start)
}

/// Human label used in logs and tables, e.g. `05 implementation`.
pub fn label(number: u8) -> String {
    match get_stage(number) {
        Some(s) => format!("{:02} {}", s.number, s.name),
        None => format!("{:02} <unknown>", number),
    }
}
