//! Quality gates: external validation tools run at the validation stage.

pub mod parse;
pub mod runner;

pub use parse::TestReport;
pub use runner::QualityGateRunner;

use serde::{Deserialize, Serialize};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum GateCategory {
    Lint,
    Typecheck,
    Test,
    Security,
}

impl GateCategory {
    /// Run order.
    pub const ALL: [GateCategory; 4] = [
        GateCategory::Lint,
        GateCategory::Typecheck,
        GateCategory::Test,
        GateCategory::Security,
    ];

    pub fn name(&self) -> &'static str {
        match self {
            GateCategory::Lint => "lint",
            GateCategory::Typecheck => "typecheck",
            GateCategory::Test => "test",
            GateCategory::Security => "security",
        }
    }

    pub fn remediation_hint(&self) -> &'static str {
        match self {
            GateCategory::Lint => "re-run the formatter and fix the reported lint findings",
            GateCategory::Typecheck => "fix the reported type errors",
            GateCategory::Test => "fix the failing tests or add tests to raise coverage",
            GateCategory::Security => "review the flagged security findings",
        }
    }
}

impl std::fmt::Display for GateCategory {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.name())
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum GateStatus {
    Pass,
    Fail,
    Skip,
}

impl std::fmt::Display for GateStatus {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let s = match self {
            GateStatus::Pass => "pass",
            GateStatus::Fail => "fail",
            GateStatus::Skip => "skip",
        };
        write!(f, "{}", s)
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct QualityGateResult {
    pub gate_name: String,
    pub status: GateStatus,
    pub message: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub remediation_hint: Option<String>,
}

impl QualityGateResult {
    pub fn pass(category: GateCategory, message: impl Into<String>) -> Self {
        Self {
            gate_name: category.name().to_string(),
            status: GateStatus::Pass,
            message: message.into(),
            remediation_hint: None,
        }
    }

    pub fn fail(category: GateCategory, message: impl Into<String>) -> Self {
        Self {
            gate_name: category.name().to_string(),
            status: GateStatus::Fail,
            message: message.into(),
            remediation_hint: Some(category.remediation_hint().to_string()),
        }
    }

    pub fn skip(category: GateCategory, message: impl Into<String>) -> Self {
        Self {
            gate_name: category.name().to_string(),
            status: GateStatus::Skip,
            message: message.into(),
            remediation_hint: None,
        }
    }

    /// `name: status (message)`, used in reports and generated documents.
    pub fn summary(&self) -> String {
        format!("{}: {} ({})", self.gate_name, self.status, self.message)
    }
}

/// True when every result is `pass` or `skip`.
pub fn all_passed(results: &[QualityGateResult]) -> bool {
    results.iter().all(|r| r.status != GateStatus::Fail)
}

/// Results with `status == fail`.
pub fn failures(results: &[QualityGateResult]) -> Vec<&QualityGateResult> {
    results
        .iter()
        .filter(|r| r.status == GateStatus::Fail)
        .collect()
}
