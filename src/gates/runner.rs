use std::path::Path;
use tracing::{info, warn};

use super::parse::TestReport;
use super::{GateCategory, QualityGateResult};
use crate::lane::{LaneConfig, QualityThresholds};
use crate::process::{CommandOutcome, run_command};
use crate::waypoint_config::{GatesSection, GateToolsSection, ToolConfig};

/// Runs the configured validation tools for a lane.
///
/// Every gate runs even after an earlier one fails. A gate with no
/// configured tool reports `skip`.
#[derive(Debug, Clone)]
pub struct QualityGateRunner {
    tools: GateToolsSection,
    default_timeout_secs: u64,
}

impl QualityGateRunner {
    pub fn new(gates: &GatesSection) -> Self {
        Self {
            tools: gates.tools.clone(),
            default_timeout_secs: gates.timeout_secs,
        }
    }

    fn tool_for(&self, category: GateCategory) -> Option<&ToolConfig> {
        let tool = match category {
            GateCategory::Lint => self.tools.lint.as_ref(),
            GateCategory::Typecheck => self.tools.typecheck.as_ref(),
            GateCategory::Test => self.tools.test.as_ref(),
            GateCategory::Security => self.tools.security.as_ref(),
        };
        tool.filter(|t| !t.command.is_empty())
    }

    pub async fn run(&self, lane: &LaneConfig, working_dir: &Path) -> Vec<QualityGateResult> {
        let mut results = Vec::with_capacity(GateCategory::ALL.len());
        for category in GateCategory::ALL {
            let result = if !lane.gates_enabled {
                QualityGateResult::skip(category, format!("gates disabled for {} lane", lane.name))
            } else {
                match self.tool_for(category) {
                    Some(tool) => self.run_gate(category, tool, lane, working_dir).await,
                    None => QualityGateResult::skip(
                        category,
                        format!("no {} tool configured", category),
                    ),
                }
            };
            info!(gate = %result.gate_name, status = %result.status, "{}", result.message);
            results.push(result);
        }
        results
    }

    async fn run_gate(
        &self,
        category: GateCategory,
        tool: &ToolConfig,
        lane: &LaneConfig,
        working_dir: &Path,
    ) -> QualityGateResult {
        let timeout_secs = tool.timeout_secs.unwrap_or(self.default_timeout_secs);
        let env = [("WAYPOINT_LANE", lane.name.to_string())];
        let outcome = match run_command(
            category.name(),
            &tool.command,
            working_dir,
            timeout_secs,
            &env,
        )
        .await
        {
            Ok(outcome) => outcome,
            Err(e) => {
                warn!(gate = category.name(), "{}", e);
                return QualityGateResult::fail(category, e.to_string());
            }
        };

        if !outcome.success() {
            return QualityGateResult::fail(category, outcome.describe_failure(timeout_secs));
        }
        if category == GateCategory::Test {
            return evaluate_test_output(&outcome, &lane.quality_thresholds);
        }
        QualityGateResult::pass(category, "exited 0")
    }
}

/// Apply lane thresholds to a zero-exit test run. Thresholds only apply to
/// metrics the output actually reports.
fn evaluate_test_output(
    outcome: &CommandOutcome,
    thresholds: &QualityThresholds,
) -> QualityGateResult {
    let category = GateCategory::Test;
    let report = TestReport::parse(&format!("{}\n{}", outcome.stdout, outcome.stderr));
    if !report.has_metrics() {
        return QualityGateResult::pass(category, "exited 0 (no test metrics reported)");
    }

    let mut problems = Vec::new();
    let mut facts = Vec::new();
    if let Some(rate) = report.pass_fraction() {
        facts.push(format!("pass rate {:.1}%", rate * 100.0));
        if rate < thresholds.min_test_pass {
            problems.push(format!(
                "pass rate {:.1}% is below the lane minimum of {:.1}%",
                rate * 100.0,
                thresholds.min_test_pass * 100.0
            ));
        }
    }
    if let Some(coverage) = report.coverage {
        facts.push(format!("coverage {:.1}%", coverage * 100.0));
        if coverage < thresholds.min_coverage {
            problems.push(format!(
                "coverage {:.1}% is below the lane minimum of {:.1}%",
                coverage * 100.0,
                thresholds.min_coverage * 100.0
            ));
        }
    }

    if problems.is_empty() {
        QualityGateResult::pass(category, facts.join(", "))
    } else {
        QualityGateResult::fail(category, problems.join("; "))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::gates::{GateStatus, all_passed};
    use crate::lane::{LaneName, LaneSelector};
    use tempfile::tempdir;

    fn tool(script: &str) -> Option<ToolConfig> {
        Some(ToolConfig {
            command: vec!["sh".into(), "-c".into(), script.into()],
            timeout_secs: None,
        })
    }

    fn runner(tools: GateToolsSection) -> QualityGateRunner {
        QualityGateRunner::new(&GatesSection {
            timeout_secs: 5,
            tools,
        })
    }

    fn lane(name: LaneName) -> LaneConfig {
        LaneSelector::default().config_for(name)
    }

    #[tokio::test]
    async fn test_docs_lane_skips_everything() {
        let dir = tempdir().unwrap();
        let r = runner(GateToolsSection {
            lint: tool("exit 1"),
            ..Default::default()
        });
        let results = r.run(&lane(LaneName::Docs), dir.path()).await;
        assert_eq!(results.len(), 4);
        assert!(results.iter().all(|r| r.status == GateStatus::Skip));
        assert!(all_passed(&results));
    }

    #[tokio::test]
    async fn test_failure_does_not_stop_other_gates() {
        let dir = tempdir().unwrap();
        let r = runner(GateToolsSection {
            lint: tool("echo 'unused import' >&2; exit 1"),
            typecheck: tool("true"),
            test: tool("echo '10 passed, 0 failed'"),
            security: None,
        });
        let results = r.run(&lane(LaneName::Standard), dir.path()).await;
        let statuses: Vec<GateStatus> = results.iter().map(|r| r.status).collect();
        assert_eq!(
            statuses,
            vec![GateStatus::Fail, GateStatus::Pass, GateStatus::Pass, GateStatus::Skip]
        );
        assert_eq!(results[0].message, "exited with code 1: unused import");
        assert!(results[0].remediation_hint.is_some());
        assert!(!all_passed(&results));
    }

    #[tokio::test]
    async fn test_threshold_fails_zero_exit_test_run() {
        let dir = tempdir().unwrap();
        let r = runner(GateToolsSection {
            test: tool("echo '6 passed, 4 failed'; exit 0"),
            ..Default::default()
        });
        let results = r.run(&lane(LaneName::Standard), dir.path()).await;
        let test = results.iter().find(|r| r.gate_name == "test").unwrap();
        assert_eq!(test.status, GateStatus::Fail);
        assert!(test.message.contains("60.0%"), "{}", test.message);
        assert!(test.message.contains("80.0%"), "{}", test.message);
    }

    #[tokio::test]
    async fn test_one_percent_coverage_fails_threshold() {
        let dir = tempdir().unwrap();
        let r = runner(GateToolsSection {
            test: tool("echo '10 passed, 0 failed'; echo 'coverage: 1%'"),
            ..Default::default()
        });
        let results = r.run(&lane(LaneName::Standard), dir.path()).await;
        let test = results.iter().find(|r| r.gate_name == "test").unwrap();
        assert_eq!(test.status, GateStatus::Fail);
        assert!(test.message.contains("coverage 1.0% is below"), "{}", test.message);
    }

    #[tokio::test]
    async fn test_heavy_lane_is_stricter() {
        let dir = tempdir().unwrap();
        let r = runner(GateToolsSection {
            test: tool("echo '9 passed, 1 failed'; echo 'coverage: 90%'"),
            ..Default::default()
        });
        let standard = r.run(&lane(LaneName::Standard), dir.path()).await;
        assert!(all_passed(&standard));
        let heavy = r.run(&lane(LaneName::Heavy), dir.path()).await;
        assert!(!all_passed(&heavy));
    }

    #[tokio::test]
    async fn test_timeout_and_spawn_failure_fail_the_gate() {
        let dir = tempdir().unwrap();
        let r = runner(GateToolsSection {
            lint: Some(ToolConfig {
                command: vec!["sleep".into(), "5".into()],
                timeout_secs: Some(1),
            }),
            security: Some(ToolConfig {
                command: vec!["no-such-scanner-binary".into()],
                timeout_secs: None,
            }),
            ..Default::default()
        });
        let results = r.run(&lane(LaneName::Standard), dir.path()).await;
        assert_eq!(results[0].status, GateStatus::Fail);
        assert_eq!(results[0].message, "timed out after 1s");
        assert_eq!(results[3].status, GateStatus::Fail);
        assert!(results[3].message.contains("no-such-scanner-binary"));
    }
}
