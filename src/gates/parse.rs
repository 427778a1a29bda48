//! Extract pass counts and coverage from test runner output.
//!
//! Two shapes are understood. A JSON object anywhere on its own line, with
//! any of `passed`, `failed`, `total` and `coverage` keys; or plain text
//! containing `N passed`, `N failed` and `coverage: X%`. Counts from several
//! text summaries (one per test binary, say) are summed.
//!
//! Text coverage is always a percentage. JSON `coverage` is a fraction, but
//! values above 1 are taken as a percentage.

use regex::Regex;
use serde::Deserialize;
use std::sync::LazyLock;

static PASSED_REGEX: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"(?i)\b(\d+)\s+(?:tests?\s+)?passed\b").unwrap());
static FAILED_REGEX: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"(?i)\b(\d+)\s+(?:tests?\s+)?failed\b").unwrap());
static COVERAGE_REGEX: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"(?i)coverage\D{0,20}?(\d+(?:\.\d+)?)\s*%").unwrap());

/// Metrics found in test output. `None` fields were not reported.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct TestReport {
    pub passed: Option<u64>,
    pub failed: Option<u64>,
    /// Fraction in `[0, 1]`.
    pub coverage: Option<f64>,
}

#[derive(Deserialize)]
struct JsonReport {
    passed: Option<u64>,
    failed: Option<u64>,
    total: Option<u64>,
    coverage: Option<f64>,
}

/// JSON coverage above 1 is a percentage.
fn normalize_json_coverage(value: f64) -> f64 {
    if value > 1.0 { value / 100.0 } else { value }
}

impl TestReport {
    pub fn parse(output: &str) -> Self {
        if let Some(report) = Self::parse_json(output) {
            return report;
        }
        Self::parse_text(output)
    }

    fn parse_json(output: &str) -> Option<Self> {
        output.lines().rev().find_map(|line| {
            let line = line.trim();
            if !line.starts_with('{') {
                return None;
            }
            let json: JsonReport = serde_json::from_str(line).ok()?;
            let failed = json.failed.or_else(|| {
                json.total
                    .zip(json.passed)
                    .map(|(total, passed)| total.saturating_sub(passed))
            });
            let report = TestReport {
                passed: json.passed,
                failed,
                coverage: json.coverage.map(normalize_json_coverage),
            };
            (report != TestReport::default()).then_some(report)
        })
    }

    fn parse_text(output: &str) -> Self {
        let sum = |re: &Regex| {
            let mut found = false;
            let total = re
                .captures_iter(output)
                .filter_map(|c| c[1].parse::<u64>().ok())
                .inspect(|_| found = true)
                .sum::<u64>();
            found.then_some(total)
        };
        let passed = sum(&PASSED_REGEX);
        let failed = sum(&FAILED_REGEX);
        let coverage = COVERAGE_REGEX
            .captures_iter(output)
            .filter_map(|c| c[1].parse::<f64>().ok())
            .last()
            .map(|percent| percent / 100.0);
        TestReport {
            passed,
            failed,
            coverage,
        }
    }

    pub fn has_metrics(&self) -> bool {
        self.pass_fraction().is_some() || self.coverage.is_some()
    }

    /// `passed / (passed + failed)`, when anything ran.
    pub fn pass_fraction(&self) -> Option<f64> {
        if self.passed.is_none() && self.failed.is_none() {
            return None;
        }
        let passed = self.passed.unwrap_or(0);
        let total = passed + self.failed.unwrap_or(0);
        (total > 0).then(|| passed as f64 / total as f64)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_pytest_style_summary() {
        let r = TestReport::parse("===== 6 passed, 4 failed in 0.12s =====\nTOTAL coverage: 72%");
        assert_eq!(r.passed, Some(6));
        assert_eq!(r.failed, Some(4));
        assert_eq!(r.pass_fraction(), Some(0.6));
        assert_eq!(r.coverage, Some(0.72));
    }

    #[test]
    fn test_cargo_summaries_are_summed() {
        let out = "test result: ok. 5 passed; 0 failed; 0 ignored\n\
                   test result: FAILED. 3 passed; 2 failed; 0 ignored\n";
        let r = TestReport::parse(out);
        assert_eq!(r.passed, Some(8));
        assert_eq!(r.failed, Some(2));
        assert!(r.coverage.is_none());
    }

    #[test]
    fn test_json_line() {
        let r = TestReport::parse("running...\n{\"passed\": 19, \"total\": 20, \"coverage\": 0.9}\n");
        assert_eq!(r.failed, Some(1));
        assert_eq!(r.pass_fraction(), Some(0.95));
        assert_eq!(r.coverage, Some(0.9));
    }

    #[test]
    fn test_small_text_coverage_stays_a_percentage() {
        let r = TestReport::parse("10 passed, 0 failed\ncoverage: 1%");
        assert_eq!(r.coverage, Some(0.01));
        let r = TestReport::parse("coverage: 0.5%");
        assert_eq!(r.coverage, Some(0.005));
    }

    #[test]
    fn test_json_coverage_as_percentage() {
        let r = TestReport::parse("{\"passed\": 3, \"coverage\": 85}");
        assert_eq!(r.coverage, Some(0.85));
    }

    #[test]
    fn test_no_metrics() {
        let r = TestReport::parse("all good\n");
        assert!(!r.has_metrics());
        assert_eq!(r.pass_fraction(), None);
        // "0 passed, 0 failed" ran nothing
        assert_eq!(TestReport::parse("0 passed, 0 failed").pass_fraction(), None);
    }
}
