//! Lanes: execution profiles selected from change scope.
//!
//! - `docs`: documentation-only changes; minimal stage set, no quality gates
//! - `standard`: every stage, moderate thresholds
//! - `heavy`: every stage, strict thresholds and a longer SLA budget

use serde::{Deserialize, Serialize};
use std::path::Path;

use crate::errors::WorkflowError;
use crate::stage::{LAST_STAGE, all_stages};
use crate::waypoint_config::{LaneOverride, LanesSection};

/// Files at or above this count push a change into the heavy lane.
pub const HEAVY_FILE_COUNT: usize = 20;
/// Changed lines at or above this count push a change into the heavy lane.
pub const HEAVY_LINE_COUNT: usize = 1000;
/// Minimum documentation share for a code-free change to count as docs-only.
pub const DOCS_FRACTION: f64 = 0.8;
/// Code-heavy changes with fewer tests per code file than this go heavy.
pub const LOW_TEST_RATIO: f64 = 0.2;
/// Code files needed before the test ratio is considered meaningful.
pub const TEST_RATIO_MIN_CODE_FILES: usize = 5;

/// Description words that force the heavy lane.
pub const RISK_MARKERS: &[&str] = &["breaking", "security"];

const DOCS_STAGES: &[u8] = &[0, 1, 2, 3, 7, 12];

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum LaneName {
    Docs,
    Standard,
    Heavy,
}

impl LaneName {
    pub fn as_str(&self) -> &'static str {
        match self {
            LaneName::Docs => "docs",
            LaneName::Standard => "standard",
            LaneName::Heavy => "heavy",
        }
    }
}

impl std::fmt::Display for LaneName {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.as_str())
    }
}

impl std::str::FromStr for LaneName {
    type Err = WorkflowError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_lowercase().as_str() {
            "docs" => Ok(LaneName::Docs),
            "standard" => Ok(LaneName::Standard),
            "heavy" => Ok(LaneName::Heavy),
            _ => Err(WorkflowError::InvalidLaneOverride(s.to_string())),
        }
    }
}

/// Minimum fractions the test runner output must reach.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct QualityThresholds {
    pub min_test_pass: f64,
    pub min_coverage: f64,
}

/// Resolved configuration of one lane.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct LaneConfig {
    pub name: LaneName,
    /// Stage numbers in ascending order.
    pub included_stages: Vec<u8>,
    pub quality_thresholds: QualityThresholds,
    pub gates_enabled: bool,
    pub sla_target_secs: u64,
}

impl LaneConfig {
    /// Built-in lane defaults with configured overrides applied.
    pub fn resolve(name: LaneName, overrides: &LanesSection) -> Self {
        let (stages, thresholds, gates_enabled, sla, o): (Vec<u8>, _, _, _, &LaneOverride) =
            match name {
                LaneName::Docs => (
                    DOCS_STAGES.to_vec(),
                    QualityThresholds {
                        min_test_pass: 0.0,
                        min_coverage: 0.0,
                    },
                    false,
                    600,
                    &overrides.docs,
                ),
                LaneName::Standard => (
                    (0..=LAST_STAGE).collect(),
                    QualityThresholds {
                        min_test_pass: 0.80,
                        min_coverage: 0.70,
                    },
                    true,
                    1800,
                    &overrides.standard,
                ),
                LaneName::Heavy => (
                    (0..=LAST_STAGE).collect(),
                    QualityThresholds {
                        min_test_pass: 0.95,
                        min_coverage: 0.85,
                    },
                    true,
                    3600,
                    &overrides.heavy,
                ),
            };

        Self {
            name,
            included_stages: stages,
            quality_thresholds: QualityThresholds {
                min_test_pass: o.min_test_pass.unwrap_or(thresholds.min_test_pass),
                min_coverage: o.min_coverage.unwrap_or(thresholds.min_coverage),
            },
            gates_enabled,
            sla_target_secs: o.sla_target_secs.unwrap_or(sla),
        }
    }

    pub fn includes(&self, stage: u8) -> bool {
        self.included_stages.binary_search(&stage).is_ok()
    }

    /// Stage numbers the lane leaves out.
    pub fn skipped_stages(&self) -> Vec<u8> {
        all_stages()
            .iter()
            .map(|s| s.number)
            .filter(|n| !self.includes(*n))
            .collect()
    }
}

/// How a changed path is counted.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum FileClass {
    Doc,
    Test,
    Code,
    Other,
}

const DOC_EXTENSIONS: &[&str] = &["md", "markdown", "rst", "txt", "adoc"];
const CODE_EXTENSIONS: &[&str] = &[
    "rs", "py", "js", "jsx", "ts", "tsx", "go", "java", "kt", "c", "h", "cc", "cpp", "hpp", "cs",
    "rb", "php", "swift", "scala", "sh", "sql",
];

/// Classify a path by location and extension.
pub fn classify_path(path: &Path) -> FileClass {
    let ext = path
        .extension()
        .map(|e| e.to_string_lossy().to_lowercase())
        .unwrap_or_default();
    let stem = path
        .file_stem()
        .map(|s| s.to_string_lossy().to_lowercase())
        .unwrap_or_default();
    let in_dir = |name: &str| {
        path.components()
            .rev()
            .skip(1)
            .any(|c| c.as_os_str().eq_ignore_ascii_case(name))
    };

    if DOC_EXTENSIONS.contains(&ext.as_str()) || in_dir("docs") {
        return FileClass::Doc;
    }
    if !CODE_EXTENSIONS.contains(&ext.as_str()) {
        return FileClass::Other;
    }
    let test_named = stem.starts_with("test_")
        || stem.ends_with("_test")
        || stem.ends_with("_tests")
        || stem.ends_with(".test")
        || stem.ends_with(".spec");
    if test_named || in_dir("tests") || in_dir("test") || in_dir("__tests__") {
        FileClass::Test
    } else {
        FileClass::Code
    }
}

/// Size and shape of a change, the input to lane selection.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct ChangeScope {
    pub files_changed: usize,
    pub doc_files: usize,
    pub code_files: usize,
    pub test_files: usize,
    pub lines_changed: usize,
    /// Risk markers found in the change description.
    #[serde(default)]
    pub markers: Vec<String>,
}

impl ChangeScope {
    /// Tally classified paths.
    pub fn from_paths<'a>(paths: impl IntoIterator<Item = &'a Path>, lines_changed: usize) -> Self {
        let mut scope = ChangeScope {
            lines_changed,
            ..Default::default()
        };
        for path in paths {
            scope.files_changed += 1;
            match classify_path(path) {
                FileClass::Doc => scope.doc_files += 1,
                FileClass::Test => scope.test_files += 1,
                FileClass::Code => scope.code_files += 1,
                FileClass::Other => {}
            }
        }
        scope
    }

    /// Record any risk markers present in `description`.
    pub fn with_description(mut self, description: &str) -> Self {
        let lower = description.to_lowercase();
        self.markers = RISK_MARKERS
            .iter()
            .filter(|m| lower.contains(**m))
            .map(|m| m.to_string())
            .collect();
        self
    }

    pub fn doc_fraction(&self) -> f64 {
        if self.files_changed == 0 {
            0.0
        } else {
            self.doc_files as f64 / self.files_changed as f64
        }
    }
}

/// Maps change scope (or an explicit override) to a lane.
#[derive(Debug, Clone, Default)]
pub struct LaneSelector {
    overrides: LanesSection,
}

impl LaneSelector {
    pub fn new(overrides: LanesSection) -> Self {
        Self { overrides }
    }

    /// Pick a lane. A valid override wins unconditionally.
    pub fn select(
        &self,
        scope: &ChangeScope,
        explicit_override: Option<&str>,
    ) -> Result<LaneConfig, WorkflowError> {
        let name = match explicit_override {
            Some(raw) => raw.parse::<LaneName>()?,
            None => Self::decide(scope).0,
        };
        Ok(self.config_for(name))
    }

    pub fn config_for(&self, name: LaneName) -> LaneConfig {
        LaneConfig::resolve(name, &self.overrides)
    }

    /// The decision tree, returning the lane and a short reason.
    pub fn decide(scope: &ChangeScope) -> (LaneName, &'static str) {
        if !scope.markers.is_empty() {
            return (LaneName::Heavy, "description carries a breaking/security marker");
        }
        if scope.files_changed == 0 {
            return (LaneName::Standard, "no changed files detected");
        }
        if scope.code_files == 0
            && scope.test_files == 0
            && scope.doc_files > 0
            && scope.doc_fraction() >= DOCS_FRACTION
        {
            return (LaneName::Docs, "documentation-only change");
        }
        if scope.files_changed >= HEAVY_FILE_COUNT || scope.lines_changed >= HEAVY_LINE_COUNT {
            return (LaneName::Heavy, "large change");
        }
        if scope.code_files >= TEST_RATIO_MIN_CODE_FILES
            && (scope.test_files as f64 / scope.code_files as f64) < LOW_TEST_RATIO
        {
            return (LaneName::Heavy, "low test coverage for the amount of code changed");
        }
        (LaneName::Standard, "moderate mixed change")
    }
}
