//! Project configuration read from `.waypoint/waypoint.toml`.
//!
//! Every field has a default, so a missing file or a partial file is valid.
//!
//! # Configuration File Format
//!
//! ```toml
//! [project]
//! changes_dir = "changes"
//!
//! [checkpoints]
//! enabled = true
//! retention = 10
//! exclude = ["*.tmp"]
//!
//! [gates]
//! timeout_secs = 300
//!
//! [gates.tools.lint]
//! command = ["cargo", "clippy", "--", "-D", "warnings"]
//!
//! [gates.tools.test]
//! command = ["cargo", "test"]
//! timeout_secs = 900
//!
//! [lanes.standard]
//! min_test_pass = 0.8
//! min_coverage = 0.7
//! sla_target_secs = 1800
//!
//! [implementation]
//! command = ["./scripts/implement.sh"]
//!
//! [[hooks]]
//! stage = 5
//! name = "db-up"
//! command = ["./scripts/ensure-db.sh"]
//! timeout_secs = 60
//! ```

use anyhow::{Context, Result};
use serde::{Deserialize, Serialize};
use std::path::Path;

use crate::stage::LAST_STAGE;

/// Name of the configuration file inside `.waypoint/`.
pub const CONFIG_FILE: &str = "waypoint.toml";

/// Project-level settings.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ProjectSection {
    /// Directory (relative to the project root) holding one directory per change.
    #[serde(default = "default_changes_dir")]
    pub changes_dir: String,
}

fn default_changes_dir() -> String {
    "changes".to_string()
}

impl Default for ProjectSection {
    fn default() -> Self {
        Self {
            changes_dir: default_changes_dir(),
        }
    }
}

/// Checkpoint behaviour.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct CheckpointsSection {
    #[serde(default = "default_true")]
    pub enabled: bool,
    /// Default `keep_count` for `cleanup-checkpoints`.
    #[serde(default = "default_retention")]
    pub retention: usize,
    /// Glob patterns (relative to the change directory) never captured.
    #[serde(default)]
    pub exclude: Vec<String>,
}

fn default_true() -> bool {
    true
}

fn default_retention() -> usize {
    10
}

impl Default for CheckpointsSection {
    fn default() -> Self {
        Self {
            enabled: true,
            retention: default_retention(),
            exclude: Vec::new(),
        }
    }
}

impl CheckpointsSection {
    /// Compile `exclude` into glob patterns, skipping invalid ones.
    pub fn exclude_patterns(&self) -> Vec<glob::Pattern> {
        self.exclude
            .iter()
            .filter_map(|p| glob::Pattern::new(p).ok())
            .collect()
    }
}

/// One external quality-gate tool.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct ToolConfig {
    /// Program followed by its arguments. Never passed through a shell.
    #[serde(default)]
    pub command: Vec<String>,
    /// Per-tool timeout, falling back to `[gates] timeout_secs`.
    #[serde(default)]
    pub timeout_secs: Option<u64>,
}

/// Configured tools per gate category. Unset categories are skipped.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct GateToolsSection {
    #[serde(default)]
    pub lint: Option<ToolConfig>,
    #[serde(default)]
    pub typecheck: Option<ToolConfig>,
    #[serde(default)]
    pub test: Option<ToolConfig>,
    #[serde(default)]
    pub security: Option<ToolConfig>,
}

/// Quality gate settings.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct GatesSection {
    #[serde(default = "default_gate_timeout")]
    pub timeout_secs: u64,
    #[serde(default)]
    pub tools: GateToolsSection,
}

fn default_gate_timeout() -> u64 {
    300
}

impl Default for GatesSection {
    fn default() -> Self {
        Self {
            timeout_secs: default_gate_timeout(),
            tools: GateToolsSection::default(),
        }
    }
}

/// Per-lane threshold and SLA overrides.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct LaneOverride {
    #[serde(default)]
    pub min_test_pass: Option<f64>,
    #[serde(default)]
    pub min_coverage: Option<f64>,
    #[serde(default)]
    pub sla_target_secs: Option<u64>,
}

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct LanesSection {
    #[serde(default)]
    pub docs: LaneOverride,
    #[serde(default)]
    pub standard: LaneOverride,
    #[serde(default)]
    pub heavy: LaneOverride,
}

/// The scripted implementation stage.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ImplementationSection {
    #[serde(default)]
    pub command: Vec<String>,
    #[serde(default = "default_implementation_timeout")]
    pub timeout_secs: u64,
}

fn default_implementation_timeout() -> u64 {
    1800
}

impl Default for ImplementationSection {
    fn default() -> Self {
        Self {
            command: Vec::new(),
            timeout_secs: default_implementation_timeout(),
        }
    }
}

/// A command hook run before a stage.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct HookSection {
    pub stage: u8,
    #[serde(default)]
    pub name: Option<String>,
    pub command: Vec<String>,
    #[serde(default = "default_hook_timeout")]
    pub timeout_secs: u64,
}

fn default_hook_timeout() -> u64 {
    60
}

/// Root of `waypoint.toml`.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct WaypointToml {
    #[serde(default)]
    pub project: ProjectSection,
    #[serde(default)]
    pub checkpoints: CheckpointsSection,
    #[serde(default)]
    pub gates: GatesSection,
    #[serde(default)]
    pub lanes: LanesSection,
    #[serde(default)]
    pub implementation: ImplementationSection,
    #[serde(default)]
    pub hooks: Vec<HookSection>,
}

impl WaypointToml {
    /// Load from a specific file.
    pub fn load(path: &Path) -> Result<Self> {
        let content = std::fs::read_to_string(path)
            .with_context(|| format!("Failed to read config file: {}", path.display()))?;
        Self::parse(&content).with_context(|| format!("Invalid config file: {}", path.display()))
    }

    pub fn parse(content: &str) -> Result<Self> {
        toml::from_str(content).context("Failed to parse waypoint.toml")
    }

    /// Load `<state_dir>/waypoint.toml`, or defaults when it does not exist.
    pub fn load_or_default(state_dir: &Path) -> Result<Self> {
        let path = state_dir.join(CONFIG_FILE);
        if path.exists() {
            Self::load(&path)
        } else {
            Ok(Self::default())
        }
    }

    pub fn save(&self, path: &Path) -> Result<()> {
        let content = toml::to_string_pretty(self).context("Failed to serialize config")?;
        crate::util::write_atomic(path, content.as_bytes())
    }

    /// Human-readable warnings for suspicious values. Empty means clean.
    pub fn validate(&self) -> Vec<String> {
        let mut warnings = Vec::new();

        if self.project.changes_dir.trim().is_empty() {
            warnings.push("project.changes_dir is empty".to_string());
        }
        if self.gates.timeout_secs == 0 {
            warnings.push("gates.timeout_secs is 0; every tool will time out".to_string());
        }

        for (lane, o) in [
            ("docs", &self.lanes.docs),
            ("standard", &self.lanes.standard),
            ("heavy", &self.lanes.heavy),
        ] {
            for (field, value) in [("min_test_pass", o.min_test_pass), ("min_coverage", o.min_coverage)]
            {
                if let Some(v) = value
                    && !(0.0..=1.0).contains(&v)
                {
                    warnings.push(format!("lanes.{lane}.{field} = {v} is outside 0.0..=1.0"));
                }
            }
            if o.sla_target_secs == Some(0) {
                warnings.push(format!("lanes.{lane}.sla_target_secs is 0; no stage can be SLA compliant"));
            }
        }

        for (name, tool) in [
            ("lint", &self.gates.tools.lint),
            ("typecheck", &self.gates.tools.typecheck),
            ("test", &self.gates.tools.test),
            ("security", &self.gates.tools.security),
        ] {
            if let Some(t) = tool
                && t.command.is_empty()
            {
                warnings.push(format!("gates.tools.{name}.command is empty"));
            }
        }

        for (i, hook) in self.hooks.iter().enumerate() {
            if hook.stage > LAST_STAGE {
                warnings.push(format!(
                    "hooks[{i}] targets unknown stage {} (stages are 0-{LAST_STAGE})",
                    hook.stage
                ));
            }
            if hook.command.is_empty() {
                warnings.push(format!("hooks[{i}].command is empty"));
            }
        }

        for pattern in &self.checkpoints.exclude {
            if glob::Pattern::new(pattern).is_err() {
                warnings.push(format!("checkpoints.exclude pattern '{pattern}' is not a valid glob"));
            }
        }

        warnings
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::tempdir;

    #[test]
    fn test_empty_file_uses_defaults() {
        let cfg = WaypointToml::parse("").unwrap();
        assert_eq!(cfg.project.changes_dir, "changes");
        assert!(cfg.checkpoints.enabled);
        assert_eq!(cfg.checkpoints.retention, 10);
        assert_eq!(cfg.gates.timeout_secs, 300);
        assert!(cfg.gates.tools.test.is_none());
        assert!(cfg.hooks.is_empty());
        assert!(cfg.validate().is_empty());
    }

    #[test]
    fn test_parse_full_file() {
        let cfg = WaypointToml::parse(
            r#"
            [checkpoints]
            retention = 3
            exclude = ["*.log"]

            [gates.tools.test]
            command = ["cargo", "test"]
            timeout_secs = 900

            [lanes.heavy]
            min_test_pass = 0.99

            [[hooks]]
            stage = 5
            command = ["true"]
            "#,
        )
        .unwrap();
        assert_eq!(cfg.checkpoints.retention, 3);
        assert_eq!(cfg.checkpoints.exclude_patterns().len(), 1);
        let test = cfg.gates.tools.test.unwrap();
        assert_eq!(test.command, vec!["cargo", "test"]);
        assert_eq!(test.timeout_secs, Some(900));
        assert_eq!(cfg.lanes.heavy.min_test_pass, Some(0.99));
        assert_eq!(cfg.hooks[0].stage, 5);
        assert_eq!(cfg.hooks[0].timeout_secs, 60);
    }

    #[test]
    fn test_validate_flags_bad_values() {
        let cfg = WaypointToml::parse(
            r#"
            [lanes.standard]
            min_coverage = 1.5

            [gates.tools.lint]
            command = []

            [[hooks]]
            stage = 42
            command = ["true"]
            "#,
        )
        .unwrap();
        let warnings = cfg.validate();
        assert_eq!(warnings.len(), 3, "{warnings:?}");
        assert!(warnings.iter().any(|w| w.contains("min_coverage")));
        assert!(warnings.iter().any(|w| w.contains("gates.tools.lint")));
        assert!(warnings.iter().any(|w| w.contains("unknown stage 42")));
    }

    #[test]
    fn test_invalid_toml_is_error() {
        assert!(WaypointToml::parse("[checkpoints\nretention = 1").is_err());
    }

    #[test]
    fn test_save_and_load_or_default() {
        let dir = tempdir().unwrap();
        assert_eq!(
            WaypointToml::load_or_default(dir.path()).unwrap().checkpoints.retention,
            10
        );
        let mut cfg = WaypointToml::default();
        cfg.checkpoints.retention = 4;
        cfg.save(&dir.path().join(CONFIG_FILE)).unwrap();
        let loaded = WaypointToml::load_or_default(dir.path()).unwrap();
        assert_eq!(loaded.checkpoints.retention, 4);
    }
}
