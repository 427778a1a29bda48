//! Integration tests for the waypoint CLI.
//!
//! Each test drives the binary against a fresh temporary project.

use assert_cmd::Command;
use assert_cmd::cargo::cargo_bin_cmd;
use predicates::prelude::*;
use std::fs;
use std::path::Path;
use tempfile::TempDir;

fn waypoint() -> Command {
    cargo_bin_cmd!("waypoint")
}

fn create_temp_project() -> TempDir {
    TempDir::new().unwrap()
}

fn init_project(dir: &TempDir) {
    waypoint()
        .current_dir(dir.path())
        .arg("init")
        .assert()
        .success();
}

/// Initialized project holding one change `c1`.
fn project_with_change() -> TempDir {
    let dir = create_temp_project();
    init_project(&dir);
    waypoint()
        .current_dir(dir.path())
        .args(["new", "c1", "--title", "Add login page", "--owner", "sam"])
        .assert()
        .success();
    dir
}

fn write_config(dir: &TempDir, content: &str) {
    fs::write(dir.path().join(".waypoint/waypoint.toml"), content).unwrap();
}

fn checkpoints(dir: &Path) -> Vec<serde_json::Value> {
    let raw = fs::read_to_string(dir.join("changes/c1/.waypoint/checkpoints.json")).unwrap();
    serde_json::from_str(&raw).unwrap()
}

fn checkpoint_for_stage(dir: &Path, stage: u64) -> String {
    checkpoints(dir)
        .iter()
        .find(|c| c["stage_number"] == stage)
        .and_then(|c| c["id"].as_str())
        .unwrap()
        .to_string()
}

// =============================================================================
// Basic CLI Tests
// =============================================================================

mod cli_basics {
    use super::*;

    #[test]
    fn test_help() {
        waypoint().arg("--help").assert().success();
    }

    #[test]
    fn test_version() {
        waypoint().arg("--version").assert().success();
    }

    #[test]
    fn test_init_creates_structure() {
        let dir = create_temp_project();

        waypoint()
            .current_dir(dir.path())
            .arg("init")
            .assert()
            .success()
            .stdout(predicate::str::contains("Initialized waypoint project"));

        assert!(dir.path().join(".waypoint/waypoint.toml").exists());
        assert!(dir.path().join(".waypoint/logs").is_dir());
        assert!(dir.path().join("changes").is_dir());
    }

    #[test]
    fn test_init_idempotent() {
        let dir = create_temp_project();
        init_project(&dir);

        waypoint()
            .current_dir(dir.path())
            .arg("init")
            .assert()
            .success()
            .stdout(predicate::str::contains("already initialized"));
    }

    #[test]
    fn test_new_requires_init() {
        let dir = create_temp_project();
        waypoint()
            .current_dir(dir.path())
            .args(["new", "c1", "--title", "x"])
            .assert()
            .failure()
            .stderr(predicate::str::contains("waypoint init"));
    }

    #[test]
    fn test_new_rejects_duplicates_and_bad_ids() {
        let dir = project_with_change();
        waypoint()
            .current_dir(dir.path())
            .args(["new", "c1", "--title", "again"])
            .assert()
            .code(2);
        waypoint()
            .current_dir(dir.path())
            .args(["new", "../escape", "--title", "x"])
            .assert()
            .code(2);
    }
}

// =============================================================================
// Pipeline runs
// =============================================================================

mod run {
    use super::*;

    #[test]
    fn test_docs_lane_completes() {
        let dir = project_with_change();

        waypoint()
            .current_dir(dir.path())
            .args(["run", "c1", "--lane", "docs", "--yes"])
            .assert()
            .success()
            .stdout(predicate::str::contains("complete in the docs lane"));

        let change_dir = dir.path().join("changes/c1");
        for artifact in ["proposal.md", "spec.md", "tasks.md", "docs.md", "archive.md"] {
            assert!(change_dir.join(artifact).exists(), "{artifact} missing");
        }
        assert!(!change_dir.join("test-plan.md").exists());
        assert_eq!(checkpoints(dir.path()).len(), 6);
    }

    #[test]
    fn test_rerun_after_completion_is_a_no_op() {
        let dir = project_with_change();
        waypoint()
            .current_dir(dir.path())
            .args(["run", "c1", "--lane", "docs"])
            .assert()
            .success();
        waypoint()
            .current_dir(dir.path())
            .args(["run", "c1"])
            .assert()
            .success()
            .stdout(predicate::str::contains("already completed"));
    }

    #[test]
    fn test_failing_gate_halts_with_recovery_guidance() {
        let dir = project_with_change();
        write_config(
            &dir,
            r#"
[gates.tools.test]
command = ["sh", "-c", "echo '6 passed, 4 failed'"]
"#,
        );

        waypoint()
            .current_dir(dir.path())
            .args(["run", "c1", "--lane", "standard"])
            .assert()
            .code(1)
            .stdout(predicate::str::contains("Stage 08 (quality-gates) failed"))
            .stdout(predicate::str::contains("below the lane minimum"));
        let stage7 = checkpoint_for_stage(dir.path(), 7);

        waypoint()
            .current_dir(dir.path())
            .args(["status", "c1", "--format", "compact"])
            .assert()
            .success();

        // The printed rollback target is the stage 7 checkpoint.
        waypoint()
            .current_dir(dir.path())
            .args(["run", "c1"])
            .assert()
            .code(1)
            .stdout(predicate::str::contains(format!(
                "waypoint rollback {} --change c1",
                stage7
            )));
    }

    #[test]
    fn test_invalid_lane_is_invalid_invocation() {
        let dir = project_with_change();
        waypoint()
            .current_dir(dir.path())
            .args(["run", "c1", "--lane", "turbo"])
            .assert()
            .code(2)
            .stderr(predicate::str::contains("Invalid lane 'turbo'"));
    }

    #[test]
    fn test_lane_locked_after_start() {
        let dir = project_with_change();
        write_config(
            &dir,
            r#"
[gates.tools.test]
command = ["false"]
"#,
        );
        waypoint()
            .current_dir(dir.path())
            .args(["run", "c1", "--lane", "standard"])
            .assert()
            .code(1);
        waypoint()
            .current_dir(dir.path())
            .args(["run", "c1", "--lane", "docs"])
            .assert()
            .code(2)
            .stderr(predicate::str::contains("fixed to 'standard'"));
    }

    #[test]
    fn test_unknown_change_is_invalid_invocation() {
        let dir = project_with_change();
        waypoint()
            .current_dir(dir.path())
            .args(["run", "nope"])
            .assert()
            .code(2)
            .stderr(predicate::str::contains("Change 'nope' not found"));
    }

    #[test]
    fn test_dry_run_writes_nothing() {
        let dir = project_with_change();
        waypoint()
            .current_dir(dir.path())
            .args(["run", "c1", "--lane", "docs", "--dry-run"])
            .assert()
            .success()
            .stdout(predicate::str::contains("Dry run"))
            .stdout(predicate::str::contains("12 archive"))
            .stdout(predicate::str::contains("(hooks: sanity-check)"))
            .stdout(predicate::str::contains("Skip:"));
        assert!(!dir.path().join("changes/c1/proposal.md").exists());
        assert!(!dir.path().join("changes/c1/.waypoint/checkpoints.json").exists());
    }

    #[test]
    fn test_no_checkpoints_flag() {
        let dir = project_with_change();
        waypoint()
            .current_dir(dir.path())
            .args(["run", "c1", "--lane", "docs", "--no-checkpoints"])
            .assert()
            .success();
        assert!(dir.path().join("changes/c1/archive.md").exists());
        assert!(!dir.path().join("changes/c1/.waypoint/checkpoints.json").exists());
    }
}

// =============================================================================
// Checkpoint commands
// =============================================================================

mod checkpoints {
    use super::*;

    fn completed_docs_run() -> TempDir {
        let dir = project_with_change();
        waypoint()
            .current_dir(dir.path())
            .args(["run", "c1", "--lane", "docs"])
            .assert()
            .success();
        dir
    }

    #[test]
    fn test_list_checkpoints() {
        let dir = completed_docs_run();
        waypoint()
            .current_dir(dir.path())
            .args(["list-checkpoints", "c1"])
            .assert()
            .success()
            .stdout(predicate::str::contains("-step00"))
            .stdout(predicate::str::contains("12 archive"))
            .stdout(predicate::str::contains("6 checkpoint(s)"));
    }

    #[test]
    fn test_rollback_restores_files_and_resume_continues() {
        let dir = completed_docs_run();
        let change_dir = dir.path().join("changes/c1");
        let original = fs::read_to_string(change_dir.join("proposal.md")).unwrap();
        fs::write(change_dir.join("proposal.md"), "scribbles").unwrap();
        fs::write(change_dir.join("notes.txt"), "scratch").unwrap();

        let target = checkpoint_for_stage(dir.path(), 2);
        waypoint()
            .current_dir(dir.path())
            .args(["rollback", &target, "--yes"])
            .assert()
            .success()
            .stdout(predicate::str::contains("Backup checkpoint"));

        assert_eq!(
            fs::read_to_string(change_dir.join("proposal.md")).unwrap(),
            original
        );
        assert!(!change_dir.join("notes.txt").exists());
        assert!(!change_dir.join("spec.md").exists());

        let backups: Vec<_> = checkpoints(dir.path())
            .into_iter()
            .filter(|c| c["rollback_of"] == target.as_str())
            .collect();
        assert_eq!(backups.len(), 1);

        waypoint()
            .current_dir(dir.path())
            .args(["run", "c1", "--dry-run"])
            .assert()
            .success()
            .stdout(predicate::str::contains("Start:  stage 02"));
        waypoint()
            .current_dir(dir.path())
            .args(["run", "c1"])
            .assert()
            .success();
        assert!(change_dir.join("spec.md").exists());
    }

    #[test]
    fn test_rollback_unknown_checkpoint() {
        let dir = completed_docs_run();
        waypoint()
            .current_dir(dir.path())
            .args(["rollback", "checkpoint-19990101-000000-step00", "--yes"])
            .assert()
            .code(2)
            .stderr(predicate::str::contains("not found"));
    }

    #[test]
    fn test_rollback_with_id_shared_by_two_changes_needs_change() {
        let dir = completed_docs_run();
        waypoint()
            .current_dir(dir.path())
            .args(["new", "c2", "--title", "Copy of c1", "--owner", "sam"])
            .assert()
            .success();
        let state_dir = dir.path().join("changes/c2/.waypoint");
        fs::create_dir_all(&state_dir).unwrap();
        fs::copy(
            dir.path().join("changes/c1/.waypoint/checkpoints.json"),
            state_dir.join("checkpoints.json"),
        )
        .unwrap();

        let target = checkpoint_for_stage(dir.path(), 1);
        waypoint()
            .current_dir(dir.path())
            .args(["rollback", &target, "--yes"])
            .assert()
            .code(2)
            .stderr(predicate::str::contains("c1, c2"))
            .stderr(predicate::str::contains("--change"));
        assert!(dir.path().join("changes/c1/archive.md").exists());

        waypoint()
            .current_dir(dir.path())
            .args(["rollback", &target, "--change", "c1", "--yes"])
            .assert()
            .success();
        assert!(!dir.path().join("changes/c1/archive.md").exists());
    }

    #[test]
    fn test_list_checkpoints_truncates_multibyte_revision() {
        let dir = completed_docs_run();
        let path = dir.path().join("changes/c1/.waypoint/checkpoints.json");
        let mut entries = checkpoints(dir.path());
        entries[0]["revision_hash"] = serde_json::json!("aéééééééééééé");
        fs::write(&path, serde_json::to_string_pretty(&entries).unwrap()).unwrap();

        waypoint()
            .current_dir(dir.path())
            .args(["list-checkpoints", "c1"])
            .assert()
            .success()
            .stdout(predicate::str::contains("aééééééééé "))
            .stdout(predicate::str::contains("aéééééééééé").not());
    }

    #[test]
    fn test_rollback_without_yes_needs_terminal() {
        let dir = completed_docs_run();
        let target = checkpoint_for_stage(dir.path(), 1);
        waypoint()
            .current_dir(dir.path())
            .args(["rollback", &target, "--change", "c1"])
            .assert()
            .failure()
            .stderr(predicate::str::contains("--yes"));
        assert!(dir.path().join("changes/c1/archive.md").exists());
    }

    #[test]
    fn test_cleanup_keeps_newest() {
        let dir = completed_docs_run();
        let newest = checkpoint_for_stage(dir.path(), 12);
        waypoint()
            .current_dir(dir.path())
            .args(["cleanup-checkpoints", "c1", "2"])
            .assert()
            .success()
            .stdout(predicate::str::contains("Removed 4 checkpoint(s)"));

        let remaining = checkpoints(dir.path());
        assert_eq!(remaining.len(), 2);
        assert_eq!(remaining[1]["id"], newest.as_str());

        waypoint()
            .current_dir(dir.path())
            .args(["cleanup-checkpoints", "c1", "5"])
            .assert()
            .success()
            .stdout(predicate::str::contains("Nothing to clean up"));
    }
}

// =============================================================================
// Status and config
// =============================================================================

mod status_and_config {
    use super::*;

    #[test]
    fn test_status_views_are_idempotent() {
        let dir = project_with_change();
        waypoint()
            .current_dir(dir.path())
            .args(["run", "c1", "--lane", "docs"])
            .assert()
            .success();

        for format in ["tree", "timeline", "compact", "detailed"] {
            let first = waypoint()
                .current_dir(dir.path())
                .args(["status", "c1", "--format", format])
                .output()
                .unwrap();
            let second = waypoint()
                .current_dir(dir.path())
                .args(["status", "c1", "--format", format])
                .output()
                .unwrap();
            assert!(first.status.success());
            assert_eq!(first.stdout, second.stdout, "{format} view changed");
            assert!(String::from_utf8_lossy(&first.stdout).contains("6 succeeded"));
        }
    }

    #[test]
    fn test_status_before_any_run() {
        let dir = project_with_change();
        waypoint()
            .current_dir(dir.path())
            .args(["status", "c1"])
            .assert()
            .success()
            .stdout(predicate::str::contains("0 checkpoints"));
    }

    #[test]
    fn test_status_rejects_unknown_format() {
        let dir = project_with_change();
        waypoint()
            .current_dir(dir.path())
            .args(["status", "c1", "--format", "pie"])
            .assert()
            .code(2);
    }

    #[test]
    fn test_config_show_and_validate() {
        let dir = create_temp_project();
        init_project(&dir);
        waypoint()
            .current_dir(dir.path())
            .args(["config", "show"])
            .assert()
            .success()
            .stdout(predicate::str::contains("[checkpoints]"));
        waypoint()
            .current_dir(dir.path())
            .args(["config", "validate"])
            .assert()
            .success()
            .stdout(predicate::str::contains("Configuration is valid"));

        write_config(&dir, "[lanes.standard]\nmin_test_pass = 1.5\n");
        waypoint()
            .current_dir(dir.path())
            .args(["config", "validate"])
            .assert()
            .failure()
            .stdout(predicate::str::contains("lanes.standard.min_test_pass"));
    }
}
