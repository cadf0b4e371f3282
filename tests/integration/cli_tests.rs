//! CLI integration tests.
//!
//! Tests for argument handling and exit status of the built binary.

use assert_cmd::Command;
use predicates::prelude::*;

const CLEARED_VARS: &[&str] = &[
    "ENVIRONMENT",
    "RESOURCE_GROUP",
    "CLUSTER_NAME",
    "DB_ENDPOINTS",
    "TARGET_NAMESPACE",
    "PREFLIGHT_READINESS_TIMEOUT",
    "PREFLIGHT_HTTP_TIMEOUT",
    "PREFLIGHT_DB_TIMEOUT_SECS",
    "PREFLIGHT_SERVER_IMAGE",
    "PREFLIGHT_CLIENT_IMAGE",
    "PREFLIGHT_EXTRA_ENDPOINTS",
    "RUST_LOG",
];

fn preflight() -> Command {
    let mut cmd = Command::cargo_bin("k8s-preflight").unwrap();
    for var in CLEARED_VARS {
        cmd.env_remove(var);
    }
    cmd
}

#[test]
fn test_help() {
    preflight()
        .arg("--help")
        .assert()
        .success()
        .stdout(predicate::str::contains("--environment"))
        .stdout(predicate::str::contains("Exit codes"));
}

#[test]
fn test_version_flag() {
    preflight()
        .arg("-V")
        .assert()
        .success()
        .stdout(predicate::str::starts_with("k8s-preflight "));
}

#[test]
fn test_list_shows_checks_in_order() {
    let output = preflight().arg("--list").output().unwrap();
    assert!(output.status.success());
    let stdout = String::from_utf8_lossy(&output.stdout);
    let tools = stdout.find("tools").unwrap();
    let database = stdout.find("database").unwrap();
    assert!(tools < database);
    assert!(stdout.contains("instance-types"));
    assert!(stdout.contains("[aks, eks]"));
}

#[test]
fn test_missing_environment_is_usage_error() {
    preflight()
        .arg("-y")
        .assert()
        .code(2)
        .stderr(predicate::str::contains("ENVIRONMENT is required"));
}

#[test]
fn test_invalid_environment_rejected() {
    preflight().args(["-e", "gke"]).assert().code(2);
}

#[test]
fn test_invalid_db_endpoints_rejected() {
    preflight()
        .args(["-e", "k3s", "-y", "--db-endpoints", "db:notaport"])
        .assert()
        .code(2);
}

#[test]
fn test_unknown_check_key_is_usage_error() {
    preflight()
        .args(["-e", "k3s", "-y", "--only", "gpu"])
        .assert()
        .code(2)
        .stderr(predicate::str::contains("unknown check 'gpu'"));
}

#[cfg(unix)]
mod external {
    use super::preflight;
    use predicates::prelude::*;
    use std::fs;
    use std::os::unix::fs::PermissionsExt;
    use std::path::{Path, PathBuf};

    fn script(dir: &Path, name: &str, body: &str) -> PathBuf {
        let path = dir.join(name);
        fs::write(&path, format!("#!/bin/sh\n{}\n", body)).unwrap();
        fs::set_permissions(&path, fs::Permissions::from_mode(0o755)).unwrap();
        path
    }

    fn run_only(path: &Path, extra: &[&str]) -> assert_cmd::assert::Assert {
        let key = path.file_name().unwrap().to_string_lossy().into_owned();
        preflight()
            .args(["-e", "k3s", "-y", "--no-color"])
            .arg("--extra-check")
            .arg(path)
            .args(["--only", key.as_str()])
            .args(extra)
            .assert()
    }

    #[test]
    fn test_passing_external_check_exits_zero() {
        let dir = tempfile::tempdir().unwrap();
        let path = script(dir.path(), "site-check.sh", "echo 'checking site'\necho \"[PASS] env=$ENVIRONMENT\"");

        run_only(&path, &[])
            .code(0)
            .stdout(predicate::str::contains("[PASS] env=k3s"))
            .stdout(predicate::str::contains("[PASS] preflight passed: 0 failing checks"))
            .stdout(predicate::str::contains("checking site").not());
    }

    #[test]
    fn test_failing_external_check_exits_one() {
        let dir = tempfile::tempdir().unwrap();
        let path = script(dir.path(), "quota.sh", "echo '[WARN] quota at 80%'\necho '[FAIL] quota exhausted'");

        run_only(&path, &[])
            .code(1)
            .stdout(predicate::str::contains("[FAIL] quota exhausted"))
            .stdout(predicate::str::contains("[FAIL] preflight failed: 1 failing check"));
    }

    #[test]
    fn test_nonzero_exit_without_fail_line_passes() {
        let dir = tempfile::tempdir().unwrap();
        let path = script(dir.path(), "flaky.sh", "echo '[WARN] degraded'\nexit 3");

        run_only(&path, &[]).code(0);
    }

    #[test]
    fn test_bare_file_name_runs_from_current_dir() {
        let dir = tempfile::tempdir().unwrap();
        script(dir.path(), "site.sh", "echo '[FAIL] relative check ran'");

        preflight()
            .current_dir(dir.path())
            .args(["-e", "k3s", "-y", "--no-color", "--extra-check", "site.sh", "--only", "site.sh"])
            .assert()
            .code(1)
            .stdout(predicate::str::contains("[FAIL] relative check ran"))
            .stdout(predicate::str::contains("check not found").not());
    }

    #[test]
    fn test_relative_subdir_path_runs() {
        let dir = tempfile::tempdir().unwrap();
        let checks = dir.path().join("checks");
        fs::create_dir(&checks).unwrap();
        script(&checks, "quota.sh", "echo '[PASS] quota ok'");

        preflight()
            .current_dir(dir.path())
            .args(["-e", "k3s", "-y", "--no-color", "--extra-check", "checks/quota.sh", "--only", "quota.sh"])
            .assert()
            .code(0)
            .stdout(predicate::str::contains("[PASS] quota ok"));
    }

    #[test]
    fn test_missing_external_check_skips() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("absent.sh");

        run_only(&path, &[])
            .code(0)
            .stdout(predicate::str::contains("[SKIP] check not found"));
    }

    #[test]
    fn test_silent_check_renders_synthesized_skip() {
        let dir = tempfile::tempdir().unwrap();
        let path = script(dir.path(), "quiet.sh", "echo 'nothing to report'");

        run_only(&path, &[])
            .code(0)
            .stdout(predicate::str::contains("[SKIP] no output for this section."));
    }

    #[test]
    fn test_json_summary() {
        let dir = tempfile::tempdir().unwrap();
        let path = script(dir.path(), "json.sh", "echo '[FAIL] broken'");

        let output = run_only(&path, &["--format", "json"]).code(1).get_output().clone();
        let value: serde_json::Value = serde_json::from_slice(&output.stdout).unwrap();
        assert_eq!(value["environment"], "k3s");
        assert_eq!(value["exit_code"], 1);
        assert_eq!(value["summary"]["failed"], 1);
        assert_eq!(value["sections"][0]["key"], "json.sh");
        assert_eq!(value["sections"][0]["lines"][0]["kind"], "fail");
    }
}
