// SPDX-License-Identifier: MIT OR Apache-2.0
//! CLI integration tests for the `promise-agent` binary.

use assert_cmd::Command;
use predicates::prelude::*;

fn promise_agent() -> Command {
    #[allow(deprecated)]
    Command::cargo_bin("promise-agent").expect("binary `promise-agent` should be built")
}

/// A minimal valid policy: one `agent` bundle with an empty `routing`
/// promise type, serialized in the §4.1 JSON tree shape.
fn minimal_policy_json() -> serde_json::Value {
    serde_json::json!({
        "bundles": [
            {
                "namespace": "default",
                "bundleType": "agent",
                "name": "main",
                "sourcePath": null,
                "args": [],
                "promiseTypes": [],
                "line": null
            }
        ],
        "bodies": []
    })
}

fn write_policy(dir: &std::path::Path, value: &serde_json::Value) -> std::path::PathBuf {
    let path = dir.join("policy.json");
    std::fs::write(&path, serde_json::to_string_pretty(value).unwrap()).unwrap();
    path
}

// ── 1. Help text ─────────────────────────────────────────────────────

#[test]
fn help_exits_zero_and_contains_expected_text() {
    promise_agent()
        .arg("--help")
        .assert()
        .success()
        .stdout(predicate::str::contains("Usage"))
        .stdout(predicate::str::contains("run"))
        .stdout(predicate::str::contains("policy"));
}

// ── 2. Version ───────────────────────────────────────────────────────

#[test]
fn version_shows_version_string() {
    promise_agent()
        .arg("--version")
        .assert()
        .success()
        .stdout(predicate::str::contains(env!("CARGO_PKG_VERSION")));
}

// ── 3. policy validate ───────────────────────────────────────────────

#[test]
fn policy_validate_accepts_a_minimal_policy() {
    let tmp = tempfile::tempdir().unwrap();
    let path = write_policy(tmp.path(), &minimal_policy_json());
    promise_agent()
        .args(["policy", "validate", path.to_str().unwrap()])
        .assert()
        .success()
        .stdout(predicate::str::contains("policy valid"));
}

#[test]
fn policy_validate_rejects_a_reserved_bundle_name() {
    let mut value = minimal_policy_json();
    value["bundles"][0]["name"] = serde_json::json!("sys");
    let tmp = tempfile::tempdir().unwrap();
    let path = write_policy(tmp.path(), &value);
    promise_agent()
        .args(["policy", "validate", path.to_str().unwrap()])
        .assert()
        .failure();
}

#[test]
fn policy_validate_reports_missing_file() {
    promise_agent()
        .args(["policy", "validate", "/nonexistent/policy.json"])
        .assert()
        .failure()
        .stderr(predicate::str::contains("error"));
}

// ── 4. policy print ──────────────────────────────────────────────────

#[test]
fn policy_print_renders_bundle_header() {
    let tmp = tempfile::tempdir().unwrap();
    let path = write_policy(tmp.path(), &minimal_policy_json());
    promise_agent()
        .args(["policy", "print", path.to_str().unwrap()])
        .assert()
        .success()
        .stdout(predicate::str::contains("bundle agent main"));
}

// ── 5. run ────────────────────────────────────────────────────────────

#[test]
fn run_evaluates_a_policy_with_no_promises() {
    let tmp = tempfile::tempdir().unwrap();
    let path = write_policy(tmp.path(), &minimal_policy_json());
    promise_agent()
        .current_dir(tmp.path())
        .args(["run", "--file", path.to_str().unwrap()])
        .assert()
        .success()
        .stdout(predicate::str::contains("kept="));
}

#[test]
fn run_aborts_before_execution_on_invalid_policy() {
    let mut value = minimal_policy_json();
    value["bundles"][0]["name"] = serde_json::json!("sys");
    let tmp = tempfile::tempdir().unwrap();
    let path = write_policy(tmp.path(), &value);
    promise_agent()
        .current_dir(tmp.path())
        .args(["run", "--file", path.to_str().unwrap()])
        .assert()
        .failure()
        .stderr(predicate::str::contains("validation"));
}

#[test]
fn run_reports_missing_policy_file() {
    let tmp = tempfile::tempdir().unwrap();
    promise_agent()
        .current_dir(tmp.path())
        .args(["run", "--file", "missing.json"])
        .assert()
        .failure();
}

// ── 6. Unknown subcommand / usage errors ─────────────────────────────

#[test]
fn unknown_subcommand_fails_with_helpful_error() {
    promise_agent()
        .arg("nonexistent")
        .assert()
        .failure()
        .stderr(predicate::str::contains("unrecognized subcommand"));
}

#[test]
fn no_subcommand_shows_usage_hint() {
    promise_agent()
        .assert()
        .failure()
        .stderr(predicate::str::contains("Usage").or(predicate::str::contains("subcommand")));
}

// ── 7. Exit codes ─────────────────────────────────────────────────────

#[test]
fn missing_subcommand_uses_nonzero_exit_code() {
    let status = promise_agent().assert().failure().get_output().status;
    assert!(!status.success());
}

#[test]
fn successful_run_uses_zero_exit_code() {
    let tmp = tempfile::tempdir().unwrap();
    let path = write_policy(tmp.path(), &minimal_policy_json());
    let status = promise_agent()
        .current_dir(tmp.path())
        .args(["run", "--file", path.to_str().unwrap()])
        .assert()
        .success()
        .get_output()
        .status;
    assert!(status.success());
}
