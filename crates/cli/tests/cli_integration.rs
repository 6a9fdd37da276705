//! CLI integration tests.
//!
//! Uses `assert_cmd` to spawn the `runledger` binary against a local store
//! in a temporary directory and verify exit codes, stdout and stderr.

use assert_cmd::cargo::cargo_bin_cmd;
use assert_cmd::Command;
use predicates::prelude::*;
use std::fs;
use tempfile::TempDir;

/// Helper: a `runledger` command isolated from the caller's environment,
/// storing its collections under `dir`.
fn runledger(dir: &TempDir) -> Command {
    let mut cmd = cargo_bin_cmd!("runledger");
    cmd.env("RUNLEDGER_LOCAL_DIR", dir.path())
        .env_remove("RUNLEDGER_REMOTE_URL")
        .env_remove("RUNLEDGER_REMOTE_KEY")
        .env_remove("RUNLEDGER_REMOTE_ENABLED")
        .env_remove("ANTHROPIC_API_KEY")
        .env_remove("RUNLEDGER_MODEL")
        .env_remove("RUST_LOG");
    cmd
}

fn json_stdout(cmd: &mut Command) -> serde_json::Value {
    let output = cmd.arg("--output").arg("json").output().unwrap();
    assert!(
        output.status.success(),
        "stderr: {}",
        String::from_utf8_lossy(&output.stderr)
    );
    serde_json::from_slice(&output.stdout).unwrap()
}

/// Create a run and return its id.
fn create_run(dir: &TempDir, input: Option<&str>) -> String {
    let mut cmd = runledger(dir);
    cmd.args([
        "runs",
        "create",
        "--workflow-id",
        "w1",
        "--ssot-version",
        "v1",
    ]);
    if let Some(input) = input {
        cmd.args(["--input", input]);
    }
    let created = json_stdout(&mut cmd);
    assert_eq!(created["ok"], true);
    assert_eq!(created["mode"], "local");
    assert_eq!(created["data"]["status"], "created");
    created["data"]["id"].as_str().unwrap().to_string()
}

fn show(dir: &TempDir, id: &str) -> serde_json::Value {
    json_stdout(runledger(dir).args(["runs", "show", id]))
}

// ──────────────────────────────────────────────
// 1. Help, version and mode
// ──────────────────────────────────────────────

#[test]
fn help_exits_0_with_description() {
    let dir = TempDir::new().unwrap();
    runledger(&dir)
        .arg("--help")
        .assert()
        .success()
        .stdout(predicate::str::contains("teacher approval gate"));
}

#[test]
fn version_exits_0() {
    let dir = TempDir::new().unwrap();
    runledger(&dir)
        .arg("--version")
        .assert()
        .success()
        .stdout(predicate::str::contains("runledger"));
}

#[test]
fn mode_is_local_without_remote_credentials() {
    let dir = TempDir::new().unwrap();
    runledger(&dir)
        .arg("mode")
        .assert()
        .success()
        .stdout("local\n");
}

#[test]
fn mode_is_remote_when_configured() {
    let dir = TempDir::new().unwrap();
    runledger(&dir)
        .env("RUNLEDGER_REMOTE_URL", "http://127.0.0.1:1")
        .env("RUNLEDGER_REMOTE_KEY", "k")
        .arg("mode")
        .assert()
        .success()
        .stdout("remote\n");
}

#[test]
fn disabled_remote_in_config_file_stays_local() {
    let dir = TempDir::new().unwrap();
    let config = dir.path().join("runledger.toml");
    fs::write(
        &config,
        "[remote]\nurl = \"http://127.0.0.1:1\"\napi_key = \"k\"\nenabled = false\n",
    )
    .unwrap();
    runledger(&dir)
        .arg("--config")
        .arg(&config)
        .arg("mode")
        .assert()
        .success()
        .stdout("local\n");
}

#[test]
fn unreachable_remote_reports_backend_error() {
    let dir = TempDir::new().unwrap();
    runledger(&dir)
        .env("RUNLEDGER_REMOTE_URL", "http://127.0.0.1:1")
        .env("RUNLEDGER_REMOTE_KEY", "k")
        .args(["runs", "list"])
        .assert()
        .failure()
        .code(1)
        .stderr(predicate::str::contains("backend error on runs"));
}

#[test]
fn missing_config_file_exits_1() {
    let dir = TempDir::new().unwrap();
    runledger(&dir)
        .args(["--config", "/definitely/not/here.toml", "mode"])
        .assert()
        .failure()
        .code(1)
        .stderr(predicate::str::contains("could not read"));
}

// ──────────────────────────────────────────────
// 2. Runs
// ──────────────────────────────────────────────

#[test]
fn empty_store_lists_no_runs() {
    let dir = TempDir::new().unwrap();
    runledger(&dir)
        .args(["runs", "list"])
        .assert()
        .success()
        .stdout(predicate::str::contains("no runs"));
}

#[test]
fn created_runs_persist_across_invocations() {
    let dir = TempDir::new().unwrap();
    let first = create_run(&dir, Some("Explain fractions"));
    let second = create_run(&dir, Some("Explain decimals"));

    let listed = json_stdout(runledger(&dir).args(["runs", "list"]));
    let ids: Vec<&str> = listed["data"]
        .as_array()
        .unwrap()
        .iter()
        .map(|r| r["id"].as_str().unwrap())
        .collect();
    assert_eq!(ids, vec![second.as_str(), first.as_str()]);
    assert!(dir.path().join("runledger_runs_v1.json").exists());
}

#[test]
fn show_unknown_run_exits_1() {
    let dir = TempDir::new().unwrap();
    runledger(&dir)
        .args(["runs", "show", "ghost"])
        .assert()
        .failure()
        .stderr(predicate::str::contains("run not found: ghost"));
}

#[test]
fn json_errors_are_json_on_stderr() {
    let dir = TempDir::new().unwrap();
    let output = runledger(&dir)
        .args(["--output", "json", "approve", "ghost"])
        .output()
        .unwrap();
    assert_eq!(output.status.code(), Some(1));
    let err: serde_json::Value = serde_json::from_slice(&output.stderr).unwrap();
    assert_eq!(err["error"], "run not found: ghost");
}

// ──────────────────────────────────────────────
// 3. Teacher gate
// ──────────────────────────────────────────────

#[test]
fn approve_without_input_fails_the_run() {
    let dir = TempDir::new().unwrap();
    let id = create_run(&dir, None);

    let outcome = json_stdout(runledger(&dir).args(["approve", &id]));
    assert_eq!(outcome["outcome"], "failed_no_input");

    let shown = show(&dir, &id);
    assert_eq!(shown["run"]["status"], "failed");
    assert_eq!(shown["run"]["notes"], "No input_ref found to execute run.");
    assert_eq!(shown["artefacts"].as_array().unwrap().len(), 0);
    let types: Vec<&str> = shown["audit"]
        .as_array()
        .unwrap()
        .iter()
        .map(|e| e["event_type"].as_str().unwrap())
        .collect();
    assert_eq!(types, vec!["run_failed_no_input", "teacher_gate_approved"]);
}

#[test]
fn approve_without_provider_fails_with_generation_error() {
    let dir = TempDir::new().unwrap();
    let id = create_run(&dir, Some("Explain fractions"));

    runledger(&dir)
        .args(["approve", &id])
        .assert()
        .success()
        .stdout(predicate::str::contains("failed: generation unavailable"));

    let shown = show(&dir, &id);
    assert_eq!(shown["run"]["status"], "failed");
    let notes = shown["run"]["notes"].as_str().unwrap();
    assert!(notes.starts_with("generation unavailable"), "{notes}");
    assert_eq!(
        shown["audit"][0]["event_type"],
        "run_failed_after_teacher_gate"
    );
    assert_eq!(shown["audit"][0]["payload"]["error"], notes);
}

#[test]
fn reject_then_approve_is_refused() {
    let dir = TempDir::new().unwrap();
    let id = create_run(&dir, Some("Explain fractions"));

    runledger(&dir)
        .args(["reject", &id])
        .assert()
        .success()
        .stdout(predicate::str::contains("rejected"));

    runledger(&dir)
        .args(["approve", &id])
        .assert()
        .failure()
        .code(1)
        .stderr(predicate::str::contains("cannot move from failed to running"));

    let shown = show(&dir, &id);
    assert_eq!(shown["run"]["notes"], "Rejected by teacher gate.");
    assert_eq!(shown["audit"].as_array().unwrap().len(), 1);
}

#[test]
fn sweep_leaves_fresh_runs_alone() {
    let dir = TempDir::new().unwrap();
    create_run(&dir, Some("Explain fractions"));
    let swept = json_stdout(runledger(&dir).args(["sweep", "--older-than-secs", "60"]));
    assert_eq!(swept["swept"], serde_json::json!([]));
}

// ──────────────────────────────────────────────
// 4. Artefacts and audit
// ──────────────────────────────────────────────

#[test]
fn audit_respects_limit_and_run_filter() {
    let dir = TempDir::new().unwrap();
    let a = create_run(&dir, None);
    let b = create_run(&dir, Some("Explain fractions"));
    runledger(&dir).args(["approve", &a]).assert().success();
    runledger(&dir).args(["reject", &b]).assert().success();

    let all = json_stdout(runledger(&dir).arg("audit"));
    assert_eq!(all["data"].as_array().unwrap().len(), 3);

    let limited = json_stdout(runledger(&dir).args(["audit", "--limit", "1"]));
    let limited = limited["data"].as_array().unwrap();
    assert_eq!(limited.len(), 1);
    assert_eq!(limited[0]["event_type"], "teacher_gate_rejected");

    let for_a = json_stdout(runledger(&dir).args(["audit", "--run", &a]));
    assert_eq!(for_a["data"].as_array().unwrap().len(), 2);
}

#[test]
fn artefacts_with_empty_run_filter_is_empty() {
    let dir = TempDir::new().unwrap();
    create_run(&dir, Some("Explain fractions"));
    runledger(&dir)
        .args(["artefacts", "--run", ""])
        .assert()
        .success()
        .stdout(predicate::str::contains("no artefacts"));
}
