//! Smoke tests -- verify the binary runs and key subcommands work end to end.

mod common;

use std::path::{Path, PathBuf};

use assert_cmd::Command;
use predicates::prelude::*;
use tempfile::TempDir;

/// Write a config whose every artifact lives under `dir`.
fn write_config(dir: &Path) -> PathBuf {
    let p = |name: &str| dir.join(name).display().to_string();
    let toml = format!(
        r#"
[storage]
snapshot_path = "{snapshot}"
events_path = "{events}"
sessions_path = "{sessions}"
checkpoint_path = "{checkpoint}"
notifications_log = "{notifications}"
tasks_log = "{tasks}"
emails_log = "{emails}"
report_path = "{report}"
knowledge_path = "{knowledge}"

[schedule]
cron = "0 */15 * * * *"

[logging]
level = "warn"
"#,
        snapshot = p("snapshot.json"),
        events = p("memory.json"),
        sessions = p("sessions.json"),
        checkpoint = p("checkpoint.json"),
        notifications = p("notifications.json"),
        tasks = p("tasks.json"),
        emails = p("emails.json"),
        report = p("report.txt"),
        knowledge = p("knowledge.json"),
    );
    let path = dir.join("aiocc.toml");
    std::fs::write(&path, toml).unwrap();

    let snapshot = serde_json::to_string(&common::degraded_snapshot()).unwrap();
    std::fs::write(dir.join("snapshot.json"), snapshot).unwrap();
    path
}

fn aiocc(config: &Path) -> Command {
    let mut cmd = Command::cargo_bin("aiocc").unwrap();
    cmd.env("AIOCC_CONFIG", config)
        .env_remove("AIOCC_TOOLS_URL")
        .env_remove("AIOCC_REASONER_URL")
        .env_remove("AIOCC_DEMO_MODE")
        .env_remove("RUST_LOG");
    cmd
}

#[test]
fn test_cli_help() {
    Command::cargo_bin("aiocc")
        .unwrap()
        .arg("--help")
        .assert()
        .success()
        .stdout(predicate::str::contains("Incident orchestration"));
}

#[test]
fn test_cli_version() {
    Command::cargo_bin("aiocc")
        .unwrap()
        .arg("--version")
        .assert()
        .success()
        .stdout(predicate::str::contains("aiocc"));
}

#[test]
fn test_schedule_dry_run() {
    let dir = TempDir::new().unwrap();
    let config = write_config(dir.path());
    aiocc(&config)
        .args(["schedule", "dry-run", "--hours", "1"])
        .assert()
        .success()
        .stdout(predicate::str::contains("Upcoming runs"));
}

#[test]
fn test_session_create_and_list() {
    let dir = TempDir::new().unwrap();
    let config = write_config(dir.path());
    aiocc(&config)
        .args(["session", "create", "--name", "nightly"])
        .assert()
        .success()
        .stdout(predicate::str::contains("\"state\": \"active\""));

    aiocc(&config)
        .args(["session", "list"])
        .assert()
        .success()
        .stdout(predicate::str::contains("nightly"));
}

#[test]
fn test_run_cycle_prints_incident_and_writes_report() {
    let dir = TempDir::new().unwrap();
    let config = write_config(dir.path());
    aiocc(&config)
        .arg("run-cycle")
        .assert()
        .success()
        .stdout(predicate::str::contains("pause_campaign"))
        .stdout(predicate::str::contains("\"status\": \"completed\""));

    assert!(dir.path().join("report.txt").exists());
    aiocc(&config)
        .args(["events", "find", "--type", "incident"])
        .assert()
        .success()
        .stdout(predicate::str::contains("trace_id"));
}

#[test]
fn test_step_then_reject_survives_restart() {
    let dir = TempDir::new().unwrap();
    let config = write_config(dir.path());
    aiocc(&config).arg("step").assert().success();
    assert!(dir.path().join("checkpoint.json").exists());

    // a second step is refused while one is pending
    aiocc(&config).arg("step").assert().failure();

    aiocc(&config)
        .args(["reject", "--reason", "not during launch"])
        .assert()
        .success()
        .stdout(predicate::str::contains("not during launch"));
    assert!(!dir.path().join("checkpoint.json").exists());

    aiocc(&config)
        .arg("approve")
        .assert()
        .failure()
        .stderr(predicate::str::contains("no cycle is awaiting approval"));
}
