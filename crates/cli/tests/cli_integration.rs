//! CLI integration tests.
//!
//! Uses `assert_cmd` to spawn the `rma` binary against store snapshots in
//! temporary directories and checks exit codes, stdout and stderr.

use assert_cmd::cargo::cargo_bin_cmd;
use assert_cmd::Command;
use predicates::prelude::*;
use std::fs;
use std::path::{Path, PathBuf};
use tempfile::TempDir;

const NOW: &str = "2025-06-01T12:00:00Z";

fn rma() -> Command {
    let mut cmd = cargo_bin_cmd!("rma");
    cmd.env_remove("RMA_LOG");
    cmd.env_remove("RMA_TICKET_API_TOKEN");
    cmd
}

fn write(dir: &TempDir, name: &str, content: &str) -> PathBuf {
    let path = dir.path().join(name);
    fs::write(&path, content).unwrap();
    path
}

fn path_arg(path: &Path) -> &str {
    path.to_str().unwrap()
}

/// Open a received case from an operator claim and return its id.
fn open_case(store: &Path, dir: &TempDir, key: &str, unit_received: bool) -> String {
    let claim = write(
        dir,
        &format!("{key}.json"),
        &format!(
            r#"{{
                "source": "operator",
                "idempotency_key": "{key}",
                "serial_number": "abc123",
                "customer": {{ "email": "buyer@example.com" }},
                "unit_received": {unit_received}
            }}"#
        ),
    );
    let out = rma()
        .args(["--output", "json", "intake", "--store"])
        .arg(store)
        .args(["--claim", path_arg(&claim), "--now", NOW])
        .output()
        .unwrap();
    assert!(out.status.success(), "intake failed: {:?}", out);
    let outcome: serde_json::Value = serde_json::from_slice(&out.stdout).unwrap();
    outcome["case"]["id"].as_str().unwrap().to_string()
}

// ──────────────────────────────────────────────
// 1. Help and version
// ──────────────────────────────────────────────

#[test]
fn help_exits_0_with_description() {
    rma()
        .arg("--help")
        .assert()
        .success()
        .stdout(predicate::str::contains("Return case lifecycle tool"));
}

#[test]
fn version_exits_0() {
    rma()
        .arg("--version")
        .assert()
        .success()
        .stdout(predicate::str::contains("rma"));
}

#[test]
fn unknown_stage_is_rejected_by_parser() {
    rma()
        .args(["transition", "--store", "s.json", "--case", "c", "--to", "shipped"])
        .assert()
        .failure()
        .stderr(predicate::str::contains("unknown stage 'shipped'"));
}

// ──────────────────────────────────────────────
// 2. Warranty
// ──────────────────────────────────────────────

#[test]
fn warranty_out_of_window() {
    rma()
        .args(["warranty", "--processed-at", "2024-01-01", "--now", NOW])
        .assert()
        .success()
        .stdout(predicate::str::contains("status:     out_of_warranty"))
        .stdout(predicate::str::contains("expires_at: 2025-01-01T00:00:00Z"));
}

#[test]
fn warranty_json_with_longer_window() {
    let out = rma()
        .args([
            "--output",
            "json",
            "warranty",
            "--processed-at",
            "2024-01-01T08:30:00-05:00",
            "--years",
            "2",
            "--now",
            NOW,
        ])
        .output()
        .unwrap();
    assert!(out.status.success());
    let snapshot: serde_json::Value = serde_json::from_slice(&out.stdout).unwrap();
    assert_eq!(snapshot["status"], "in_warranty");
    assert_eq!(snapshot["basis"], "manufacturer");
    assert_eq!(snapshot["expires_at"], "2026-01-01T13:30:00Z");
}

#[test]
fn warranty_without_date_is_unknown() {
    rma()
        .args(["warranty", "--now", NOW])
        .assert()
        .success()
        .stdout(predicate::str::contains("status:     unknown"))
        .stdout(predicate::str::contains("expires_at: -"));
}

#[test]
fn warranty_rejects_out_of_range_years() {
    rma()
        .args(["warranty", "--processed-at", "2024-01-01", "--years", "0"])
        .assert()
        .failure()
        .stderr(predicate::str::contains("invalid config"));
}

// ──────────────────────────────────────────────
// 3. Intake and transitions
// ──────────────────────────────────────────────

#[test]
fn intake_creates_store_and_dedups() {
    let dir = TempDir::new().unwrap();
    let store = dir.path().join("store.json");
    let id = open_case(&store, &dir, "op-1", false);
    assert!(store.exists());

    let claim = dir.path().join("op-1.json");
    rma()
        .args(["intake", "--store", path_arg(&store), "--claim", path_arg(&claim)])
        .assert()
        .success()
        .stdout(predicate::str::contains(format!("matched open case {id}")));

    let snapshot: serde_json::Value =
        serde_json::from_str(&fs::read_to_string(&store).unwrap()).unwrap();
    assert_eq!(snapshot["cases"].as_array().unwrap().len(), 1);
    assert_eq!(snapshot["serials"][0]["serial_number"], "ABC123");
    assert_eq!(snapshot["serials"][0]["case_count"], 1);
}

#[test]
fn intake_rejects_invalid_claim_json() {
    let dir = TempDir::new().unwrap();
    let claim = write(&dir, "bad.json", r#"{ "source": "carrier_pigeon" }"#);
    rma()
        .args(["intake", "--store"])
        .arg(dir.path().join("store.json"))
        .args(["--claim", path_arg(&claim)])
        .assert()
        .failure()
        .stderr(predicate::str::contains("error parsing claim file"));
}

#[test]
fn transition_without_evidence_fails_with_json_detail() {
    let dir = TempDir::new().unwrap();
    let store = dir.path().join("store.json");
    let id = open_case(&store, &dir, "op-2", false);

    let out = rma()
        .args(["--output", "json", "transition", "--store", path_arg(&store)])
        .args(["--case", &id, "--to", "testing"])
        .output()
        .unwrap();
    assert_eq!(out.status.code(), Some(1));
    let err: serde_json::Value = serde_json::from_slice(&out.stderr).unwrap();
    assert_eq!(err["kind"], "transition");
    assert_eq!(err["rule"], "missing_evidence");
    assert_eq!(err["missing"], serde_json::json!(["received_at"]));
}

#[test]
fn transition_writes_snapshot_and_history() {
    let dir = TempDir::new().unwrap();
    let store = dir.path().join("store.json");
    let id = open_case(&store, &dir, "op-3", true);

    rma()
        .args(["transition", "--store", path_arg(&store), "--case", &id])
        .args(["--to", "testing", "--note", "bench test", "--now", NOW])
        .assert()
        .success()
        .stdout(predicate::str::contains(format!("case {id}: received -> testing")));

    let snapshot: serde_json::Value =
        serde_json::from_str(&fs::read_to_string(&store).unwrap()).unwrap();
    assert_eq!(snapshot["cases"][0]["stage"], "testing");
    assert_eq!(snapshot["cases"][0]["inspected_at"], NOW);

    rma()
        .args(["history", "--store", path_arg(&store), "ABC123"])
        .assert()
        .success()
        .stdout(predicate::str::contains("serial ABC123: 1 case(s)"))
        .stdout(predicate::str::contains("stage changed from received to testing"));
}

#[test]
fn skipping_testing_is_rejected() {
    let dir = TempDir::new().unwrap();
    let store = dir.path().join("store.json");
    let id = open_case(&store, &dir, "op-4", true);

    rma()
        .args(["transition", "--store", path_arg(&store), "--case", &id])
        .args(["--to", "repaired_replaced"])
        .assert()
        .failure()
        .stderr(predicate::str::contains("without testing"));
}

#[test]
fn transition_on_missing_store_fails() {
    let dir = TempDir::new().unwrap();
    rma()
        .args(["transition", "--store"])
        .arg(dir.path().join("absent.json"))
        .args(["--case", "c-1", "--to", "testing"])
        .assert()
        .failure()
        .stderr(predicate::str::contains("error reading store"));
}

#[test]
fn quiet_suppresses_error_output() {
    let dir = TempDir::new().unwrap();
    rma()
        .args(["--quiet", "history", "--store"])
        .arg(dir.path().join("absent.json"))
        .arg("ABC123")
        .assert()
        .failure()
        .stderr(predicate::str::is_empty());
}

// ──────────────────────────────────────────────
// 4. Reports
// ──────────────────────────────────────────────

#[test]
fn report_stages_flags_overdue_cases() {
    let dir = TempDir::new().unwrap();
    let store = dir.path().join("store.json");
    let id = open_case(&store, &dir, "op-5", false);

    rma()
        .args(["report", "stages", "--store", path_arg(&store)])
        .args(["--now", "2025-06-01T22:00:00Z"])
        .assert()
        .success()
        .stdout(predicate::str::contains(&id))
        .stdout(predicate::str::contains("10.0h"))
        .stdout(predicate::str::contains("OVERDUE").not());

    rma()
        .args(["report", "stages", "--store", path_arg(&store)])
        .args(["--now", "2025-06-10T12:00:00Z"])
        .assert()
        .success()
        .stdout(predicate::str::contains("OVERDUE"));
}

#[test]
fn report_exceptions_summary() {
    let dir = TempDir::new().unwrap();
    let store = dir.path().join("store.json");
    open_case(&store, &dir, "op-6", false);

    rma()
        .args(["report", "exceptions", "--store", path_arg(&store), "--summary"])
        .args(["--now", NOW])
        .assert()
        .success()
        .stdout(predicate::str::contains("needs_inbound_tracking: 1"));

    let out = rma()
        .args(["--output", "json", "report", "exceptions", "--store"])
        .arg(&store)
        .args(["--now", NOW])
        .output()
        .unwrap();
    assert!(out.status.success());
    let reports: serde_json::Value = serde_json::from_slice(&out.stdout).unwrap();
    assert_eq!(
        reports[0]["exception_types"],
        serde_json::json!(["needs_inbound_tracking"])
    );
}

// ──────────────────────────────────────────────
// 5. Config
// ──────────────────────────────────────────────

#[test]
fn check_config_accepts_valid_file() {
    let dir = TempDir::new().unwrap();
    let config = write(
        &dir,
        "rma.toml",
        r#"
[warranty]
years = 2

[ticket_mirror]
base_url = "https://tickets.example.com/api"

[ticket_mirror.stages]
received = "New"
"#,
    );
    rma()
        .args(["check-config", path_arg(&config)])
        .assert()
        .success()
        .stdout(predicate::str::contains(
            "ok (warranty 2 year(s), ticket mirror https://tickets.example.com/api)",
        ));
}

#[test]
fn check_config_rejects_unknown_stage() {
    let dir = TempDir::new().unwrap();
    let config = write(
        &dir,
        "rma.toml",
        r#"
[ticket_mirror]
base_url = "https://tickets.example.com/api"

[ticket_mirror.stages]
shipped = "Closed"
"#,
    );
    let out = rma()
        .args(["--output", "json", "check-config", path_arg(&config)])
        .output()
        .unwrap();
    assert_eq!(out.status.code(), Some(1));
    let err: serde_json::Value = serde_json::from_slice(&out.stderr).unwrap();
    assert_eq!(err["kind"], "config");
    assert!(err["error"].as_str().unwrap().contains("shipped"));
}

#[test]
fn check_config_missing_file() {
    rma()
        .args(["check-config", "/nonexistent/rma.toml"])
        .assert()
        .failure()
        .stderr(predicate::str::contains("could not read"));
}
