//! CLI integration tests for neo-catalog.
//!
//! These tests cover argument parsing, help output, the commands that run
//! without a server (script generation, dry-run loads) and exit codes for
//! configuration errors.

use assert_cmd::Command;
use predicates::prelude::*;
use std::fs;
use std::path::Path;

/// Get a command for the neo-catalog binary.
fn cmd() -> Command {
    Command::cargo_bin("neo-catalog").unwrap()
}

fn write_config(dir: &Path) -> std::path::PathBuf {
    let path = dir.join("neo-catalog.yaml");
    fs::write(
        &path,
        "connection:\n  host: localhost\n  password: secret\nloader:\n  commit_every: 10\n",
    )
    .unwrap();
    path
}

const NEO_CSV: &str = "\
id;spkid;full_name;pdes;name;prefix;neo;pha;h;diameter;orbit_id;epoch;epoch_mjd;epoch_cal;e;a;q;i;class;class_description
a0000433;2000433;433 Eros (A898 PA);433;Eros;;Y;N;10.4;16.84;JPL 659;2460600.5;60600;20241017;0.2229;1.458;1.133;10.83;AMO;Amor
bNOKEY;;Nameless;;;;N;N;;;;;;;;;;;;
";

// =============================================================================
// Help and Version Tests
// =============================================================================

#[test]
fn test_help_shows_all_commands() {
    cmd()
        .arg("--help")
        .assert()
        .success()
        .stdout(predicate::str::contains("init"))
        .stdout(predicate::str::contains("health-check"))
        .stdout(predicate::str::contains("load-neo"))
        .stdout(predicate::str::contains("load-mpcorb"))
        .stdout(predicate::str::contains("generate-sql"))
        .stdout(predicate::str::contains("apply-script"))
        .stdout(predicate::str::contains("verify"))
        .stdout(predicate::str::contains("monitor"))
        .stdout(predicate::str::contains("alerts"));
}

#[test]
fn test_version_flag() {
    cmd()
        .arg("--version")
        .assert()
        .success()
        .stdout(predicate::str::contains("neo-catalog"));
}

#[test]
fn test_load_neo_help() {
    cmd()
        .args(["load-neo", "--help"])
        .assert()
        .success()
        .stdout(predicate::str::contains("--merged"))
        .stdout(predicate::str::contains("--dry-run"));
}

#[test]
fn test_alerts_subcommands() {
    cmd()
        .args(["alerts", "--help"])
        .assert()
        .success()
        .stdout(predicate::str::contains("list"))
        .stdout(predicate::str::contains("search"))
        .stdout(predicate::str::contains("create"))
        .stdout(predicate::str::contains("watch"));
}

#[test]
fn test_alerts_create_requires_fields() {
    cmd()
        .args(["alerts", "create", "--asteroid", "1"])
        .assert()
        .failure()
        .stderr(predicate::str::contains("--criteria"));
}

// =============================================================================
// Global Flags Tests
// =============================================================================

#[test]
fn test_config_default() {
    cmd()
        .arg("--help")
        .assert()
        .success()
        .stdout(predicate::str::contains("--config"))
        .stdout(predicate::str::contains("[default: neo-catalog.yaml]"))
        .stdout(predicate::str::contains("--legacy-config"))
        .stdout(predicate::str::contains("--output-json"));
}

// =============================================================================
// Configuration Error Tests
// =============================================================================

#[test]
fn test_missing_config_exits_with_config_error() {
    let dir = tempfile::tempdir().unwrap();
    cmd()
        .current_dir(dir.path())
        .args(["--config", "nope.yaml", "health-check"])
        .assert()
        .code(1)
        .stderr(predicate::str::contains("Configuration file not found"));
}

#[test]
fn test_invalid_config_exits_with_config_error() {
    let dir = tempfile::tempdir().unwrap();
    let path = dir.path().join("bad.yaml");
    fs::write(&path, "connection:\n  host: ''\n").unwrap();

    cmd()
        .arg("--config")
        .arg(&path)
        .arg("health-check")
        .assert()
        .code(1)
        .stderr(predicate::str::contains("connection.host is required"));
}

#[test]
fn test_unparseable_config_exits_with_config_error() {
    let dir = tempfile::tempdir().unwrap();
    let path = dir.path().join("broken.yaml");
    fs::write(&path, "connection: [unclosed\n").unwrap();

    cmd()
        .arg("--config")
        .arg(&path)
        .arg("monitor")
        .assert()
        .code(1);
}

// =============================================================================
// Script Generation Tests
// =============================================================================

#[test]
fn test_generate_sql_merges_csv_into_template() {
    let dir = tempfile::tempdir().unwrap();
    let template = dir.path().join("NEOs_database.sql");
    let csv = dir.path().join("merged.csv");
    let output = dir.path().join("NEOs_database_correct.sql");
    fs::write(
        &template,
        "USE [NEOs]\nGO\nINSERT [dbo].[Class_Orbital] ([class_code], [class_description]) VALUES (N'OLD', N'Old')\nGO\n",
    )
    .unwrap();
    fs::write(&csv, NEO_CSV).unwrap();

    cmd()
        .args(["generate-sql", "--template"])
        .arg(&template)
        .arg("--csv")
        .arg(&csv)
        .arg("--output")
        .arg(&output)
        .assert()
        .success()
        .stdout(predicate::str::contains("Classes: 1"))
        .stdout(predicate::str::contains("Orbits: 1"));

    let script = fs::read_to_string(&output).unwrap();
    assert!(script.starts_with("USE [NEOs]\nGO\n"));
    assert!(script.contains("N'AMO'"));
    assert!(!script.contains("N'OLD'"));
}

#[test]
fn test_generate_sql_json_output() {
    let dir = tempfile::tempdir().unwrap();
    let template = dir.path().join("t.sql");
    let csv = dir.path().join("merged.csv");
    fs::write(&template, "GO\n").unwrap();
    fs::write(&csv, NEO_CSV).unwrap();

    cmd()
        .arg("--output-json")
        .args(["generate-sql", "--template"])
        .arg(&template)
        .arg("--csv")
        .arg(&csv)
        .arg("--output")
        .arg(dir.path().join("out.sql"))
        .assert()
        .success()
        .stdout(predicate::str::contains("\"orbits\": 1"));
}

#[test]
fn test_generate_sql_missing_template_is_io_error() {
    let dir = tempfile::tempdir().unwrap();
    let csv = dir.path().join("merged.csv");
    fs::write(&csv, NEO_CSV).unwrap();

    cmd()
        .args(["generate-sql", "--template"])
        .arg(dir.path().join("missing.sql"))
        .arg("--csv")
        .arg(&csv)
        .arg("--output")
        .arg(dir.path().join("out.sql"))
        .assert()
        .code(7);
}

// =============================================================================
// Dry-Run Load Tests
// =============================================================================

#[test]
fn test_load_neo_dry_run_reports_counts() {
    let dir = tempfile::tempdir().unwrap();
    let config = write_config(dir.path());
    let csv = dir.path().join("neo.csv");
    fs::write(&csv, NEO_CSV).unwrap();

    cmd()
        .arg("--config")
        .arg(&config)
        .arg("load-neo")
        .arg(&csv)
        .arg("--dry-run")
        .assert()
        .success()
        .stdout(predicate::str::contains("Dry run completed!"))
        .stdout(predicate::str::contains("Rows read: 2"))
        .stdout(predicate::str::contains("Asteroids: 1 inserted"))
        .stdout(predicate::str::contains("Missing id or spkid"));
}

#[test]
fn test_load_neo_dry_run_json() {
    let dir = tempfile::tempdir().unwrap();
    let config = write_config(dir.path());
    let csv = dir.path().join("neo.csv");
    fs::write(&csv, NEO_CSV).unwrap();

    cmd()
        .arg("--config")
        .arg(&config)
        .args(["--output-json", "load-neo"])
        .arg(&csv)
        .args(["--merged", "--dry-run"])
        .assert()
        .success()
        .stdout(predicate::str::contains("\"mode\": \"merged\""))
        .stdout(predicate::str::contains("\"rows_read\": 2"));
}

#[test]
fn test_load_mpcorb_without_link_loads_nothing() {
    let dir = tempfile::tempdir().unwrap();
    let config = write_config(dir.path());
    let csv = dir.path().join("mpcorb.csv");
    fs::write(&csv, "designation,epoch,a,e\n").unwrap();

    cmd()
        .arg("--config")
        .arg(&config)
        .arg("load-mpcorb")
        .arg(&csv)
        .arg("--dry-run")
        .assert()
        .success()
        .stdout(predicate::str::contains("linking is disabled"));
}

#[test]
fn test_load_neo_missing_csv_is_io_error() {
    let dir = tempfile::tempdir().unwrap();
    let config = write_config(dir.path());

    cmd()
        .arg("--config")
        .arg(&config)
        .arg("load-neo")
        .arg(dir.path().join("missing.csv"))
        .arg("--dry-run")
        .assert()
        .code(7);
}
