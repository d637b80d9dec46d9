//! Integration tests for the CLI interface

use assert_cmd::Command;
use predicates::prelude::*;
use tempfile::TempDir;

fn thorns(dir: &TempDir) -> Command {
    let mut cmd = Command::cargo_bin("thorns").unwrap();
    cmd.current_dir(dir.path())
        .env_remove("THORNS_BACKEND")
        .env_remove("THORNS_WORKERS")
        .env_remove("THORNS_SHOW_STATUS")
        .env_remove("THORNS_LOG_LEVEL");
    cmd
}

#[test]
fn test_cli_help() {
    let dir = TempDir::new().unwrap();
    thorns(&dir)
        .arg("--help")
        .assert()
        .success()
        .stdout(predicate::str::contains("Usage:"))
        .stdout(predicate::str::contains("greenwood"));
}

#[test]
fn test_greenwood_apex_is_zero() {
    let dir = TempDir::new().unwrap();
    thorns(&dir)
        .args(["greenwood", "--no-status", "0"])
        .assert()
        .success()
        .stdout("0\n");
}

#[test]
fn test_greenwood_keeps_input_order() {
    let dir = TempDir::new().unwrap();
    let output = thorns(&dir)
        .args([
            "greenwood",
            "--backend",
            "threads",
            "--workers",
            "3",
            "--no-status",
            "0.03",
            "0",
            "0.01",
        ])
        .output()
        .unwrap();
    assert!(output.status.success());

    let values: Vec<f64> = String::from_utf8(output.stdout)
        .unwrap()
        .lines()
        .map(|l| l.parse().unwrap())
        .collect();
    assert_eq!(values.len(), 3);
    assert!(values[0] > values[2]);
    assert_eq!(values[1], 0.0);
}

#[test]
fn test_greenwood_inverse() {
    let dir = TempDir::new().unwrap();
    thorns(&dir)
        .args(["greenwood", "--inverse", "--backend", "serial", "--no-status", "0"])
        .assert()
        .success()
        .stdout("0\n");
}

#[test]
fn test_unknown_backend_is_rejected() {
    let dir = TempDir::new().unwrap();
    thorns(&dir)
        .args(["greenwood", "--backend", "gpu", "0"])
        .assert()
        .failure()
        .stderr(predicate::str::contains("unknown backend 'gpu'"));
}

#[test]
fn test_config_reads_project_file_and_env() {
    let dir = TempDir::new().unwrap();
    std::fs::write(dir.path().join("thorns.toml"), "backend = \"serial\"\nworkers = 2\n").unwrap();

    thorns(&dir)
        .env("THORNS_SHOW_STATUS", "false")
        .arg("config")
        .assert()
        .success()
        .stdout(predicate::str::contains("backend = \"serial\""))
        .stdout(predicate::str::contains("workers = 2"))
        .stdout(predicate::str::contains("show_status = false"));
}

#[test]
fn test_invalid_config_exits_with_config_code() {
    let dir = TempDir::new().unwrap();
    std::fs::write(dir.path().join("thorns.toml"), "workers = 0\n").unwrap();

    thorns(&dir)
        .arg("config")
        .assert()
        .code(2)
        .stderr(predicate::str::contains("workers must be at least 1"));
}

#[test]
fn test_missing_explicit_config() {
    let dir = TempDir::new().unwrap();
    thorns(&dir)
        .args(["--config", "missing.toml", "config"])
        .assert()
        .code(2)
        .stderr(predicate::str::contains("cannot read"));
}

#[test]
fn test_non_finite_value_is_rejected() {
    let dir = TempDir::new().unwrap();
    thorns(&dir)
        .args(["greenwood", "--no-status", "0.01", "nan"])
        .assert()
        .code(8)
        .stderr(predicate::str::contains("value #2"));
}

#[test]
fn test_inverse_below_range_is_rejected() {
    let dir = TempDir::new().unwrap();
    thorns(&dir)
        .args(["greenwood", "--inverse", "--no-status", "-500"])
        .assert()
        .code(8)
        .stderr(predicate::str::contains("must be above"));
}

#[test]
fn test_place_with_infinite_frequency_is_rejected() {
    let dir = TempDir::new().unwrap();
    thorns(&dir)
        .args(["greenwood", "--no-status", "0.01", "10"])
        .assert()
        .code(8)
        .stdout("")
        .stderr(predicate::str::contains("place 10 m is beyond"));
}

#[test]
fn test_verbose_error_names_code() {
    let dir = TempDir::new().unwrap();
    thorns(&dir)
        .args(["-v", "greenwood", "--no-status", "nan"])
        .assert()
        .code(8)
        .stderr(predicate::str::contains("Error code E7001: Value is not a number"));
}
