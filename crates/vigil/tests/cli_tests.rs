//! Smoke tests for the vigil CLI surface.

use assert_cmd::Command;
use predicates::prelude::*;

#[test]
fn help_lists_subcommands() {
    Command::cargo_bin("vigil")
        .unwrap()
        .arg("--help")
        .assert()
        .success()
        .stdout(predicate::str::contains("logs"))
        .stdout(predicate::str::contains("demo"));
}

#[test]
fn logs_dir_prints_configured_directory() {
    let tmp = tempfile::tempdir().unwrap();
    let log_dir = tmp.path().join("captures");
    let config_path = tmp.path().join("vigil.toml");
    std::fs::write(
        &config_path,
        format!("log_dir = {:?}\n", log_dir.display().to_string()),
    )
    .unwrap();

    Command::cargo_bin("vigil")
        .unwrap()
        .args(["logs", "dir", "--config"])
        .arg(&config_path)
        .assert()
        .success()
        .stdout(predicate::str::contains("captures"));
}

#[test]
fn logs_list_on_empty_directory_reports_none() {
    let tmp = tempfile::tempdir().unwrap();
    let config_path = tmp.path().join("vigil.toml");
    std::fs::write(
        &config_path,
        format!(
            "log_dir = {:?}\n",
            tmp.path().join("empty").display().to_string()
        ),
    )
    .unwrap();

    Command::cargo_bin("vigil")
        .unwrap()
        .args(["logs", "list", "--config"])
        .arg(&config_path)
        .assert()
        .success()
        .stdout(predicate::str::contains("no capture files"));
}

#[test]
fn invalid_config_fails_cleanly() {
    let tmp = tempfile::tempdir().unwrap();
    let config_path = tmp.path().join("vigil.toml");
    std::fs::write(&config_path, "hang_timeout_ms = 0\n").unwrap();

    Command::cargo_bin("vigil")
        .unwrap()
        .args(["logs", "dir", "--config"])
        .arg(&config_path)
        .assert()
        .failure();
}
