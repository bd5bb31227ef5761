//! Integration tests for the `nmea-monitor` binary.
//!
//! Each test runs the binary with `HOME` pointed at a temporary directory so
//! no user configuration leaks in, then checks stdout and the exit code.

#![allow(deprecated)] // cargo_bin deprecation: macro replacement not yet stable

use assert_cmd::Command;
use predicates::prelude::*;
use serde_json::Value;

const GGA: &str = "$GPGGA,123519,4807.038,N,01131.000,E,1,08,0.9,545.4,M,46.9,M,,*47";

/// Convenience: get a `Command` for the binary with an isolated home directory.
fn monitor(home: &tempfile::TempDir) -> Command {
    let mut cmd = Command::cargo_bin("nmea-monitor").expect("nmea-monitor binary not found");
    cmd.env("HOME", home.path());
    cmd
}

fn snapshot_from(stdout: &[u8]) -> Value {
    let text = String::from_utf8_lossy(stdout);
    let line = text.lines().last().expect("snapshot line on stdout");
    serde_json::from_str(line).expect("snapshot is JSON")
}

#[test]
fn headless_stdin_prints_final_snapshot() {
    let home = tempfile::tempdir().unwrap();
    let output = monitor(&home)
        .arg("--headless")
        .write_stdin(format!("{}\n", GGA))
        .assert()
        .success()
        .stdout(predicate::str::contains("\"fixQuality\":\"GPS\""))
        .get_output()
        .stdout
        .clone();

    let snapshot = snapshot_from(&output);
    assert_eq!(snapshot["altitudeMeters"], 545.4);
    assert!((snapshot["latitude"].as_f64().unwrap() - 48.1173).abs() < 1e-4);
    assert!((snapshot["longitude"].as_f64().unwrap() - 11.516667).abs() < 1e-4);
    assert_eq!(snapshot["satellitesUsed"], 8);
    assert!(snapshot["lastUpdated"]["position"].is_string());
    assert_eq!(snapshot["incomplete"], false);
}

#[test]
fn garbage_input_is_not_fatal() {
    let home = tempfile::tempdir().unwrap();
    monitor(&home)
        .arg("--headless")
        .write_stdin("hello\n$GPGGA*00\n\x01\x02\n")
        .assert()
        .success()
        .stdout(predicate::str::contains("\"fixQuality\":\"NoFix\""));
}

#[test]
fn file_source_is_read() {
    let home = tempfile::tempdir().unwrap();
    let log = home.path().join("drive.nmea");
    std::fs::write(&log, format!("{}\r\n", GGA)).unwrap();

    monitor(&home)
        .arg(&log)
        .arg("--headless")
        .assert()
        .success()
        .stdout(predicate::str::contains("\"altitudeMeters\":545.4"));
}

#[test]
fn missing_source_file_fails() {
    let home = tempfile::tempdir().unwrap();
    monitor(&home)
        .arg(home.path().join("nope.nmea"))
        .arg("--headless")
        .assert()
        .code(1)
        .stderr(predicate::str::contains("Failed to open"));
}

#[test]
fn dashboard_without_terminal_is_a_renderer_error() {
    let home = tempfile::tempdir().unwrap();
    monitor(&home)
        .write_stdin(format!("{}\n", GGA))
        .assert()
        .code(2)
        .stderr(predicate::str::contains("not a terminal"));
}

#[test]
fn missing_explicit_config_fails() {
    let home = tempfile::tempdir().unwrap();
    monitor(&home)
        .arg("--headless")
        .arg("--config")
        .arg(home.path().join("absent.json"))
        .write_stdin("")
        .assert()
        .code(1)
        .stderr(predicate::str::contains("configuration error"));
}

#[test]
fn config_file_and_flags_are_accepted() {
    let home = tempfile::tempdir().unwrap();
    let config = home.path().join("monitor.json");
    std::fs::write(&config, r#"{ "staleness_threshold_ms": 10000 }"#).unwrap();

    monitor(&home)
        .arg("--headless")
        .arg("--config")
        .arg(&config)
        .args(["--gsv-timeout", "500ms", "--refresh", "2s", "-vv"])
        .write_stdin(format!("{}\n", GGA))
        .assert()
        .success()
        .stdout(predicate::str::contains("\"fixQuality\":\"GPS\""));
}

#[test]
fn web_exporter_on_ephemeral_port() {
    let home = tempfile::tempdir().unwrap();
    monitor(&home)
        .args(["--headless", "--web", "0"])
        .write_stdin(format!("{}\n", GGA))
        .assert()
        .success();
}

#[test]
fn invalid_duration_is_rejected() {
    let home = tempfile::tempdir().unwrap();
    monitor(&home)
        .args(["--headless", "--staleness", "soon"])
        .assert()
        .failure();
}
