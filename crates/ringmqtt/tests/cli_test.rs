//! Integration tests for the `ringmqtt` binary.
//!
//! Everything here runs without a broker or Ring account: argument
//! parsing, config handling, token seeding and the startup failures
//! that happen before any network traffic.
#![allow(clippy::unwrap_used)]

use std::path::Path;

use assert_cmd::cargo::cargo_bin_cmd;
use predicates::prelude::*;

// ── Helpers ─────────────────────────────────────────────────────────

/// Build a [`Command`] for the binary with env isolation.
///
/// Clears the `RINGMQTT_*` variables the tests rely on and points config
/// directories at a nonexistent path.
fn ringmqtt_cmd() -> assert_cmd::Command {
    let mut cmd = cargo_bin_cmd!("ringmqtt");
    cmd.env("HOME", "/tmp/ringmqtt-cli-test-nonexistent")
        .env("XDG_CONFIG_HOME", "/tmp/ringmqtt-cli-test-nonexistent")
        .env_remove("RUST_LOG")
        .env_remove("RINGMQTT_CONFIG")
        .env_remove("RINGMQTT_RING_TOKEN")
        .env_remove("RINGMQTT_MQTT_URL")
        .env_remove("RINGMQTT_MQTT_PASS")
        .env_remove("RINGMQTT_STATE_FILE")
        .env_remove("RINGMQTT_MEDIA_BINARY");
    cmd
}

/// Same as [`ringmqtt_cmd`], scoped to a config file and state file in `dir`.
fn scoped_cmd(dir: &Path) -> assert_cmd::Command {
    let mut cmd = ringmqtt_cmd();
    cmd.arg("--config")
        .arg(dir.join("config.toml"))
        .env("RINGMQTT_STATE_FILE", dir.join("state.json"));
    cmd
}

fn combined_output(output: &std::process::Output) -> String {
    let stdout = String::from_utf8_lossy(&output.stdout);
    let stderr = String::from_utf8_lossy(&output.stderr);
    format!("{stdout}{stderr}")
}

// ── Basic invocation ────────────────────────────────────────────────

#[test]
fn test_no_args_shows_help() {
    let output = ringmqtt_cmd().output().unwrap();
    assert_eq!(output.status.code(), Some(2));
    let text = combined_output(&output);
    assert!(text.contains("Usage"), "Expected 'Usage' in output:\n{text}");
}

#[test]
fn test_help_lists_commands() {
    ringmqtt_cmd().arg("--help").assert().success().stdout(
        predicate::str::contains("run")
            .and(predicate::str::contains("token"))
            .and(predicate::str::contains("config")),
    );
}

#[test]
fn test_version_flag() {
    ringmqtt_cmd()
        .arg("--version")
        .assert()
        .success()
        .stdout(predicate::str::contains("ringmqtt"));
}

#[test]
fn test_unknown_log_format_rejected() {
    ringmqtt_cmd()
        .args(["--log-format", "xml", "config", "path"])
        .assert()
        .code(2);
}

// ── Config ──────────────────────────────────────────────────────────

#[test]
fn test_config_path_honours_flag() {
    let dir = tempfile::tempdir().unwrap();
    scoped_cmd(dir.path())
        .args(["config", "path"])
        .assert()
        .success()
        .stdout(predicate::str::contains("config.toml"));
}

#[test]
fn test_config_show_redacts_secrets() {
    let dir = tempfile::tempdir().unwrap();
    scoped_cmd(dir.path())
        .env("RINGMQTT_RING_TOKEN", "tok-value-123")
        .env("RINGMQTT_MQTT_PASS", "hunter2")
        .args(["config", "show"])
        .assert()
        .success()
        .stdout(
            predicate::str::contains("********")
                .and(predicate::str::contains("tok-value-123").not())
                .and(predicate::str::contains("hunter2").not())
                .and(predicate::str::contains("ring_topic")),
        );
}

#[test]
fn test_config_show_rejects_invalid_topic() {
    let dir = tempfile::tempdir().unwrap();
    let output = scoped_cmd(dir.path())
        .env("RINGMQTT_RING_TOPIC", "ring/#")
        .args(["config", "show"])
        .output()
        .unwrap();
    assert_eq!(output.status.code(), Some(2));
    assert!(combined_output(&output).contains("ring_topic"));
}

#[test]
fn test_config_init_writes_once() {
    let dir = tempfile::tempdir().unwrap();
    scoped_cmd(dir.path())
        .args(["config", "init"])
        .assert()
        .success();
    let written = std::fs::read_to_string(dir.path().join("config.toml")).unwrap();
    assert!(written.contains("mqtt_url"));

    let output = scoped_cmd(dir.path())
        .args(["config", "init"])
        .output()
        .unwrap();
    assert_eq!(output.status.code(), Some(2));
    assert!(combined_output(&output).contains("--force"));

    scoped_cmd(dir.path())
        .args(["config", "init", "--force"])
        .assert()
        .success();
}

// ── Token ───────────────────────────────────────────────────────────

#[test]
fn test_token_seeds_state_file() {
    let dir = tempfile::tempdir().unwrap();
    scoped_cmd(dir.path())
        .args(["token", "seed-token-abc"])
        .assert()
        .success();

    let state = std::fs::read_to_string(dir.path().join("state.json")).unwrap();
    assert!(state.contains("seed-token-abc"));
    assert!(state.contains("systemId"));
}

#[test]
fn test_token_keeps_system_id() {
    let dir = tempfile::tempdir().unwrap();
    let state_path = dir.path().join("state.json");
    std::fs::write(
        &state_path,
        r#"{"ring_token":"old","systemId":"fixed-id","devices":{}}"#,
    )
    .unwrap();

    scoped_cmd(dir.path())
        .args(["token", "new-token"])
        .assert()
        .success();

    let state = std::fs::read_to_string(&state_path).unwrap();
    assert!(state.contains("fixed-id"));
    assert!(state.contains("new-token"));
    assert!(!state.contains("\"old\""));
}

#[test]
fn test_empty_token_rejected() {
    let dir = tempfile::tempdir().unwrap();
    scoped_cmd(dir.path())
        .args(["token", "  "])
        .assert()
        .code(2);
    assert!(!dir.path().join("state.json").exists());
}

// ── Run ─────────────────────────────────────────────────────────────

#[test]
fn test_run_rejects_bad_mqtt_url() {
    let dir = tempfile::tempdir().unwrap();
    let output = scoped_cmd(dir.path())
        .env("RINGMQTT_MQTT_URL", "http://broker:1883")
        .env("RINGMQTT_RING_TOKEN", "tok-value")
        .arg("run")
        .output()
        .unwrap();
    assert_eq!(output.status.code(), Some(2));
    assert!(combined_output(&output).contains("mqtt_url"));
}

#[test]
fn test_run_without_token_exits_with_auth_code() {
    let dir = tempfile::tempdir().unwrap();
    let output = scoped_cmd(dir.path()).arg("run").output().unwrap();
    assert_eq!(output.status.code(), Some(3));
    assert!(combined_output(&output).contains("ringmqtt token"));
}
