//! Integration tests for the `velbus-homekit` binary.
//!
//! Argument parsing and start-up failures only; nothing here reaches a
//! live gateway.
#![allow(clippy::unwrap_used)]

use std::io::Write;

use assert_cmd::cargo::cargo_bin_cmd;
use predicates::prelude::*;

// ── Helpers ─────────────────────────────────────────────────────────

/// Build a [`Command`] for the binary with env isolation.
fn bridge_cmd() -> assert_cmd::Command {
    let mut cmd = cargo_bin_cmd!("velbus-homekit");
    cmd.env("HOME", "/tmp/velbus-homekit-test-nonexistent")
        .env("XDG_CONFIG_HOME", "/tmp/velbus-homekit-test-nonexistent")
        .env_remove("RUST_LOG")
        .env_remove("VELBUS_CONFIG")
        .env_remove("VELBUS_WEBSOCKET_URL")
        .env_remove("VELBUS_TIMEOUT_SECS")
        .env_remove("VELBUS_RECONNECT_DELAY_SECS")
        .env_remove("VELBUS_RESET_STATE_ON_CONNECT");
    cmd
}

fn controls_file(contents: &str) -> tempfile::NamedTempFile {
    let mut file = tempfile::NamedTempFile::new().unwrap();
    file.write_all(contents.as_bytes()).unwrap();
    file
}

// ── Argument parsing ────────────────────────────────────────────────

#[test]
fn help_describes_arguments() {
    bridge_cmd().arg("--help").assert().success().stdout(
        predicate::str::contains("Velbus HomeKit bridge")
            .and(predicate::str::contains("<BASE_URL>"))
            .and(predicate::str::contains("<CONTROLS_FILE>"))
            .and(predicate::str::contains("--logfile")),
    );
}

#[test]
fn missing_arguments_is_usage_error() {
    bridge_cmd()
        .assert()
        .code(2)
        .stderr(predicate::str::contains("Usage"));
}

#[test]
fn invalid_base_url_is_usage_error() {
    let controls = controls_file("controls:\n  Desk:\n    type: relay\n    icon: light\n    address: [1, 1]\n");

    bridge_cmd()
        .arg("not a url")
        .arg(controls.path())
        .assert()
        .code(2)
        .stderr(predicate::str::contains("base_url"));
}

// ── Start-up failures ───────────────────────────────────────────────

#[test]
fn empty_controls_file_is_rejected() {
    let controls = controls_file("controls: {}\n");

    bridge_cmd()
        .arg("http://127.0.0.1:9")
        .arg(controls.path())
        .assert()
        .code(3)
        .stderr(predicate::str::contains("Could not find `controls`"));
}

#[test]
fn unsupported_controls_only_is_rejected() {
    let controls = controls_file("controls:\n  Fan:\n    type: relay\n    icon: fan\n    address: [1, 2]\n");

    bridge_cmd()
        .arg("http://127.0.0.1:9")
        .arg(controls.path())
        .assert()
        .code(3)
        .stderr(predicate::str::contains("None of the configured controls is supported"));
}

#[test]
fn missing_settings_file_is_rejected() {
    let controls = controls_file("controls:\n  Desk:\n    type: relay\n    icon: light\n    address: [1, 1]\n");

    bridge_cmd()
        .args(["--config", "/tmp/velbus-homekit-test-nonexistent/config.toml"])
        .arg("http://127.0.0.1:9")
        .arg(controls.path())
        .assert()
        .code(3)
        .stderr(predicate::str::contains("config file not found"));
}
