//! Integration tests for the `iotsync` CLI binary.
//!
//! These tests validate argument parsing, help output, shell completions,
//! error handling, and a few read commands against a wiremock backend.
#![allow(clippy::unwrap_used)]

use assert_cmd::cargo::cargo_bin_cmd;
use predicates::prelude::*;
use wiremock::matchers::{header, method, path};
use wiremock::{Mock, MockServer, ResponseTemplate};

// ── Helpers ─────────────────────────────────────────────────────────

/// Build a [`Command`] for the `iotsync` binary with env isolation.
///
/// Clears all `IOTSYNC_*` env vars and points config directories at a
/// nonexistent path so tests never touch the user's real configuration.
fn iotsync_cmd() -> assert_cmd::Command {
    let mut cmd = cargo_bin_cmd!("iotsync");
    cmd.env("HOME", "/tmp/iotsync-cli-test-nonexistent")
        .env("XDG_CONFIG_HOME", "/tmp/iotsync-cli-test-nonexistent")
        .env_remove("IOTSYNC_PROFILE")
        .env_remove("IOTSYNC_BACKEND")
        .env_remove("IOTSYNC_ORGANIZATION")
        .env_remove("IOTSYNC_TOKEN")
        .env_remove("IOTSYNC_OUTPUT")
        .env_remove("IOTSYNC_INSECURE")
        .env_remove("IOTSYNC_TIMEOUT")
        .env_remove("RUST_LOG");
    cmd
}

/// Concatenate stdout + stderr from a command output for flexible matching.
fn combined_output(output: &std::process::Output) -> String {
    let stdout = String::from_utf8_lossy(&output.stdout);
    let stderr = String::from_utf8_lossy(&output.stderr);
    format!("{stdout}{stderr}")
}

/// Run the binary off the async runtime so wiremock keeps serving.
async fn run_against(server: &MockServer, args: &[&str]) -> std::process::Output {
    let mut full: Vec<String> = vec![
        "--backend".into(),
        server.uri(),
        "--organization".into(),
        "org-1".into(),
        "--token".into(),
        "cli-token".into(),
        "--color".into(),
        "never".into(),
    ];
    full.extend(args.iter().map(|a| (*a).to_owned()));
    tokio::task::spawn_blocking(move || iotsync_cmd().args(full).output().unwrap())
        .await
        .unwrap()
}

// ── Basic invocation ────────────────────────────────────────────────

#[test]
fn test_no_args_shows_help() {
    let output = iotsync_cmd().output().unwrap();
    assert_eq!(output.status.code(), Some(2), "Expected exit code 2");
    let text = combined_output(&output);
    assert!(
        text.contains("Usage"),
        "Expected 'Usage' in output:\n{text}"
    );
}

#[test]
fn test_help_flag() {
    iotsync_cmd().arg("--help").assert().success().stdout(
        predicate::str::contains("IoT devices")
            .and(predicate::str::contains("watch"))
            .and(predicate::str::contains("onboard"))
            .and(predicate::str::contains("notifications")),
    );
}

#[test]
fn test_version_flag() {
    iotsync_cmd()
        .arg("--version")
        .assert()
        .success()
        .stdout(predicate::str::contains("iotsync"));
}

// ── Shell completions ───────────────────────────────────────────────

#[test]
fn test_completions_bash() {
    iotsync_cmd()
        .args(["completions", "bash"])
        .assert()
        .success()
        .stdout(predicate::str::is_empty().not());
}

#[test]
fn test_completions_zsh() {
    iotsync_cmd()
        .args(["completions", "zsh"])
        .assert()
        .success()
        .stdout(predicate::str::contains("#compdef"));
}

// ── Error cases ─────────────────────────────────────────────────────

#[test]
fn test_invalid_subcommand() {
    let output = iotsync_cmd().arg("foobar").output().unwrap();
    assert!(
        !output.status.success(),
        "Expected failure for invalid subcommand"
    );
    let text = combined_output(&output);
    assert!(
        text.contains("invalid") || text.contains("unrecognized") || text.contains("foobar"),
        "Expected error mentioning invalid subcommand:\n{text}"
    );
}

#[test]
fn test_devices_list_no_backend() {
    iotsync_cmd()
        .args(["devices", "list"])
        .assert()
        .failure()
        .stderr(
            predicate::str::contains("config")
                .or(predicate::str::contains("backend"))
                .or(predicate::str::contains("profile")),
        );
}

#[test]
fn test_missing_token_is_auth_exit_code() {
    let output = iotsync_cmd()
        .args([
            "--backend",
            "http://127.0.0.1:9",
            "--organization",
            "org-1",
            "stats",
        ])
        .output()
        .unwrap();
    assert_eq!(output.status.code(), Some(3));
    assert!(combined_output(&output).contains("No token configured"));
}

#[test]
fn test_unknown_profile_is_not_found() {
    let output = iotsync_cmd()
        .args(["--profile", "nope", "stats"])
        .output()
        .unwrap();
    assert_eq!(output.status.code(), Some(4));
    assert!(combined_output(&output).contains("'nope'"));
}

#[test]
fn test_config_show_no_config() {
    // `config show` renders the default config when no file exists.
    iotsync_cmd().args(["config", "show"]).assert().success();
}

#[test]
fn test_invalid_output_format() {
    let output = iotsync_cmd()
        .args(["--output", "invalid", "devices", "list"])
        .output()
        .unwrap();
    assert!(
        !output.status.success(),
        "Expected failure for invalid output format"
    );
    let text = combined_output(&output);
    assert!(
        text.contains("invalid")
            || text.contains("possible values")
            || text.contains("valid value"),
        "Expected error about valid output formats:\n{text}"
    );
}

#[test]
fn test_onboard_requires_name_or_data() {
    iotsync_cmd()
        .args(["onboard"])
        .assert()
        .code(2)
        .stderr(predicate::str::contains("--name"));
}

// ── Subcommand help discovery ───────────────────────────────────────

#[test]
fn test_watch_flags_exist() {
    iotsync_cmd()
        .args(["watch", "--help"])
        .assert()
        .success()
        .stdout(
            predicate::str::contains("--transport")
                .and(predicate::str::contains("--topic"))
                .and(predicate::str::contains("--no-polling")),
        );
}

#[test]
fn test_notifications_subcommands_exist() {
    iotsync_cmd()
        .args(["notifications", "--help"])
        .assert()
        .success()
        .stdout(
            predicate::str::contains("list")
                .and(predicate::str::contains("mark-read"))
                .and(predicate::str::contains("mark-all-read"))
                .and(predicate::str::contains("unread")),
        );
}

#[test]
fn test_config_subcommands_exist() {
    iotsync_cmd()
        .args(["config", "--help"])
        .assert()
        .success()
        .stdout(
            predicate::str::contains("init")
                .and(predicate::str::contains("show"))
                .and(predicate::str::contains("set-token"))
                .and(predicate::str::contains("profiles")),
        );
}

// ── Against a mock backend ──────────────────────────────────────────

#[tokio::test]
async fn test_devices_list_plain_output() {
    let server = MockServer::start().await;
    Mock::given(method("GET"))
        .and(path("/api/devices"))
        .and(header("authorization", "Bearer cli-token"))
        .respond_with(ResponseTemplate::new(200).set_body_json(serde_json::json!([
            { "id": "d1", "name": "Pump 1", "status": "ONLINE" },
            { "id": "d2", "name": "Pump 2", "status": "OFFLINE" }
        ])))
        .expect(1)
        .mount(&server)
        .await;

    let output = run_against(&server, &["--output", "plain", "devices", "list"]).await;
    assert!(output.status.success(), "{}", combined_output(&output));
    assert_eq!(String::from_utf8_lossy(&output.stdout).trim(), "d1\nd2");

    let output = run_against(
        &server,
        &["--output", "plain", "devices", "list", "--status", "offline"],
    )
    .await;
    assert_eq!(String::from_utf8_lossy(&output.stdout).trim(), "d2");
}

#[tokio::test]
async fn test_devices_get_unknown_id_is_not_found() {
    let server = MockServer::start().await;
    Mock::given(method("GET"))
        .and(path("/api/devices"))
        .respond_with(ResponseTemplate::new(200).set_body_json(serde_json::json!([])))
        .mount(&server)
        .await;

    let output = run_against(&server, &["devices", "get", "d9"]).await;
    assert_eq!(output.status.code(), Some(4));
    assert!(combined_output(&output).contains("'d9' not found"));
}

#[tokio::test]
async fn test_stats_json_output() {
    let server = MockServer::start().await;
    Mock::given(method("GET"))
        .and(path("/api/devices/stats"))
        .respond_with(ResponseTemplate::new(200).set_body_json(serde_json::json!({
            "total": 4, "online": 2, "offline": 1, "warning": 1, "error": 0
        })))
        .mount(&server)
        .await;

    let output = run_against(&server, &["--output", "json", "stats"]).await;
    assert!(output.status.success(), "{}", combined_output(&output));
    let stats: serde_json::Value = serde_json::from_slice(&output.stdout).unwrap();
    assert_eq!(stats["online"], 2);
    assert_eq!(stats["total"], 4);
}

#[tokio::test]
async fn test_unauthorized_maps_to_auth_exit_code() {
    let server = MockServer::start().await;
    Mock::given(method("GET"))
        .and(path("/api/notifications/unread-count"))
        .respond_with(ResponseTemplate::new(401))
        .mount(&server)
        .await;

    let output = run_against(&server, &["notifications", "unread"]).await;
    assert_eq!(output.status.code(), Some(3), "{}", combined_output(&output));
}

#[tokio::test]
async fn test_watch_exits_when_live_tiers_refused_without_polling() {
    let server = MockServer::start().await;
    Mock::given(method("GET"))
        .and(path("/api/devices"))
        .respond_with(ResponseTemplate::new(200).set_body_json(serde_json::json!([
            { "id": "d1", "name": "Pump 1", "status": "ONLINE" }
        ])))
        .expect(1)
        .mount(&server)
        .await;

    // The upgrade on /ws gets a plain 404, so STOMP is refused outright.
    let output = run_against(
        &server,
        &["--output", "plain", "watch", "--transport", "stomp", "--no-polling"],
    )
    .await;
    assert_eq!(output.status.code(), Some(7), "{}", combined_output(&output));
    let stdout = String::from_utf8_lossy(&output.stdout);
    assert!(stdout.contains("session ended: exhausted"), "{stdout}");
}
