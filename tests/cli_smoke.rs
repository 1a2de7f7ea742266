//! Binary-level smoke tests: argument parsing, config commands and one
//! request/response exchange with a running daemon.

mod common;

use std::fs;
use std::io::{BufRead, BufReader, Write};
use std::process::{Command, Stdio};
use std::sync::mpsc;
use std::thread;
use std::time::Duration;

use serde_json::Value;

use common::{bin_path, run_cli_case};

fn write_config(dir: &std::path::Path, body: &str) -> std::path::PathBuf {
    let path = dir.join("diskmon.toml");
    fs::write(&path, body).expect("write config");
    path
}

#[test]
fn help_lists_subcommands() {
    let result = run_cli_case("help", &["--help"]);
    assert!(result.status.success(), "log: {}", result.log_path.display());
    assert!(result.stdout.contains("diskmond"));
    for sub in ["daemon", "config", "completions"] {
        assert!(result.stdout.contains(sub), "missing {sub} in help");
    }
}

#[test]
fn version_prints_package_version() {
    let result = run_cli_case("version", &["--version"]);
    assert!(result.status.success());
    assert!(result.stdout.contains(env!("CARGO_PKG_VERSION")));
}

#[test]
fn validate_reports_hash_as_json() {
    let dir = tempfile::tempdir().expect("tempdir");
    let config = write_config(
        dir.path(),
        "[schedule]\nactive_interval_secs = 60\nidle_interval_secs = 600\n",
    );
    let config_arg = config.to_string_lossy().to_string();

    let result = run_cli_case(
        "validate_json",
        &["--config", &config_arg, "config", "validate", "--json"],
    );
    assert!(result.status.success(), "log: {}", result.log_path.display());

    let payload: Value = serde_json::from_str(result.stdout.trim()).expect("json output");
    assert_eq!(payload["command"], "config validate");
    assert_eq!(payload["valid"], true);
    assert_eq!(payload["hash"].as_str().map(str::len), Some(16));
}

#[test]
fn invalid_config_exits_with_user_error() {
    let dir = tempfile::tempdir().expect("tempdir");
    let config = write_config(
        dir.path(),
        "[schedule]\nactive_interval_secs = 4000\nidle_interval_secs = 600\n",
    );
    let config_arg = config.to_string_lossy().to_string();

    let result = run_cli_case(
        "validate_invalid",
        &["--config", &config_arg, "config", "validate", "--json"],
    );
    assert_eq!(result.status.code(), Some(1));
    let payload: Value = serde_json::from_str(result.stdout.trim()).expect("json output");
    assert_eq!(payload["valid"], false);
    assert_eq!(payload["code"], "DMON-1001");
}

#[test]
fn missing_explicit_config_is_rejected() {
    let result = run_cli_case(
        "missing_config",
        &["--config", "/nonexistent/diskmon.toml", "config", "show"],
    );
    assert_eq!(result.status.code(), Some(1));
}

#[test]
#[cfg(target_os = "linux")]
fn daemon_answers_check_request_and_signals_usage() {
    let dir = tempfile::tempdir().expect("tempdir");
    let log = dir.path().join("activity.jsonl");
    let body = format!(
        r#"[backend.limits]
"/" = 1

[paths]
jsonl_log = "{}"
"#,
        log.display()
    );
    let config = write_config(dir.path(), &body);

    let mut child = Command::new(bin_path())
        .args(["--config", &config.to_string_lossy(), "daemon", "--assume-ready"])
        .stdin(Stdio::piped())
        .stdout(Stdio::piped())
        .stderr(Stdio::null())
        .spawn()
        .expect("spawn daemon");

    let stdout = child.stdout.take().expect("stdout");
    let (tx, rx) = mpsc::channel();
    thread::spawn(move || {
        for line in BufReader::new(stdout).lines().map_while(Result::ok) {
            if tx.send(line).is_err() {
                break;
            }
        }
    });

    let mut stdin = child.stdin.take().expect("stdin");
    writeln!(stdin, r#"{{"type":"check_now","requester":"smoke"}}"#).expect("write request");
    stdin.flush().expect("flush");

    let mut lines = Vec::new();
    while lines.len() < 2 {
        match rx.recv_timeout(Duration::from_secs(10)) {
            Ok(line) => lines.push(line),
            Err(_) => break,
        }
    }
    let _ = child.kill();
    let _ = child.wait();

    assert_eq!(lines.len(), 2, "daemon output: {lines:?}");
    let reply: Value = serde_json::from_str(&lines[0]).expect("reply json");
    assert_eq!(reply["type"], "reply");
    assert_eq!(reply["method"], "req_check");

    // The first check always reports the root mount, within or over its limit.
    let signal: Value = serde_json::from_str(&lines[1]).expect("signal json");
    assert_eq!(signal["type"], "disk_space_change_ind");
    assert_eq!(signal["path"], "/");
    let pct = signal["percent_used"].as_u64().expect("percent_used");
    assert!(pct <= 100, "percent out of range: {pct}");
}
