// Integration tests for CLI commands
// These run the built binary and never reach the Telegram API.

use std::io::Write;
use std::process::{Command, Output};
use tempfile::{NamedTempFile, TempDir};

fn channel_gate(args: &[&str]) -> Output {
    Command::new(env!("CARGO_BIN_EXE_channel-gate"))
        .args(args)
        .env_remove("CHANNEL_GATE_BOT_TOKEN")
        .output()
        .expect("Failed to execute command")
}

fn stdout(output: &Output) -> String {
    String::from_utf8_lossy(&output.stdout).to_string()
}

fn stderr(output: &Output) -> String {
    String::from_utf8_lossy(&output.stderr).to_string()
}

#[test]
fn test_cli_help() {
    let output = channel_gate(&["--help"]);

    assert!(output.status.success());
    let text = stdout(&output);
    assert!(text.contains("Operator CLI for the channel access gateway bot"));
    assert!(text.contains("run"));
    assert!(text.contains("init-config"));
    assert!(text.contains("stats"));
    assert!(text.contains("version"));
}

#[test]
fn test_cli_version() {
    let output = channel_gate(&["version"]);

    assert!(output.status.success());
    assert!(stdout(&output).contains(&format!("channel-gate {}", env!("CARGO_PKG_VERSION"))));
}

#[test]
fn test_cli_run_with_missing_config() {
    let dir = TempDir::new().unwrap();
    let missing = dir.path().join("absent.toml");
    let output = channel_gate(&["run", "--config", missing.to_str().unwrap()]);

    assert!(!output.status.success());
    assert!(stderr(&output).contains("init-config"));
}

#[test]
fn test_cli_run_rejects_placeholder_token() {
    let dir = TempDir::new().unwrap();
    let config = dir.path().join("config.toml");
    let store = dir.path().join("gateway.db");

    let init = channel_gate(&[
        "init-config",
        "--config",
        config.to_str().unwrap(),
        "--store-path",
        store.to_str().unwrap(),
    ]);
    assert!(init.status.success());

    let output = channel_gate(&["run", "--config", config.to_str().unwrap()]);
    assert!(!output.status.success());
    assert!(stderr(&output).contains("Error:"));
}

#[test]
fn test_cli_run_with_malformed_config() {
    let mut file = NamedTempFile::new().unwrap();
    writeln!(file, "[telegram").unwrap();
    file.flush().unwrap();

    let output = channel_gate(&["run", "--config", file.path().to_str().unwrap()]);
    assert!(!output.status.success());
    assert!(stderr(&output).contains("Error:"));
}

#[test]
fn test_cli_init_config_then_stats() {
    let dir = TempDir::new().unwrap();
    let config = dir.path().join("config.toml");
    let store = dir.path().join("gateway.db");
    let config_arg = config.to_str().unwrap();

    let init = channel_gate(&[
        "init-config",
        "--config",
        config_arg,
        "--store-path",
        store.to_str().unwrap(),
    ]);
    assert!(init.status.success());
    assert!(config.exists());

    let again = channel_gate(&["init-config", "--config", config_arg]);
    assert!(!again.status.success());
    assert!(stderr(&again).contains("--force"));

    let stats = channel_gate(&["stats", "--config", config_arg]);
    assert!(stats.status.success());
    let text = stdout(&stats);
    assert!(text.contains("Total:"));
    assert!(text.contains("Active:"));
    assert!(text.contains("In channel:"));
    assert!(text.contains("VIP:"));
}

#[test]
fn test_subcommand_help() {
    for subcommand in ["run", "init-config", "stats"] {
        let output = channel_gate(&[subcommand, "--help"]);
        assert!(output.status.success(), "{} --help failed", subcommand);
        assert!(stdout(&output).contains("--config"));
    }
}

#[test]
fn test_invalid_command() {
    let output = channel_gate(&["link-device"]);

    assert!(!output.status.success());
    assert!(stderr(&output).contains("unrecognized subcommand"));
}
