//! CLI integration tests

use std::io::Write;
use std::process::Command;

fn tickmon() -> Command {
    let mut command = Command::new(env!("CARGO_BIN_EXE_tickmon"));
    command.env_remove("TICKMON_CONFIG").env("RUST_LOG", "warn");
    command
}

/// Test that the CLI shows help
#[test]
fn test_cli_help() {
    let output = tickmon()
        .arg("--help")
        .output()
        .expect("Failed to execute command");

    let stdout = String::from_utf8_lossy(&output.stdout);

    assert!(output.status.success(), "CLI help should succeed");
    assert!(stdout.contains("--threshold"), "Should show relative threshold");
    assert!(stdout.contains("--threshold-tick"), "Should show absolute threshold");
    assert!(stdout.contains("--without-gc"), "Should show GC switch");
}

/// Test that the CLI shows version
#[test]
fn test_cli_version() {
    let output = tickmon()
        .arg("--version")
        .output()
        .expect("Failed to execute command");

    let stdout = String::from_utf8_lossy(&output.stdout);

    assert!(output.status.success(), "CLI version should succeed");
    assert!(stdout.contains("tickmon"), "Should show binary name");
}

#[test]
fn test_conflicting_thresholds_fail() {
    let output = tickmon()
        .args(["--threshold", "20", "--threshold-tick", "50"])
        .output()
        .expect("Failed to execute command");

    assert!(!output.status.success());
}

#[test]
fn test_zero_tick_interval_fails() {
    let output = tickmon()
        .args(["--tick-interval-ms", "0", "--duration-secs", "1"])
        .output()
        .expect("Failed to execute command");

    let stderr = String::from_utf8_lossy(&output.stderr);

    assert!(!output.status.success());
    assert!(stderr.contains("tick_interval_ms"), "Should name the bad setting");
}

#[test]
fn test_short_run_prints_calibration_as_json() {
    let output = tickmon()
        .args([
            "--duration-secs",
            "1",
            "--tick-interval-ms",
            "1",
            "--jitter-ms",
            "0",
            "--format",
            "json",
            "--without-gc",
        ])
        .output()
        .expect("Failed to execute command");

    let stdout = String::from_utf8_lossy(&output.stdout);

    assert!(output.status.success(), "Run should exit cleanly");
    let events: Vec<String> = stdout
        .lines()
        .map(|line| {
            let value: serde_json::Value =
                serde_json::from_str(line).expect("Every stdout line should be JSON");
            value["event"].as_str().unwrap_or_default().to_string()
        })
        .collect();

    assert_eq!(events.first().map(String::as_str), Some("monitor_started"));
    assert!(events.iter().any(|event| event == "calibration_complete"));
    assert!(events.iter().any(|event| event == "monitoring_policy"));
}

#[test]
fn test_config_file_is_read() {
    let mut file = tempfile::Builder::new().suffix(".toml").tempfile().unwrap();
    writeln!(file, "tick_interval_ms = 0").unwrap();

    let output = tickmon()
        .arg("--config")
        .arg(file.path())
        .output()
        .expect("Failed to execute command");

    assert!(!output.status.success(), "Invalid file setting should fail");
}
