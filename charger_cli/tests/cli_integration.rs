use assert_cmd::prelude::*;
use predicates::prelude::*;
use rstest::rstest;
use std::fs;
use std::path::{Path, PathBuf};
use std::process::Command;
use tempfile::{TempDir, tempdir};

// Minimal config; the slot record lives next to it in the temp dir.
fn write_config(dir: &TempDir, extra: &str) -> PathBuf {
    let record = dir.path().join("slots.rec");
    let toml = format!(
        r#"
[timing]
tick_ms = 100

[store]
path = '{}'

[simulation]
ambient = 220

[[simulation.cell]]
capacity_mah = 2000
state_of_charge = 0.3

[[simulation.cell]]
present = false

{extra}
"#,
        record.display()
    );
    let path = dir.path().join("cfg.toml");
    fs::write(&path, toml).unwrap();
    path
}

fn charger(cfg: &Path) -> Command {
    let mut cmd = Command::cargo_bin("charger").unwrap();
    cmd.arg("--config").arg(cfg);
    cmd
}

#[test]
fn help_lists_subcommands() {
    Command::cargo_bin("charger")
        .unwrap()
        .arg("--help")
        .assert()
        .success()
        .stdout(predicate::str::contains("Usage:"))
        .stdout(predicate::str::contains("simulate"))
        .stdout(predicate::str::contains("self-check"));
}

#[test]
fn self_check_passes_on_valid_config() {
    let dir = tempdir().unwrap();
    let cfg = write_config(&dir, "");
    charger(&cfg)
        .arg("self-check")
        .assert()
        .success()
        .stdout(predicate::str::contains("self-check ok (2 channels)"));
}

#[test]
fn self_check_rejects_corrupt_record() {
    let dir = tempdir().unwrap();
    let cfg = write_config(&dir, "");
    fs::write(dir.path().join("slots.rec"), [0u8; 14]).unwrap();
    charger(&cfg)
        .arg("self-check")
        .assert()
        .failure()
        .code(1)
        .stderr(predicate::str::contains("stored slot settings are unreadable"));
}

#[test]
fn config_set_then_show_round_trips() {
    let dir = tempdir().unwrap();
    let cfg = write_config(&dir, "");
    charger(&cfg)
        .args([
            "config",
            "set",
            "--slot",
            "1",
            "--capacity",
            "800",
            "--schedule",
            "fast",
            "--loops",
            "2",
            "--skip-discharge",
            "true",
        ])
        .assert()
        .success()
        .stdout(predicate::str::contains("slot 1: 800 mAh, fast"));

    let out = charger(&cfg)
        .args(["--json", "config", "show"])
        .output()
        .unwrap();
    assert!(out.status.success());
    let v: serde_json::Value = serde_json::from_slice(&out.stdout).unwrap();
    assert_eq!(v["valid"], true);
    assert_eq!(v["slots"][1]["capacity_mah"], 800);
    assert_eq!(v["slots"][1]["schedule"], "fast");
    assert_eq!(v["slots"][1]["skip_discharge"], true);
    // Skipping the discharge leaves nothing to repeat.
    assert_eq!(v["slots"][1]["loops"], 0);
    assert_eq!(v["slots"][0]["capacity_mah"], 2000);
}

#[test]
fn show_without_record_reports_defaults() {
    let dir = tempdir().unwrap();
    let cfg = write_config(&dir, "");
    charger(&cfg)
        .args(["config", "show"])
        .assert()
        .success()
        .stdout(predicate::str::contains("no valid record"))
        .stdout(predicate::str::contains("slot 0: 2000 mAh, slow"));
}

#[rstest]
#[case(&["config", "set", "--slot", "5"], 5, "Invalid configuration")]
#[case(&["config", "set", "--slot", "0", "--schedule", "turbo"], 2, "unknown schedule")]
#[case(&["simulate", "--hours", "nope"], 2, "invalid value")]
fn bad_arguments(#[case] args: &[&str], #[case] code: i32, #[case] needle: &str) {
    let dir = tempdir().unwrap();
    let cfg = write_config(&dir, "");
    charger(&cfg)
        .args(args)
        .assert()
        .failure()
        .code(code)
        .stderr(predicate::str::contains(needle));
}

#[test]
fn invalid_config_is_explained() {
    let dir = tempdir().unwrap();
    let cfg = write_config(&dir, "[temperature]\nhot = 600\nmax = 550\n");
    charger(&cfg)
        .arg("self-check")
        .assert()
        .failure()
        .code(1)
        .stderr(predicate::str::contains("Configuration is invalid"))
        .stderr(predicate::str::contains("temperature.hot"));
}

#[test]
fn missing_config_file_is_explained() {
    let dir = tempdir().unwrap();
    charger(&dir.path().join("absent.toml"))
        .arg("self-check")
        .assert()
        .failure()
        .stderr(predicate::str::contains("Could not read the config file"));
}

#[test]
fn json_mode_reports_errors_on_stdout() {
    let dir = tempdir().unwrap();
    let cfg = write_config(&dir, "");
    let out = charger(&cfg)
        .args(["--json", "config", "set", "--slot", "9"])
        .output()
        .unwrap();
    assert_eq!(out.status.code(), Some(5));
    let v: serde_json::Value = serde_json::from_slice(&out.stdout).unwrap();
    assert_eq!(v["reason"], "Config");
    assert_eq!(v["code"], 5);
}

#[test]
fn short_simulation_writes_trace() {
    let dir = tempdir().unwrap();
    let cfg = write_config(&dir, "");
    let trace = dir.path().join("trace.csv");
    charger(&cfg)
        .args(["simulate", "--hours", "0.1", "--sample-s", "30", "--csv"])
        .arg(&trace)
        .assert()
        .success()
        .stdout(predicate::str::contains("channel 0: discharge"))
        .stdout(predicate::str::contains("Simulation ended (time_limit)"));

    let text = fs::read_to_string(&trace).unwrap();
    let mut lines = text.lines();
    assert_eq!(
        lines.next(),
        Some("t_s,channel,phase,voltage_mv,current_ma,temperature,remaining_s")
    );
    // Two channels every 30 s over 6 minutes.
    assert!(lines.count() >= 20);
}

#[test]
fn json_simulation_prints_only_json_lines() {
    let dir = tempdir().unwrap();
    let cfg = write_config(&dir, "");
    let out = charger(&cfg)
        .args(["--json", "simulate", "--hours", "0.05"])
        .output()
        .unwrap();
    assert!(out.status.success());
    let stdout = String::from_utf8(out.stdout).unwrap();
    let values: Vec<serde_json::Value> = stdout
        .lines()
        .map(|l| serde_json::from_str(l).unwrap())
        .collect();
    let summaries: Vec<_> = values.iter().filter(|v| v["event"] == "summary").collect();
    assert_eq!(summaries.len(), 2);
    assert_eq!(summaries[0]["outcome"], "time_limit");
    assert_eq!(summaries[1]["phase"], "check");
    assert!(
        values
            .iter()
            .any(|v| v["event"] == "phase" && v["channel"] == 0 && v["phase"] == "discharge")
    );
}
