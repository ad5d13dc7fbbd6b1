use assert_cmd::prelude::*;
use rstest::rstest;
use serde_json::Value;
use std::fs;
use std::path::PathBuf;
use std::process::Command;
use tempfile::tempdir;

fn write_config(dir: &tempfile::TempDir, extra: &str) -> PathBuf {
    let toml = format!(
        r#"
[pins]
home_sensor = 17
drop_sensor = 27
coils = [2, 3, 4, 6]
status_led = 22
calibrate_button = 9
dispense_button = 10

{extra}
"#
    );
    let path = dir.path().join("cfg.toml");
    fs::write(&path, toml).unwrap();
    path
}

/// Run with --json and parse every stdout line.
fn json_lines(cfg: &PathBuf, args: &[&str], code: i32) -> Vec<Value> {
    let out = Command::cargo_bin("dispenser_cli")
        .unwrap()
        .arg("--json")
        .arg("--log-level")
        .arg("error")
        .arg("--config")
        .arg(cfg)
        .args(args)
        .env_remove("RUST_LOG")
        .output()
        .unwrap();
    assert_eq!(
        out.status.code(),
        Some(code),
        "stderr: {}",
        String::from_utf8_lossy(&out.stderr)
    );
    String::from_utf8(out.stdout)
        .unwrap()
        .lines()
        .map(|l| serde_json::from_str(l).unwrap_or_else(|e| panic!("not JSON ({e}): {l}")))
        .collect()
}

fn events<'a>(lines: &'a [Value], kind: &str) -> Vec<&'a Value> {
    lines.iter().filter(|v| v["event"] == kind).collect()
}

#[rstest]
fn calibrate_then_dispense_schema() {
    let dir = tempdir().unwrap();
    let cfg = write_config(&dir, "[sim]\nempty_slots = [3]\n");
    let lines = json_lines(&cfg, &["dispense", "--calibrate"], 0);

    assert_eq!(events(&lines, "calibration_started").len(), 1);
    assert_eq!(events(&lines, "home_found").len(), 1);
    let samples = events(&lines, "sample_measured");
    assert_eq!(samples.len(), 3);
    assert!(samples.iter().all(|s| s["steps"] == 4096 && s["accepted"] == true));
    assert_eq!(events(&lines, "aligned")[0]["steps"], 166);

    let missed = events(&lines, "slot_missed");
    assert_eq!(missed.len(), 1);
    assert_eq!(missed[0]["slot"], 3);
    assert_eq!(events(&lines, "slot_dispensed").len(), 7);

    let calibrated = lines
        .iter()
        .find(|v| v["result"] == "calibrated")
        .expect("calibration result line");
    assert_eq!(calibrated["steps_per_revolution"], 4096);
    assert_eq!(calibrated["attempts"], 1);
    assert_eq!(calibrated["accepted"].as_array().map(Vec::len), Some(3));

    let last = lines.last().expect("result line");
    assert_eq!(last["result"], "dispensed");
    assert_eq!(last["dispensed"], 7);
    assert_eq!(last["slots"], 8);
    assert_eq!(last["missed"], serde_json::json!([3]));
    assert_eq!(last["steps"], 4096);
}

#[rstest]
fn refusal_is_structured() {
    let dir = tempdir().unwrap();
    let cfg = write_config(&dir, "");
    let lines = json_lines(&cfg, &["dispense"], 3);

    assert_eq!(events(&lines, "dispense_refused").len(), 1);
    let err = lines.last().expect("error line");
    assert_eq!(err["reason"], "NotCalibrated");
    assert!(err["message"].as_str().unwrap().contains("How to fix"));
}

#[rstest]
#[case("[sim]\nhome_connected = false\n", 4, "CalibrationTimeout")]
#[case("[sim]\nhome_gaps = [3000]\n", 5, "CalibrationRejected")]
fn calibration_failures_are_structured(
    #[case] extra: &str,
    #[case] code: i32,
    #[case] reason: &str,
) {
    let dir = tempdir().unwrap();
    let cfg = write_config(&dir, extra);
    let lines = json_lines(&cfg, &["calibrate"], code);

    assert_eq!(events(&lines, "calibration_failed").len(), 1);
    let err = lines.last().expect("error line");
    assert_eq!(err["reason"], reason);
    assert!(err.get("details").is_some(), "{err}");
}

#[rstest]
fn status_schema() {
    let dir = tempdir().unwrap();
    let cfg = write_config(&dir, "");
    let lines = json_lines(&cfg, &["status"], 0);
    assert_eq!(lines.len(), 1);
    let s = &lines[0];
    assert_eq!(s["calibrated"], false);
    assert!(s["steps_per_revolution"].is_null());
    assert_eq!(s["position"], 0);
    assert_eq!(s["mode"], "idle");
    assert_eq!(s["sim_position"], 0);
}
