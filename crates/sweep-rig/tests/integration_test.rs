use std::process::{Command, Output};
use std::time::{Duration, Instant};

fn bin_path() -> String {
    // Prefer the test-built binary when available to avoid extra cargo builds.
    std::env::var("CARGO_BIN_EXE_sweep-rig").unwrap_or_else(|_| {
        let candidates = [
            "../../target/release/sweep-rig",
            "target/release/sweep-rig",
            "../../target/debug/sweep-rig",
            "target/debug/sweep-rig",
        ];
        for candidate in candidates {
            if std::path::Path::new(candidate).exists() {
                return candidate.to_string();
            }
        }
        panic!(
            "Failed to locate sweep-rig binary. Expected CARGO_BIN_EXE_sweep-rig or a build in target/{{release,debug}}/sweep-rig."
        );
    })
}

fn run_rig(args: &[&str]) -> Output {
    Command::new(bin_path())
        .args(args)
        .env("RUST_LOG", "warn")
        .output()
        .expect("Failed to run sweep-rig")
}

fn stdout_lines(output: &Output) -> Vec<String> {
    String::from_utf8_lossy(&output.stdout)
        .lines()
        .map(str::to_string)
        .collect()
}

#[test]
fn test_single_pass_prints_one_line_per_step() {
    // 1e6 / (1e5 * 128) floors to a zero delay, so this finishes instantly.
    let output = run_rig(&[
        "--rates",
        "100000",
        "--resolution",
        "8",
        "--cycles",
        "1",
        "--passes",
        "1",
        "--progress-ms",
        "0",
        "--sim-tau-ms",
        "0",
    ]);
    assert!(output.status.success(), "stderr: {}", String::from_utf8_lossy(&output.stderr));

    let lines = stdout_lines(&output);
    assert_eq!(lines.len(), 16);
    assert!(lines[0].starts_with("PWM Value: 0, ADC Voltage: 0.000 V, Sweep rate: 100000 mV/s, Interval: 0 us"));
    assert!(lines[7].starts_with("PWM Value: 7, ADC Voltage: 3.300 V"));
    assert!(lines[8].starts_with("PWM Value: 7,"));
    assert!(lines[15].starts_with("PWM Value: 0,"));

    // Printed regardless of the log filter.
    assert!(String::from_utf8_lossy(&output.stderr).contains("PWM stopped"));
}

#[test]
fn test_json_samples_follow_ramp_order() {
    let output = run_rig(&[
        "--rates",
        "100000,200000",
        "--resolution",
        "4",
        "--cycles",
        "2",
        "--passes",
        "1",
        "--json-samples",
        "--progress-ms",
        "0",
    ]);
    assert!(output.status.success());

    let samples: Vec<serde_json::Value> = stdout_lines(&output)
        .iter()
        .map(|line| serde_json::from_str(line).expect("sample line is JSON"))
        .collect();
    assert_eq!(samples.len(), 2 * 2 * 8);

    let levels: Vec<u64> = samples[..8]
        .iter()
        .map(|s| s["level"].as_u64().unwrap())
        .collect();
    assert_eq!(levels, vec![0, 1, 2, 3, 3, 2, 1, 0]);
    assert_eq!(samples[0]["rate"], 100000.0);
    assert_eq!(samples[31]["rate"], 200000.0);
    assert_eq!(samples[3]["duty"], 65535);
}

#[test]
fn test_invalid_rate_fails_before_sweeping() {
    let output = run_rig(&["--rates", "100,0", "--passes", "1"]);
    assert_eq!(output.status.code(), Some(2));
    assert!(output.stdout.is_empty());
    assert!(!String::from_utf8_lossy(&output.stderr).contains("PWM stopped"));
}

#[test]
fn test_unknown_flag_is_rejected() {
    let output = run_rig(&["--frobnicate"]);
    assert_eq!(output.status.code(), Some(2));
    assert!(String::from_utf8_lossy(&output.stderr).contains("--frobnicate"));
}

#[test]
fn test_help_prints_usage() {
    let output = run_rig(&["--help"]);
    assert!(output.status.success());
    assert!(String::from_utf8_lossy(&output.stdout).contains("USAGE:"));
}

#[test]
fn test_run_seconds_stops_endless_sweep() {
    // Rate 1 plans ~7.8 ms per step, so one second covers only part of a ramp.
    let start = Instant::now();
    let output = run_rig(&["--rates", "1", "--run-seconds", "1", "--progress-ms", "0"]);
    assert!(output.status.success());
    assert!(start.elapsed() < Duration::from_secs(10));

    let lines = stdout_lines(&output);
    assert!(!lines.is_empty());
    assert!(lines.len() < 512, "sweep should have been cut short, got {} samples", lines.len());
    assert!(String::from_utf8_lossy(&output.stderr).contains("PWM stopped"));
}
