//! CLI subprocess integration tests.
//!
//! These tests invoke the `spindle` binary with a scripted-executor config,
//! so no disc tools or drives are needed, and verify exit codes, stdout
//! content, and JSON output.

use std::path::{Path, PathBuf};
use std::process::{Command, Output};

fn spindle_bin() -> Command {
    let mut cmd = Command::new(env!("CARGO_BIN_EXE_spindle"));
    cmd.env_remove("SPINDLE_CONFIG");
    cmd.env_remove("SPINDLE_LOG");
    cmd
}

fn fixture(name: &str) -> PathBuf {
    Path::new(env!("CARGO_MANIFEST_DIR"))
        .join("../spindle-core/tests/fixtures")
        .join(name)
}

/// Write a scripted config under `dir`; `scripts` is appended verbatim.
fn write_config(dir: &Path, scripts: &str) -> PathBuf {
    let path = dir.join("spindle.toml");
    std::fs::write(
        &path,
        format!(
            r#"executor = "scripted"
poll_interval_ms = 10
temp_root = '{root}/tmp'
log_dir = '{root}/logs'
lock_dir = '{root}/locks'

{scripts}
"#,
            root = dir.display()
        ),
    )
    .unwrap();
    path
}

fn run_with(config: &Path, args: &[&str]) -> Output {
    spindle_bin()
        .arg("--config")
        .arg(config)
        .args(args)
        .output()
        .unwrap()
}

fn json_lines(output: &Output) -> Vec<serde_json::Value> {
    String::from_utf8_lossy(&output.stdout)
        .lines()
        .filter(|l| !l.trim().is_empty())
        .map(|l| serde_json::from_str(l).unwrap_or_else(|e| panic!("bad JSON line {l}: {e}")))
        .collect()
}

fn phase_of(snapshot: &serde_json::Value) -> &str {
    snapshot["phase"]["phase"].as_str().unwrap_or_default()
}

fn assert_clean(dir: &Path) {
    let tmp = dir.join("tmp");
    if tmp.exists() {
        assert_eq!(std::fs::read_dir(&tmp).unwrap().count(), 0, "temp dir left behind");
    }
    let logs = dir.join("logs");
    if logs.exists() {
        assert_eq!(std::fs::read_dir(&logs).unwrap().count(), 0, "log file left behind");
    }
}

#[test]
fn cli_version_exits_zero() {
    let output = spindle_bin().arg("--version").output().unwrap();
    assert!(output.status.success());
    assert!(String::from_utf8_lossy(&output.stdout).contains("spindle"));
}

#[test]
fn cli_help_lists_operations() {
    let output = spindle_bin().arg("--help").output().unwrap();
    assert!(output.status.success());
    let stdout = String::from_utf8_lossy(&output.stdout);
    for sub in ["burn", "copy", "read", "erase", "extract", "classify", "replay"] {
        assert!(stdout.contains(sub), "help must mention {sub}: {stdout}");
    }
}

#[test]
fn cli_erase_json_streams_to_completion() {
    let dir = tempfile::tempdir().unwrap();
    let config = write_config(
        dir.path(),
        r#"[scripts.cdrecord]
lines = ["Last chance to quit, starting real blanking in 0 seconds.", "Blanking PMA, TOC, pregap"]
"#,
    );
    let output = run_with(&config, &["--json", "erase", "-d", "/dev/sr0"]);
    assert!(
        output.status.success(),
        "stderr: {}",
        String::from_utf8_lossy(&output.stderr)
    );

    let snapshots = json_lines(&output);
    let phases: Vec<&str> = snapshots.iter().map(phase_of).collect();
    assert_eq!(phases.first(), Some(&"preparing"));
    assert!(phases.contains(&"blanking"), "phases: {phases:?}");
    assert_eq!(phases.last(), Some(&"completed"));
    assert_eq!(phases.iter().filter(|p| **p == "completed").count(), 1);

    let run_id = snapshots[0]["run_id"].as_str().unwrap();
    assert_eq!(run_id.len(), 12);
    assert!(snapshots.iter().all(|s| s["run_id"] == run_id));
    assert_clean(dir.path());
}

#[test]
fn cli_missing_source_exits_invalid() {
    let dir = tempfile::tempdir().unwrap();
    let config = write_config(dir.path(), "");
    let missing = dir.path().join("nope");
    let output = run_with(
        &config,
        &["--json", "burn", "-d", "/dev/sr0", missing.to_str().unwrap()],
    );
    assert_eq!(output.status.code(), Some(2));
    let snapshots = json_lines(&output);
    let last = snapshots.last().unwrap();
    assert_eq!(phase_of(last), "failed");
    assert_eq!(last["phase"]["detail"]["kind"]["kind"], "validation");
}

#[test]
fn cli_tool_failure_is_classified() {
    let dir = tempfile::tempdir().unwrap();
    let config = write_config(
        dir.path(),
        r#"[scripts.cdrecord]
exit_code = 255
error_text = "cdrecord: No disk / Wrong disk!"
"#,
    );
    let output = run_with(&config, &["--json", "erase", "-d", "/dev/sr0"]);
    assert_eq!(output.status.code(), Some(1));
    let snapshots = json_lines(&output);
    let failure = &snapshots.last().unwrap()["phase"]["detail"];
    assert_eq!(failure["kind"]["kind"], "tool");
    assert_eq!(failure["kind"]["code"], 102);
    assert_clean(dir.path());
}

#[test]
fn cli_busy_device_exits_three() {
    let dir = tempfile::tempdir().unwrap();
    let config = write_config(dir.path(), "");
    let _held = spindle_core::DeviceLock::try_acquire(
        &dir.path().join("locks"),
        &spindle_schema::DeviceId::new("/dev/sr0"),
    )
    .unwrap()
    .unwrap();
    let output = run_with(&config, &["--json", "erase", "-d", "/dev/sr0"]);
    assert_eq!(output.status.code(), Some(3));
}

#[test]
fn cli_timeout_exits_cancelled() {
    let dir = tempfile::tempdir().unwrap();
    let config = write_config(
        dir.path(),
        r#"[scripts.cdrecord]
lines = ["Blanking PMA, TOC, pregap"]
hang_until_cancelled = true
"#,
    );
    let output = run_with(&config, &["--json", "--timeout", "1", "erase", "-d", "/dev/sr0"]);
    assert_eq!(output.status.code(), Some(4));
    let snapshots = json_lines(&output);
    let last = snapshots.last().unwrap();
    assert_eq!(last["phase"]["detail"]["kind"]["kind"], "timed_out");
    assert!(snapshots.iter().any(|s| phase_of(s) == "cancelling"));
    assert_clean(dir.path());
}

#[test]
fn cli_run_executes_request_file() {
    let dir = tempfile::tempdir().unwrap();
    let config = write_config(dir.path(), "");
    let request = dir.path().join("erase.toml");
    std::fs::write(&request, "operation = \"erase\"\ndevice = \"/dev/sr1\"\n").unwrap();
    let output = run_with(&config, &["--json", "run", request.to_str().unwrap()]);
    assert!(output.status.success());
    let snapshots = json_lines(&output);
    assert_eq!(snapshots.last().unwrap()["device"], "/dev/sr1");
}

#[test]
fn cli_run_rejects_bad_request_file() {
    let dir = tempfile::tempdir().unwrap();
    let config = write_config(dir.path(), "");
    let request = dir.path().join("bad.toml");
    std::fs::write(&request, "operation = \"levitate\"\n").unwrap();
    let output = run_with(&config, &["run", request.to_str().unwrap()]);
    assert_eq!(output.status.code(), Some(2));
    assert!(String::from_utf8_lossy(&output.stderr).contains("request error"));
}

#[test]
fn cli_classify_json() {
    let output = spindle_bin()
        .args([
            "--json",
            "classify",
            "wodim",
            "255",
            "--stderr",
            "wodim: No disk / Wrong disk!",
        ])
        .output()
        .unwrap();
    assert!(output.status.success());
    let json: serde_json::Value = serde_json::from_slice(&output.stdout).unwrap();
    assert_eq!(json["tool"], "cdrecord");
    assert_eq!(json["code"], 102);
    assert_eq!(json["fallback"], false);
}

#[test]
fn cli_classify_falls_back_to_exit_code() {
    let output = spindle_bin()
        .args(["--json", "classify", "mkisofs", "7", "--stderr", "something odd"])
        .output()
        .unwrap();
    let json: serde_json::Value = serde_json::from_slice(&output.stdout).unwrap();
    assert_eq!(json["code"], 299);
    assert_eq!(json["fallback"], true);
    assert!(json["message"].as_str().unwrap().contains("exit code 7"));
}

#[test]
fn cli_replay_recorded_burn() {
    let output = spindle_bin()
        .args(["--json", "replay", "cdrecord"])
        .arg(fixture("cdrecord_burn.log"))
        .output()
        .unwrap();
    assert!(output.status.success());
    let json: serde_json::Value = serde_json::from_slice(&output.stdout).unwrap();
    assert_eq!(json["snapshot"]["phase"]["phase"], "flushing");
    assert_eq!(json["snapshot"]["track_current"], 12);
    assert!(!json["events"].as_array().unwrap().is_empty());
}

#[test]
fn cli_replay_missing_log_exits_invalid() {
    let output = spindle_bin()
        .args(["replay", "readcd", "/nonexistent/readcd.log"])
        .output()
        .unwrap();
    assert_eq!(output.status.code(), Some(2));
}

#[test]
fn cli_config_prints_effective_settings() {
    let dir = tempfile::tempdir().unwrap();
    let config = write_config(dir.path(), "");
    let output = run_with(&config, &["config"]);
    assert!(output.status.success());
    let stdout = String::from_utf8_lossy(&output.stdout);
    assert!(stdout.contains("executor = \"scripted\""), "{stdout}");
    assert!(stdout.contains("[tools]"), "{stdout}");
}

#[test]
fn cli_bad_config_exits_invalid() {
    let dir = tempfile::tempdir().unwrap();
    let path = dir.path().join("bad.toml");
    std::fs::write(&path, "poll_interval_ms = 0\n").unwrap();
    let output = run_with(&path, &["erase", "-d", "/dev/sr0"]);
    assert_eq!(output.status.code(), Some(2));
    assert!(String::from_utf8_lossy(&output.stderr).contains("config error"));
}

#[test]
fn cli_completions_bash() {
    let output = spindle_bin().args(["completions", "bash"]).output().unwrap();
    assert!(output.status.success());
    assert!(String::from_utf8_lossy(&output.stdout).contains("spindle"));
}

#[test]
fn cli_man_pages_written() {
    let dir = tempfile::tempdir().unwrap();
    let out = dir.path().join("man");
    let output = spindle_bin()
        .arg("man-pages")
        .arg(&out)
        .output()
        .unwrap();
    assert!(output.status.success());
    assert!(out.join("spindle.1").exists());
    assert!(out.join("spindle-burn.1").exists());
}
