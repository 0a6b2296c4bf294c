mod common;

use assert_cmd::prelude::*;
use predicates::prelude::*;
use rstest::rstest;
use std::process::Command;
use tempfile::tempdir;

use common::write_config;

fn kegmon(cfg: &std::path::Path) -> Command {
    let mut cmd = Command::cargo_bin("kegmon").unwrap();
    cmd.arg("--log-level").arg("error").arg("--config").arg(cfg);
    cmd
}

#[rstest]
#[case(&["--help"], 0, "Usage:", "stdout")]
#[case(&["command", "getState"], 0, "getState 10", "stdout")]
#[case(&["command", "sendStatus"], 0, "sendStatus -2", "stdout")]
#[case(&["command", "stopMaintenanceMode"], 0, "stopMaintenanceMode -1", "stdout")]
#[case(&["command", "calibrate", "abc"], 0, "calibrate -1", "stdout")]
#[case(&["command", "reboot"], 1, "Unknown command", "stderr")]
#[case(&["command"], 2, "required", "stderr")]
#[case(&["self-check"], 0, "state=CALIBRATION_PENDING", "stdout")]
#[case(&["health"], 0, "service disabled", "stdout")]
fn cli_table_cases(
    #[case] args: &[&str],
    #[case] exit_code: i32,
    #[case] needle: &str,
    #[case] stream: &str,
) {
    let dir = tempdir().unwrap();
    let cfg = write_config(&dir, "");

    let assert = kegmon(&cfg).args(args).assert().code(exit_code);
    match stream {
        "stdout" => {
            assert.stdout(predicate::str::contains(needle));
        }
        "stderr" => {
            assert.stderr(predicate::str::contains(needle));
        }
        other => panic!("unknown stream: {other}"),
    }
}

#[rstest]
fn calibration_persists_across_invocations() {
    let dir = tempdir().unwrap();
    let cfg = write_config(&dir, "");

    kegmon(&cfg)
        .args(["--sim-grams", "2000", "command", "calibrate", "2000"])
        .assert()
        .success()
        .stdout(predicate::str::contains("calibrate 1"));

    // Calibrated record on disk: the next boot goes straight to NORMAL.
    kegmon(&cfg)
        .args(["command", "getState"])
        .assert()
        .success()
        .stdout(predicate::str::contains("getState 1"));

    kegmon(&cfg)
        .args(["--sim-grams", "1250", "self-check"])
        .assert()
        .success()
        .stdout(predicate::str::contains("state=NORMAL").and(predicate::str::contains("weight=1250.0 g")));
}

#[rstest]
fn low_reference_weight_is_rejected_when_configured() {
    let dir = tempdir().unwrap();
    let cfg = write_config(&dir, "");
    std::fs::write(
        &cfg,
        std::fs::read_to_string(&cfg)
            .unwrap()
            .replace("group_delay_ms = 0", "group_delay_ms = 0\nallow_low_weight = false"),
    )
    .unwrap();

    kegmon(&cfg)
        .args(["--sim-grams", "500", "command", "calibrate", "500"])
        .assert()
        .success()
        .stdout(predicate::str::contains("calibrate -2"));
}

#[rstest]
fn clear_memory_erases_the_store() {
    let dir = tempdir().unwrap();
    let cfg = write_config(&dir, "");

    kegmon(&cfg)
        .args(["--sim-grams", "1000", "command", "calibrate", "1000"])
        .assert()
        .success();
    kegmon(&cfg)
        .args(["command", "clearMemory"])
        .assert()
        .success()
        .stdout(predicate::str::contains("clearMemory 1"));
    kegmon(&cfg)
        .args(["command", "getState"])
        .assert()
        .success()
        .stdout(predicate::str::contains("getState 10"));
}

#[rstest]
fn invalid_config_exits_with_code_two() {
    let dir = tempdir().unwrap();
    let cfg = write_config(&dir, "\n[measurement]\nsamples = 0\n");

    kegmon(&cfg)
        .args(["command", "getState"])
        .assert()
        .code(2)
        .stderr(predicate::str::contains("measurement.samples must be >= 1"));
}

#[rstest]
fn missing_config_file_is_reported() {
    let dir = tempdir().unwrap();
    kegmon(&dir.path().join("nope.toml"))
        .args(["command", "getState"])
        .assert()
        .failure()
        .stderr(predicate::str::contains("config file could not be read"));
}
