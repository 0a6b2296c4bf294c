//! End-to-end calibration against the simulated load cell and the
//! file-backed store, including a reboot.

use kegmon_core::mocks::{RecordingIndicator, ScriptedButton, ScriptedTransport};
use kegmon_core::{Command, Controller, OperatingState, SyncCfg};
use kegmon_hardware::{FileStore, SIM_ZERO_COUNTS, SimulatedLoadCell, SimulatedWeight};
use kegmon_traits::clock::test_clock::TestClock;
use tempfile::tempdir;

fn build(path: &std::path::Path) -> (Controller, SimulatedWeight) {
    let (cell, weight) = SimulatedLoadCell::new();
    let controller = Controller::builder()
        .with_load_cell(cell)
        .with_store(FileStore::new(path))
        .with_indicator(RecordingIndicator::new())
        .with_transport(ScriptedTransport::new())
        .with_button(ScriptedButton::new())
        .with_clock(TestClock::new())
        .with_sync(SyncCfg {
            enabled: false,
            ..SyncCfg::default()
        })
        .build()
        .expect("valid");
    (controller, weight)
}

#[test]
fn calibration_survives_reboot() {
    let dir = tempdir().unwrap();
    let path = dir.path().join("cal.bin");

    let (mut first, weight) = build(&path);
    assert_eq!(first.boot().unwrap(), OperatingState::CalibrationPending);
    let offset = first.device().calibration().unwrap().offset;
    assert_eq!(offset, SIM_ZERO_COUNTS as i32);

    weight.set_grams(2_000.0);
    assert_eq!(
        first
            .device()
            .dispatch(&Command::Calibrate("2000".into()))
            .unwrap(),
        1
    );
    let committed = first.device().calibration().unwrap();
    assert!((committed.scale - 21.5).abs() < 1e-3);
    drop(first);

    let (mut second, weight) = build(&path);
    weight.set_grams(1_250.0);
    assert_eq!(second.boot().unwrap(), OperatingState::Normal);
    assert_eq!(second.device().calibration().unwrap(), committed);
    let grams = second.device().sample().unwrap();
    assert!((grams - 1_250.0).abs() < 0.5, "read {grams}");
}

#[test]
fn offline_device_reports_status_delivered() {
    let dir = tempdir().unwrap();
    let (mut controller, weight) = build(&dir.path().join("cal.bin"));
    controller.boot().unwrap();
    weight.set_grams(1_000.0);
    controller
        .device()
        .dispatch(&Command::Calibrate("1000".into()))
        .unwrap();
    controller.tick().unwrap();
    // No identity offline, so sendStatus cannot name the device.
    assert_eq!(
        controller.device().dispatch(&Command::SendStatus).unwrap(),
        -2
    );
    assert_eq!(controller.device().state_code().unwrap(), 1);
}
