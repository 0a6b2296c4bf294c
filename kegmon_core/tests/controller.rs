mod common;

use std::sync::atomic::AtomicBool;
use std::thread;
use std::time::Duration;

use common::{DEVICE_ID, Rig, calibrated, wait_for_state};
use kegmon_core::{Command, OperatingState, RestartReason, RunExit, Tick};
use kegmon_traits::{Color, Signal};

/// Hold the button for `hold`, release it, and collect every restart seen.
fn press_for(r: &mut Rig, hold: Duration) -> Vec<RestartReason> {
    let mut restarts = Vec::new();
    let start = r.clock.elapsed();
    r.button.set_pressed(true);
    while r.clock.elapsed() - start < hold {
        match r.controller.tick().unwrap() {
            Tick::Continue(wait) => r.clock.advance(wait),
            Tick::Restart(reason) => restarts.push(reason),
        }
    }
    r.button.set_pressed(false);
    if let Tick::Restart(reason) = r.controller.tick().unwrap() {
        restarts.push(reason);
    }
    restarts
}

#[test]
fn long_press_restarts_exactly_once() {
    let mut r = calibrated(100.0);
    r.transport.serve_device(DEVICE_ID, None);
    r.controller.tick().unwrap();

    let restarts = press_for(&mut r, Duration::from_secs(6));
    assert_eq!(restarts, vec![RestartReason::ButtonHold]);

    let history = r.indicator.history();
    assert!(history.contains(&Signal::solid(Color::Red)));
    assert!(history.contains(&Signal::fast(Color::Red)));
    assert_eq!(r.device.state().unwrap(), OperatingState::ResetPending);
    // Transient state reports the mode it interrupted.
    assert_eq!(r.device.state_code().unwrap(), 1);
}

#[test]
fn short_press_restores_indicator() {
    let mut r = calibrated(100.0);
    r.transport.serve_device(DEVICE_ID, None);
    r.controller.tick().unwrap();
    let reads = r.cell.reads();

    let restarts = press_for(&mut r, Duration::from_secs(3));
    assert!(restarts.is_empty());
    assert_eq!(r.device.state().unwrap(), OperatingState::Normal);
    assert_eq!(r.indicator.last(), Some(Signal::solid(Color::Green)));
    // Sampling is paused while the button is held and resumes on release.
    assert_eq!(r.cell.reads(), reads + 1);
}

#[test]
fn pressed_button_polls_faster() {
    let mut r = calibrated(100.0);
    r.button.set_pressed(true);
    assert_eq!(
        r.controller.tick().unwrap(),
        Tick::Continue(Duration::from_millis(500))
    );
    assert_eq!(r.indicator.last(), Some(Signal::solid(Color::Red)));
}

#[test]
fn restart_after_clear_memory_boots_uncalibrated() {
    let mut r = calibrated(100.0);
    assert_eq!(r.device.dispatch(&Command::ClearMemory).unwrap(), 1);
    assert!(!r.store.record().is_set());
    assert_eq!(
        r.controller.tick().unwrap(),
        Tick::Restart(RestartReason::FactoryReset)
    );
    assert_eq!(
        r.controller.boot().unwrap(),
        OperatingState::CalibrationPending
    );
    // The latch is consumed.
    assert!(matches!(r.controller.tick().unwrap(), Tick::Continue(_)));
}

#[test]
fn run_stops_on_shutdown_flag() {
    let mut r = calibrated(100.0);
    let shutdown = AtomicBool::new(true);
    assert_eq!(r.controller.run(&shutdown), RunExit::Shutdown);
    assert_eq!(r.cell.reads(), 0);
}

#[test]
fn run_restarts_on_sensor_failure() {
    let mut r = calibrated(100.0);
    r.cell.set_failing(true);
    let shutdown = AtomicBool::new(false);
    assert_eq!(
        r.controller.run(&shutdown),
        RunExit::Restart(RestartReason::HardwareFault)
    );
    assert!(!r.cell.is_powered());
}

#[test]
fn run_returns_latched_button_restart() {
    let mut r = calibrated(100.0);
    r.transport.serve_device(DEVICE_ID, None);
    let shutdown = AtomicBool::new(false);
    r.button.set_pressed(true);
    let device = r.device.clone();
    let button = r.button.clone();
    let releaser = thread::spawn(move || {
        wait_for_state(&device, OperatingState::ResetPending);
        button.set_pressed(false);
    });
    assert_eq!(
        r.controller.run(&shutdown),
        RunExit::Restart(RestartReason::ButtonHold)
    );
    releaser.join().expect("join");
}

#[test]
fn stale_reading_is_discarded_after_a_concurrent_command() {
    let mut r = calibrated(100.0);
    r.transport.serve_device(DEVICE_ID, None);
    let gate = r.cell.gate_next_read();

    let Rig {
        mut controller,
        device,
        transport,
        ..
    } = r;
    let ticker = thread::spawn(move || {
        let tick = controller.tick();
        (controller, tick)
    });
    assert!(gate.wait_started(Duration::from_secs(5)));

    let commander = {
        let device = device.clone();
        thread::spawn(move || device.dispatch(&Command::StartCalibration))
    };
    wait_for_state(&device, OperatingState::CalibrationPending);
    gate.release();

    let (_controller, tick) = ticker.join().expect("join");
    assert!(matches!(tick.unwrap(), Tick::Continue(_)));
    assert_eq!(commander.join().expect("join").unwrap(), 1);

    assert_eq!(device.last_sample().unwrap(), None);
    assert_eq!(
        transport.count("POST", &format!("/api/v1/devices/{DEVICE_ID}/measurements")),
        0
    );
    assert_eq!(device.state().unwrap(), OperatingState::CalibrationPending);
}
