#![allow(dead_code)]

use kegmon_core::builder::{DeviceBuilder, Set};
use kegmon_core::mocks::{MemStore, RecordingIndicator, ScriptedButton, ScriptedLoadCell, ScriptedTransport};
use kegmon_core::{CalibrationData, Controller, Device, OperatingState};
use std::thread;
use std::time::{Duration, Instant};
use kegmon_traits::clock::test_clock::TestClock;

pub const DEVICE_ID: &str = "keg-1";

pub struct Rig {
    pub controller: Controller,
    pub device: Device,
    pub cell: ScriptedLoadCell,
    pub store: MemStore,
    pub transport: ScriptedTransport,
    pub indicator: RecordingIndicator,
    pub button: ScriptedButton,
    pub clock: TestClock,
}

impl Rig {
    pub fn measurement_posts(&self) -> usize {
        self.transport
            .count("POST", &format!("/api/v1/devices/{DEVICE_ID}/measurements"))
    }

    pub fn status_posts(&self) -> usize {
        self.transport
            .count("POST", &format!("/api/v1/devices/{DEVICE_ID}/status"))
    }

    pub fn last_status_body(&self) -> serde_json::Value {
        let path = format!("/api/v1/devices/{DEVICE_ID}/status");
        let req = self
            .transport
            .requests()
            .into_iter()
            .rev()
            .find(|r| r.path == path)
            .expect("a status push");
        serde_json::from_str(&req.body).expect("json body")
    }
}

/// Device with scripted collaborators, not yet booted.
pub fn rig_with<F>(store: MemStore, raw: f64, tweak: F) -> Rig
where
    F: FnOnce(DeviceBuilder<Set, Set>) -> DeviceBuilder<Set, Set>,
{
    let cell = ScriptedLoadCell::new(raw);
    let transport = ScriptedTransport::new();
    let indicator = RecordingIndicator::new();
    let button = ScriptedButton::new();
    let clock = TestClock::new();
    let builder = Controller::builder()
        .with_load_cell(cell.clone())
        .with_store(store.clone())
        .with_indicator(indicator.clone())
        .with_transport(transport.clone())
        .with_button(button.clone())
        .with_clock(clock.clone());
    let controller = tweak(builder).build().expect("valid rig");
    let device = controller.device().clone();
    Rig {
        controller,
        device,
        cell,
        store,
        transport,
        indicator,
        button,
        clock,
    }
}

pub fn rig(store: MemStore, raw: f64) -> Rig {
    rig_with(store, raw, |b| b)
}

/// Booted device with a stored unity calibration, so it starts NORMAL.
pub fn calibrated(raw: f64) -> Rig {
    let mut r = rig(
        MemStore::with_record(CalibrationData {
            scale: 1.0,
            offset: 0,
        }),
        raw,
    );
    r.controller.boot().expect("boot");
    r
}

/// Poll until another thread has moved the device into `mode`.
pub fn wait_for_state(device: &Device, mode: OperatingState) {
    let deadline = Instant::now() + Duration::from_secs(5);
    while device.state().expect("state") != mode {
        assert!(Instant::now() < deadline, "device never reached {mode}");
        thread::sleep(Duration::from_millis(1));
    }
}
