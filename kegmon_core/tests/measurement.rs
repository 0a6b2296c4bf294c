mod common;

use std::time::Duration;

use common::{DEVICE_ID, calibrated};
use kegmon_core::{Level, Tick, classify_level, is_significant};
use kegmon_traits::{Color, Signal};
use proptest::prelude::*;

#[test]
fn first_reading_is_always_pushed() {
    let mut r = calibrated(100.0);
    r.transport.serve_device(DEVICE_ID, None);
    assert_eq!(
        r.controller.tick().unwrap(),
        Tick::Continue(Duration::from_secs(1))
    );
    assert_eq!(r.measurement_posts(), 1);
    let sample = r.device.last_sample().unwrap().expect("sample kept");
    assert_eq!(sample.value, 100.0);
    assert_eq!(sample.timestamp, 1_700_000_000);
    assert_eq!(r.indicator.last(), Some(Signal::solid(Color::Green)));
}

#[test]
fn only_significant_changes_are_pushed() {
    let mut r = calibrated(100.0);
    r.transport.serve_device(DEVICE_ID, None);
    r.controller.tick().unwrap();
    r.controller.tick().unwrap();
    assert_eq!(r.measurement_posts(), 1);

    r.cell.set_raw(101.0);
    r.controller.tick().unwrap();
    assert_eq!(r.measurement_posts(), 1);
    assert_eq!(r.device.last_sample().unwrap().unwrap().value, 100.0);

    r.cell.set_raw(102.0);
    r.controller.tick().unwrap();
    assert_eq!(r.measurement_posts(), 2);
    assert_eq!(r.device.last_sample().unwrap().unwrap().value, 102.0);
}

#[test]
fn failed_push_still_replaces_the_sample() {
    let mut r = calibrated(100.0);
    r.transport.serve_device(DEVICE_ID, None);
    r.transport
        .fail("POST", &format!("/api/v1/devices/{DEVICE_ID}/measurements"));

    r.controller.tick().unwrap();
    assert_eq!(r.measurement_posts(), 3);
    assert_eq!(r.device.last_sample().unwrap().unwrap().value, 100.0);
    assert_eq!(r.device.state_code().unwrap(), 2);

    r.controller.tick().unwrap();
    assert_eq!(r.measurement_posts(), 3, "unchanged value is not resent");
}

#[test]
fn unreachable_service_leaves_identity_unresolved() {
    let mut r = calibrated(100.0);
    r.controller.tick().unwrap();

    assert_eq!(r.transport.count("GET", "/api/v1/ping"), 3);
    assert_eq!(r.transport.count("GET", "/api/v1/devices/find"), 0);
    assert_eq!(r.transport.count("POST", "/api/v1/devices"), 0);
    assert!(!r.device.identity().unwrap().is_resolved());
    assert!(r.device.last_sample().unwrap().is_some());
    assert_eq!(r.device.dispatch(&kegmon_core::Command::GetState).unwrap(), 2);
}

#[test]
fn identity_is_retried_on_the_next_change() {
    let mut r = calibrated(100.0);
    r.controller.tick().unwrap();
    assert_eq!(r.transport.count("GET", "/api/v1/ping"), 3);

    r.transport.serve_device(DEVICE_ID, None);
    r.cell.set_raw(200.0);
    r.controller.tick().unwrap();
    assert_eq!(r.transport.count("GET", "/api/v1/ping"), 4);
    assert_eq!(r.measurement_posts(), 1);
    assert_eq!(r.device.identity().unwrap().id, DEVICE_ID);
    assert_eq!(r.device.state_code().unwrap(), 1);
}

#[test]
fn readings_while_empty_stay_local() {
    let mut r = calibrated(10_000.0);
    r.transport.serve_device(DEVICE_ID, Some(4_500.0));

    // Resolves identity, and with it the backend's empty threshold.
    r.controller.tick().unwrap();
    assert_eq!(r.measurement_posts(), 1);

    r.cell.set_raw(100.0);
    r.controller.tick().unwrap();
    assert_eq!(r.measurement_posts(), 2);
    assert_eq!(r.indicator.last(), Some(Signal::solid(Color::Orange)));

    r.cell.set_raw(50.0);
    r.controller.tick().unwrap();
    assert_eq!(r.measurement_posts(), 2);
    assert_eq!(r.device.last_sample().unwrap().unwrap().value, 50.0);

    r.cell.set_raw(20_000.0);
    r.controller.tick().unwrap();
    assert_eq!(r.measurement_posts(), 3);
    assert_eq!(r.indicator.last(), Some(Signal::solid(Color::Green)));
}

#[test]
fn periodic_status_reports_latest_sample() {
    let mut r = calibrated(100.0);
    r.transport.serve_device(DEVICE_ID, Some(4_500.0));
    r.controller.tick().unwrap();
    assert_eq!(r.status_posts(), 0);

    r.clock.advance(Duration::from_secs(300));
    r.controller.tick().unwrap();
    assert_eq!(r.status_posts(), 1);
    let body = r.last_status_body();
    assert_eq!(body["latestMeasurement"], 100.0);
    assert_eq!(body["latestMeasurementTS"], 1_700_000_000);
    assert_eq!(body["state"], 1);
    assert_eq!(body["emptyKegWeightGrams"], 4_500.0);
}

#[test]
fn periodic_status_without_a_sample_sends_zeros() {
    let mut r = calibrated(100.0);
    r.transport.serve_device(DEVICE_ID, None);
    assert_eq!(r.device.dispatch(&kegmon_core::Command::StartMaintenance).unwrap(), 1);
    r.clock.advance(Duration::from_secs(300));
    r.controller.tick().unwrap();

    assert_eq!(r.status_posts(), 2);
    let body = r.last_status_body();
    assert_eq!(body["latestMeasurement"], 0.0);
    assert_eq!(body["latestMeasurementTS"], 0);
    assert_eq!(body["state"], 99);
    assert_eq!(r.cell.reads(), 0);
}

#[test]
fn significance_examples() {
    assert!(!is_significant(100.0, 100.0, 0.01));
    assert!(is_significant(102.0, 100.0, 0.01));
    assert!(!is_significant(101.0, 100.0, 0.01));
    assert_eq!(classify_level(10.0, 20.0), Level::Empty);
}

proptest! {
    #[test]
    fn equal_readings_are_never_significant(v in 0.0f32..1.0e6, t in 0.001f32..0.5) {
        prop_assert!(!is_significant(v, v, t));
    }

    #[test]
    fn negative_baselines_always_report(last in -1.0e6f32..-0.001, delta in -10.0f32..10.0, t in 0.001f32..0.5) {
        prop_assert!(is_significant(last + delta, last, t));
    }

    #[test]
    fn changes_well_past_the_band_are_significant(last in 1.0f32..1.0e6, t in 0.001f32..0.5) {
        prop_assert!(is_significant(last * (1.0 + 2.0 * t), last, t));
        prop_assert!(is_significant(last * (1.0 - 2.0 * t), last, t));
    }

    #[test]
    fn changes_well_inside_the_band_are_not(last in 1.0f32..1.0e6, t in 0.001f32..0.5) {
        prop_assert!(!is_significant(last * (1.0 + t / 2.0), last, t));
    }
}
