//! `From` implementations bridging `kegmon_config` types to `kegmon_core` types.
//!
//! `SyncCfg` is the exception: the chip id may need a host lookup, so the
//! caller supplies it through `SyncCfg::from_config`.

use crate::config::{CalibrationCfg, MeasurementCfg, SyncCfg, TimingCfg};
use std::time::Duration;

// ── MeasurementCfg ───────────────────────────────────────────────────────────

impl From<&kegmon_config::MeasurementCfg> for MeasurementCfg {
    fn from(c: &kegmon_config::MeasurementCfg) -> Self {
        Self {
            samples: c.samples,
            relative_threshold: c.relative_threshold,
            empty_threshold_g: c.empty_threshold_g,
        }
    }
}

// ── CalibrationCfg ───────────────────────────────────────────────────────────

impl From<&kegmon_config::CalibrationCfg> for CalibrationCfg {
    fn from(c: &kegmon_config::CalibrationCfg) -> Self {
        Self {
            min_reference_g: c.min_reference_g,
            allow_low_weight: c.allow_low_weight,
            groups: c.groups,
            samples_per_group: c.samples_per_group,
            group_delay: Duration::from_millis(c.group_delay_ms),
        }
    }
}

// ── TimingCfg ────────────────────────────────────────────────────────────────

impl From<&kegmon_config::TimingCfg> for TimingCfg {
    fn from(c: &kegmon_config::TimingCfg) -> Self {
        Self {
            tick: Duration::from_millis(c.tick_ms),
            button_poll: Duration::from_millis(c.button_poll_ms),
            reset_hold: Duration::from_millis(c.reset_hold_ms),
            status_interval: Duration::from_secs(c.status_interval_s),
            led_test_step: Duration::from_millis(c.led_test_step_ms),
        }
    }
}

// ── SyncCfg ──────────────────────────────────────────────────────────────────

impl SyncCfg {
    pub fn from_config(cfg: &kegmon_config::Config, chip_id: impl Into<String>) -> Self {
        Self {
            enabled: cfg.service.enabled,
            max_retries: cfg.service.max_retries,
            device_type: cfg.device.device_type.clone(),
            chip_type: cfg.device.chip_type.clone(),
            chip_id: chip_id.into(),
            chip_model: cfg.device.chip_model.clone(),
        }
    }
}
