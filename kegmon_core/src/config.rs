//! Runtime configuration types for the device.
//!
//! These are the structs the engines read at runtime. They are separate from
//! the TOML-deserialized config in `kegmon_config`; see `conversions`.

use std::time::Duration;

/// Sampling and change detection.
#[derive(Debug, Clone)]
pub struct MeasurementCfg {
    /// Conversions averaged per sample.
    pub samples: u32,
    /// Relative change that counts as significant (0.01 = 1 %). Also the
    /// calibration verification band.
    pub relative_threshold: f32,
    /// Empty-keg weight used until the backend supplies one.
    pub empty_threshold_g: f32,
}

impl Default for MeasurementCfg {
    fn default() -> Self {
        Self {
            samples: 10,
            relative_threshold: 0.01,
            empty_threshold_g: 0.0,
        }
    }
}

/// Reference-weight calibration.
#[derive(Debug, Clone)]
pub struct CalibrationCfg {
    pub min_reference_g: f32,
    pub allow_low_weight: bool,
    pub groups: u32,
    pub samples_per_group: u32,
    /// Pause between sample groups.
    pub group_delay: Duration,
}

impl Default for CalibrationCfg {
    fn default() -> Self {
        Self {
            min_reference_g: 1000.0,
            allow_low_weight: true,
            groups: 10,
            samples_per_group: 10,
            group_delay: Duration::from_millis(500),
        }
    }
}

/// Inventory-service identity and retry budget.
#[derive(Debug, Clone)]
pub struct SyncCfg {
    pub enabled: bool,
    pub max_retries: u32,
    pub device_type: String,
    pub chip_type: String,
    pub chip_id: String,
    pub chip_model: String,
}

impl Default for SyncCfg {
    fn default() -> Self {
        Self {
            enabled: true,
            max_retries: 3,
            device_type: "weight".to_string(),
            chip_type: "Particle".to_string(),
            chip_id: "unknown".to_string(),
            chip_model: "rpi".to_string(),
        }
    }
}

/// Tick cadence, reset gesture and background status period.
#[derive(Debug, Clone)]
pub struct TimingCfg {
    pub tick: Duration,
    pub button_poll: Duration,
    pub reset_hold: Duration,
    pub status_interval: Duration,
    pub led_test_step: Duration,
}

impl Default for TimingCfg {
    fn default() -> Self {
        Self {
            tick: Duration::from_millis(1000),
            button_poll: Duration::from_millis(500),
            reset_hold: Duration::from_millis(5000),
            status_interval: Duration::from_secs(300),
            led_test_step: Duration::from_millis(1000),
        }
    }
}
