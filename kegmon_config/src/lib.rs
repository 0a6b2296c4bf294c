#![cfg_attr(all(not(debug_assertions), not(test)), deny(warnings))]
#![cfg_attr(
    all(not(debug_assertions), not(test)),
    deny(clippy::all, clippy::pedantic, clippy::nursery)
)]
#![allow(clippy::module_name_repetitions, clippy::missing_errors_doc)]
//! Config schema for the keg monitor.
//!
//! - `Config` and its sections are deserialized from TOML. Every section has
//!   defaults so a minimal file only names what differs from the stock device.
//! - `Config::validate` rejects values the device cannot operate with and
//!   names the offending key in the error.
use serde::Deserialize;
use std::path::{Path, PathBuf};

/// Identity the device presents to the inventory service.
#[derive(Debug, Deserialize, Clone)]
#[serde(default)]
pub struct DeviceCfg {
    /// Backend device type; the weight monitor registers as "weight".
    pub device_type: String,
    /// Controller family reported as `chip_type`. The backend only knows "Particle".
    pub chip_type: String,
    /// Hardware id used to find/register the device. Falls back to
    /// `/etc/machine-id` when absent.
    pub chip_id: Option<String>,
    pub chip_model: String,
}

impl Default for DeviceCfg {
    fn default() -> Self {
        Self {
            device_type: "weight".to_string(),
            chip_type: "Particle".to_string(),
            chip_id: None,
            chip_model: "rpi".to_string(),
        }
    }
}

#[derive(Debug, Deserialize, Clone)]
#[serde(default)]
pub struct Pins {
    pub hx711_dt: u8,
    pub hx711_sck: u8,
    pub button: u8,
    pub led_red: u8,
    pub led_green: u8,
    pub led_blue: u8,
}

impl Default for Pins {
    fn default() -> Self {
        Self {
            hx711_dt: 5,
            hx711_sck: 6,
            button: 21,
            led_red: 13,
            led_green: 19,
            led_blue: 26,
        }
    }
}

#[derive(Debug, Deserialize, Clone)]
#[serde(default)]
pub struct SensorCfg {
    /// Max time to wait for HX711 data-ready (DT low) per conversion.
    pub read_timeout_ms: u64,
    /// Trailing clock pulses selecting gain/channel: 25 (A/128), 26 (B/32), 27 (A/64).
    pub gain_pulses: u8,
}

impl Default for SensorCfg {
    fn default() -> Self {
        Self {
            read_timeout_ms: 150,
            gain_pulses: 25,
        }
    }
}

#[derive(Debug, Deserialize, Clone)]
#[serde(default)]
pub struct MeasurementCfg {
    /// Conversions averaged per sample.
    pub samples: u32,
    /// Relative change that counts as significant; also the calibration
    /// verification tolerance.
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

#[derive(Debug, Deserialize, Clone)]
#[serde(default)]
pub struct CalibrationCfg {
    /// Backing file for the calibration record.
    pub store_path: PathBuf,
    /// Smallest reference weight accepted when `allow_low_weight` is false.
    pub min_reference_g: f32,
    pub allow_low_weight: bool,
    /// Sample groups averaged during calibration.
    pub groups: u32,
    pub samples_per_group: u32,
    /// Pause between groups; bounds total calibration latency.
    pub group_delay_ms: u64,
}

impl Default for CalibrationCfg {
    fn default() -> Self {
        Self {
            store_path: PathBuf::from("/var/lib/kegmon/calibration.bin"),
            min_reference_g: 1000.0,
            allow_low_weight: true,
            groups: 10,
            samples_per_group: 10,
            group_delay_ms: 500,
        }
    }
}

#[derive(Debug, Deserialize, Clone)]
#[serde(default)]
pub struct ServiceCfg {
    /// When false the device runs offline: pushes report success and
    /// identity never resolves.
    pub enabled: bool,
    pub host: String,
    pub port: u16,
    /// Use https instead of http.
    pub secure: bool,
    /// Sent as a bearer token when present.
    pub api_key: Option<String>,
    /// Attempts per request, no delay between them.
    pub max_retries: u32,
    /// Per-attempt transport timeout.
    pub request_timeout_ms: u64,
}

impl Default for ServiceCfg {
    fn default() -> Self {
        Self {
            enabled: true,
            host: "localhost".to_string(),
            port: 5000,
            secure: false,
            api_key: None,
            max_retries: 3,
            request_timeout_ms: 2000,
        }
    }
}

#[derive(Debug, Deserialize, Clone)]
#[serde(default)]
pub struct TimingCfg {
    /// Tick period in NORMAL and CALIBRATION_PENDING.
    pub tick_ms: u64,
    /// Tick period while the button is held or calibration is running.
    pub button_poll_ms: u64,
    /// Continuous hold that triggers a restart.
    pub reset_hold_ms: u64,
    /// Period of the background status push.
    pub status_interval_s: u64,
    /// Duration of each color during the LED self-test.
    pub led_test_step_ms: u64,
}

impl Default for TimingCfg {
    fn default() -> Self {
        Self {
            tick_ms: 1000,
            button_poll_ms: 500,
            reset_hold_ms: 5000,
            status_interval_s: 300,
            led_test_step_ms: 1000,
        }
    }
}

#[derive(Debug, Deserialize, Default, Clone)]
#[serde(default)]
pub struct Logging {
    pub file: Option<String>,  // path to .log (JSON lines)
    pub level: Option<String>, // "info","debug"
    /// Log rotation policy: "never" | "daily" | "hourly" (default: never)
    pub rotation: Option<String>,
}

#[derive(Debug, Deserialize, Default, Clone)]
#[serde(default)]
pub struct Config {
    pub device: DeviceCfg,
    pub pins: Pins,
    pub sensor: SensorCfg,
    pub measurement: MeasurementCfg,
    pub calibration: CalibrationCfg,
    pub service: ServiceCfg,
    pub timing: TimingCfg,
    pub logging: Logging,
}

pub fn load_toml(s: &str) -> Result<Config, toml::de::Error> {
    toml::from_str::<Config>(s)
}

/// Read, parse and validate a config file.
pub fn load_file(path: &Path) -> eyre::Result<Config> {
    let text = std::fs::read_to_string(path)
        .map_err(|e| eyre::eyre!("read config {:?}: {}", path, e))?;
    let cfg = load_toml(&text).map_err(|e| eyre::eyre!("invalid configuration: {e}"))?;
    cfg.validate()?;
    Ok(cfg)
}

impl Config {
    pub fn validate(&self) -> eyre::Result<()> {
        // Device
        if self.device.device_type.trim().is_empty() {
            eyre::bail!("device.device_type must not be empty");
        }
        if self.device.chip_type.trim().is_empty() {
            eyre::bail!("device.chip_type must not be empty");
        }
        if let Some(id) = &self.device.chip_id
            && id.trim().is_empty()
        {
            eyre::bail!("device.chip_id must not be empty when set");
        }

        // Sensor
        if self.sensor.read_timeout_ms == 0 {
            eyre::bail!("sensor.read_timeout_ms must be >= 1");
        }
        if !(25..=27).contains(&self.sensor.gain_pulses) {
            eyre::bail!("sensor.gain_pulses must be 25, 26 or 27");
        }

        // Measurement
        if self.measurement.samples == 0 {
            eyre::bail!("measurement.samples must be >= 1");
        }
        let t = self.measurement.relative_threshold;
        if !(t.is_finite() && t > 0.0 && t < 1.0) {
            eyre::bail!("measurement.relative_threshold must be in (0.0, 1.0)");
        }
        if !self.measurement.empty_threshold_g.is_finite()
            || self.measurement.empty_threshold_g < 0.0
        {
            eyre::bail!("measurement.empty_threshold_g must be >= 0.0");
        }

        // Calibration
        if self.calibration.store_path.as_os_str().is_empty() {
            eyre::bail!("calibration.store_path must not be empty");
        }
        if !self.calibration.min_reference_g.is_finite() || self.calibration.min_reference_g < 0.0
        {
            eyre::bail!("calibration.min_reference_g must be >= 0.0");
        }
        if self.calibration.groups == 0 {
            eyre::bail!("calibration.groups must be >= 1");
        }
        if self.calibration.samples_per_group == 0 {
            eyre::bail!("calibration.samples_per_group must be >= 1");
        }
        if self.calibration.group_delay_ms > 10_000 {
            eyre::bail!("calibration.group_delay_ms is unreasonably large (>10s)");
        }

        // Service
        if self.service.enabled && self.service.host.trim().is_empty() {
            eyre::bail!("service.host must not be empty when the service is enabled");
        }
        if self.service.port == 0 {
            eyre::bail!("service.port must be > 0");
        }
        if self.service.max_retries == 0 {
            eyre::bail!("service.max_retries must be >= 1");
        }
        // Every retry blocks the tick loop; keep the budget small.
        if self.service.max_retries > 10 {
            eyre::bail!("service.max_retries must be <= 10");
        }
        if self.service.request_timeout_ms == 0 {
            eyre::bail!("service.request_timeout_ms must be >= 1");
        }

        // Timing
        if self.timing.tick_ms == 0 {
            eyre::bail!("timing.tick_ms must be >= 1");
        }
        if self.timing.button_poll_ms == 0 {
            eyre::bail!("timing.button_poll_ms must be >= 1");
        }
        if self.timing.reset_hold_ms < self.timing.button_poll_ms {
            eyre::bail!("timing.reset_hold_ms must be >= timing.button_poll_ms");
        }
        if self.timing.status_interval_s == 0 {
            eyre::bail!("timing.status_interval_s must be >= 1");
        }

        // Logging
        if let Some(r) = self.logging.rotation.as_deref()
            && !matches!(r, "never" | "daily" | "hourly")
        {
            eyre::bail!("logging.rotation must be one of never|daily|hourly");
        }

        Ok(())
    }

    /// Base URL of the inventory service, e.g. `http://localhost:5000`.
    pub fn service_base_url(&self) -> String {
        let scheme = if self.service.secure { "https" } else { "http" };
        format!("{scheme}://{}:{}", self.service.host, self.service.port)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn empty_document_yields_stock_device() {
        let cfg = load_toml("").expect("parse");
        cfg.validate().expect("defaults are valid");
        assert_eq!(cfg.measurement.samples, 10);
        assert_eq!(cfg.service.max_retries, 3);
        assert_eq!(cfg.timing.reset_hold_ms, 5000);
        assert_eq!(cfg.calibration.groups, 10);
    }

    #[test]
    fn base_url_honors_scheme() {
        let mut cfg = Config::default();
        cfg.service.host = "inventory.local".into();
        cfg.service.port = 8443;
        cfg.service.secure = true;
        assert_eq!(cfg.service_base_url(), "https://inventory.local:8443");
    }
}
