//! Config mapping and hardware assembly.

use kegmon_core::Controller;
use kegmon_hardware::FileStore;
use kegmon_traits::{Button, Indicator, LoadCell};

use crate::transport::HttpTransport;

const MACHINE_ID: &str = "/etc/machine-id";

/// Device hardware id: the configured one, else the host's machine id.
pub fn chip_id(cfg: &kegmon_config::Config) -> eyre::Result<String> {
    if let Some(id) = &cfg.device.chip_id {
        return Ok(id.trim().to_string());
    }
    let id = std::fs::read_to_string(MACHINE_ID)
        .map_err(|e| eyre::eyre!("no device.chip_id configured and {MACHINE_ID} unreadable: {e}"))?;
    let id = id.trim();
    if id.is_empty() {
        eyre::bail!("no device.chip_id configured and {MACHINE_ID} is empty");
    }
    Ok(id.to_string())
}

/// Handle to the simulated platform, when the build has one.
pub struct SimHandle {
    #[cfg(not(feature = "hardware"))]
    weight: kegmon_hardware::SimulatedWeight,
}

impl SimHandle {
    /// Put `grams` on the platform. No-op on real hardware.
    pub fn place(&self, grams: f64) {
        #[cfg(not(feature = "hardware"))]
        {
            tracing::info!(grams, "simulated weight placed");
            self.weight.set_grams(grams);
        }
        #[cfg(feature = "hardware")]
        {
            if grams != 0.0 {
                tracing::warn!(grams, "--sim-grams ignored on hardware builds");
            }
        }
    }
}

fn controller(
    cfg: &kegmon_config::Config,
    load_cell: impl LoadCell + Send + 'static,
    button: impl Button + Send + 'static,
    indicator: impl Indicator + Send + 'static,
) -> eyre::Result<Controller> {
    let chip_id = chip_id(cfg)?;
    let transport = HttpTransport::from_config(cfg)?;
    tracing::info!(
        chip_id = %chip_id,
        service = transport.base_url(),
        enabled = cfg.service.enabled,
        store = %cfg.calibration.store_path.display(),
        "assembling device"
    );
    Controller::builder()
        .with_load_cell(load_cell)
        .with_store(FileStore::new(&cfg.calibration.store_path))
        .with_indicator(indicator)
        .with_transport(transport)
        .with_button(button)
        .with_config(cfg, chip_id)
        .build()
}

#[cfg(feature = "hardware")]
pub fn build(cfg: &kegmon_config::Config) -> eyre::Result<(Controller, SimHandle)> {
    use kegmon_hardware::hardware::{GpioButton, Hx711LoadCell, RgbLed};

    let pins = &cfg.pins;
    let load_cell = Hx711LoadCell::try_new(
        pins.hx711_dt,
        pins.hx711_sck,
        cfg.sensor.gain_pulses,
        cfg.sensor.read_timeout_ms,
    )
    .map_err(|e| eyre::eyre!("open hx711 (dt={}, sck={}): {e}", pins.hx711_dt, pins.hx711_sck))?;
    let button = GpioButton::try_new(pins.button)
        .map_err(|e| eyre::eyre!("open button pin {}: {e}", pins.button))?;
    let led = RgbLed::try_new(pins.led_red, pins.led_green, pins.led_blue)
        .map_err(|e| eyre::eyre!("open led pins: {e}"))?;
    Ok((controller(cfg, load_cell, button, led)?, SimHandle {}))
}

#[cfg(not(feature = "hardware"))]
pub fn build(cfg: &kegmon_config::Config) -> eyre::Result<(Controller, SimHandle)> {
    use kegmon_hardware::{LogIndicator, SimulatedButton, SimulatedLoadCell};

    let (load_cell, weight) = SimulatedLoadCell::new();
    let controller = controller(cfg, load_cell, SimulatedButton::new(), LogIndicator::new())?;
    Ok((controller, SimHandle { weight }))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn configured_chip_id_is_trimmed() {
        let cfg = kegmon_config::load_toml("[device]\nchip_id = \" abc \"").unwrap();
        assert_eq!(chip_id(&cfg).unwrap(), "abc");
    }
}
