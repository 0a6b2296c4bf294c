//! Type-state builder for `Controller`.
//!
//! The load cell and the calibration store are tracked in the type so
//! `build()` only exists once both are set. `try_build()` is always
//! available and reports whatever is missing at runtime.

use std::marker::PhantomData;
use std::sync::{Arc, Mutex};

use kegmon_traits::clock::{Clock, MonotonicClock};
use kegmon_traits::{Button, ByteStore, Indicator, LoadCell, Transport};

use crate::calibration::{Calibration, CalibrationStore};
use crate::config::{CalibrationCfg, MeasurementCfg, SyncCfg, TimingCfg};
use crate::controller::Controller;
use crate::device::{Device, Inner};
use crate::error::BuildError;
use crate::sensor::SensorPort;
use crate::state::{DeviceState, OperatingState};
use crate::sync::DeviceSyncClient;

// ── Type-state markers ───────────────────────────────────────────────────────

pub struct Missing;
pub struct Set;

pub struct DeviceBuilder<L, S> {
    load_cell: Option<Box<dyn LoadCell + Send>>,
    store: Option<Box<dyn ByteStore + Send>>,
    indicator: Option<Box<dyn Indicator + Send>>,
    transport: Option<Box<dyn Transport + Send>>,
    button: Option<Box<dyn Button + Send>>,
    clock: Option<Arc<dyn Clock + Send + Sync>>,
    measurement: Option<MeasurementCfg>,
    calibration: Option<CalibrationCfg>,
    sync: Option<SyncCfg>,
    timing: Option<TimingCfg>,
    _l: PhantomData<L>,
    _s: PhantomData<S>,
}

impl Default for DeviceBuilder<Missing, Missing> {
    fn default() -> Self {
        Self {
            load_cell: None,
            store: None,
            indicator: None,
            transport: None,
            button: None,
            clock: None,
            measurement: None,
            calibration: None,
            sync: None,
            timing: None,
            _l: PhantomData,
            _s: PhantomData,
        }
    }
}

impl Controller {
    /// Start building a controller.
    pub fn builder() -> DeviceBuilder<Missing, Missing> {
        DeviceBuilder::default()
    }
}

fn invalid(msg: &'static str) -> eyre::Report {
    eyre::Report::new(BuildError::InvalidConfig(msg))
}

fn validate(
    measurement: &MeasurementCfg,
    calibration: &CalibrationCfg,
    sync: &SyncCfg,
    timing: &TimingCfg,
) -> eyre::Result<()> {
    if measurement.samples == 0 {
        return Err(invalid("samples must be >= 1"));
    }
    let t = measurement.relative_threshold;
    if !(t.is_finite() && t > 0.0 && t < 1.0) {
        return Err(invalid("relative_threshold must be in (0, 1)"));
    }
    if !measurement.empty_threshold_g.is_finite() {
        return Err(invalid("empty_threshold_g must be finite"));
    }
    if calibration.groups == 0 || calibration.samples_per_group == 0 {
        return Err(invalid("calibration groups and samples per group must be >= 1"));
    }
    if !calibration.min_reference_g.is_finite() {
        return Err(invalid("min_reference_g must be finite"));
    }
    if sync.max_retries == 0 {
        return Err(invalid("max_retries must be >= 1"));
    }
    if timing.tick.is_zero() || timing.button_poll.is_zero() {
        return Err(invalid("tick periods must be > 0"));
    }
    if timing.reset_hold < timing.button_poll {
        return Err(invalid("reset_hold must be >= button_poll"));
    }
    if timing.status_interval.is_zero() {
        return Err(invalid("status_interval must be > 0"));
    }
    Ok(())
}

impl<L, S> DeviceBuilder<L, S> {
    /// Fallible build available in any type-state; returns detailed error for missing pieces.
    pub fn try_build(self) -> eyre::Result<Controller> {
        let load_cell = self
            .load_cell
            .ok_or_else(|| eyre::Report::new(BuildError::MissingLoadCell))?;
        let store = self
            .store
            .ok_or_else(|| eyre::Report::new(BuildError::MissingStore))?;
        let indicator = self
            .indicator
            .ok_or_else(|| eyre::Report::new(BuildError::MissingIndicator))?;
        let transport = self
            .transport
            .ok_or_else(|| eyre::Report::new(BuildError::MissingTransport))?;
        let button = self
            .button
            .ok_or_else(|| eyre::Report::new(BuildError::MissingButton))?;

        let measurement = self.measurement.unwrap_or_default();
        let calibration = self.calibration.unwrap_or_default();
        let sync = self.sync.unwrap_or_default();
        let timing = self.timing.unwrap_or_default();
        validate(&measurement, &calibration, &sync, &timing)?;

        let clock: Arc<dyn Clock + Send + Sync> = match self.clock {
            Some(c) => c,
            None => Arc::new(MonotonicClock::new()),
        };
        let sync = DeviceSyncClient::new(transport, sync);
        // Nothing is trusted until `boot` has read the store.
        let state = DeviceState::new(OperatingState::CalibrationPending, sync.reachable());

        let device = Device::new(Inner {
            sensor: SensorPort::new(load_cell, Calibration::unity()),
            store: Mutex::new(CalibrationStore::new(store)),
            sync: Mutex::new(sync),
            indicator: Mutex::new(indicator),
            state: Mutex::new(state),
            clock,
            measurement,
            calibration,
            timing,
        });
        Ok(Controller::new(device, button))
    }
}

/// Chainable setters that do not affect type-state.
impl<L, S> DeviceBuilder<L, S> {
    pub fn with_indicator(mut self, indicator: impl Indicator + Send + 'static) -> Self {
        self.indicator = Some(Box::new(indicator));
        self
    }
    pub fn with_transport(mut self, transport: impl Transport + Send + 'static) -> Self {
        self.transport = Some(Box::new(transport));
        self
    }
    pub fn with_button(mut self, button: impl Button + Send + 'static) -> Self {
        self.button = Some(Box::new(button));
        self
    }
    /// Provide a custom clock implementation; defaults to `MonotonicClock` when not provided.
    pub fn with_clock(mut self, clock: impl Clock + Send + Sync + 'static) -> Self {
        self.clock = Some(Arc::new(clock));
        self
    }
    pub fn with_measurement(mut self, measurement: MeasurementCfg) -> Self {
        self.measurement = Some(measurement);
        self
    }
    pub fn with_calibration(mut self, calibration: CalibrationCfg) -> Self {
        self.calibration = Some(calibration);
        self
    }
    pub fn with_sync(mut self, sync: SyncCfg) -> Self {
        self.sync = Some(sync);
        self
    }
    pub fn with_timing(mut self, timing: TimingCfg) -> Self {
        self.timing = Some(timing);
        self
    }

    /// Apply every runtime section of a loaded config file.
    pub fn with_config(self, cfg: &kegmon_config::Config, chip_id: impl Into<String>) -> Self {
        self.with_measurement((&cfg.measurement).into())
            .with_calibration((&cfg.calibration).into())
            .with_timing((&cfg.timing).into())
            .with_sync(SyncCfg::from_config(cfg, chip_id))
    }
}

// Setters that advance type-state
impl<S> DeviceBuilder<Missing, S> {
    pub fn with_load_cell(self, load_cell: impl LoadCell + Send + 'static) -> DeviceBuilder<Set, S> {
        DeviceBuilder {
            load_cell: Some(Box::new(load_cell)),
            store: self.store,
            indicator: self.indicator,
            transport: self.transport,
            button: self.button,
            clock: self.clock,
            measurement: self.measurement,
            calibration: self.calibration,
            sync: self.sync,
            timing: self.timing,
            _l: PhantomData,
            _s: PhantomData,
        }
    }
}

impl<L> DeviceBuilder<L, Missing> {
    pub fn with_store(self, store: impl ByteStore + Send + 'static) -> DeviceBuilder<L, Set> {
        DeviceBuilder {
            load_cell: self.load_cell,
            store: Some(Box::new(store)),
            indicator: self.indicator,
            transport: self.transport,
            button: self.button,
            clock: self.clock,
            measurement: self.measurement,
            calibration: self.calibration,
            sync: self.sync,
            timing: self.timing,
            _l: PhantomData,
            _s: PhantomData,
        }
    }
}

impl DeviceBuilder<Set, Set> {
    /// Validate and build. Only available once the load cell and store are set.
    pub fn build(self) -> eyre::Result<Controller> {
        self.try_build()
    }
}
