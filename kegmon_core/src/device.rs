//! Shared device handle: state, indicator mapping, status reporting and the
//! remote-command entry points that are not calibration.
//!
//! `Device` is cheap to clone. The controller's tick loop and any command
//! dispatcher hold clones of the same handle; all mutation goes through the
//! locks below.
//!
//! Lock order is sensor, then store. The state lock is only ever taken
//! briefly and never held across another lock or a network call.

use std::sync::{Arc, Mutex};

use kegmon_traits::{Clock, Color, Indicator, Signal};
use tracing::{debug, info, warn};

use crate::calibration::{Calibration, CalibrationStore};
use crate::config::{CalibrationCfg, MeasurementCfg, TimingCfg};
use crate::error::{CommandError, Result};
use crate::measurement::{Level, MeasurementSample};
use crate::sensor::SensorPort;
use crate::state::{DeviceState, OperatingState, RestartReason};
use crate::sync::{DeviceIdentity, DeviceSyncClient, StatusReport};
use crate::util::lock;

pub(crate) struct Inner {
    pub(crate) sensor: SensorPort,
    pub(crate) store: Mutex<CalibrationStore>,
    pub(crate) sync: Mutex<DeviceSyncClient>,
    pub(crate) indicator: Mutex<Box<dyn Indicator + Send>>,
    pub(crate) state: Mutex<DeviceState>,
    pub(crate) clock: Arc<dyn Clock + Send + Sync>,
    pub(crate) measurement: MeasurementCfg,
    pub(crate) calibration: CalibrationCfg,
    pub(crate) timing: TimingCfg,
}

#[derive(Clone)]
pub struct Device {
    pub(crate) inner: Arc<Inner>,
}

impl core::fmt::Debug for Device {
    fn fmt(&self, f: &mut core::fmt::Formatter<'_>) -> core::fmt::Result {
        let mut d = f.debug_struct("Device");
        if let Ok(s) = self.inner.state.try_lock() {
            d.field("state", &s.mode())
                .field("last_sample", &s.last_sample)
                .field("identity_resolved", &s.identity.is_resolved());
        }
        d.finish_non_exhaustive()
    }
}

/// Indicator signal for the current state. Button feedback and the boot
/// blink are driven separately.
pub fn indicator_signal(mode: OperatingState, level: Level) -> Signal {
    match mode {
        OperatingState::Normal => match level {
            Level::Normal => Signal::solid(Color::Green),
            Level::Empty => Signal::solid(Color::Orange),
        },
        OperatingState::CalibrationPending => Signal::slow(Color::Blue),
        OperatingState::Calibrating => Signal::fast(Color::Blue),
        OperatingState::Maintenance => Signal::slow(Color::White),
        OperatingState::ResetPending => Signal::fast(Color::Red),
    }
}

impl Device {
    pub(crate) fn new(inner: Inner) -> Self {
        Self {
            inner: Arc::new(inner),
        }
    }

    /// Run `f` against the state under its lock.
    pub(crate) fn with_state<R>(&self, f: impl FnOnce(&mut DeviceState) -> R) -> Result<R> {
        let mut state = lock(&self.inner.state, "state")?;
        Ok(f(&mut state))
    }

    pub fn clock(&self) -> &Arc<dyn Clock + Send + Sync> {
        &self.inner.clock
    }

    pub fn timing(&self) -> &TimingCfg {
        &self.inner.timing
    }

    pub fn state(&self) -> Result<OperatingState> {
        self.with_state(|s| s.mode())
    }

    /// External state code (1, 2, 10, 11 or 99).
    pub fn state_code(&self) -> Result<i32> {
        self.with_state(|s| s.state_code())
    }

    pub fn last_sample(&self) -> Result<Option<MeasurementSample>> {
        self.with_state(|s| s.last_sample)
    }

    pub fn identity(&self) -> Result<DeviceIdentity> {
        self.with_state(|s| s.identity.clone())
    }

    /// Calibration currently applied to readings.
    pub fn calibration(&self) -> Result<Calibration> {
        self.inner.sensor.calibration()
    }

    pub(crate) fn take_restart(&self) -> Result<Option<RestartReason>> {
        self.with_state(|s| s.restart.take())
    }

    pub(crate) fn request_restart(&self, reason: RestartReason) -> Result<()> {
        self.with_state(|s| s.request_restart(reason))
    }

    pub(crate) fn show(&self, signal: Signal) -> Result<()> {
        lock(&self.inner.indicator, "indicator")?.show(signal);
        Ok(())
    }

    /// Drive the indicator from the current state. Left alone while the LED
    /// self-test owns it.
    pub fn refresh_indicator(&self) -> Result<()> {
        let signal = self.with_state(|s| (!s.testing_leds).then(|| indicator_signal(s.mode(), s.level)))?;
        match signal {
            Some(signal) => self.show(signal),
            None => Ok(()),
        }
    }

    /// Start a session: blink white, sleep the sensor, then pick the boot
    /// state from the stored calibration. Without one the device tares and
    /// waits in CALIBRATION_PENDING.
    pub fn boot(&self) -> Result<OperatingState> {
        self.show(Signal::fast(Color::White))?;
        self.inner.sensor.power_down()?;

        let persisted = lock(&self.inner.store, "store")?.load()?;
        debug!(scale = persisted.scale, offset = persisted.offset, "stored calibration");
        match persisted.calibration() {
            Some(cal) => {
                self.inner.sensor.set_calibration(cal)?;
                self.with_state(|s| s.begin_session(OperatingState::Normal))?;
                self.refresh_indicator()?;
            }
            None => {
                info!("no calibration stored; entering calibration mode");
                self.inner.sensor.set_calibration(Calibration::unity())?;
                self.with_state(|s| s.begin_session(OperatingState::CalibrationPending))?;
                self.start_calibration_mode()?;
            }
        }
        let mode = self.state()?;
        info!(state = %mode, "boot complete");
        Ok(mode)
    }

    /// Resolved identity, resolving it now if this session has none yet.
    /// `None` means "try again later".
    pub(crate) fn ensure_identity(&self) -> Result<Option<DeviceIdentity>> {
        let cached = self.with_state(|s| s.identity.is_resolved().then(|| s.identity.clone()))?;
        if cached.is_some() {
            return Ok(cached);
        }
        let (identity, reachable) = {
            let mut sync = lock(&self.inner.sync, "sync")?;
            if !sync.is_enabled() {
                return Ok(None);
            }
            let identity = sync.resolve_identity();
            (identity, sync.reachable())
        };
        let resolved = identity.is_resolved().then_some(identity);
        self.with_state(|s| {
            s.reachable = reachable;
            if let Some(identity) = &resolved {
                s.identity = identity.clone();
            }
        })?;
        Ok(resolved)
    }

    fn status_report(&self, identity: &DeviceIdentity) -> Result<StatusReport> {
        let fallback = self.inner.measurement.empty_threshold_g;
        self.with_state(|s| {
            let (latest_measurement, latest_measurement_ts) = s
                .last_sample
                .map_or((0.0, 0), |m| (m.value, m.timestamp));
            StatusReport {
                latest_measurement,
                latest_measurement_ts,
                state: s.state_code(),
                empty_keg_weight_grams: identity.empty_keg_weight_grams.unwrap_or(fallback),
            }
        })
    }

    fn push_status_report(&self, identity: &DeviceIdentity) -> Result<bool> {
        let report = self.status_report(identity)?;
        let (ok, reachable) = {
            let mut sync = lock(&self.inner.sync, "sync")?;
            let ok = sync.push_status(&identity.id, &report);
            (ok, sync.reachable())
        };
        self.with_state(|s| s.reachable = reachable)?;
        if ok {
            debug!(state = report.state, "status pushed");
        } else {
            warn!(state = report.state, "status push failed");
        }
        Ok(ok)
    }

    /// Best-effort status push. `false` when the identity is unresolved or
    /// the push failed; an offline device always reports `true`.
    pub(crate) fn report_status(&self) -> Result<bool> {
        if !lock(&self.inner.sync, "sync")?.is_enabled() {
            return Ok(true);
        }
        match self.ensure_identity()? {
            Some(identity) => self.push_status_report(&identity),
            None => Ok(false),
        }
    }

    /// Background status push; failures are only logged.
    pub fn periodic_status(&self) -> Result<()> {
        if !self.report_status()? {
            warn!("periodic status not delivered");
        }
        Ok(())
    }

    /// `sendStatus`: push now, reporting why it could not be delivered.
    pub fn send_status(&self) -> std::result::Result<(), CommandError> {
        let identity = self
            .ensure_identity()?
            .ok_or(CommandError::IdentityUnresolved)?;
        if self.last_sample()?.is_none() {
            return Err(CommandError::NoMeasurement);
        }
        if !self.push_status_report(&identity)? {
            return Err(CommandError::PushFailed);
        }
        Ok(())
    }

    pub fn start_maintenance(&self) -> std::result::Result<(), CommandError> {
        self.set_maintenance(true)
    }

    pub fn stop_maintenance(&self) -> std::result::Result<(), CommandError> {
        self.set_maintenance(false)
    }

    fn set_maintenance(&self, on: bool) -> std::result::Result<(), CommandError> {
        let target = if on {
            OperatingState::Maintenance
        } else {
            OperatingState::Normal
        };
        let changed = self
            .with_state(|s| {
                let mode = s.mode();
                if mode.is_calibration() || mode == OperatingState::ResetPending {
                    return Err(mode);
                }
                if mode == target {
                    return Ok(false);
                }
                s.transition(target);
                Ok(true)
            })?
            .map_err(CommandError::Blocked)?;
        if !changed {
            return Ok(());
        }
        self.refresh_indicator()?;
        if !self.report_status()? {
            return Err(CommandError::StatusPushFailed);
        }
        Ok(())
    }

    /// Cycle white, red, green, blue for one step each, then restore the
    /// state color. Sampling pauses while the test runs.
    pub fn test_leds(&self) -> std::result::Result<(), CommandError> {
        self.with_state(|s| {
            if s.mode().is_calibration() {
                Err(s.mode())
            } else {
                s.testing_leds = true;
                Ok(())
            }
        })?
        .map_err(CommandError::Blocked)?;

        info!("LED test started");
        let shown = [Color::White, Color::Red, Color::Green, Color::Blue]
            .into_iter()
            .try_for_each(|color| {
                debug!(?color, "LED test step");
                self.show(Signal::solid(color))?;
                self.inner.clock.sleep(self.inner.timing.led_test_step);
                Ok::<(), crate::error::KegError>(())
            });
        self.with_state(|s| s.testing_leds = false)?;
        shown?;
        self.refresh_indicator()?;
        info!("LED test complete");
        Ok(())
    }

    /// Erase the calibration store and request a restart.
    pub fn clear_memory(&self) -> Result<()> {
        {
            // Held across the transition: a calibration commit checks the
            // generation under this lock.
            let mut store = lock(&self.inner.store, "store")?;
            store.clear()?;
            self.with_state(|s| {
                s.transition(OperatingState::CalibrationPending);
                s.request_restart(RestartReason::FactoryReset);
            })?;
        }
        info!("calibration memory cleared");
        self.inner.sensor.set_calibration(Calibration::unity())?;
        self.refresh_indicator()
    }
}
