//! Tare and reference-weight calibration.
//!
//! Readings convert as `units = (raw - offset) / scale`. The `{scale,
//! offset}` pair is persisted as one 8-byte record so a power cut leaves
//! either the old pair or the new one.

use kegmon_traits::ByteStore;
use tracing::{debug, info, trace, warn};

use crate::device::Device;
use crate::error::{CommandError, KegError, Result};
use crate::hw_error::map_store_error;
use crate::sensor::PoweredSensor;
use crate::state::OperatingState;
use crate::util::lock;

/// In-memory conversion parameters.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct Calibration {
    /// Raw counts per weight unit.
    pub scale: f32,
    /// Raw reading at zero load.
    pub offset: i32,
}

impl Calibration {
    pub const fn unity() -> Self {
        Self {
            scale: 1.0,
            offset: 0,
        }
    }

    /// Same offset, unity scale: readings come back in raw counts above tare.
    pub const fn with_unity_scale(self) -> Self {
        Self {
            scale: 1.0,
            offset: self.offset,
        }
    }

    pub fn to_units(&self, raw: f64) -> f32 {
        ((raw - f64::from(self.offset)) / f64::from(self.scale)) as f32
    }
}

impl Default for Calibration {
    fn default() -> Self {
        Self::unity()
    }
}

pub const RECORD_ADDR: usize = 0;
pub const RECORD_LEN: usize = 8;

/// Persisted calibration record: f32 scale at +0, i32 offset at +4, both
/// little-endian. Erased storage decodes to a NaN scale, i.e. unset.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct CalibrationData {
    pub scale: f32,
    pub offset: i32,
}

impl CalibrationData {
    pub fn is_set(&self) -> bool {
        self.scale.is_finite() && self.scale != 0.0
    }

    pub fn to_bytes(&self) -> [u8; RECORD_LEN] {
        let mut out = [0u8; RECORD_LEN];
        out[..4].copy_from_slice(&self.scale.to_le_bytes());
        out[4..].copy_from_slice(&self.offset.to_le_bytes());
        out
    }

    pub fn from_bytes(b: [u8; RECORD_LEN]) -> Self {
        Self {
            scale: f32::from_le_bytes([b[0], b[1], b[2], b[3]]),
            offset: i32::from_le_bytes([b[4], b[5], b[6], b[7]]),
        }
    }

    /// The usable pair, if one was ever committed.
    pub fn calibration(&self) -> Option<Calibration> {
        self.is_set().then_some(Calibration {
            scale: self.scale,
            offset: self.offset,
        })
    }
}

impl From<Calibration> for CalibrationData {
    fn from(c: Calibration) -> Self {
        Self {
            scale: c.scale,
            offset: c.offset,
        }
    }
}

/// Single-writer access to the calibration record.
pub struct CalibrationStore {
    bytes: Box<dyn ByteStore + Send>,
}

impl CalibrationStore {
    pub fn new(bytes: Box<dyn ByteStore + Send>) -> Self {
        Self { bytes }
    }

    pub fn load(&mut self) -> Result<CalibrationData> {
        let mut buf = [0u8; RECORD_LEN];
        self.bytes
            .read(RECORD_ADDR, &mut buf)
            .map_err(|e| map_store_error(e.as_ref()))?;
        Ok(CalibrationData::from_bytes(buf))
    }

    /// Write the whole record in one call.
    pub fn save(&mut self, data: &CalibrationData) -> Result<()> {
        self.bytes
            .write(RECORD_ADDR, &data.to_bytes())
            .map_err(|e| map_store_error(e.as_ref()))?;
        debug!(scale = data.scale, offset = data.offset, "calibration record written");
        Ok(())
    }

    pub fn clear(&mut self) -> Result<()> {
        self.bytes
            .clear()
            .map_err(|e| map_store_error(e.as_ref()))
    }
}

/// Parse a reference weight argument.
///
/// Only the leading decimal number counts, so `"4535.92g"` reads as
/// 4535.92. Anything without a positive finite prefix is rejected, except
/// the literal `"0"`, which is passed through and later fails verification.
pub fn parse_reference_weight(input: &str) -> std::result::Result<f32, CommandError> {
    let trimmed = input.trim();
    let weight = numeric_prefix(trimmed).parse::<f32>().unwrap_or(0.0);
    if weight == 0.0 && trimmed != "0" {
        return Err(CommandError::InvalidInput(input.to_string()));
    }
    if !weight.is_finite() || weight < 0.0 {
        return Err(CommandError::InvalidInput(input.to_string()));
    }
    Ok(weight)
}

/// Longest `[+-]digits[.digits][e[+-]digits]` prefix of `s`.
fn numeric_prefix(s: &str) -> &str {
    let bytes = s.as_bytes();
    let digits = |mut i: usize| {
        while bytes.get(i).is_some_and(u8::is_ascii_digit) {
            i += 1;
        }
        i
    };
    let mut end = usize::from(matches!(bytes.first(), Some(b'+' | b'-')));
    end = digits(end);
    if bytes.get(end) == Some(&b'.') {
        end = digits(end + 1);
    }
    if matches!(bytes.get(end), Some(b'e' | b'E')) {
        let mut exp = end + 1;
        if matches!(bytes.get(exp), Some(b'+' | b'-')) {
            exp += 1;
        }
        let exp_end = digits(exp);
        if exp_end > exp {
            end = exp_end;
        }
    }
    &s[..end]
}

/// Round an averaged raw reading to a tare offset.
fn offset_from_raw(raw: f64) -> Result<i32> {
    if !raw.is_finite() {
        return Err(KegError::Hardware(format!("non-finite raw reading {raw}")));
    }
    Ok(raw.round().clamp(f64::from(i32::MIN), f64::from(i32::MAX)) as i32)
}

impl Device {
    /// Zero the baseline at the current load and persist the new offset
    /// next to the stored scale.
    pub fn tare(&self) -> Result<()> {
        let mut sensor = self.inner.sensor.acquire()?;
        self.tare_with(&mut sensor)
    }

    fn tare_with(&self, sensor: &mut PoweredSensor<'_>) -> Result<()> {
        let raw = sensor.read_raw(self.inner.measurement.samples)?;
        let offset = offset_from_raw(raw)?;
        let mut cal = sensor.calibration();
        cal.offset = offset;
        sensor.set_calibration(cal);

        let mut store = lock(&self.inner.store, "store")?;
        let persisted = store.load()?;
        store.save(&CalibrationData {
            scale: persisted.scale,
            offset,
        })?;
        info!(offset, "tared");
        Ok(())
    }

    /// Enter CALIBRATION_PENDING with unity scale and a fresh tare. A
    /// running calibration is left alone.
    pub fn start_calibration_mode(&self) -> Result<()> {
        let entered = self.with_state(|s| {
            if s.mode() == OperatingState::Calibrating {
                false
            } else {
                s.transition(OperatingState::CalibrationPending);
                true
            }
        })?;
        if !entered {
            debug!("calibration already running; start ignored");
            return Ok(());
        }
        self.refresh_indicator()?;

        let mut sensor = self.inner.sensor.acquire()?;
        let unity = sensor.calibration().with_unity_scale();
        sensor.set_calibration(unity);
        self.tare_with(&mut sensor)
    }

    /// Derive, verify and commit a scale factor from a known load.
    pub fn calibrate(&self, input: &str) -> std::result::Result<(), CommandError> {
        let known = parse_reference_weight(input)?;
        let cfg = &self.inner.calibration;
        if known < cfg.min_reference_g && !cfg.allow_low_weight {
            return Err(CommandError::WeightTooLow {
                weight: known,
                minimum: cfg.min_reference_g,
            });
        }

        let generation = self
            .with_state(|s| {
                (s.mode() != OperatingState::Calibrating)
                    .then(|| s.transition(OperatingState::Calibrating))
            })?
            .ok_or(CommandError::AlreadyCalibrating)?;
        self.refresh_indicator()?;
        info!(known, "calibration started");
        if !self.report_status()? {
            warn!("status push at calibration start failed");
        }

        if let Err(e) = self.measure_scale(known, generation) {
            warn!(error = %e, "calibration failed");
            self.with_state(|s| {
                if s.unchanged_since(generation) {
                    s.transition(OperatingState::CalibrationPending);
                }
            })?;
            self.refresh_indicator()?;
            return Err(e);
        }

        self.with_state(|s| {
            if s.unchanged_since(generation) {
                s.transition(OperatingState::Normal);
            }
        })?;
        self.refresh_indicator()?;
        if !self.report_status()? {
            return Err(CommandError::StatusPushFailed);
        }
        Ok(())
    }

    /// Sample, verify and persist. On any failure the in-memory scale goes
    /// back to the last stored one (unity if none) and the record is untouched.
    fn measure_scale(
        &self,
        known: f32,
        generation: u64,
    ) -> std::result::Result<(), CommandError> {
        let mut sensor = self.inner.sensor.acquire()?;
        let unity = sensor.calibration().with_unity_scale();
        sensor.set_calibration(unity);

        let result = self
            .verify_candidate(&mut sensor, known)
            .and_then(|cal| self.commit_scale(cal, generation));
        if result.is_err() {
            sensor.set_calibration(self.stored_or(unity));
        }
        result
    }

    /// Persist `cal` unless the state moved on. The generation is checked
    /// under the store lock so a concurrent clear cannot be overwritten.
    fn commit_scale(
        &self,
        cal: Calibration,
        generation: u64,
    ) -> std::result::Result<(), CommandError> {
        let mut store = lock(&self.inner.store, "store")?;
        let current = self.with_state(|s| (s.unchanged_since(generation), s.mode()))?;
        if let (false, mode) = current {
            return Err(CommandError::Interrupted(mode));
        }
        store.save(&cal.into())?;
        info!(scale = cal.scale, offset = cal.offset, "calibration committed");
        Ok(())
    }

    /// The stored scale on top of the current offset, or `fallback`.
    fn stored_or(&self, fallback: Calibration) -> Calibration {
        let persisted = lock(&self.inner.store, "store").and_then(|mut store| store.load());
        match persisted {
            Ok(data) => data.calibration().map_or(fallback, |stored| Calibration {
                scale: stored.scale,
                ..fallback
            }),
            Err(e) => {
                warn!(error = %e, "stored calibration unreadable; keeping unity scale");
                fallback
            }
        }
    }

    fn verify_candidate(
        &self,
        sensor: &mut PoweredSensor<'_>,
        known: f32,
    ) -> std::result::Result<Calibration, CommandError> {
        let cfg = &self.inner.calibration;
        let mut total = 0.0f64;
        for group in 0..cfg.groups {
            if group > 0 {
                self.inner.clock.sleep(cfg.group_delay);
            }
            let units = sensor.read_units(cfg.samples_per_group)?;
            trace!(group = group + 1, groups = cfg.groups, units, "calibration sample group");
            total += f64::from(units);
        }
        let average = (total / f64::from(cfg.groups.max(1))) as f32;
        let tolerance = (known * self.inner.measurement.relative_threshold).abs();
        let candidate = average / known;
        if !candidate.is_finite() || candidate == 0.0 {
            return Err(CommandError::VerificationFailed {
                reading: average,
                expected: known,
                tolerance,
            });
        }

        let cal = Calibration {
            scale: candidate,
            offset: sensor.calibration().offset,
        };
        sensor.set_calibration(cal);
        let check = sensor.read_units(self.inner.measurement.samples)?;
        debug!(candidate, check, known, tolerance, "verification reading");
        if (check - known).abs() > tolerance {
            return Err(CommandError::VerificationFailed {
                reading: check,
                expected: known,
                tolerance,
            });
        }
        Ok(cal)
    }

    /// Restore the stored pair and leave CALIBRATION_PENDING. Outside
    /// calibration states this does nothing.
    pub fn cancel_calibration_mode(&self) -> std::result::Result<(), CommandError> {
        let (mode, generation) = self.with_state(|s| (s.mode(), s.generation()))?;
        match mode {
            OperatingState::Calibrating => return Err(CommandError::Calibrating),
            OperatingState::CalibrationPending => {}
            other => {
                debug!(state = %other, "not in calibration mode; cancel ignored");
                return Ok(());
            }
        }

        let persisted = lock(&self.inner.store, "store")?.load()?;
        let Some(cal) = persisted.calibration() else {
            return Err(CommandError::NoPriorCalibration);
        };

        let restored = self.with_state(|s| {
            if s.unchanged_since(generation) {
                s.transition(OperatingState::Normal);
                Ok(())
            } else {
                Err(s.mode())
            }
        })?;
        if let Err(mode) = restored {
            return Err(CommandError::Interrupted(mode));
        }
        self.inner.sensor.set_calibration(cal)?;
        self.refresh_indicator()?;
        info!(scale = cal.scale, offset = cal.offset, "calibration restored");
        Ok(())
    }
}
