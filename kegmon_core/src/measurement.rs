//! Periodic sampling and relative-threshold change detection.

use tracing::{debug, info, trace, warn};

use crate::device::Device;
use crate::error::Result;
use crate::state::OperatingState;
use crate::util::lock;

/// Last accepted reading.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct MeasurementSample {
    pub value: f32,
    /// Unix seconds.
    pub timestamp: i64,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Level {
    Normal,
    /// Below the empty-keg threshold: empty or removed.
    Empty,
}

/// `|new - last| > last * threshold`. The bound is exclusive, so a change
/// of exactly `threshold` is not significant. A negative baseline makes
/// every reading significant.
pub fn is_significant(new: f32, last: f32, threshold: f32) -> bool {
    (new - last).abs() > last * threshold
}

pub fn classify_level(value: f32, empty_threshold: f32) -> Level {
    if value < empty_threshold {
        Level::Empty
    } else {
        Level::Normal
    }
}

/// What a fresh reading means for the retained state.
#[derive(Debug, Clone, Copy, PartialEq)]
enum Acceptance {
    /// State changed while sampling; the reading is discarded.
    Stale,
    Accepted {
        level_changed: bool,
        push: Option<MeasurementSample>,
    },
}

impl Device {
    /// One averaged, calibrated reading. The sensor is powered only for the
    /// duration of the read.
    pub fn sample(&self) -> Result<f32> {
        let mut sensor = self.inner.sensor.acquire()?;
        let value = sensor.read_units(self.inner.measurement.samples)?;
        trace!(value, "sample taken");
        Ok(value)
    }

    /// Sample, classify, and push the reading if it moved significantly.
    ///
    /// The retained sample is replaced before the push is attempted, so a
    /// failed push is not retried with the same value on the next tick.
    /// Repeated readings while the keg stays empty are kept locally but not
    /// pushed.
    pub fn measure_and_report(&self) -> Result<()> {
        let generation = self.with_state(|s| s.generation())?;
        let value = self.sample()?;
        let timestamp = self.inner.clock.unix_secs();
        let cfg = &self.inner.measurement;

        let acceptance = self.with_state(|s| {
            if !s.unchanged_since(generation) || s.mode() != OperatingState::Normal {
                return Acceptance::Stale;
            }
            let threshold = s
                .identity
                .empty_keg_weight_grams
                .unwrap_or(cfg.empty_threshold_g);
            let level = classify_level(value, threshold);
            let previous_level = std::mem::replace(&mut s.level, level);
            let level_changed = previous_level != level;

            let significant = match s.last_sample {
                None => true,
                Some(last) => is_significant(value, last.value, cfg.relative_threshold),
            };
            if !significant {
                return Acceptance::Accepted {
                    level_changed,
                    push: None,
                };
            }
            let had_prior = s.last_sample.is_some();
            let sample = MeasurementSample { value, timestamp };
            s.last_sample = Some(sample);
            let still_empty = had_prior && previous_level == Level::Empty && level == Level::Empty;
            Acceptance::Accepted {
                level_changed,
                push: (!still_empty).then_some(sample),
            }
        })?;

        let Acceptance::Accepted {
            level_changed,
            push,
        } = acceptance
        else {
            debug!(value, "state changed while sampling; reading discarded");
            return Ok(());
        };
        if level_changed {
            info!(value, "keg level changed");
            self.refresh_indicator()?;
        }
        if let Some(sample) = push {
            self.push_sample(sample)?;
        }
        Ok(())
    }

    fn push_sample(&self, sample: MeasurementSample) -> Result<bool> {
        let Some(identity) = self.ensure_identity()? else {
            debug!(value = sample.value, "identity unresolved; measurement kept locally");
            return Ok(false);
        };
        let (ok, reachable) = {
            let mut sync = lock(&self.inner.sync, "sync")?;
            let ok = sync.push_measurement(&identity.id, sample.value, sample.timestamp);
            (ok, sync.reachable())
        };
        self.with_state(|s| s.reachable = reachable)?;
        if ok {
            debug!(value = sample.value, ts = sample.timestamp, "measurement pushed");
        } else {
            warn!(value = sample.value, "measurement push failed; dropped");
        }
        Ok(ok)
    }
}
