//! Exclusive, power-scoped access to the load cell.
//!
//! The load cell and the in-memory calibration live behind one lock. The
//! only way to read is through `PoweredSensor`, which powers the ADC up when
//! acquired and down when dropped, so every exit path (including `?`)
//! leaves the sensor asleep.

use std::sync::{Mutex, MutexGuard};

use kegmon_traits::LoadCell;
use tracing::{error, trace};

use crate::calibration::Calibration;
use crate::error::Result;
use crate::hw_error::map_hw_error;
use crate::util::lock;

pub(crate) struct SensorSlot {
    cell: Box<dyn LoadCell + Send>,
    calibration: Calibration,
}

pub struct SensorPort {
    slot: Mutex<SensorSlot>,
}

impl SensorPort {
    pub fn new(cell: Box<dyn LoadCell + Send>, calibration: Calibration) -> Self {
        Self {
            slot: Mutex::new(SensorSlot { cell, calibration }),
        }
    }

    /// Power the sensor up and hold it until the guard drops.
    ///
    /// Blocks while another operation holds the sensor.
    pub fn acquire(&self) -> Result<PoweredSensor<'_>> {
        let mut slot = lock(&self.slot, "sensor")?;
        if let Err(e) = slot.cell.power_up() {
            let mapped = map_hw_error(e.as_ref());
            if let Err(down) = slot.cell.power_down() {
                error!(error = %down, "power-down after failed power-up");
            }
            return Err(mapped);
        }
        trace!("load cell powered up");
        Ok(PoweredSensor { slot })
    }

    pub fn calibration(&self) -> Result<Calibration> {
        Ok(lock(&self.slot, "sensor")?.calibration)
    }

    pub fn set_calibration(&self, calibration: Calibration) -> Result<()> {
        lock(&self.slot, "sensor")?.calibration = calibration;
        Ok(())
    }

    /// Put the ADC to sleep without reading. Used once at boot.
    pub fn power_down(&self) -> Result<()> {
        lock(&self.slot, "sensor")?
            .cell
            .power_down()
            .map_err(|e| map_hw_error(e.as_ref()))
    }
}

/// A powered, exclusively held sensor.
pub struct PoweredSensor<'a> {
    slot: MutexGuard<'a, SensorSlot>,
}

impl PoweredSensor<'_> {
    /// Averaged raw conversion over `samples` reads.
    pub fn read_raw(&mut self, samples: u32) -> Result<f64> {
        let raw = self
            .slot
            .cell
            .read_average(samples)
            .map_err(|e| map_hw_error(e.as_ref()))?;
        trace!(raw, samples, "raw average");
        Ok(raw)
    }

    /// Averaged reading converted with the current calibration.
    pub fn read_units(&mut self, samples: u32) -> Result<f32> {
        let raw = self.read_raw(samples)?;
        Ok(self.slot.calibration.to_units(raw))
    }

    pub fn calibration(&self) -> Calibration {
        self.slot.calibration
    }

    pub fn set_calibration(&mut self, calibration: Calibration) {
        self.slot.calibration = calibration;
    }
}

impl Drop for PoweredSensor<'_> {
    fn drop(&mut self) {
        match self.slot.cell.power_down() {
            Ok(()) => trace!("load cell powered down"),
            Err(e) => error!(error = %e, "load cell power-down failed"),
        }
    }
}
