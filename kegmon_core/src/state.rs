//! Operating state of the device and the single structure that owns every
//! piece of mutable runtime state.

use std::fmt;
use tracing::info;

use crate::measurement::{Level, MeasurementSample};
use crate::sync::DeviceIdentity;

/// State codes reported to the backend and returned by `getState`.
pub const CODE_NORMAL_REACHABLE: i32 = 1;
pub const CODE_NORMAL_UNREACHABLE: i32 = 2;
pub const CODE_CALIBRATION_PENDING: i32 = 10;
pub const CODE_CALIBRATING: i32 = 11;
pub const CODE_MAINTENANCE: i32 = 99;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum OperatingState {
    Normal,
    CalibrationPending,
    Calibrating,
    Maintenance,
    /// Button held past the reset threshold; the restart fires on release.
    ResetPending,
}

impl OperatingState {
    /// Calibration states block maintenance and the LED self-test.
    pub fn is_calibration(self) -> bool {
        matches!(
            self,
            OperatingState::CalibrationPending | OperatingState::Calibrating
        )
    }
}

impl fmt::Display for OperatingState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let s = match self {
            OperatingState::Normal => "NORMAL",
            OperatingState::CalibrationPending => "CALIBRATION_PENDING",
            OperatingState::Calibrating => "CALIBRATING",
            OperatingState::Maintenance => "MAINTENANCE",
            OperatingState::ResetPending => "RESET_PENDING",
        };
        f.write_str(s)
    }
}

/// Why the controller asks its host to restart the device.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RestartReason {
    /// Function button held past the reset threshold and released.
    ButtonHold,
    /// `clearMemory` erased the calibration store.
    FactoryReset,
    /// The sensor or store failed; the session cannot continue.
    HardwareFault,
}

/// All mutable runtime state, owned by the device and guarded by one lock.
///
/// Every mode change bumps `generation`. Long-running operations snapshot
/// the generation before they start and compare afterwards: a different
/// value means something else changed the state in the meantime and the
/// operation's result is stale.
#[derive(Debug)]
pub struct DeviceState {
    mode: OperatingState,
    /// Mode to report while `ResetPending`.
    resume: OperatingState,
    generation: u64,
    pub last_sample: Option<MeasurementSample>,
    pub level: Level,
    pub identity: DeviceIdentity,
    /// Outcome of the most recent network operation.
    pub reachable: bool,
    pub testing_leds: bool,
    pub restart: Option<RestartReason>,
}

impl DeviceState {
    pub fn new(mode: OperatingState, reachable: bool) -> Self {
        Self {
            mode,
            resume: mode,
            generation: 0,
            last_sample: None,
            level: Level::Normal,
            identity: DeviceIdentity::unresolved(),
            reachable,
            testing_leds: false,
            restart: None,
        }
    }

    pub fn mode(&self) -> OperatingState {
        self.mode
    }

    pub fn generation(&self) -> u64 {
        self.generation
    }

    /// Move to `to`, returning the new generation. Re-entering the current
    /// mode is a no-op and does not invalidate in-flight work.
    pub fn transition(&mut self, to: OperatingState) -> u64 {
        if to == self.mode {
            return self.generation;
        }
        info!(from = %self.mode, to = %to, "state transition");
        if to == OperatingState::ResetPending {
            self.resume = self.mode;
        }
        self.mode = to;
        self.generation = self.generation.wrapping_add(1);
        self.generation
    }

    /// Forget everything learned in the previous session and enter `mode`.
    /// The generation keeps counting so work from before the restart is
    /// recognized as stale.
    pub fn begin_session(&mut self, mode: OperatingState) {
        self.last_sample = None;
        self.level = Level::Normal;
        self.identity = DeviceIdentity::unresolved();
        self.testing_leds = false;
        self.restart = None;
        self.resume = mode;
        self.mode = mode;
        self.generation = self.generation.wrapping_add(1);
        info!(state = %mode, "session started");
    }

    /// True while the state is still the one observed at `generation`.
    pub fn unchanged_since(&self, generation: u64) -> bool {
        self.generation == generation
    }

    /// Record a restart request; the first reason wins.
    pub fn request_restart(&mut self, reason: RestartReason) {
        if self.restart.is_none() {
            info!(?reason, "restart requested");
            self.restart = Some(reason);
        }
    }

    /// External state code. `ResetPending` is transient and reports the
    /// mode it interrupted.
    pub fn state_code(&self) -> i32 {
        let mode = match self.mode {
            OperatingState::ResetPending => self.resume,
            m => m,
        };
        match mode {
            OperatingState::CalibrationPending => CODE_CALIBRATION_PENDING,
            OperatingState::Calibrating => CODE_CALIBRATING,
            OperatingState::Maintenance => CODE_MAINTENANCE,
            OperatingState::Normal | OperatingState::ResetPending => {
                if self.reachable {
                    CODE_NORMAL_REACHABLE
                } else {
                    CODE_NORMAL_UNREACHABLE
                }
            }
        }
    }
}
