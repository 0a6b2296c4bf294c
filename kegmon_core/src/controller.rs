//! Tick-driven top-level loop.
//!
//! Each tick: pick up a latched restart, track the function button, do the
//! per-state work, then fire the status interval. The caller sleeps for the
//! returned duration (or `run` does it against the device clock).

use std::sync::atomic::{AtomicBool, Ordering};
use std::time::{Duration, Instant};

use kegmon_traits::{Button, Color, Signal};
use tracing::{error, info, warn};

use crate::device::Device;
use crate::error::Result;
use crate::state::{OperatingState, RestartReason};
use crate::util::{Interval, secs_f32};

/// Tracks one continuous press of the function button.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ButtonPress {
    pub started: Instant,
    /// Held past the reset threshold; release restarts the device.
    pub held: bool,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Tick {
    /// Call `tick` again after this long.
    Continue(Duration),
    Restart(RestartReason),
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RunExit {
    Shutdown,
    Restart(RestartReason),
}

pub struct Controller {
    device: Device,
    button: Box<dyn Button + Send>,
    press: Option<ButtonPress>,
    status: Interval,
}

impl core::fmt::Debug for Controller {
    fn fmt(&self, f: &mut core::fmt::Formatter<'_>) -> core::fmt::Result {
        f.debug_struct("Controller")
            .field("device", &self.device)
            .field("press", &self.press)
            .field("status_period", &self.status.period())
            .finish()
    }
}

impl Controller {
    pub(crate) fn new(device: Device, button: Box<dyn Button + Send>) -> Self {
        let status = Interval::new(device.timing().status_interval);
        Self {
            device,
            button,
            press: None,
            status,
        }
    }

    /// Handle for commands and inspection. Clones share all state.
    pub fn device(&self) -> &Device {
        &self.device
    }

    /// Start (or restart) a session.
    pub fn boot(&mut self) -> Result<OperatingState> {
        self.press = None;
        let mode = self.device.boot()?;
        self.status.reset(self.device.clock().now());
        Ok(mode)
    }

    pub fn tick(&mut self) -> Result<Tick> {
        if let Some(reason) = self.device.take_restart()? {
            return Ok(Tick::Restart(reason));
        }
        let timing = self.device.timing().clone();

        if let Some(tick) = self.poll_button()? {
            return Ok(tick);
        }

        let (mode, testing) = self.device.with_state(|s| (s.mode(), s.testing_leds))?;
        if !testing && mode == OperatingState::Normal {
            self.device.measure_and_report()?;
        }

        if self.status.due(self.device.clock().now()) {
            self.device.periodic_status()?;
        }

        let wait = if mode == OperatingState::Calibrating {
            timing.button_poll
        } else {
            timing.tick
        };
        Ok(Tick::Continue(wait))
    }

    /// Returns `Some` while the button owns the tick.
    fn poll_button(&mut self) -> Result<Option<Tick>> {
        let pressed = self.button.is_pressed();
        let now = self.device.clock().now();
        let timing = self.device.timing();

        match (self.press, pressed) {
            (None, false) => Ok(None),
            (None, true) => {
                info!("function switch pressed");
                self.press = Some(ButtonPress {
                    started: now,
                    held: false,
                });
                self.device.show(Signal::solid(Color::Red))?;
                Ok(Some(Tick::Continue(timing.button_poll)))
            }
            (Some(mut press), true) => {
                if !press.held && now.saturating_duration_since(press.started) >= timing.reset_hold {
                    press.held = true;
                    warn!("function switch held; restart on release");
                    self.device
                        .with_state(|s| s.transition(OperatingState::ResetPending))?;
                    self.device.refresh_indicator()?;
                }
                self.press = Some(press);
                Ok(Some(Tick::Continue(timing.button_poll)))
            }
            (Some(press), false) => {
                self.press = None;
                let held_for = now.saturating_duration_since(press.started);
                info!(held_s = secs_f32(held_for), "function switch released");
                if press.held {
                    info!("restart initiated by function switch");
                    self.device.show(Signal::slow(Color::Red))?;
                    return Ok(Some(Tick::Restart(RestartReason::ButtonHold)));
                }
                self.device.refresh_indicator()?;
                Ok(None)
            }
        }
    }

    /// Tick until `shutdown` is set or a restart is due. A tick error ends
    /// the session with a hardware-fault restart.
    pub fn run(&mut self, shutdown: &AtomicBool) -> RunExit {
        while !shutdown.load(Ordering::Relaxed) {
            match self.tick() {
                Ok(Tick::Continue(wait)) => self.device.clock().sleep(wait),
                Ok(Tick::Restart(reason)) => return RunExit::Restart(reason),
                Err(e) => {
                    error!(error = %e, "tick failed; restarting");
                    return RunExit::Restart(RestartReason::HardwareFault);
                }
            }
        }
        RunExit::Shutdown
    }
}
