use std::time::{Duration, Instant};
use tracing::trace;

use crate::error::{HwError, Result};
use crate::util::{sign_extend_24, wait_until_low_with_timeout};

/// SCK must stay high longer than 60 µs for the HX711 to enter power-down.
const POWER_DOWN_HOLD: Duration = Duration::from_micros(80);

pub struct Hx711 {
    dt: rppal::gpio::InputPin,
    sck: rppal::gpio::OutputPin,
    gain_pulses: u8, // 25, 26, 27 based on gain/channel
    powered: bool,
}

impl Hx711 {
    pub fn new(
        dt_pin: rppal::gpio::InputPin,
        mut sck_pin: rppal::gpio::OutputPin,
        gain_pulses: u8,
    ) -> Result<Self> {
        sck_pin.set_low(); // clock idle low == powered
        Ok(Self {
            dt: dt_pin,
            sck: sck_pin,
            gain_pulses,
            powered: true,
        })
    }

    pub fn power_up(&mut self) {
        self.sck.set_low();
        self.powered = true;
    }

    pub fn power_down(&mut self) {
        self.sck.set_low();
        self.sck.set_high();
        let until = Instant::now() + POWER_DOWN_HOLD;
        while Instant::now() < until {
            std::hint::spin_loop();
        }
        self.powered = false;
    }

    pub fn is_powered(&self) -> bool {
        self.powered
    }

    pub fn read_with_timeout(&mut self, timeout: Duration) -> Result<i32> {
        if !self.powered {
            return Err(HwError::PoweredDown);
        }

        // Wait for data ready (DT goes low)
        let dt = &self.dt;
        wait_until_low_with_timeout(|| dt.is_high(), timeout, Duration::from_micros(200))?;

        let mut frame: u32 = 0;
        for _ in 0..24 {
            frame = (frame << 1) | u32::from(self.pulse());
        }
        // Extra pulses select gain/channel for the next conversion.
        for _ in 0..self.gain_pulses.saturating_sub(24) {
            self.pulse();
        }

        let value = sign_extend_24(frame);
        trace!(raw = value, "hx711 raw read");
        Ok(value)
    }

    /// One SCK pulse; returns DT as sampled while the clock is high.
    fn pulse(&mut self) -> bool {
        self.sck.set_high();
        spin_delay_100ns();
        let bit = self.dt.is_high();
        self.sck.set_low();
        spin_delay_100ns();
        bit
    }
}

#[inline(always)]
fn spin_delay_100ns() {
    std::hint::spin_loop();
}
