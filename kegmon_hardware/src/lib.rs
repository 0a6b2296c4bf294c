//! Adapters behind the `kegmon_traits` seams.
//!
//! Simulated devices and the file-backed calibration store are always
//! available; the Raspberry Pi HX711, GPIO button and RGB LED live behind the
//! `hardware` feature.
pub mod error;
#[cfg(feature = "hardware")]
pub mod hx711;
pub mod util;

use kegmon_traits::{BoxError, Button, ByteStore, Indicator, LoadCell, Signal};
use std::fs;
use std::io::Write;
use std::path::{Path, PathBuf};
use std::sync::Arc;
use std::sync::atomic::{AtomicBool, AtomicU64, Ordering};

use crate::error::HwError;

/// Raw counts per gram of the simulated bridge; matches a typical 50 kg cell at gain 128.
pub const SIM_COUNTS_PER_GRAM: f64 = 21.5;
/// Raw reading of the empty simulated platform.
pub const SIM_ZERO_COUNTS: f64 = 84_213.0;

/// Handle to steer a [`SimulatedLoadCell`] from outside (CLI, tests).
#[derive(Debug, Clone)]
pub struct SimulatedWeight {
    grams_bits: Arc<AtomicU64>,
}

impl SimulatedWeight {
    pub fn set_grams(&self, grams: f64) {
        self.grams_bits.store(grams.to_bits(), Ordering::Relaxed);
    }

    pub fn grams(&self) -> f64 {
        f64::from_bits(self.grams_bits.load(Ordering::Relaxed))
    }
}

/// Simulated load cell: raw = zero + grams * counts_per_gram.
///
/// Reads while powered down fail the same way the HX711 adapter does, so a
/// missing power-up shows up in simulation.
#[derive(Debug)]
pub struct SimulatedLoadCell {
    weight: SimulatedWeight,
    powered: bool,
}

impl SimulatedLoadCell {
    pub fn new() -> (Self, SimulatedWeight) {
        let weight = SimulatedWeight {
            grams_bits: Arc::new(AtomicU64::new(0f64.to_bits())),
        };
        (
            Self {
                weight: weight.clone(),
                powered: false,
            },
            weight,
        )
    }
}

impl LoadCell for SimulatedLoadCell {
    fn power_up(&mut self) -> Result<(), BoxError> {
        self.powered = true;
        Ok(())
    }

    fn power_down(&mut self) -> Result<(), BoxError> {
        self.powered = false;
        Ok(())
    }

    fn read_average(&mut self, samples: u32) -> Result<f64, BoxError> {
        if !self.powered {
            return Err(Box::new(HwError::PoweredDown));
        }
        let raw = SIM_ZERO_COUNTS + self.weight.grams() * SIM_COUNTS_PER_GRAM;
        tracing::trace!(raw, samples, "simulated load cell read");
        Ok(raw)
    }
}

/// Simulated function switch; press/release through the returned handle.
#[derive(Debug, Clone, Default)]
pub struct SimulatedButton {
    pressed: Arc<AtomicBool>,
}

impl SimulatedButton {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn set_pressed(&self, pressed: bool) {
        self.pressed.store(pressed, Ordering::Relaxed);
    }
}

impl Button for SimulatedButton {
    fn is_pressed(&mut self) -> bool {
        self.pressed.load(Ordering::Relaxed)
    }
}

/// Indicator that reports changes through `tracing`.
#[derive(Debug, Default)]
pub struct LogIndicator {
    current: Option<Signal>,
}

impl LogIndicator {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn current(&self) -> Option<Signal> {
        self.current
    }
}

impl Indicator for LogIndicator {
    fn show(&mut self, signal: Signal) {
        if self.current != Some(signal) {
            tracing::info!(color = ?signal.color, pattern = ?signal.pattern, "indicator");
            self.current = Some(signal);
        }
    }
}

/// EEPROM-like store kept in a single file of fixed capacity.
///
/// Every write rewrites the whole image through a temp file, fsync and
/// rename, so a power cut leaves either the previous or the new image.
#[derive(Debug, Clone)]
pub struct FileStore {
    path: PathBuf,
    capacity: usize,
}

impl FileStore {
    pub const DEFAULT_CAPACITY: usize = 64;

    pub fn new(path: impl Into<PathBuf>) -> Self {
        Self::with_capacity(path, Self::DEFAULT_CAPACITY)
    }

    pub fn with_capacity(path: impl Into<PathBuf>, capacity: usize) -> Self {
        Self {
            path: path.into(),
            capacity,
        }
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    fn image(&self) -> Result<Vec<u8>, HwError> {
        let mut img = match fs::read(&self.path) {
            Ok(bytes) => bytes,
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => Vec::new(),
            Err(e) => return Err(e.into()),
        };
        img.resize(self.capacity, 0xFF);
        Ok(img)
    }

    fn check(&self, addr: usize, len: usize) -> Result<(), HwError> {
        if addr.checked_add(len).is_none_or(|end| end > self.capacity) {
            return Err(HwError::OutOfBounds {
                addr,
                len,
                capacity: self.capacity,
            });
        }
        Ok(())
    }
}

impl ByteStore for FileStore {
    fn read(&mut self, addr: usize, buf: &mut [u8]) -> Result<(), BoxError> {
        self.check(addr, buf.len())?;
        let img = self.image()?;
        buf.copy_from_slice(&img[addr..addr + buf.len()]);
        Ok(())
    }

    fn write(&mut self, addr: usize, bytes: &[u8]) -> Result<(), BoxError> {
        self.check(addr, bytes.len())?;
        let mut img = self.image()?;
        img[addr..addr + bytes.len()].copy_from_slice(bytes);
        write_atomic(&self.path, &img)?;
        Ok(())
    }

    fn clear(&mut self) -> Result<(), BoxError> {
        write_atomic(&self.path, &vec![0xFF; self.capacity])?;
        Ok(())
    }
}

/// Replace `path` with `bytes` via a synced sibling temp file and rename.
pub fn write_atomic(path: &Path, bytes: &[u8]) -> std::io::Result<()> {
    if let Some(dir) = path.parent()
        && !dir.as_os_str().is_empty()
    {
        fs::create_dir_all(dir)?;
    }
    let tmp = path.with_extension("new");
    {
        let mut f = fs::File::create(&tmp)?;
        f.write_all(bytes)?;
        f.sync_all()?;
    }
    fs::rename(tmp, path)
}

#[cfg(feature = "hardware")]
pub mod hardware {
    //! Raspberry Pi adapters (rppal).
    use super::*;
    use crate::hx711::Hx711;
    use crossbeam_channel as xch;
    use kegmon_traits::{Color, Pattern};
    use rppal::gpio::{Gpio, InputPin, OutputPin};
    use std::time::Duration;

    fn gpio_err(e: rppal::gpio::Error) -> HwError {
        HwError::Gpio(e.to_string())
    }

    /// HX711 on two GPIO lines.
    pub struct Hx711LoadCell {
        hx711: Hx711,
        timeout: Duration,
    }

    impl Hx711LoadCell {
        pub fn try_new(dt_pin: u8, sck_pin: u8, gain_pulses: u8, timeout_ms: u64) -> Result<Self, HwError> {
            let gpio = Gpio::new().map_err(gpio_err)?;
            let dt = gpio.get(dt_pin).map_err(gpio_err)?.into_input();
            let sck = gpio.get(sck_pin).map_err(gpio_err)?.into_output();
            let mut hx711 = Hx711::new(dt, sck, gain_pulses)?;
            hx711.power_down();
            Ok(Self {
                hx711,
                timeout: Duration::from_millis(timeout_ms),
            })
        }
    }

    impl LoadCell for Hx711LoadCell {
        fn power_up(&mut self) -> Result<(), BoxError> {
            self.hx711.power_up();
            Ok(())
        }

        fn power_down(&mut self) -> Result<(), BoxError> {
            self.hx711.power_down();
            Ok(())
        }

        fn read_average(&mut self, samples: u32) -> Result<f64, BoxError> {
            let mut attempts = 0;
            let max_attempts = 3;
            let timeout = self.timeout;
            let hx = &mut self.hx711;
            let avg = crate::util::average_of(samples, || loop {
                match hx.read_with_timeout(timeout) {
                    Ok(raw) => return Ok(raw),
                    Err(HwError::DataReadyTimeout) if attempts < max_attempts => {
                        attempts += 1;
                        tracing::warn!(retries = attempts, "load cell timeout, retrying");
                    }
                    Err(e) => {
                        tracing::error!("load cell read error: {}", e);
                        return Err(e);
                    }
                }
            })?;
            tracing::debug!(avg, samples, "hx711 average");
            Ok(avg)
        }
    }

    /// Active-high push button with pull-down.
    pub struct GpioButton {
        pin: InputPin,
    }

    impl GpioButton {
        pub fn try_new(pin: u8) -> Result<Self, HwError> {
            let gpio = Gpio::new().map_err(gpio_err)?;
            let pin = gpio.get(pin).map_err(gpio_err)?.into_input_pulldown();
            Ok(Self { pin })
        }
    }

    impl Button for GpioButton {
        fn is_pressed(&mut self) -> bool {
            self.pin.is_high()
        }
    }

    struct RgbPins {
        red: OutputPin,
        green: OutputPin,
        blue: OutputPin,
    }

    impl RgbPins {
        fn apply(&mut self, rgb: u32) {
            let channel = |pin: &mut OutputPin, v: u32| match v {
                0 => {
                    let _ = pin.clear_pwm();
                    pin.set_low();
                }
                255 => {
                    let _ = pin.clear_pwm();
                    pin.set_high();
                }
                v => {
                    let _ = pin.set_pwm_frequency(200.0, f64::from(v) / 255.0);
                }
            };
            channel(&mut self.red, (rgb >> 16) & 0xFF);
            channel(&mut self.green, (rgb >> 8) & 0xFF);
            channel(&mut self.blue, rgb & 0xFF);
        }
    }

    /// Common-cathode RGB LED driven by a worker thread that owns the pins
    /// and generates blink pulses.
    pub struct RgbLed {
        tx: xch::Sender<Signal>,
    }

    impl RgbLed {
        pub fn try_new(red: u8, green: u8, blue: u8) -> Result<Self, HwError> {
            let gpio = Gpio::new().map_err(gpio_err)?;
            let mut pins = RgbPins {
                red: gpio.get(red).map_err(gpio_err)?.into_output(),
                green: gpio.get(green).map_err(gpio_err)?.into_output(),
                blue: gpio.get(blue).map_err(gpio_err)?.into_output(),
            };
            let (tx, rx) = xch::unbounded::<Signal>();
            std::thread::spawn(move || {
                let mut current = Signal::solid(Color::Off);
                let mut lit = true;
                pins.apply(Color::Off.rgb());
                loop {
                    let wait = match current.pattern {
                        Pattern::Solid => None,
                        Pattern::BlinkFast => Some(Duration::from_millis(100)),
                        Pattern::BlinkSlow => Some(Duration::from_millis(400)),
                    };
                    let next = match wait {
                        None => rx.recv().map_err(|_| ()),
                        Some(d) => match rx.recv_timeout(d) {
                            Ok(s) => Ok(s),
                            Err(xch::RecvTimeoutError::Timeout) => {
                                lit = !lit;
                                pins.apply(if lit { current.color.rgb() } else { 0 });
                                continue;
                            }
                            Err(xch::RecvTimeoutError::Disconnected) => Err(()),
                        },
                    };
                    match next {
                        Ok(signal) => {
                            current = signal;
                            lit = true;
                            pins.apply(signal.color.rgb());
                        }
                        Err(()) => break,
                    }
                }
                pins.apply(0);
            });
            Ok(Self { tx })
        }
    }

    impl Indicator for RgbLed {
        fn show(&mut self, signal: Signal) {
            let _ = self.tx.send(signal);
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn simulated_cell_requires_power() {
        let (mut cell, weight) = SimulatedLoadCell::new();
        assert!(cell.read_average(10).is_err());
        cell.power_up().unwrap();
        weight.set_grams(100.0);
        let raw = cell.read_average(10).unwrap();
        assert_eq!(raw, SIM_ZERO_COUNTS + 100.0 * SIM_COUNTS_PER_GRAM);
        cell.power_down().unwrap();
        assert!(cell.read_average(1).is_err());
    }

    #[test]
    fn log_indicator_tracks_latest_signal() {
        let mut led = LogIndicator::new();
        led.show(Signal::slow(kegmon_traits::Color::Blue));
        assert_eq!(led.current(), Some(Signal::slow(kegmon_traits::Color::Blue)));
    }

    #[test]
    fn simulated_button_follows_handle() {
        let btn = SimulatedButton::new();
        let mut polled = btn.clone();
        assert!(!polled.is_pressed());
        btn.set_pressed(true);
        assert!(polled.is_pressed());
    }
}
