//! Collaborator traits for the keg monitor.
//!
//! Everything the control logic touches outside its own memory goes through
//! one of these seams: the load cell, the calibration byte store, the status
//! indicator, the function button and the HTTP transport. Errors cross the
//! boundary boxed so adapters can report whatever they have.
pub mod clock;

pub use clock::{Clock, MonotonicClock};

/// Boxed error type used at every trait boundary.
pub type BoxError = Box<dyn std::error::Error + Send + Sync>;

/// Load-cell amplifier (HX711 class device).
pub trait LoadCell {
    /// Wake the ADC. Must be called before reads.
    fn power_up(&mut self) -> Result<(), BoxError>;
    /// Put the ADC to sleep.
    fn power_down(&mut self) -> Result<(), BoxError>;
    /// Average of `samples` consecutive raw conversions.
    fn read_average(&mut self, samples: u32) -> Result<f64, BoxError>;
}

/// Byte-addressed persistent storage (EEPROM-like).
///
/// A single `write` call must be atomic with respect to power loss: after a
/// reboot the range holds either the old or the new bytes, never a mix.
pub trait ByteStore {
    /// Fill `buf` from `addr`. Bytes never written read back as 0xFF.
    fn read(&mut self, addr: usize, buf: &mut [u8]) -> Result<(), BoxError>;
    fn write(&mut self, addr: usize, bytes: &[u8]) -> Result<(), BoxError>;
    /// Erase the whole store.
    fn clear(&mut self) -> Result<(), BoxError>;
}

/// Indicator colors used by the device.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Color {
    Off,
    White,
    Red,
    Green,
    Blue,
    Orange,
}

impl Color {
    /// 0xRRGGBB value for PWM/RGB drivers.
    pub const fn rgb(self) -> u32 {
        match self {
            Color::Off => 0x000000,
            Color::White => 0xFFFFFF,
            Color::Red => 0xFF0000,
            Color::Green => 0x00FF00,
            Color::Blue => 0x0000FF,
            Color::Orange => 0xFF6000,
        }
    }
}

/// Blink pattern applied on top of a color.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Pattern {
    Solid,
    /// 100 ms toggle period.
    BlinkFast,
    /// 400 ms toggle period.
    BlinkSlow,
}

/// What the indicator should currently show.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct Signal {
    pub color: Color,
    pub pattern: Pattern,
}

impl Signal {
    pub const fn solid(color: Color) -> Self {
        Self {
            color,
            pattern: Pattern::Solid,
        }
    }

    pub const fn fast(color: Color) -> Self {
        Self {
            color,
            pattern: Pattern::BlinkFast,
        }
    }

    pub const fn slow(color: Color) -> Self {
        Self {
            color,
            pattern: Pattern::BlinkSlow,
        }
    }
}

/// Status LED. Pulse generation for blink patterns is the adapter's job.
pub trait Indicator {
    fn show(&mut self, signal: Signal);
}

/// Physical function switch.
pub trait Button {
    fn is_pressed(&mut self) -> bool;
}

/// Minimal HTTP response as seen by the sync client.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct HttpResponse {
    pub status: u16,
    pub body: String,
}

impl HttpResponse {
    pub fn is_success(&self) -> bool {
        (200..300).contains(&self.status)
    }
}

/// Blocking HTTP transport. Paths are absolute (`/api/v1/...`); the adapter
/// owns scheme, host, port and authentication headers.
pub trait Transport {
    fn get(&mut self, path: &str) -> Result<HttpResponse, BoxError>;
    /// POST a JSON body.
    fn post(&mut self, path: &str, body: &str) -> Result<HttpResponse, BoxError>;
}
