#![cfg_attr(all(not(debug_assertions), not(test)), deny(warnings))]
#![cfg_attr(
    all(not(debug_assertions), not(test)),
    deny(clippy::all, clippy::pedantic, clippy::nursery)
)]
#![allow(clippy::module_name_repetitions, clippy::missing_errors_doc)]
#![cfg_attr(not(test), deny(clippy::unwrap_used, clippy::expect_used))]
//! Keg monitor control logic (hardware-agnostic).
//!
//! All hardware and network access goes through the `kegmon_traits`
//! collaborators: `LoadCell`, `ByteStore`, `Indicator`, `Button` and
//! `Transport`.
//!
//! ## Architecture
//!
//! - **Calibration**: tare, reference-weight calibration and the persisted
//!   `{scale, offset}` record (`calibration` module)
//! - **Measurement**: sampling and relative-threshold change detection
//! - **Sync**: ping/find/register and measurement/status pushes with a
//!   bounded retry budget (`sync` module)
//! - **Device**: the shared handle owning all runtime state; commands from
//!   any thread act on it between and during ticks
//! - **Controller**: tick loop, button reset gesture, periodic status
//!
//! ## Concurrency
//!
//! The sensor is reachable only through a power guard that sleeps the ADC
//! on drop. Every mode change bumps a generation counter; work that spans a
//! long sensor read re-checks it and discards stale results.

pub mod builder;
pub mod calibration;
pub mod command;
pub mod config;
pub mod controller;
pub mod conversions;
pub mod device;
pub mod error;
pub mod hw_error;
pub mod measurement;
pub mod mocks;
pub mod sensor;
pub mod state;
pub mod sync;
pub mod util;

pub use builder::DeviceBuilder;
pub use calibration::{Calibration, CalibrationData, parse_reference_weight};
pub use command::{CODE_OK, Command, UnknownCommand};
pub use config::{CalibrationCfg, MeasurementCfg, SyncCfg, TimingCfg};
pub use controller::{ButtonPress, Controller, RunExit, Tick};
pub use device::Device;
pub use error::{BuildError, CommandError, KegError, Result};
pub use measurement::{Level, MeasurementSample, classify_level, is_significant};
pub use state::{OperatingState, RestartReason};
pub use sync::{DeviceIdentity, StatusReport};
