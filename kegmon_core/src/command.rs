//! Closed set of remote commands with a uniform (argument → code) surface.
//!
//! Routing external invocations here is the host's job; `Command::parse`
//! accepts the published function names.

use std::fmt;
use std::str::FromStr;

use tracing::{error, info};

use crate::device::Device;
use crate::error::{CommandError, KegError, Result};
use crate::state::RestartReason;

/// Code returned by every command that succeeds (except `getState`).
pub const CODE_OK: i32 = 1;

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Command {
    StartCalibration,
    CancelCalibration,
    /// Reference weight, exactly as received.
    Calibrate(String),
    Tare,
    TestLeds,
    ClearMemory,
    SendStatus,
    StartMaintenance,
    StopMaintenance,
    GetState,
}

#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
#[error("unknown command {0:?}")]
pub struct UnknownCommand(pub String);

impl Command {
    pub const NAMES: [&'static str; 10] = [
        "startCalibration",
        "cancelCalibration",
        "calibrate",
        "tare",
        "testLEDs",
        "clearMemory",
        "sendStatus",
        "startMaintenanceMode",
        "stopMaintenanceMode",
        "getState",
    ];

    /// Build a command from its published name and raw argument. Only
    /// `calibrate` uses the argument.
    pub fn parse(name: &str, arg: &str) -> std::result::Result<Self, UnknownCommand> {
        let cmd = match name {
            "startCalibration" => Command::StartCalibration,
            "cancelCalibration" => Command::CancelCalibration,
            "calibrate" => Command::Calibrate(arg.to_string()),
            "tare" => Command::Tare,
            "testLEDs" => Command::TestLeds,
            "clearMemory" => Command::ClearMemory,
            "sendStatus" => Command::SendStatus,
            "startMaintenanceMode" => Command::StartMaintenance,
            "stopMaintenanceMode" => Command::StopMaintenance,
            "getState" => Command::GetState,
            other => return Err(UnknownCommand(other.to_string())),
        };
        Ok(cmd)
    }

    pub fn name(&self) -> &'static str {
        match self {
            Command::StartCalibration => "startCalibration",
            Command::CancelCalibration => "cancelCalibration",
            Command::Calibrate(_) => "calibrate",
            Command::Tare => "tare",
            Command::TestLeds => "testLEDs",
            Command::ClearMemory => "clearMemory",
            Command::SendStatus => "sendStatus",
            Command::StartMaintenance => "startMaintenanceMode",
            Command::StopMaintenance => "stopMaintenanceMode",
            Command::GetState => "getState",
        }
    }
}

impl fmt::Display for Command {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.name())
    }
}

/// `"name"` or `"name arg"`, as typed on a console.
impl FromStr for Command {
    type Err = UnknownCommand;

    fn from_str(line: &str) -> std::result::Result<Self, Self::Err> {
        let line = line.trim();
        let (name, arg) = line.split_once(char::is_whitespace).unwrap_or((line, ""));
        Command::parse(name, arg.trim())
    }
}

impl Device {
    /// Execute `cmd` and return its result code.
    ///
    /// Domain failures become their negative code. Hardware and storage
    /// failures are returned as errors and latch a restart that the next
    /// tick picks up.
    pub fn dispatch(&self, cmd: &Command) -> Result<i32> {
        let outcome: std::result::Result<(), CommandError> = match cmd {
            Command::GetState => return self.state_code(),
            Command::StartCalibration => self.start_calibration_mode().map_err(Into::into),
            Command::CancelCalibration => self.cancel_calibration_mode(),
            Command::Calibrate(weight) => self.calibrate(weight),
            Command::Tare => self.tare().map_err(Into::into),
            Command::TestLeds => self.test_leds(),
            Command::ClearMemory => self.clear_memory().map_err(Into::into),
            Command::SendStatus => self.send_status(),
            Command::StartMaintenance => self.start_maintenance(),
            Command::StopMaintenance => self.stop_maintenance(),
        };
        match outcome {
            Ok(()) => {
                info!(command = %cmd, "command ok");
                Ok(CODE_OK)
            }
            Err(CommandError::Fatal(e)) => Err(self.fatal(cmd, e)),
            Err(e) => {
                let code = e.code().unwrap_or(-1);
                info!(command = %cmd, code, reason = %e, "command rejected");
                Ok(code)
            }
        }
    }

    fn fatal(&self, cmd: &Command, e: KegError) -> KegError {
        error!(command = %cmd, error = %e, "command hit a device failure");
        if let Err(latch) = self.request_restart(RestartReason::HardwareFault) {
            error!(error = %latch, "could not latch restart");
        }
        e
    }
}
