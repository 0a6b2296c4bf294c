use crate::state::OperatingState;
use thiserror::Error;

/// Failures of the device itself (sensor, store, internal state).
#[derive(Debug, Error, Clone, PartialEq)]
pub enum KegError {
    #[error("hardware error: {0}")]
    Hardware(String),
    #[error("hardware fault: {0}")]
    HardwareFault(String),
    #[error("timeout waiting for load cell")]
    Timeout,
    #[error("storage error: {0}")]
    Storage(String),
    #[error("invalid state: {0}")]
    State(String),
    #[error("configuration error: {0}")]
    Config(String),
}

#[derive(Debug, Error, Clone, PartialEq)]
pub enum BuildError {
    #[error("missing load cell")]
    MissingLoadCell,
    #[error("missing calibration store")]
    MissingStore,
    #[error("missing indicator")]
    MissingIndicator,
    #[error("missing transport")]
    MissingTransport,
    #[error("missing button")]
    MissingButton,
    #[error("invalid config: {0}")]
    InvalidConfig(&'static str),
}

/// Domain outcome of a remote command. `code()` is the value returned to the
/// remote caller.
#[derive(Debug, Error, Clone, PartialEq)]
pub enum CommandError {
    #[error("invalid input: {0:?}")]
    InvalidInput(String),
    #[error("reference weight {weight} is below the minimum of {minimum}")]
    WeightTooLow { weight: f32, minimum: f32 },
    #[error("calibration is running")]
    Calibrating,
    #[error("no prior calibration to restore")]
    NoPriorCalibration,
    #[error("verification reading {reading} outside {expected} ± {tolerance}")]
    VerificationFailed {
        reading: f32,
        expected: f32,
        tolerance: f32,
    },
    #[error("calibration already in progress")]
    AlreadyCalibrating,
    #[error("calibration interrupted by a transition to {0}")]
    Interrupted(OperatingState),
    #[error("blocked while {0}")]
    Blocked(OperatingState),
    #[error("status push failed")]
    PushFailed,
    #[error("device identity unresolved")]
    IdentityUnresolved,
    #[error("no measurement taken yet")]
    NoMeasurement,
    /// The requested change was applied but the follow-up status push failed.
    #[error("applied, but the status push failed")]
    StatusPushFailed,
    #[error(transparent)]
    Fatal(#[from] KegError),
}

impl CommandError {
    /// Result code for the remote command surface.
    ///
    /// `Fatal` has no code: it is surfaced as an error so the controller can
    /// restart.
    pub fn code(&self) -> Option<i32> {
        let code = match self {
            CommandError::InvalidInput(_) => -1,
            CommandError::Calibrating => -1,
            CommandError::Blocked(_) => -1,
            CommandError::PushFailed => -1,
            CommandError::WeightTooLow { .. } => -2,
            CommandError::NoPriorCalibration => -2,
            CommandError::IdentityUnresolved => -2,
            CommandError::VerificationFailed { .. } => -3,
            CommandError::NoMeasurement => -3,
            CommandError::AlreadyCalibrating => -4,
            CommandError::Interrupted(_) => -5,
            CommandError::StatusPushFailed => -99,
            CommandError::Fatal(_) => return None,
        };
        Some(code)
    }
}

pub type Result<T> = std::result::Result<T, KegError>;
pub use eyre::Report;

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn fatal_has_no_code() {
        let e = CommandError::from(KegError::Timeout);
        assert_eq!(e.code(), None);
        assert_eq!(e.to_string(), "timeout waiting for load cell");
    }

    #[test]
    fn committed_push_failure_is_distinct() {
        assert_eq!(CommandError::StatusPushFailed.code(), Some(-99));
        assert_eq!(CommandError::PushFailed.code(), Some(-1));
    }
}
