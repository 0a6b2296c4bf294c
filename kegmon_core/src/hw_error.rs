//! Maps `Box<dyn Error>` from trait boundaries to typed `KegError`.
//!
//! The traits in `kegmon_traits` use `Box<dyn Error + Send + Sync>` so
//! adapters can report anything; this module converts those to our typed
//! error enum, with an optional feature-gated path for
//! `kegmon_hardware::HwError` downcasting.

use crate::error::KegError;

/// Map a load-cell error to a typed `KegError`.
///
/// Attempts to downcast known hardware error types first, then falls back
/// to string-based heuristics.
pub fn map_hw_error(e: &(dyn std::error::Error + 'static)) -> KegError {
    // Feature-gated: try to downcast to HwError for precise mapping
    #[cfg(feature = "hardware-errors")]
    {
        use kegmon_hardware::error::HwError;
        if let Some(hw) = e.downcast_ref::<HwError>() {
            return match hw {
                HwError::DataReadyTimeout => KegError::Timeout,
                other => KegError::HardwareFault(other.to_string()),
            };
        }
    }

    // Fallback: string-based detection
    let s = e.to_string();
    if s.to_lowercase().contains("timeout") {
        KegError::Timeout
    } else {
        KegError::Hardware(s)
    }
}

/// Map a byte-store error to `KegError::Storage`.
pub fn map_store_error(e: &(dyn std::error::Error + 'static)) -> KegError {
    KegError::Storage(e.to_string())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn timeouts_are_recognized_by_text() {
        let e: Box<dyn std::error::Error + Send + Sync> = "sensor timeout".into();
        assert_eq!(map_hw_error(e.as_ref()), KegError::Timeout);
    }

    #[test]
    fn other_errors_keep_their_message() {
        let e: Box<dyn std::error::Error + Send + Sync> = "bus glitch".into();
        assert_eq!(map_hw_error(e.as_ref()), KegError::Hardware("bus glitch".into()));
    }

    #[cfg(feature = "hardware-errors")]
    #[test]
    fn hw_errors_downcast_precisely() {
        use kegmon_hardware::error::HwError;
        let e: Box<dyn std::error::Error + Send + Sync> = Box::new(HwError::DataReadyTimeout);
        assert_eq!(map_hw_error(e.as_ref()), KegError::Timeout);
        let e: Box<dyn std::error::Error + Send + Sync> = Box::new(HwError::PoweredDown);
        assert!(matches!(map_hw_error(e.as_ref()), KegError::HardwareFault(_)));
    }
}
