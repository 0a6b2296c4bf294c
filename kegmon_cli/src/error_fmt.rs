//! Human-readable error descriptions and structured JSON error formatting.

use kegmon_core::error::{BuildError, KegError};
use kegmon_core::UnknownCommand;

/// Map an eyre::Report to a human-readable explanation with likely causes and fix hints.
pub fn humanize(err: &eyre::Report) -> String {
    // Typed matches first
    if let Some(be) = err.downcast_ref::<BuildError>() {
        return match be {
            BuildError::InvalidConfig(msg) => format!(
                "What happened: Invalid configuration ({msg}).\nLikely causes: Missing or out-of-range values in the TOML.\nHow to fix: Edit the config file, then rerun."
            ),
            other => format!(
                "What happened: The device could not be assembled ({other}).\nLikely causes: A collaborator failed to initialize.\nHow to fix: Re-run with --log-level=debug and check the hardware wiring."
            ),
        };
    }

    if let Some(UnknownCommand(name)) = err.downcast_ref::<UnknownCommand>() {
        return format!(
            "What happened: Unknown command {name:?}.\nHow to fix: Use one of: {}.",
            kegmon_core::Command::NAMES.join(", ")
        );
    }

    if let Some(ke) = err.downcast_ref::<KegError>() {
        return match ke {
            KegError::Timeout => "What happened: Load cell read timed out.\nLikely causes: HX711 not wired correctly, no power/ground, or timeout too low.\nHow to fix: Verify DT/SCK pins and power, and consider increasing sensor.read_timeout_ms in the config.".to_string(),
            KegError::Storage(msg) => format!(
                "What happened: Calibration storage failed ({msg}).\nLikely causes: calibration.store_path is not writable or the disk is full.\nHow to fix: Check the path and its permissions, then rerun."
            ),
            other => format!(
                "What happened: {other}.\nLikely causes: See logs.\nHow to fix: Re-run with --log-level=debug or set RUST_LOG for more detail."
            ),
        };
    }

    // String-based heuristics for errors coming from init or config
    let msg = err.to_string();
    let lower = msg.to_ascii_lowercase();

    if lower.contains("open hx711") || lower.contains("open button") || lower.contains("open led")
    {
        return "What happened: Failed to initialize hardware pins.\nLikely causes: Incorrect pin numbers or insufficient GPIO permissions.\nHow to fix: Fix the [pins] values in the config; ensure the process has permission to access GPIO.".to_string();
    }

    if lower.contains("read config") {
        return format!(
            "What happened: The config file could not be read.\nHow to fix: Pass an existing file with --config. Original: {msg}"
        );
    }

    if lower.contains("invalid configuration") || lower.contains(" must ") {
        return format!(
            "What happened: Configuration is invalid ({msg}).\nLikely causes: Out-of-range or mistyped values.\nHow to fix: Edit the TOML config and try again."
        );
    }

    if lower.contains("unreachable") {
        return format!(
            "What happened: {msg}.\nLikely causes: Service down, wrong [service] host/port, or no network.\nHow to fix: Check the service and the [service] section."
        );
    }

    // Generic fallback
    let mut cause = String::new();
    if let Some(src) = err.source() {
        cause = format!(" Cause: {src}");
    }
    format!(
        "Something went wrong.{cause}\nHow to fix: Re-run with --log-level=debug for details. Original: {msg}"
    )
}

/// Stable exit codes: 2 for config problems, 3 for hardware, 4 for storage, 1 otherwise.
pub fn exit_code_for_error(err: &eyre::Report) -> i32 {
    if err.downcast_ref::<BuildError>().is_some() {
        return 2;
    }
    if let Some(ke) = err.downcast_ref::<KegError>() {
        return match ke {
            KegError::Config(_) => 2,
            KegError::Hardware(_) | KegError::HardwareFault(_) | KegError::Timeout => 3,
            KegError::Storage(_) => 4,
            KegError::State(_) => 1,
        };
    }
    let lower = err.to_string().to_ascii_lowercase();
    if lower.contains("invalid configuration") || lower.contains(" must ") {
        return 2;
    }
    1
}

fn reason_name(err: &eyre::Report) -> &'static str {
    if err.downcast_ref::<BuildError>().is_some() {
        return "Config";
    }
    if err.downcast_ref::<UnknownCommand>().is_some() {
        return "UnknownCommand";
    }
    match err.downcast_ref::<KegError>() {
        Some(KegError::Timeout) => "Timeout",
        Some(KegError::Hardware(_) | KegError::HardwareFault(_)) => "Hardware",
        Some(KegError::Storage(_)) => "Storage",
        Some(KegError::Config(_)) => "Config",
        Some(KegError::State(_)) => "State",
        None => "Error",
    }
}

/// Structured JSON for errors when --json is enabled.
pub fn format_error_json(err: &eyre::Report) -> String {
    serde_json::json!({
        "reason": reason_name(err),
        "exit_code": exit_code_for_error(err),
        "message": humanize(err),
    })
    .to_string()
}
