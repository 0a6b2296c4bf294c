//! CLI argument definitions and shared statics.

use clap::{ArgAction, Parser, Subcommand};
use std::path::PathBuf;
use std::sync::OnceLock;

pub static FILE_GUARD: OnceLock<tracing_appender::non_blocking::WorkerGuard> = OnceLock::new();
/// Whether the user asked for JSON output (controls structured error output).
pub static JSON_MODE: OnceLock<bool> = OnceLock::new();

pub fn json_mode() -> bool {
    JSON_MODE.get().copied().unwrap_or(false)
}

#[derive(Parser, Debug)]
#[command(name = "kegmon", version, about = "Keg weight monitor")]
pub struct Cli {
    /// Path to config TOML (typed)
    #[arg(long, value_name = "FILE", default_value = "/etc/kegmon/kegmon.toml")]
    pub config: PathBuf,

    /// Log as JSON lines instead of pretty; command replies become JSON too
    #[arg(long, action = ArgAction::SetTrue)]
    pub json: bool,

    /// Console log level (error|warn|info|debug|trace)
    #[arg(long = "log-level", value_name = "LEVEL", default_value = "info")]
    pub log_level: String,

    /// Grams placed on the simulated platform once the device has booted
    /// (simulation builds only)
    #[arg(long = "sim-grams", value_name = "GRAMS", default_value_t = 0.0)]
    pub sim_grams: f64,

    /// Command to execute
    #[command(subcommand)]
    pub cmd: Commands,
}

#[derive(Subcommand, Debug)]
pub enum Commands {
    /// Run the monitor until interrupted; command lines are read from stdin
    Run {
        /// Shut down once stdin is closed instead of running headless
        #[arg(long, action = ArgAction::SetTrue)]
        stop_on_eof: bool,
    },
    /// Boot the device, execute one remote command and print its result code
    Command {
        /// Published command name, e.g. getState or calibrate
        name: String,
        /// Command argument (only `calibrate` uses it)
        #[arg(default_value = "")]
        arg: String,
    },
    /// Quick health check (hardware presence / sim ok)
    SelfCheck,
    /// Health check for operational monitoring (config and service reachability)
    Health,
}
