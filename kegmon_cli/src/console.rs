//! Line-oriented command console: one `name [arg]` per line on stdin, one
//! reply per line on stdout.

use std::io::BufRead;
use std::str::FromStr;
use std::sync::Arc;
use std::sync::atomic::{AtomicBool, Ordering};
use std::thread::JoinHandle;

use kegmon_core::{Command, Device};

/// Render the reply to one console line.
pub fn reply(line: &str, device: &Device, json: bool) -> eyre::Result<String> {
    let cmd = Command::from_str(line)?;
    let code = device.dispatch(&cmd)?;
    Ok(format_reply(&cmd, code, json))
}

pub fn format_reply(cmd: &Command, code: i32, json: bool) -> String {
    if json {
        serde_json::json!({ "command": cmd.name(), "code": code }).to_string()
    } else {
        format!("{cmd} {code}")
    }
}

/// Serve stdin until it closes. With `stop_on_eof` the shutdown flag is
/// raised when it does.
pub fn spawn(
    device: Device,
    json: bool,
    stop_on_eof: bool,
    shutdown: Arc<AtomicBool>,
) -> std::io::Result<JoinHandle<()>> {
    std::thread::Builder::new()
        .name("console".into())
        .spawn(move || {
            let stdin = std::io::stdin();
            for line in stdin.lock().lines() {
                let Ok(line) = line else { break };
                if line.trim().is_empty() {
                    continue;
                }
                match reply(&line, &device, json) {
                    Ok(out) => println!("{out}"),
                    Err(e) => {
                        tracing::warn!(line = %line.trim(), error = %e, "console command failed");
                        if json {
                            println!("{}", crate::error_fmt::format_error_json(&e));
                        } else {
                            eprintln!("{}", crate::error_fmt::humanize(&e));
                        }
                    }
                }
            }
            tracing::debug!("console input closed");
            if stop_on_eof {
                shutdown.store(true, Ordering::Relaxed);
            }
        })
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn replies_name_the_command() {
        assert_eq!(format_reply(&Command::GetState, 10, false), "getState 10");
        let v: serde_json::Value =
            serde_json::from_str(&format_reply(&Command::Tare, -1, true)).unwrap();
        assert_eq!(v["command"], "tare");
        assert_eq!(v["code"], -1);
    }
}
