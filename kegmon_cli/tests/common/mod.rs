#![allow(dead_code)]

use std::fs;
use std::path::PathBuf;

/// Offline simulated device with fast timing and an isolated store.
pub fn write_config(dir: &tempfile::TempDir, extra: &str) -> PathBuf {
    let store = dir.path().join("calibration.bin");
    let toml = format!(
        r#"
[device]
chip_id = "test-chip"

[service]
# no backend in tests
enabled = false

[calibration]
store_path = {store:?}
group_delay_ms = 0

[timing]
tick_ms = 10
button_poll_ms = 10
reset_hold_ms = 100
{extra}
"#,
        store = store.display().to_string()
    );
    let path = dir.path().join("kegmon.toml");
    fs::write(&path, toml).unwrap();
    path
}
