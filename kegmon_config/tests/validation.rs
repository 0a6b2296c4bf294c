use kegmon_config::{load_file, load_toml};
use rstest::rstest;
use std::fs;
use tempfile::tempdir;

const FULL: &str = r#"
[device]
device_type = "weight"
chip_type = "Particle"
chip_id = "e00fce68a1b2c3d4e5f60718"
chip_model = "rpi4"

[pins]
hx711_dt = 5
hx711_sck = 6
button = 21
led_red = 13
led_green = 19
led_blue = 26

[sensor]
read_timeout_ms = 150
gain_pulses = 25

[measurement]
samples = 10
relative_threshold = 0.01
empty_threshold_g = 4500.0

[calibration]
store_path = "/tmp/kegmon-cal.bin"
min_reference_g = 1000.0
allow_low_weight = false
groups = 10
samples_per_group = 10
group_delay_ms = 500

[service]
enabled = true
host = "inventory.local"
port = 5000
secure = false
api_key = "secret"
max_retries = 3
request_timeout_ms = 2000

[timing]
tick_ms = 1000
button_poll_ms = 500
reset_hold_ms = 5000
status_interval_s = 300
led_test_step_ms = 1000

[logging]
level = "debug"
rotation = "daily"
"#;

#[test]
fn accepts_full_config() {
    let cfg = load_toml(FULL).expect("parse TOML");
    cfg.validate().expect("valid config should pass");
    assert_eq!(cfg.device.chip_id.as_deref(), Some("e00fce68a1b2c3d4e5f60718"));
    assert!(!cfg.calibration.allow_low_weight);
    assert_eq!(cfg.measurement.empty_threshold_g, 4500.0);
    assert_eq!(cfg.service.api_key.as_deref(), Some("secret"));
}

#[test]
fn partial_sections_fill_defaults() {
    let cfg = load_toml(
        r#"
[measurement]
relative_threshold = 0.05
"#,
    )
    .expect("parse TOML");
    cfg.validate().expect("valid");
    assert_eq!(cfg.measurement.relative_threshold, 0.05);
    assert_eq!(cfg.measurement.samples, 10);
    assert_eq!(cfg.timing.tick_ms, 1000);
}

#[rstest]
#[case("[measurement]\nsamples = 0", "measurement.samples must be >= 1")]
#[case(
    "[measurement]\nrelative_threshold = 0.0",
    "measurement.relative_threshold must be in (0.0, 1.0)"
)]
#[case(
    "[measurement]\nrelative_threshold = 1.5",
    "measurement.relative_threshold must be in (0.0, 1.0)"
)]
#[case("[service]\nmax_retries = 0", "service.max_retries must be >= 1")]
#[case("[service]\nmax_retries = 50", "service.max_retries must be <= 10")]
#[case("[service]\nport = 0", "service.port must be > 0")]
#[case(
    "[service]\nhost = \"\"",
    "service.host must not be empty when the service is enabled"
)]
#[case("[sensor]\ngain_pulses = 24", "sensor.gain_pulses must be 25, 26 or 27")]
#[case("[calibration]\ngroups = 0", "calibration.groups must be >= 1")]
#[case(
    "[timing]\nreset_hold_ms = 100\nbutton_poll_ms = 500",
    "timing.reset_hold_ms must be >= timing.button_poll_ms"
)]
#[case(
    "[logging]\nrotation = \"weekly\"",
    "logging.rotation must be one of never|daily|hourly"
)]
#[case("[device]\nchip_id = \"  \"", "device.chip_id must not be empty when set")]
fn rejects_invalid_values(#[case] toml: &str, #[case] needle: &str) {
    let cfg = load_toml(toml).expect("parse TOML");
    let err = cfg.validate().expect_err("should be rejected");
    assert!(
        format!("{err}").contains(needle),
        "expected `{needle}` in `{err}`"
    );
}

#[test]
fn offline_mode_allows_empty_host() {
    let cfg = load_toml("[service]\nenabled = false\nhost = \"\"").expect("parse");
    cfg.validate().expect("offline device needs no host");
}

#[test]
fn load_file_parses_and_validates() {
    let dir = tempdir().unwrap();
    let good = dir.path().join("good.toml");
    fs::write(&good, FULL).unwrap();
    let cfg = load_file(&good).expect("load");
    assert_eq!(cfg.service.host, "inventory.local");

    let bad = dir.path().join("bad.toml");
    fs::write(&bad, "[measurement]\nsamples = 0\n").unwrap();
    let err = load_file(&bad).expect_err("invalid");
    assert!(format!("{err}").contains("measurement.samples"));

    let missing = dir.path().join("missing.toml");
    let err = load_file(&missing).expect_err("missing file");
    assert!(format!("{err}").contains("read config"));
}

#[test]
fn unknown_types_fail_to_parse() {
    assert!(load_toml("[service]\nport = \"eighty\"").is_err());
}
