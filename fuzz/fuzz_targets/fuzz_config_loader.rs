#![no_main]
use libfuzzer_sys::fuzz_target;

fuzz_target!(|data: &str| {
    // Parse errors and validation errors are both fine; panics are not.
    if let Ok(cfg) = kegmon_config::load_toml(data)
        && cfg.validate().is_ok()
    {
        let _ = cfg.service_base_url();
    }
});
