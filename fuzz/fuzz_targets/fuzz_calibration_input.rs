#![no_main]
use kegmon_core::{CalibrationData, parse_reference_weight};
use libfuzzer_sys::fuzz_target;

fuzz_target!(|data: &[u8]| {
    // Remote argument: anything accepted must be a usable reference weight.
    if let Ok(text) = std::str::from_utf8(data)
        && let Ok(grams) = parse_reference_weight(text)
    {
        assert!(grams.is_finite() && grams >= 0.0);
    }

    // Stored record: any 8 bytes decode; only a usable scale counts as set.
    if let Ok(bytes) = <[u8; 8]>::try_from(data) {
        let record = CalibrationData::from_bytes(bytes);
        if record.is_set() {
            assert!(record.scale.is_finite() && record.scale != 0.0);
            assert!(record.calibration().is_some());
        }
    }
});
