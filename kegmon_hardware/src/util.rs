use std::time::{Duration, Instant};

use crate::error::{HwError, Result};

/// Wait until the provided `is_high` predicate becomes false (i.e., line goes low),
/// or a timeout expires. Sleeps in small intervals to avoid CPU spinning.
pub fn wait_until_low_with_timeout(
    mut is_high: impl FnMut() -> bool,
    timeout: Duration,
    poll_interval: Duration,
) -> Result<()> {
    let deadline = Instant::now() + timeout;
    while is_high() {
        if Instant::now() >= deadline {
            return Err(HwError::DataReadyTimeout);
        }
        std::thread::sleep(poll_interval);
    }
    Ok(())
}

/// Mean of `n` values produced by `read`, stopping at the first error.
/// `n == 0` is treated as a single read.
pub fn average_of<E>(n: u32, mut read: impl FnMut() -> std::result::Result<i32, E>) -> std::result::Result<f64, E> {
    let n = n.max(1);
    let mut sum = 0i64;
    for _ in 0..n {
        sum += i64::from(read()?);
    }
    Ok(sum as f64 / f64::from(n))
}

/// Two's-complement value of a 24-bit HX711 frame held in the low bits.
pub fn sign_extend_24(frame: u32) -> i32 {
    ((frame << 8) as i32) >> 8
}
