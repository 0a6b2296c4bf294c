//! Time and locking helpers.

use std::sync::{Mutex, MutexGuard};
use std::time::{Duration, Instant};

use crate::error::{KegError, Result};

/// Number of milliseconds in one second.
pub const MILLIS_PER_SEC: u64 = 1_000;

/// Periodic trigger driven by whatever clock the caller polls with.
///
/// Decoupled from any timer primitive: the controller asks `due(now)` once
/// per tick. The first firing happens one full period after the first poll;
/// missed periods collapse into a single firing.
#[derive(Debug, Clone)]
pub struct Interval {
    period: Duration,
    next: Option<Instant>,
}

impl Interval {
    pub fn new(period: Duration) -> Self {
        Self { period, next: None }
    }

    pub fn period(&self) -> Duration {
        self.period
    }

    /// True when a period has elapsed since the last firing.
    pub fn due(&mut self, now: Instant) -> bool {
        match self.next {
            None => {
                self.next = Some(now + self.period);
                false
            }
            Some(at) if now >= at => {
                self.next = Some(now + self.period);
                true
            }
            Some(_) => false,
        }
    }

    /// Restart the period from `now`.
    pub fn reset(&mut self, now: Instant) {
        self.next = Some(now + self.period);
    }
}

/// Seconds in `d` as f32, at millisecond resolution.
#[inline]
pub fn secs_f32(d: Duration) -> f32 {
    (d.as_millis() as f32) / (MILLIS_PER_SEC as f32)
}

/// Lock `m`, turning poisoning into a state error naming `what`.
pub(crate) fn lock<'a, T: ?Sized>(m: &'a Mutex<T>, what: &str) -> Result<MutexGuard<'a, T>> {
    m.lock()
        .map_err(|_| KegError::State(format!("{what} lock poisoned")))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn fires_once_per_period() {
        let t0 = Instant::now();
        let mut iv = Interval::new(Duration::from_secs(10));
        assert!(!iv.due(t0));
        assert!(!iv.due(t0 + Duration::from_secs(9)));
        assert!(iv.due(t0 + Duration::from_secs(10)));
        assert!(!iv.due(t0 + Duration::from_secs(11)));
        // Long stall collapses into one firing.
        assert!(iv.due(t0 + Duration::from_secs(45)));
        assert!(!iv.due(t0 + Duration::from_secs(46)));
    }

    #[test]
    fn reset_pushes_next_firing() {
        let t0 = Instant::now();
        let mut iv = Interval::new(Duration::from_secs(5));
        iv.reset(t0 + Duration::from_secs(3));
        assert!(!iv.due(t0 + Duration::from_secs(7)));
        assert!(iv.due(t0 + Duration::from_secs(8)));
    }

    #[test]
    fn secs_f32_is_fractional() {
        assert_eq!(secs_f32(Duration::from_millis(3_500)), 3.5);
    }
}
