//! Monotonic timing helpers and the Network Throttler (§4.4).

pub mod throttle;

pub use throttle::Throttler;

use std::time::{Duration, Instant};

/// A fixed reference point other timestamps are measured relative to,
/// mirroring the original `start_timer`/`get_timer` pair: callers store one
/// `Clock` at session start and compare against `elapsed()` rather than
/// reading the system clock directly, so NTP adjustments never skew
/// liveness/latency measurements.
#[derive(Debug, Clone, Copy)]
pub struct Clock {
    start: Instant,
}

impl Default for Clock {
    fn default() -> Self {
        Self::new()
    }
}

impl Clock {
    pub fn new() -> Self {
        Clock { start: Instant::now() }
    }

    pub fn elapsed(&self) -> Duration {
        self.start.elapsed()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::thread::sleep;

    #[test]
    fn elapsed_increases_monotonically() {
        let clock = Clock::new();
        let first = clock.elapsed();
        sleep(Duration::from_millis(5));
        let second = clock.elapsed();
        assert!(second >= first);
    }
}
