//! Monotonic time source.
//!
//! The tag and AP cores take `now_ms` as an argument on every call.  This
//! adapter produces it from `std::time::Instant` on the host; a firmware
//! build swaps in the controller's timer behind the same methods.

use std::time::{Duration, Instant};

/// Milliseconds since the clock was created.
pub struct MonotonicClock {
    start: Instant,
}

impl Default for MonotonicClock {
    fn default() -> Self {
        Self::new()
    }
}

impl MonotonicClock {
    pub fn new() -> Self {
        Self {
            start: Instant::now(),
        }
    }

    pub fn now_ms(&self) -> u64 {
        self.start.elapsed().as_millis() as u64
    }

    pub fn uptime_us(&self) -> u64 {
        self.start.elapsed().as_micros() as u64
    }

    /// Time left until `deadline_ms`, zero if it has passed.
    pub fn until(&self, deadline_ms: u64) -> Duration {
        Duration::from_millis(deadline_ms.saturating_sub(self.now_ms()))
    }
}
