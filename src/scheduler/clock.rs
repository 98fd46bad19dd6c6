//! Absolute-time anchor shared by AP and tags.
//!
//! The AP tells each tag its 32-bit millisecond absolute time.  The tag
//! remembers `anchor = now − abs` and derives the current absolute time as
//! `now − anchor`.  All arithmetic wraps at 2^32.

use crate::error::EcpError;

/// Horizon for timed commands: 48 days in milliseconds.
pub const ESL_TIMED_ABS_MAX: u32 = 48 * 24 * 60 * 60 * 1000;

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct AbsClock {
    anchor: u32,
}

impl AbsClock {
    pub const fn new() -> Self {
        Self { anchor: 0 }
    }

    /// Re-anchor so that `now()` reads `abs_ms` at monotonic `now_ms`.
    pub fn set(&mut self, now_ms: u64, abs_ms: u32) {
        self.anchor = (now_ms as u32).wrapping_sub(abs_ms);
    }

    /// Current absolute time at monotonic `now_ms`.
    pub fn now(&self, now_ms: u64) -> u32 {
        (now_ms as u32).wrapping_sub(self.anchor)
    }

    /// Forward distance from the current absolute time to `requested`.
    pub fn offset_to(&self, now_ms: u64, requested: u32) -> u32 {
        requested.wrapping_sub(self.now(now_ms))
    }

    /// Offset to `requested`, or `ERR_IMPLAUSIBLE_ABS` when it lies at or
    /// beyond the horizon (which also catches times in the past).
    pub fn plausible_offset(&self, now_ms: u64, requested: u32) -> Result<u32, EcpError> {
        let offset = self.offset_to(now_ms, requested);
        if offset >= ESL_TIMED_ABS_MAX {
            return Err(EcpError::ImplausibleAbsoluteTime);
        }
        Ok(offset)
    }
}
