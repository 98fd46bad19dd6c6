//! Randomizer generation for EAD nonces.
//!
//! A randomizer is 5 bytes; the most significant bit of the last byte is
//! the direction flag.  The remaining 39 bits come from a per-key counter
//! seeded from the RNG, so two encryptions under the same source never
//! share a nonce until the counter wraps (2^39 payloads).

use log::warn;
use rand::RngCore;

pub const RANDOMIZER_LEN: usize = 5;

const DIRECTION_BIT: u8 = 0x80;
const COUNTER_MASK: u64 = (1 << 39) - 1;

/// Which side produced the payload.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Direction {
    /// Sync packet sent by the access point.
    ApToTag,
    /// Response sent by a tag.
    TagToAp,
}

/// Five randomizer bytes as they appear on air.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct Randomizer([u8; RANDOMIZER_LEN]);

impl Randomizer {
    /// Wrap raw bytes, forcing the direction bit.
    pub fn new(mut bytes: [u8; RANDOMIZER_LEN], direction: Direction) -> Self {
        match direction {
            Direction::ApToTag => bytes[RANDOMIZER_LEN - 1] |= DIRECTION_BIT,
            Direction::TagToAp => bytes[RANDOMIZER_LEN - 1] &= !DIRECTION_BIT,
        }
        Self(bytes)
    }

    /// Bytes taken verbatim from a received envelope.
    pub fn from_received(bytes: [u8; RANDOMIZER_LEN]) -> Self {
        Self(bytes)
    }

    pub fn direction(&self) -> Direction {
        if self.0[RANDOMIZER_LEN - 1] & DIRECTION_BIT != 0 {
            Direction::ApToTag
        } else {
            Direction::TagToAp
        }
    }

    pub fn as_bytes(&self) -> &[u8; RANDOMIZER_LEN] {
        &self.0
    }
}

/// Monotonic randomizer source.  One per encrypting key.
#[derive(Debug, Clone)]
pub struct RandomizerSource {
    direction: Direction,
    counter: u64,
    start: u64,
}

impl RandomizerSource {
    /// Seed the counter from `rng`.
    pub fn new(rng: &mut impl RngCore, direction: Direction) -> Self {
        Self::from_seed(rng.next_u64(), direction)
    }

    /// Deterministic seed (tests, replay tooling).
    pub fn from_seed(seed: u64, direction: Direction) -> Self {
        let start = seed & COUNTER_MASK;
        Self {
            direction,
            counter: start,
            start,
        }
    }

    /// Produce the next randomizer.
    pub fn next_randomizer(&mut self) -> Randomizer {
        let value = self.counter;
        self.counter = (self.counter + 1) & COUNTER_MASK;
        if self.counter == self.start {
            warn!("randomizer space exhausted for this key; rekey required");
        }
        let b = value.to_le_bytes();
        Randomizer::new([b[0], b[1], b[2], b[3], b[4]], self.direction)
    }

    pub fn direction(&self) -> Direction {
        self.direction
    }
}
