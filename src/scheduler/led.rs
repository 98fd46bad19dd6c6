//! LED flash-pattern walker.
//!
//! Steps one bit of a 40-bit pattern per tick, highest set bit first.
//! The tick length depends on the bit just emitted:
//!
//! | bit | LED | next step after       |
//! |-----|-----|-----------------------|
//! | 1   | on  | `2 × on_period` ms    |
//! | 0   | off | `2 × off_period` ms   |
//!
//! A completed scan counts one repetition and restarts at the top bit.
//! Stepping ends when the repeat budget (count or seconds) is spent, after
//! which the LED is switched off and the walker goes idle.

use log::debug;

use crate::ecp::command::{LedCommand, RepeatKind};

/// Desired LED drive after a step.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct LedOutput {
    pub index: u8,
    pub color_brightness: u8,
    pub on: bool,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum Walk {
    /// Nothing running; LED held in `lit`.
    Idle,
    /// Walking the pattern.
    Running {
        cursor: u32,
        /// Cursor passed bit 0 on the last step.
        wrapped: bool,
        repetitions: u16,
        stop_at: Option<u64>,
        next_step_at: u64,
    },
}

/// Walker for one LED element.
#[derive(Debug, Clone)]
pub struct LedWalker {
    index: u8,
    cmd: Option<LedCommand>,
    walk: Walk,
    lit: bool,
}

impl LedWalker {
    pub const fn new(index: u8) -> Self {
        Self {
            index,
            cmd: None,
            walk: Walk::Idle,
            lit: false,
        }
    }

    /// Begin `cmd` at monotonic `now_ms`.  Returns the first drive.
    pub fn start(&mut self, cmd: LedCommand, now_ms: u64) -> LedOutput {
        self.cmd = Some(cmd);
        self.walk = Walk::Idle;

        if cmd.repeat.duration == 0 {
            // Pattern ignored; type alone selects the steady level.
            let on = cmd.repeat.kind == RepeatKind::Time;
            debug!("LED {}: steady {}", self.index, if on { "on" } else { "off" });
            return self.drive(on);
        }

        let Some(top) = cmd.pattern.top_bit() else {
            return self.drive(false);
        };

        let stop_at = match cmd.repeat.kind {
            RepeatKind::Time => Some(now_ms + u64::from(cmd.repeat.duration) * 1000),
            RepeatKind::Count => None,
        };
        self.walk = Walk::Running {
            cursor: top,
            wrapped: false,
            repetitions: 0,
            stop_at,
            next_step_at: now_ms,
        };
        self.step(now_ms).unwrap_or(LedOutput {
            index: self.index,
            color_brightness: cmd.color_brightness,
            on: self.lit,
        })
    }

    /// Switch off and go idle.
    pub fn stop(&mut self) -> LedOutput {
        self.walk = Walk::Idle;
        self.drive(false)
    }

    /// Advance if a step is due.
    pub fn poll(&mut self, now_ms: u64) -> Option<LedOutput> {
        match self.walk {
            Walk::Running { next_step_at, .. } if now_ms >= next_step_at => self.step(now_ms),
            _ => None,
        }
    }

    /// When the next step is due, if a pattern is running.
    pub fn next_deadline(&self) -> Option<u64> {
        match self.walk {
            Walk::Running { next_step_at, .. } => Some(next_step_at),
            Walk::Idle => None,
        }
    }

    pub fn is_running(&self) -> bool {
        matches!(self.walk, Walk::Running { .. })
    }

    /// Running a pattern or held on.
    pub fn is_active(&self) -> bool {
        self.is_running() || self.lit
    }

    pub fn is_lit(&self) -> bool {
        self.lit
    }

    pub fn index(&self) -> u8 {
        self.index
    }

    fn step(&mut self, now_ms: u64) -> Option<LedOutput> {
        let cmd = self.cmd?;
        let Walk::Running {
            mut cursor,
            mut wrapped,
            mut repetitions,
            stop_at,
            ..
        } = self.walk
        else {
            return None;
        };

        if stop_at.is_some_and(|t| now_ms >= t) {
            debug!("LED {}: repeat time elapsed", self.index);
            return Some(self.stop());
        }

        if wrapped {
            repetitions = repetitions.saturating_add(1);
            if cmd.repeat.kind == RepeatKind::Count && repetitions >= cmd.repeat.duration {
                debug!("LED {}: {} repetitions done", self.index, repetitions);
                return Some(self.stop());
            }
            cursor = cmd.pattern.top_bit().unwrap_or(0);
            wrapped = false;
        }

        let on = cmd.pattern.bit(cursor);
        let half_period = if on { cmd.on_period } else { cmd.off_period };
        let delay = u64::from(half_period) * 2;

        if cursor == 0 {
            wrapped = true;
        } else {
            cursor -= 1;
        }

        self.walk = Walk::Running {
            cursor,
            wrapped,
            repetitions,
            stop_at,
            next_step_at: now_ms + delay.max(1),
        };
        Some(self.drive(on))
    }

    fn drive(&mut self, on: bool) -> LedOutput {
        self.lit = on;
        LedOutput {
            index: self.index,
            color_brightness: self.cmd.map_or(0, |c| c.color_brightness),
            on,
        }
    }
}
