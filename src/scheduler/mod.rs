//! Timed scheduling engine.
//!
//! Owns the absolute clock, one [`LedWalker`] per LED and one
//! [`DisplaySlot`] per display.  The tag service polls it from the timer
//! queue and forwards the resulting [`TimedOutput`]s to the hardware port.
//!
//! ```text
//! ┌───────────────────────────────────────────────────────────┐
//! │                     TimedScheduler                        │
//! │                                                           │
//! │  AbsClock ──▶ plan_timed_*() ──▶ Pending { abs, fire_at } │
//! │                                         │                 │
//! │  poll(now) ◀────────────────────────────┘                 │
//! │     ├── LED pending due  → LedWalker::start               │
//! │     ├── LedWalker::poll  → TimedOutput::Led               │
//! │     └── display due      → TimedOutput::Display           │
//! └───────────────────────────────────────────────────────────┘
//! ```

pub mod clock;
pub mod display;
pub mod led;

use heapless::Vec;
use log::{debug, info};

use crate::ecp::command::LedCommand;
use crate::error::EcpError;

pub use clock::{AbsClock, ESL_TIMED_ABS_MAX};
pub use display::{DisplaySlot, Pending, NO_IMAGE};
pub use led::{LedOutput, LedWalker};

// ═══════════════════════════════════════════════════════════════
//  Limits
// ═══════════════════════════════════════════════════════════════

/// Maximum number of LED elements (stack-allocated).
pub const MAX_LEDS: usize = 8;
/// Maximum number of display elements (stack-allocated).
pub const MAX_DISPLAYS: usize = 4;

const MAX_OUTPUTS: usize = MAX_LEDS * 2 + MAX_DISPLAYS;

// ═══════════════════════════════════════════════════════════════
//  Plans and outputs
// ═══════════════════════════════════════════════════════════════

/// Outcome of the timed-command policy for one element.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum TimedPlan {
    /// Absolute time 0: drop whatever is pending.
    Cancel,
    /// Store (or replace) the pending action.
    Schedule { fire_at: u64 },
}

/// Hardware drive requested by a poll.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum TimedOutput {
    Led(LedOutput),
    Display { index: u8, image: u8 },
}

#[derive(Debug, Clone)]
struct LedSlot {
    walker: LedWalker,
    pending: Option<Pending<LedCommand>>,
}

// ═══════════════════════════════════════════════════════════════
//  Engine
// ═══════════════════════════════════════════════════════════════

#[derive(Debug, Clone)]
pub struct TimedScheduler {
    clock: AbsClock,
    leds: Vec<LedSlot, MAX_LEDS>,
    displays: Vec<DisplaySlot, MAX_DISPLAYS>,
}

impl TimedScheduler {
    /// Counts beyond the limits are clamped; `TagConfig::validate` rejects
    /// them earlier.
    pub fn new(led_count: u8, display_count: u8) -> Self {
        let mut leds = Vec::new();
        for i in 0..(led_count as usize).min(MAX_LEDS) {
            let _ = leds.push(LedSlot {
                walker: LedWalker::new(i as u8),
                pending: None,
            });
        }
        let mut displays = Vec::new();
        for i in 0..(display_count as usize).min(MAX_DISPLAYS) {
            let _ = displays.push(DisplaySlot::new(i as u8));
        }
        Self {
            clock: AbsClock::new(),
            leds,
            displays,
        }
    }

    // ── Clock ─────────────────────────────────────────────────

    pub fn set_abs_time(&mut self, now_ms: u64, abs_ms: u32) {
        self.clock.set(now_ms, abs_ms);
        info!("Absolute time set to {} ms", abs_ms);
    }

    pub fn abs_now(&self, now_ms: u64) -> u32 {
        self.clock.now(now_ms)
    }

    pub fn clock(&self) -> &AbsClock {
        &self.clock
    }

    // ── Capability queries ────────────────────────────────────

    pub fn led_count(&self) -> u8 {
        self.leds.len() as u8
    }

    pub fn display_count(&self) -> u8 {
        self.displays.len() as u8
    }

    pub fn display_image(&self, index: u8) -> Option<u8> {
        self.displays.get(index as usize).map(DisplaySlot::image)
    }

    pub fn any_led_active(&self) -> bool {
        self.leds.iter().any(|l| l.walker.is_active())
    }

    pub fn any_led_pending(&self) -> bool {
        self.leds.iter().any(|l| l.pending.is_some())
    }

    pub fn any_display_pending(&self) -> bool {
        self.displays.iter().any(|d| d.pending().is_some())
    }

    pub fn led_pending(&self, index: u8) -> Option<&Pending<LedCommand>> {
        self.leds.get(index as usize)?.pending.as_ref()
    }

    pub fn display_pending(&self, index: u8) -> Option<&Pending<u8>> {
        self.displays.get(index as usize)?.pending()
    }

    // ── Timed-command policy (pure) ───────────────────────────

    /// Apply the timed policy for LED `index`.  The index must be valid.
    pub fn plan_timed_led(
        &self,
        index: u8,
        abs_time: u32,
        now_ms: u64,
    ) -> Result<TimedPlan, EcpError> {
        let pending = self
            .leds
            .get(index as usize)
            .ok_or(EcpError::InvalidParameters)?
            .pending
            .map(|p| p.abs_time);
        self.plan(pending, abs_time, now_ms)
    }

    /// Apply the timed policy for display `index`.  The index must be valid.
    pub fn plan_timed_display(
        &self,
        index: u8,
        abs_time: u32,
        now_ms: u64,
    ) -> Result<TimedPlan, EcpError> {
        let pending = self
            .displays
            .get(index as usize)
            .ok_or(EcpError::InvalidParameters)?
            .pending()
            .map(|p| p.abs_time);
        self.plan(pending, abs_time, now_ms)
    }

    fn plan(
        &self,
        pending: Option<u32>,
        abs_time: u32,
        now_ms: u64,
    ) -> Result<TimedPlan, EcpError> {
        if abs_time == 0 {
            return Ok(TimedPlan::Cancel);
        }
        let offset = self.clock.plausible_offset(now_ms, abs_time)?;
        match pending {
            Some(p) if p != abs_time => Err(EcpError::QueueFull),
            _ => Ok(TimedPlan::Schedule {
                fire_at: now_ms + u64::from(offset),
            }),
        }
    }

    // ── Mutation ──────────────────────────────────────────────

    /// Start `cmd` on its LED right away, dropping any timed pattern still
    /// waiting on that LED.
    pub fn start_led(&mut self, cmd: LedCommand, now_ms: u64) -> Option<LedOutput> {
        let slot = self.leds.get_mut(cmd.index as usize)?;
        if slot.pending.take().is_some() {
            debug!("LED {}: timed pattern superseded", cmd.index);
        }
        Some(slot.walker.start(cmd, now_ms))
    }

    pub fn schedule_led(&mut self, cmd: LedCommand, abs_time: u32, fire_at: u64) {
        if let Some(slot) = self.leds.get_mut(cmd.index as usize) {
            slot.pending = Some(Pending {
                abs_time,
                fire_at,
                item: cmd,
            });
        }
    }

    /// Drop the timed pattern and switch the LED off.
    pub fn cancel_led(&mut self, index: u8) -> Option<LedOutput> {
        let slot = self.leds.get_mut(index as usize)?;
        slot.pending = None;
        Some(slot.walker.stop())
    }

    pub fn set_display_image(&mut self, index: u8, image: u8) {
        if let Some(d) = self.displays.get_mut(index as usize) {
            d.set_image(image);
        }
    }

    pub fn schedule_display(&mut self, index: u8, image: u8, abs_time: u32, fire_at: u64) {
        if let Some(d) = self.displays.get_mut(index as usize) {
            d.schedule(Pending {
                abs_time,
                fire_at,
                item: image,
            });
        }
    }

    pub fn cancel_display(&mut self, index: u8) {
        if let Some(d) = self.displays.get_mut(index as usize) {
            d.cancel();
        }
    }

    /// Fire everything that is due at `now_ms`.
    pub fn poll(&mut self, now_ms: u64) -> Vec<TimedOutput, MAX_OUTPUTS> {
        let mut out = Vec::new();

        for slot in &mut self.leds {
            if let Some(p) = slot.pending.filter(|p| now_ms >= p.fire_at) {
                slot.pending = None;
                info!("LED {}: timed pattern fired at abs {}", p.item.index, p.abs_time);
                let _ = out.push(TimedOutput::Led(slot.walker.start(p.item, now_ms)));
            } else if let Some(o) = slot.walker.poll(now_ms) {
                let _ = out.push(TimedOutput::Led(o));
            }
        }

        for d in &mut self.displays {
            if let Some(image) = d.take_due(now_ms) {
                info!("Display {}: timed image {} fired", d.index(), image);
                d.set_image(image);
                let _ = out.push(TimedOutput::Display {
                    index: d.index(),
                    image,
                });
            }
        }
        out
    }

    /// Earliest monotonic time at which `poll` has work.
    pub fn next_deadline(&self) -> Option<u64> {
        let leds = self.leds.iter().flat_map(|l| {
            l.walker
                .next_deadline()
                .into_iter()
                .chain(l.pending.map(|p| p.fire_at))
        });
        let displays = self.displays.iter().filter_map(|d| d.pending().map(|p| p.fire_at));
        leds.chain(displays).min()
    }

    /// Drop all pending work, switch LEDs off and forget shown images.
    pub fn reset(&mut self) -> Vec<LedOutput, MAX_LEDS> {
        let mut off = Vec::new();
        for slot in &mut self.leds {
            slot.pending = None;
            if slot.walker.is_active() {
                let _ = off.push(slot.walker.stop());
            }
        }
        for d in &mut self.displays {
            d.reset();
        }
        off
    }
}
