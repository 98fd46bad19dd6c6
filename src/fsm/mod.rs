//! Function-pointer finite state machine for the tag lifecycle.
//!
//! ```text
//! ┌──────────────────────────────────────────────────────────────┐
//! │  StateTable                                                  │
//! │  ┌────────────────┬───────────┬──────────┬─────────────────┐ │
//! │  │ StateId        │ on_enter  │ on_exit  │ on_update       │ │
//! │  ├────────────────┼───────────┼──────────┼─────────────────┤ │
//! │  │ Unassociated   │ fn(ctx)   │    -     │ fn(ctx)->Option │ │
//! │  │ Configuring    │    -      │    -     │ fn(ctx)->Option │ │
//! │  │ Configured     │ fn(ctx)   │    -     │ fn(ctx)->Option │ │
//! │  │ Synchronized   │ fn(ctx)   │    -     │ fn(ctx)->Option │ │
//! │  │ Updating       │ fn(ctx)   │    -     │ fn(ctx)->Option │ │
//! │  │ Unsynchronized │ fn(ctx)   │    -     │ fn(ctx)->Option │ │
//! │  └────────────────┴───────────┴──────────┴─────────────────┘ │
//! └──────────────────────────────────────────────────────────────┘
//! ```
//!
//! The service writes one [`LifecycleEvent`] into the context and calls
//! [`Fsm::dispatch`].  The current state's `on_update` consumes it and may
//! return the next state; the engine then runs `on_exit` / `on_enter`.
//! Handlers never touch the radio directly: they queue
//! [`RadioAction`](context::RadioAction)s for the service to apply.

pub mod context;
pub mod states;

use context::{LifecycleEvent, TagContext};
use log::{debug, info};

// ---------------------------------------------------------------------------
// State identity
// ---------------------------------------------------------------------------

/// Lifecycle states of an ESL tag.
/// Must stay in sync with the table built in [`states::build_state_table`].
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
#[repr(u8)]
pub enum StateId {
    Unassociated = 0,
    Configuring = 1,
    Configured = 2,
    Synchronized = 3,
    Updating = 4,
    Unsynchronized = 5,
}

impl StateId {
    pub const COUNT: usize = 6;

    /// Convert an index back to `StateId`.  Panics on out-of-range in
    /// debug builds; returns `Unassociated` in release.
    pub fn from_index(idx: usize) -> Self {
        match idx {
            0 => Self::Unassociated,
            1 => Self::Configuring,
            2 => Self::Configured,
            3 => Self::Synchronized,
            4 => Self::Updating,
            5 => Self::Unsynchronized,
            _ => {
                debug_assert!(false, "invalid state index: {idx}");
                Self::Unassociated
            }
        }
    }

    pub const fn name(self) -> &'static str {
        match self {
            Self::Unassociated => "UNASSOCIATED",
            Self::Configuring => "CONFIGURING",
            Self::Configured => "CONFIGURED",
            Self::Synchronized => "SYNCHRONIZED",
            Self::Updating => "UPDATING",
            Self::Unsynchronized => "UNSYNCHRONIZED",
        }
    }
}

impl core::fmt::Display for StateId {
    fn fmt(&self, f: &mut core::fmt::Formatter<'_>) -> core::fmt::Result {
        f.write_str(self.name())
    }
}

// ---------------------------------------------------------------------------
// Function-pointer type aliases
// ---------------------------------------------------------------------------

/// Signature for `on_enter` and `on_exit` actions.
pub type StateActionFn = fn(&mut TagContext);

/// Signature for the event handler.
/// Returns `Some(next)` to trigger a transition, or `None` to stay.
pub type StateUpdateFn = fn(&mut TagContext) -> Option<StateId>;

// ---------------------------------------------------------------------------
// State descriptor (one row in the table)
// ---------------------------------------------------------------------------

/// Static descriptor for a single lifecycle state.
pub struct StateDescriptor {
    pub id: StateId,
    pub name: &'static str,
    pub on_enter: Option<StateActionFn>,
    pub on_exit: Option<StateActionFn>,
    pub on_update: StateUpdateFn,
}

// ---------------------------------------------------------------------------
// FSM engine
// ---------------------------------------------------------------------------

pub struct Fsm {
    /// Fixed-size table indexed by `StateId as usize`.
    table: [StateDescriptor; StateId::COUNT],
    current: usize,
    /// Number of events dispatched (wraps at u64::MAX).
    tick_count: u64,
    /// Tick at which the current state was entered.
    state_entry_tick: u64,
}

impl Fsm {
    pub fn new(table: [StateDescriptor; StateId::COUNT], initial: StateId) -> Self {
        Self {
            table,
            current: initial as usize,
            tick_count: 0,
            state_entry_tick: 0,
        }
    }

    /// Run the initial `on_enter`.  Call once after construction.
    pub fn start(&mut self, ctx: &mut TagContext) {
        info!("Lifecycle starting in state: {}", self.table[self.current].name);
        if let Some(enter) = self.table[self.current].on_enter {
            enter(ctx);
        }
    }

    /// Run `on_update` for the current state against whatever event the
    /// context holds, transitioning if it asks to.
    pub fn tick(&mut self, ctx: &mut TagContext) {
        self.tick_count = self.tick_count.wrapping_add(1);

        let next = (self.table[self.current].on_update)(ctx);

        if let Some(next_id) = next {
            self.transition(next_id, ctx);
        }
    }

    /// Feed one event through the current state.  Events the state does
    /// not care about are dropped.
    pub fn dispatch(&mut self, event: LifecycleEvent, ctx: &mut TagContext) -> StateId {
        ctx.event = Some(event);
        self.tick(ctx);
        if let Some(ignored) = ctx.event.take() {
            debug!(
                "{}: ignoring {:?}",
                self.table[self.current].name, ignored
            );
        }
        self.current_state()
    }

    /// Jump straight to `next` (boot restore, unassociate).  No-op if
    /// already there.
    pub fn force_transition(&mut self, next: StateId, ctx: &mut TagContext) {
        if next as usize != self.current {
            self.transition(next, ctx);
        }
    }

    pub fn current_state(&self) -> StateId {
        StateId::from_index(self.current)
    }

    /// How many events have been dispatched in the current state.
    pub fn ticks_in_current_state(&self) -> u64 {
        self.tick_count.wrapping_sub(self.state_entry_tick)
    }

    // -----------------------------------------------------------------------
    // Internal
    // -----------------------------------------------------------------------

    fn transition(&mut self, next_id: StateId, ctx: &mut TagContext) {
        let next_idx = next_id as usize;

        info!(
            "Lifecycle transition: {} -> {}",
            self.table[self.current].name, self.table[next_idx].name
        );

        if let Some(exit) = self.table[self.current].on_exit {
            exit(ctx);
        }

        self.current = next_idx;
        self.state_entry_tick = self.tick_count;

        if let Some(enter) = self.table[self.current].on_enter {
            enter(ctx);
        }
    }
}
