//! Shared mutable context threaded through every lifecycle handler.
//!
//! `TagContext` is the "blackboard": the service writes the pending
//! [`LifecycleEvent`] and current time, state handlers read them, update
//! the bitsets and queue [`RadioAction`]s that the service then applies
//! through the radio port.

use heapless::Vec;

use crate::config::TagConfig;
use crate::ecp::BasicState;

// ---------------------------------------------------------------------------
// Configuring bits
// ---------------------------------------------------------------------------

/// Which provisioning characteristics have been written since the last
/// unassociate.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub struct ConfiguringBits(u8);

impl ConfiguringBits {
    pub const ADDRESS: u8 = 1 << 0;
    pub const AP_KEY: u8 = 1 << 1;
    pub const RESPONSE_KEY: u8 = 1 << 2;
    pub const ABS_TIME: u8 = 1 << 3;
    pub const ALL: u8 = Self::ADDRESS | Self::AP_KEY | Self::RESPONSE_KEY | Self::ABS_TIME;

    pub const fn bits(self) -> u8 {
        self.0
    }

    pub fn set(&mut self, bit: u8) {
        self.0 |= bit & Self::ALL;
    }

    pub const fn contains(self, bit: u8) -> bool {
        self.0 & bit == bit
    }

    /// All four characteristics written.
    pub const fn is_complete(self) -> bool {
        self.contains(Self::ALL)
    }

    pub fn clear(&mut self) {
        self.0 = 0;
    }
}

// ---------------------------------------------------------------------------
// Events in, actions out
// ---------------------------------------------------------------------------

/// Why the AP link went down.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum DisconnectReason {
    /// We terminated it ourselves (e.g. on entering Synchronized).
    Local,
    /// Pairing / authentication failed.
    AuthenticationFailure,
    /// Supervision timeout, remote terminate, anything else.
    Remote,
}

/// Something the lifecycle reacts to.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum LifecycleEvent {
    /// A configuring characteristic was written.
    ConfiguringBitSet,
    /// `OP_UPDATE_COMPLETE` was processed.
    UpdateComplete,
    /// PAwR sync established with our subevent.
    SyncEstablished,
    /// PAwR sync terminated.
    SyncLost,
    /// Link to the AP secured.
    SecurityEstablished,
    /// Link to the AP dropped.
    Disconnected(DisconnectReason),
    /// The armed timeout expired.
    TimeoutExpired(TimeoutKind),
}

/// Link-layer work queued by a state handler.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RadioAction {
    StartAdvertising,
    StopAdvertising,
    Disconnect,
    SubscribePast,
    StopSync,
    /// Erase provisioned data and return to Unassociated.
    Unassociate,
}

/// Which lifecycle timeout is armed.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum TimeoutKind {
    /// Synchronized with no valid sync packet for too long.
    Unsynchronized,
    /// Unsynchronized with no AP reconnect for too long.
    Unassociated,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Timeout {
    pub kind: TimeoutKind,
    pub deadline_ms: u64,
}

// ---------------------------------------------------------------------------
// TagContext
// ---------------------------------------------------------------------------

/// The shared context passed to every state handler function.
pub struct TagContext {
    // -- Timing --
    /// Monotonic milliseconds at the time of the current event.
    pub now_ms: u64,

    // -- Input --
    /// Event being processed, consumed by `on_update`.
    pub event: Option<LifecycleEvent>,

    // -- Status bitsets --
    pub configuring: ConfiguringBits,
    /// `OP_UPDATE_COMPLETE` seen since the last connect.
    pub update_complete: bool,
    pub basic_state: BasicState,

    // -- Output --
    /// Radio work for the service to apply after the transition.
    pub actions: Vec<RadioAction, 8>,
    /// Armed lifecycle timeout, if any.
    pub timeout: Option<Timeout>,

    // -- Configuration --
    pub config: TagConfig,
}

impl TagContext {
    pub fn new(config: TagConfig) -> Self {
        Self {
            now_ms: 0,
            event: None,
            configuring: ConfiguringBits::default(),
            update_complete: false,
            basic_state: BasicState::default(),
            actions: Vec::new(),
            timeout: None,
            config,
        }
    }

    pub fn queue(&mut self, action: RadioAction) {
        if self.actions.push(action).is_err() {
            log::warn!("radio action queue full, dropping {:?}", action);
        }
    }

    pub fn arm_timeout(&mut self, kind: TimeoutKind) {
        let after_ms = match kind {
            TimeoutKind::Unsynchronized => self.config.unsynchronized_timeout_ms(),
            TimeoutKind::Unassociated => self.config.unassociated_timeout_ms(),
        };
        self.timeout = Some(Timeout {
            kind,
            deadline_ms: self.now_ms + u64::from(after_ms),
        });
    }

    pub fn cancel_timeout(&mut self) {
        self.timeout = None;
    }

    /// Take the event if it matches `pred`.
    pub fn take_event_if(
        &mut self,
        pred: impl Fn(LifecycleEvent) -> bool,
    ) -> Option<LifecycleEvent> {
        match self.event {
            Some(e) if pred(e) => self.event.take(),
            _ => None,
        }
    }

    pub fn is_synchronized_bit(&self) -> bool {
        self.basic_state.contains(BasicState::SYNCHRONIZED)
    }

    /// Forget everything provisioned (keys are wiped by the service).
    pub fn wipe(&mut self) {
        self.configuring.clear();
        self.update_complete = false;
        self.basic_state = BasicState::default();
        self.timeout = None;
    }
}
