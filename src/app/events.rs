//! Outbound application events.
//!
//! The [`TagService`](super::service::TagService) emits these through the
//! [`EventSink`](super::ports::EventSink) port.  Adapters on the other
//! side decide what to do with them (log, count, forward to a host).

use super::commands::{Characteristic, CommandSource};
use crate::error::{EadError, EcpError};
use crate::fsm::StateId;

/// Structured events emitted by the tag core.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum TagEvent {
    /// The service has started (carries initial state).
    Started(StateId),

    /// The lifecycle transitioned between states.
    StateChanged { from: StateId, to: StateId },

    /// A provisioning characteristic was accepted.
    Provisioned(Characteristic),

    /// A command was answered.  `len` is the encoded response length.
    Responded { source: CommandSource, opcode: u8, len: usize },

    /// A command was rejected with an in-band error code.
    CommandRejected { source: CommandSource, opcode: u8, error: EcpError },

    /// A sync packet failed authentication or framing and was dropped.
    SyncPacketDropped(EadError),

    /// Provisioned data was wiped.
    Unassociated,

    /// A timed display image fired.
    DisplayChanged { display: u8, image: u8 },
}
