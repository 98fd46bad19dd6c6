//! Inbound inputs to the tag service.
//!
//! These represent what the radio stack hands us: characteristic writes,
//! link state changes and received sync packets.  The
//! [`TagService`](super::service::TagService) interprets them.

use crate::fsm::context::DisconnectReason;

/// Provisioning characteristics the AP writes during configuration.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Characteristic {
    /// ESL Address (2 bytes).
    Address,
    /// AP Sync Key Material (24 bytes).
    ApSyncKey,
    /// Response Key Material (24 bytes).
    ResponseKey,
    /// Current Absolute Time (4 bytes, ms).
    AbsoluteTime,
}

impl Characteristic {
    /// Expected write length.
    pub const fn value_len(self) -> usize {
        match self {
            Self::Address => 2,
            Self::ApSyncKey | Self::ResponseKey => crate::ead::KEY_MATERIAL_LEN,
            Self::AbsoluteTime => 4,
        }
    }
}

/// Link-layer notifications from the radio stack.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum LinkEvent {
    /// An AP connected.
    Connected,
    /// Link security changed; `ok == false` means pairing failed.
    SecurityChanged { ok: bool },
    /// The AP link went down.
    Disconnected(DisconnectReason),
    /// PAwR sync established via PAST.
    SyncEstablished,
    /// PAwR sync terminated.
    SyncLost,
}

/// Where an ECP command came from.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum CommandSource {
    /// Control Point write over the AP connection.
    ControlPoint,
    /// TLV extracted from a decrypted sync packet.
    SyncPacket,
}
