//! Access-point side of the protocol.
//!
//! ```text
//! ┌──────────────┐ push ┌──────────────────┐ service ┌────────────┐
//! │ AccessPoint  │─────▶│ GroupSyncBuffers │────────▶│ PAwR radio │
//! │ (configure,  │◀─────│  (per-group EAD) │◀────────│ (subevents)│
//! │  PAST, ECP)  │ dump └──────────────────┘ response└────────────┘
//! └──────────────┘
//! ```

pub mod client;
pub mod sync_buffer;

/// Upper bound on PAwR subevents (groups) a single AP drives.
pub const MAX_GROUPS: usize = 32;

/// Upper bound on response slots per subevent.
pub const MAX_RESPONSE_SLOTS: usize = 8;

pub use client::{AccessPoint, ApLinkPort, LinkError, TagInfo, TagRecord, WriteGate, WriteTarget};
pub use sync_buffer::{BufferStatus, GroupSyncBuffers, SlotResponse, SubeventData};
