//! Radio event queue.
//!
//! Radio callbacks run in a time-critical context and must never block on
//! the command path.  They post [`RadioEvent`]s into a bounded
//! `embassy-sync` channel and return; the command task drains the channel
//! and feeds each event to [`TagService::handle_radio_event`].
//!
//! ```text
//! ┌────────────────┐  RadioEvent  ┌──────────────────┐
//! │ radio callback │─────────────▶│   command task   │
//! │ (never blocks) │   try_send   │  (drain → tag)   │
//! └────────────────┘              └──────────────────┘
//! ```
//!
//! [`TagService::handle_radio_event`]: crate::app::service::TagService::handle_radio_event

use embassy_sync::blocking_mutex::raw::CriticalSectionRawMutex;
use embassy_sync::channel::Channel;
use heapless::Vec;
use log::warn;

use crate::app::commands::{Characteristic, LinkEvent};
use crate::app::ports::{EventSink, TagPorts};
use crate::app::service::TagService;
use crate::ead::{Envelope, KEY_MATERIAL_LEN};
use crate::ecp::command::TlvBuf;

/// Channel depth for radio events.
pub const RADIO_EVENT_DEPTH: usize = 16;

/// Something the radio stack handed us.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum RadioEvent {
    Link(LinkEvent),
    /// Write to a provisioning characteristic.
    Write {
        chrc: Characteristic,
        data: Vec<u8, KEY_MATERIAL_LEN>,
    },
    /// Control Point write.
    ControlPoint(TlvBuf),
    /// Encrypted payload received on our PAwR subevent.
    SyncPacket(Envelope),
}

impl RadioEvent {
    /// Build a characteristic write, `None` if `data` is longer than any
    /// provisioning value.
    pub fn write(chrc: Characteristic, data: &[u8]) -> Option<Self> {
        Some(Self::Write {
            chrc,
            data: Vec::from_slice(data).ok()?,
        })
    }

    pub fn control_point(bytes: &[u8]) -> Option<Self> {
        Some(Self::ControlPoint(Vec::from_slice(bytes).ok()?))
    }

    pub fn sync_packet(envelope: &[u8]) -> Option<Self> {
        Some(Self::SyncPacket(Vec::from_slice(envelope).ok()?))
    }
}

pub type RadioEventChannel = Channel<CriticalSectionRawMutex, RadioEvent, RADIO_EVENT_DEPTH>;

/// Process-wide queue for single-tag firmware builds.
pub static RADIO_EVENTS: RadioEventChannel = Channel::new();

/// Post from radio context.  Returns `false` if the queue is full and the
/// event was dropped.
pub fn post(channel: &RadioEventChannel, event: RadioEvent) -> bool {
    match channel.try_send(event) {
        Ok(()) => true,
        Err(_) => {
            warn!("Radio event queue full, event dropped");
            false
        }
    }
}

/// Drain every pending event into `tag`.  Returns how many were handled.
pub fn drain(
    channel: &RadioEventChannel,
    tag: &mut TagService,
    now_ms: u64,
    io: &mut impl TagPorts,
    sink: &mut impl EventSink,
) -> usize {
    let mut handled = 0;
    while let Ok(event) = channel.try_receive() {
        tag.handle_radio_event(&event, now_ms, io, sink);
        handled += 1;
    }
    handled
}
