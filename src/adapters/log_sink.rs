//! Log-based event sink adapter.
//!
//! Implements [`EventSink`] by writing structured tag events through the
//! `log` facade.  A host-forwarding adapter would implement the same trait.

use log::{info, warn};

use crate::app::events::TagEvent;
use crate::app::ports::EventSink;

/// Adapter that logs every [`TagEvent`].
#[derive(Debug, Default)]
pub struct LogEventSink {
    emitted: u32,
}

impl LogEventSink {
    pub fn new() -> Self {
        Self::default()
    }

    /// Events seen since creation.
    pub fn emitted(&self) -> u32 {
        self.emitted
    }
}

impl EventSink for LogEventSink {
    fn emit(&mut self, event: &TagEvent) {
        self.emitted = self.emitted.wrapping_add(1);
        match event {
            TagEvent::Started(state) => {
                info!("START | initial_state={state}");
            }
            TagEvent::StateChanged { from, to } => {
                info!("STATE | {from} -> {to}");
            }
            TagEvent::Provisioned(chrc) => {
                info!("PROV  | {chrc:?} written");
            }
            TagEvent::Responded { source, opcode, len } => {
                info!("RSP   | {source:?} op=0x{opcode:02X} len={len}");
            }
            TagEvent::CommandRejected {
                source,
                opcode,
                error,
            } => {
                warn!("REJ   | {source:?} op=0x{opcode:02X} {error}");
            }
            TagEvent::SyncPacketDropped(e) => {
                warn!("DROP  | sync packet: {e}");
            }
            TagEvent::Unassociated => {
                info!("UNASC | provisioned data wiped");
            }
            TagEvent::DisplayChanged { display, image } => {
                info!("DISP  | display {display} -> image {image}");
            }
        }
    }
}
