//! Radio adapter: forwards lifecycle requests to the radio task.
//!
//! The command task must not call into the BLE controller directly.  Each
//! [`RadioPort`] call becomes a [`RadioCommand`] posted to a bounded
//! channel; the radio task drains it and talks to the controller.

use embassy_sync::blocking_mutex::raw::CriticalSectionRawMutex;
use embassy_sync::channel::Channel;
use heapless::Vec;
use log::warn;

use crate::app::ports::RadioPort;
use crate::ead::Envelope;
use crate::ecp::command::TlvBuf;

pub const RADIO_COMMAND_DEPTH: usize = 8;

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum RadioCommand {
    StartAdvertising,
    StopAdvertising,
    Disconnect,
    SubscribePast,
    StopSync,
    Notify(TlvBuf),
    PawrResponse { slot: u8, data: Envelope },
}

pub type RadioCommandChannel = Channel<CriticalSectionRawMutex, RadioCommand, RADIO_COMMAND_DEPTH>;

/// [`RadioPort`] that posts into a [`RadioCommandChannel`].
pub struct ChannelRadio<'a> {
    channel: &'a RadioCommandChannel,
    dropped: u32,
}

impl<'a> ChannelRadio<'a> {
    pub fn new(channel: &'a RadioCommandChannel) -> Self {
        Self { channel, dropped: 0 }
    }

    /// Commands lost to a full channel.
    pub fn dropped(&self) -> u32 {
        self.dropped
    }

    fn post(&mut self, cmd: RadioCommand) {
        if self.channel.try_send(cmd).is_err() {
            self.dropped = self.dropped.wrapping_add(1);
            warn!("Radio command queue full, command dropped");
        }
    }
}

impl RadioPort for ChannelRadio<'_> {
    fn start_advertising(&mut self) {
        self.post(RadioCommand::StartAdvertising);
    }

    fn stop_advertising(&mut self) {
        self.post(RadioCommand::StopAdvertising);
    }

    fn disconnect(&mut self) {
        self.post(RadioCommand::Disconnect);
    }

    fn subscribe_past(&mut self) {
        self.post(RadioCommand::SubscribePast);
    }

    fn stop_sync(&mut self) {
        self.post(RadioCommand::StopSync);
    }

    fn notify_control_point(&mut self, response: &[u8]) {
        match Vec::from_slice(response) {
            Ok(buf) => self.post(RadioCommand::Notify(buf)),
            Err(()) => warn!("Control point response of {} bytes dropped", response.len()),
        }
    }

    fn set_pawr_response(&mut self, slot: u8, data: &[u8]) {
        match Vec::from_slice(data) {
            Ok(data) => self.post(RadioCommand::PawrResponse { slot, data }),
            Err(()) => warn!("PAwR response of {} bytes dropped", data.len()),
        }
    }
}
