//! Access-point client: provisions tags over a connection and drives the
//! group sync buffers.
//!
//! The configuration sequence is strictly serialized.  Each characteristic
//! write is started through [`ApLinkPort::write`] and the sequence then
//! suspends on the [`WriteGate`] until the radio reports completion:
//!
//! ```text
//!  address ─▶ AP key ─▶ response key ─▶ abs time ─▶ info reads ─▶ UPDATE_COMPLETE
//! ```

use core::fmt;

use anyhow::{Context, bail};
use embassy_sync::blocking_mutex::raw::CriticalSectionRawMutex;
use embassy_sync::signal::Signal;
use embedded_hal::delay::DelayNs;
use heapless::Vec;
use log::{debug, info, warn};
use rand::RngCore;

use super::MAX_RESPONSE_SLOTS;
use super::sync_buffer::GroupSyncBuffers;
use crate::app::commands::Characteristic;
use crate::app::ports::ConfigError;
use crate::config::ApConfig;
use crate::ead::KeyMaterial;
use crate::ecp::address::EslAddress;
use crate::ecp::command::{EcpCommand, EcpFrame};
use crate::ecp::response::EcpResponse;
use crate::ecp::sync_packet::SyncPacketBuilder;
use crate::error::Error;
use crate::scheduler::clock::AbsClock;

/// Connections tracked at once.
pub const MAX_CONNECTIONS: usize = 8;

/// Responses decoded from one slot.
pub const MAX_RESPONSES_PER_SLOT: usize = 8;

pub type ConnHandle = u16;

// ───────────────────────────────────────────────────────────────
// Link port
// ───────────────────────────────────────────────────────────────

/// Failure reported by the central-role link.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum LinkError {
    NotConnected,
    /// The peer answered with an ATT error code.
    Rejected(u8),
    /// The controller could not queue the request.
    Busy,
}

impl fmt::Display for LinkError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::NotConnected => write!(f, "not connected"),
            Self::Rejected(code) => write!(f, "rejected by peer (ATT 0x{code:02X})"),
            Self::Busy => write!(f, "link busy"),
        }
    }
}

impl core::error::Error for LinkError {}

/// Where a write goes.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum WriteTarget {
    Characteristic(Characteristic),
    ControlPoint,
}

/// Read-only capability characteristics.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum InfoKind {
    Display,
    Image,
    Sensor,
    Led,
}

/// Central-role GATT operations the AP needs.
///
/// `write` only starts the operation; the radio reports its outcome
/// through [`WriteGate::complete`].
pub trait ApLinkPort {
    fn write(
        &mut self,
        conn: ConnHandle,
        target: WriteTarget,
        data: &[u8],
    ) -> Result<(), LinkError>;

    /// Read a capability characteristic into `buf`, returning its length.
    fn read_info(
        &mut self,
        conn: ConnHandle,
        kind: InfoKind,
        buf: &mut [u8],
    ) -> Result<usize, LinkError>;

    /// Transfer the periodic sync to the tag.
    fn send_past(&mut self, conn: ConnHandle) -> Result<(), LinkError>;

    fn is_connected(&self, conn: ConnHandle) -> bool;

    fn disconnect(&mut self, conn: ConnHandle);
}

/// Write-complete gate between the radio callback and the configuration
/// sequence.
pub struct WriteGate(Signal<CriticalSectionRawMutex, Result<(), LinkError>>);

impl WriteGate {
    pub const fn new() -> Self {
        Self(Signal::new())
    }

    /// Called from the radio side when the pending write finishes.
    pub fn complete(&self, result: Result<(), LinkError>) {
        self.0.signal(result);
    }

    async fn write(
        &self,
        link: &mut impl ApLinkPort,
        conn: ConnHandle,
        target: WriteTarget,
        data: &[u8],
    ) -> Result<(), LinkError> {
        self.0.reset();
        link.write(conn, target, data)?;
        self.0.wait().await
    }
}

impl Default for WriteGate {
    fn default() -> Self {
        Self::new()
    }
}

// ───────────────────────────────────────────────────────────────
// Tag records
// ───────────────────────────────────────────────────────────────

/// Capabilities read from a tag during configuration.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub struct TagInfo {
    pub displays: u8,
    pub max_image_index: u8,
    pub sensors: u8,
    pub leds: u8,
}

impl TagInfo {
    /// Display info entries are `[width u16][height u16][type]`.
    fn count_displays(raw: &[u8]) -> u8 {
        (raw.len() / 5) as u8
    }

    /// Sensor info entries start with a size byte: 0 for a 2-byte mesh
    /// property id, 1 for a 4-byte vendor id.
    fn count_sensors(raw: &[u8]) -> u8 {
        let mut n = 0u8;
        let mut at = 0;
        while let Some(&size) = raw.get(at) {
            let step = if size == 0 { 3 } else { 5 };
            if at + step > raw.len() {
                break;
            }
            at += step;
            n = n.saturating_add(1);
        }
        n
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct TagRecord {
    pub conn: ConnHandle,
    pub address: EslAddress,
    pub response_key: KeyMaterial,
    /// Configured but not yet handed the periodic sync.
    pub past_needed: bool,
    pub info: TagInfo,
}

impl TagRecord {
    fn new(conn: ConnHandle) -> Self {
        Self {
            conn,
            address: EslAddress::UNASSIGNED,
            response_key: KeyMaterial::zeroed(),
            past_needed: false,
            info: TagInfo::default(),
        }
    }
}

/// Responses decoded from one slot of a group.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct TagResponses {
    pub slot: u8,
    pub responses: Vec<EcpResponse, MAX_RESPONSES_PER_SLOT>,
}

// ───────────────────────────────────────────────────────────────
// Access point
// ───────────────────────────────────────────────────────────────

pub struct AccessPoint {
    config: ApConfig,
    buffers: GroupSyncBuffers,
    tags: Vec<TagRecord, MAX_CONNECTIONS>,
    clock: AbsClock,
}

impl AccessPoint {
    pub fn new(
        config: ApConfig,
        ap_key: KeyMaterial,
        rng: &mut impl RngCore,
    ) -> Result<Self, ConfigError> {
        let buffers = GroupSyncBuffers::new(&config, ap_key, rng)?;
        Ok(Self {
            config,
            buffers,
            tags: Vec::new(),
            clock: AbsClock::new(),
        })
    }

    pub fn config(&self) -> &ApConfig {
        &self.config
    }

    pub fn buffers(&self) -> &GroupSyncBuffers {
        &self.buffers
    }

    pub fn set_abs_time(&mut self, now_ms: u64, abs_ms: u32) {
        self.clock.set(now_ms, abs_ms);
    }

    pub fn abs_time(&self, now_ms: u64) -> u32 {
        self.clock.now(now_ms)
    }

    pub fn tag(&self, conn: ConnHandle) -> Option<&TagRecord> {
        self.tags.iter().find(|t| t.conn == conn)
    }

    pub fn needs_past(&self, conn: ConnHandle) -> bool {
        self.tag(conn).is_some_and(|t| t.past_needed)
    }

    fn record_mut(&mut self, conn: ConnHandle) -> anyhow::Result<&mut TagRecord> {
        if self.tag(conn).is_none() {
            self.tags
                .push(TagRecord::new(conn))
                .map_err(|_| anyhow::anyhow!("connection table full ({MAX_CONNECTIONS})"))?;
        }
        self.tags
            .iter_mut()
            .find(|t| t.conn == conn)
            .context("tag record vanished")
    }

    /// Response slot a tag answers in when addressed first in a packet.
    fn slot_for(&self, address: EslAddress) -> Option<u8> {
        address
            .esl_id()
            .checked_sub(self.config.default_esl_id)
            .filter(|&s| s < self.config.response_slots)
    }

    /// Run the full configuration sequence against a connected tag.
    pub async fn configure_tag(
        &mut self,
        conn: ConnHandle,
        address: EslAddress,
        link: &mut impl ApLinkPort,
        gate: &WriteGate,
        now_ms: u64,
        rng: &mut impl RngCore,
    ) -> anyhow::Result<()> {
        let ap_key = self.buffers.ap_key();
        let abs_now = self.clock.now(now_ms);
        let slot = self.slot_for(address);

        let record = self.record_mut(conn)?;
        record.address = address;
        if record.response_key.is_zero() {
            record.response_key = KeyMaterial::generate(rng);
        }
        let rsp_key = record.response_key;

        info!("Configuring tag {address} on conn {conn}");

        let char_write = |c| WriteTarget::Characteristic(c);
        gate.write(link, conn, char_write(Characteristic::Address), &address.to_wire())
            .await
            .context("writing ESL address")?;
        gate.write(link, conn, char_write(Characteristic::ApSyncKey), &ap_key.to_wire())
            .await
            .context("writing AP sync key")?;
        gate.write(link, conn, char_write(Characteristic::ResponseKey), &rsp_key.to_wire())
            .await
            .context("writing response key")?;

        match slot {
            Some(s) => {
                self.buffers
                    .set_response_key(address.group_id(), s, rsp_key)
                    .map_err(Error::from)
                    .context("installing response key")?;
            }
            None => warn!("Tag {address}: ESL id outside the response slot range"),
        }

        gate.write(link, conn, char_write(Characteristic::AbsoluteTime), &abs_now.to_le_bytes())
            .await
            .context("writing absolute time")?;

        let info = read_info(link, conn).context("reading tag capabilities")?;
        debug!("Tag {address}: {info:?}");

        let update = EcpFrame::new(address.esl_id(), EcpCommand::UpdateComplete).encode();
        gate.write(link, conn, WriteTarget::ControlPoint, &update)
            .await
            .context("sending UPDATE_COMPLETE")?;

        let record = self.record_mut(conn)?;
        record.info = info;
        record.past_needed = true;
        info!("Tag {address} configured");
        Ok(())
    }

    /// Re-provision a tag that reconnected while unsynchronized and hand it
    /// the periodic sync.  The tag drops the link once it syncs; if it is
    /// still connected after `auto_past_retry` attempts it is disconnected.
    pub async fn past_unsynced_tag(
        &mut self,
        conn: ConnHandle,
        address: EslAddress,
        link: &mut impl ApLinkPort,
        gate: &WriteGate,
        delay: &mut impl DelayNs,
        now_ms: u64,
        rng: &mut impl RngCore,
    ) -> anyhow::Result<()> {
        self.configure_tag(conn, address, link, gate, now_ms, rng)
            .await
            .context("re-provisioning unsynchronized tag")?;

        let retries = self.config.auto_past_retry;
        for attempt in 0..retries {
            if !link.is_connected(conn) {
                info!("Tag {address} synchronized after {attempt} PAST attempt(s)");
                self.on_disconnected(conn);
                return Ok(());
            }
            link.send_past(conn)
                .with_context(|| format!("PAST attempt {}", attempt + 1))?;
            delay.delay_ms(self.config.pawr_interval_ms);
        }
        if !link.is_connected(conn) {
            self.on_disconnected(conn);
            return Ok(());
        }

        warn!("Tag {address} ignored {retries} PAST attempts, disconnecting");
        link.disconnect(conn);
        self.on_disconnected(conn);
        bail!("tag {address} did not synchronize after {retries} PAST attempts")
    }

    /// Tell a connected tag to forget its provisioning.
    pub async fn unassociate_tag(
        &mut self,
        conn: ConnHandle,
        link: &mut impl ApLinkPort,
        gate: &WriteGate,
    ) -> anyhow::Result<()> {
        let address = self
            .tag(conn)
            .map(|t| t.address)
            .with_context(|| format!("no tag on conn {conn}"))?;

        let frame = EcpFrame::new(address.esl_id(), EcpCommand::Unassociate).encode();
        gate.write(link, conn, WriteTarget::ControlPoint, &frame)
            .await
            .context("sending UNASSOCIATE")?;

        if let Some(s) = self.slot_for(address) {
            let _ = self.buffers.clear_response_key(address.group_id(), s);
        }
        self.tags.retain(|t| t.conn != conn);
        info!("Tag {address} unassociated");
        Ok(())
    }

    /// Link to `conn` went down.
    pub fn on_disconnected(&mut self, conn: ConnHandle) {
        if let Some(t) = self.tags.iter_mut().find(|t| t.conn == conn) {
            t.response_key = KeyMaterial::zeroed();
            t.past_needed = false;
        }
        self.tags.retain(|t| t.conn != conn);
    }

    /// Decode a Control Point notification.
    pub fn on_control_point_notify(&self, bytes: &[u8]) -> Option<EcpResponse> {
        EcpResponse::decode(bytes).map(|(rsp, _)| rsp)
    }

    // ── Sync path ─────────────────────────────────────────────

    /// Pack `frames` into one sync packet for `group` and queue it.
    ///
    /// Returns the response slot of each frame, in order.
    pub fn send_sync(
        &self,
        group: u8,
        frames: &[EcpFrame],
    ) -> Result<Vec<u8, MAX_RESPONSE_SLOTS>, Error> {
        let mut builder = SyncPacketBuilder::new(group);
        let mut slots = Vec::new();
        for frame in frames {
            let slot = builder.push(&frame.encode())?;
            if slot < self.config.response_slots {
                let _ = slots.push(slot);
            }
        }
        self.buffers.push(group, builder.as_slice())?;
        debug!("Group {group}: queued {} command(s)", frames.len());
        Ok(slots)
    }

    /// Consume the responses of a RESP_FULL group.
    pub fn collect_responses(
        &self,
        group: u8,
    ) -> Result<Vec<TagResponses, MAX_RESPONSE_SLOTS>, Error> {
        let mut out = Vec::new();
        for dumped in self.buffers.dump(group)? {
            let Some(payload) = dumped.payload else {
                continue;
            };
            let mut responses = Vec::new();
            for rsp in EcpResponse::iter(&payload) {
                if responses.push(rsp).is_err() {
                    warn!("Group {group} slot {}: extra responses dropped", dumped.slot);
                    break;
                }
            }
            if out
                .push(TagResponses {
                    slot: dumped.slot,
                    responses,
                })
                .is_err()
            {
                warn!("Group {group}: slot {} response dropped, list full", dumped.slot);
            }
        }
        Ok(out)
    }
}

fn read_info(link: &mut impl ApLinkPort, conn: ConnHandle) -> Result<TagInfo, LinkError> {
    let mut buf = [0u8; 64];
    let mut info = TagInfo::default();

    let n = read_clamped(link, conn, InfoKind::Display, &mut buf)?;
    info.displays = TagInfo::count_displays(&buf[..n]);

    let n = read_clamped(link, conn, InfoKind::Image, &mut buf)?;
    info.max_image_index = buf[..n].first().copied().unwrap_or(0);

    let n = read_clamped(link, conn, InfoKind::Sensor, &mut buf)?;
    info.sensors = TagInfo::count_sensors(&buf[..n]);

    let n = read_clamped(link, conn, InfoKind::Led, &mut buf)?;
    info.leds = n as u8;

    Ok(info)
}

/// The reported length is capped at the buffer size.
fn read_clamped(
    link: &mut impl ApLinkPort,
    conn: ConnHandle,
    kind: InfoKind,
    buf: &mut [u8],
) -> Result<usize, LinkError> {
    let n = link.read_info(conn, kind, buf)?;
    if n > buf.len() {
        warn!("{:?} info claims {} bytes, buffer holds {}", kind, n, buf.len());
    }
    Ok(n.min(buf.len()))
}
