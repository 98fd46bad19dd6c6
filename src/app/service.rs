//! Tag service: the hexagonal core of one ESL tag.
//!
//! [`TagService`] owns the lifecycle FSM, its context, the timed scheduler
//! and the provisioned keys.  All I/O flows through port traits injected
//! at call sites, so several tags can run side by side in one test.
//!
//! ```text
//!  characteristic writes ─┐
//!  Control Point ─────────┤      ┌──────────────────────────┐ ──▶ RadioPort
//!  sync packets (EAD) ────┼────▶ │        TagService        │ ──▶ HardwarePort
//!  link events ───────────┤      │ FSM · processor · timers │ ──▶ SettingsPort
//!  poll(now) ─────────────┘      └──────────────────────────┘ ──▶ EventSink
//! ```

use heapless::Vec;
use log::{debug, info, warn};
use rand::RngCore;
use serde::de::DeserializeOwned;
use serde::Serialize;

use crate::config::TagConfig;
use crate::ead::{self, Direction, EadCodec, KeyMaterial};
use crate::ecp::response::SensorData;
use crate::ecp::{BasicState, EcpResponse, EslAddress, ResponseAccumulator, SyncPacket};
use crate::error::{EcpError, WriteError};
use crate::events::RadioEvent;
use crate::fsm::context::{
    ConfiguringBits, LifecycleEvent, RadioAction, TagContext, TimeoutKind,
};
use crate::fsm::states::build_state_table;
use crate::fsm::{Fsm, StateId};
use crate::scheduler::{LedOutput, TimedOutput, TimedScheduler};

use super::commands::{Characteristic, CommandSource, LinkEvent};
use super::events::TagEvent;
use super::ports::{ConfigError, EventSink, HardwarePort, SettingsPort, TagPorts};
use super::processor::{self, Effect, TagView};

/// Settings namespace holding provisioned data.
pub const SETTINGS_NAMESPACE: &str = "esl";

/// Keys inside [`SETTINGS_NAMESPACE`].
pub mod settings_key {
    pub const ADDRESS: &str = "addr";
    pub const AP_KEY: &str = "ap_key";
    pub const RESPONSE_KEY: &str = "rsp_key";
    pub const ABS_TIME_SET: &str = "abs_set";

    pub const ALL: [&str; 4] = [ADDRESS, AP_KEY, RESPONSE_KEY, ABS_TIME_SET];
}

/// Work that must wait until the response has been handed to the radio.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum Deferred {
    Unassociate,
    FactoryReset,
}

// ───────────────────────────────────────────────────────────────
// TagService
// ───────────────────────────────────────────────────────────────

pub struct TagService {
    fsm: Fsm,
    ctx: TagContext,
    scheduler: TimedScheduler,
    address: EslAddress,
    ap_key: KeyMaterial,
    /// Response-Key codec; its randomizers carry the tag→AP direction.
    response: EadCodec,
    busy: bool,
    connected: bool,
    deferred: Option<Deferred>,
}

impl TagService {
    /// Construct the service.  Does **not** start the FSM; call
    /// [`start`](Self::start) next.
    pub fn new(config: TagConfig, rng: &mut impl RngCore) -> Result<Self, ConfigError> {
        config.validate()?;
        let scheduler = TimedScheduler::new(config.led_count, config.display_count);
        Ok(Self {
            fsm: Fsm::new(build_state_table(), StateId::Unassociated),
            ctx: TagContext::new(config),
            scheduler,
            address: EslAddress::UNASSIGNED,
            ap_key: KeyMaterial::zeroed(),
            response: EadCodec::new(KeyMaterial::zeroed(), Direction::TagToAp, rng),
            busy: false,
            connected: false,
            deferred: None,
        })
    }

    // ── Lifecycle ─────────────────────────────────────────────

    /// Initialise hardware, restore provisioned data and enter the initial
    /// state.  A tag that was fully provisioned before reboot resumes in
    /// Unsynchronized.
    pub fn start(&mut self, now_ms: u64, io: &mut impl TagPorts, sink: &mut impl EventSink) {
        self.ctx.now_ms = now_ms;
        if let Err(e) = io.init() {
            warn!("Hardware init failed: {}", e);
        }

        if self.ctx.config.forget_provisioned_data {
            info!("Discarding provisioned data on boot");
            Self::erase_settings(io);
        } else {
            self.restore(&*io);
        }

        self.fsm.start(&mut self.ctx);
        if self.ctx.configuring.is_complete() {
            self.fsm.force_transition(StateId::Unsynchronized, &mut self.ctx);
        }
        self.apply_actions(io, sink);

        sink.emit(&TagEvent::Started(self.fsm.current_state()));
        info!(
            "Tag started in {} as {}",
            self.fsm.current_state(),
            self.address
        );
    }

    /// Wipe provisioned data and return to Unassociated.
    pub fn unassociate(&mut self, io: &mut impl TagPorts, sink: &mut impl EventSink) {
        if self.connected {
            io.disconnect();
        }
        self.wipe(io, sink);
        let from = self.fsm.current_state();
        self.fsm.force_transition(StateId::Unassociated, &mut self.ctx);
        self.apply_actions(io, sink);
        self.emit_transition(from, sink);
    }

    // ── Inputs ────────────────────────────────────────────────

    /// Route one queued radio event.
    pub fn handle_radio_event(
        &mut self,
        event: &RadioEvent,
        now_ms: u64,
        io: &mut impl TagPorts,
        sink: &mut impl EventSink,
    ) {
        match event {
            RadioEvent::Link(link) => self.handle_link_event(*link, now_ms, io, sink),
            RadioEvent::Write { chrc, data } => {
                if let Err(e) = self.write_characteristic(*chrc, data, now_ms, io, sink) {
                    warn!("{:?} write rejected: {}", chrc, e);
                }
            }
            RadioEvent::ControlPoint(bytes) => {
                self.handle_control_point(bytes, now_ms, io, sink);
            }
            RadioEvent::SyncPacket(envelope) => {
                self.handle_sync_packet(envelope, now_ms, io, sink);
            }
        }
    }

    /// Accept a write to one of the provisioning characteristics.
    pub fn write_characteristic(
        &mut self,
        chrc: Characteristic,
        data: &[u8],
        now_ms: u64,
        io: &mut impl TagPorts,
        sink: &mut impl EventSink,
    ) -> Result<(), WriteError> {
        if data.len() != chrc.value_len() {
            return Err(WriteError::InvalidLength);
        }

        let bit = match chrc {
            Characteristic::Address => {
                let address = EslAddress::from_wire(data)?;
                self.address = address;
                Self::persist(io, settings_key::ADDRESS, &address);
                ConfiguringBits::ADDRESS
            }
            Characteristic::ApSyncKey => {
                self.ap_key = KeyMaterial::from_wire(data)?;
                Self::persist(io, settings_key::AP_KEY, &self.ap_key);
                ConfiguringBits::AP_KEY
            }
            Characteristic::ResponseKey => {
                let key = KeyMaterial::from_wire(data)?;
                self.response.rekey(key);
                Self::persist(io, settings_key::RESPONSE_KEY, &key);
                ConfiguringBits::RESPONSE_KEY
            }
            Characteristic::AbsoluteTime => {
                let raw: [u8; 4] = data.try_into().map_err(|_| WriteError::InvalidLength)?;
                self.scheduler.set_abs_time(now_ms, u32::from_le_bytes(raw));
                Self::persist(io, settings_key::ABS_TIME_SET, &true);
                ConfiguringBits::ABS_TIME
            }
        };

        self.ctx.configuring.set(bit);
        sink.emit(&TagEvent::Provisioned(chrc));
        self.dispatch(LifecycleEvent::ConfiguringBitSet, now_ms, io, sink);
        Ok(())
    }

    /// Handle a Control Point write.  The response (if any) is notified
    /// individually and also returned.
    pub fn handle_control_point(
        &mut self,
        bytes: &[u8],
        now_ms: u64,
        io: &mut impl TagPorts,
        sink: &mut impl EventSink,
    ) -> Option<EcpResponse> {
        let rsp = self.process(bytes, CommandSource::ControlPoint, now_ms, io, sink);
        if let Some(r) = &rsp {
            io.notify_control_point(&r.encode());
        }
        self.run_deferred(io, sink);
        rsp
    }

    /// Handle an encrypted sync packet received on our subevent.
    ///
    /// Returns the response slot used, if a response was queued.
    pub fn handle_sync_packet(
        &mut self,
        envelope: &[u8],
        now_ms: u64,
        io: &mut impl TagPorts,
        sink: &mut impl EventSink,
    ) -> Option<u8> {
        if !self.ctx.is_synchronized_bit() {
            debug!("Sync packet while not synchronized, dropping");
            return None;
        }

        let payload = match ead::open(envelope, &self.ap_key) {
            Ok(p) => p,
            Err(e) => {
                warn!("Sync packet dropped: {}", e);
                sink.emit(&TagEvent::SyncPacketDropped(e));
                return None;
            }
        };

        let packet = SyncPacket::parse(&payload)?;
        if packet.group_id() != self.address.group_id() {
            debug!(
                "Sync packet for group {} (ours is {})",
                packet.group_id(),
                self.address.group_id()
            );
            return None;
        }

        if self.fsm.current_state() == StateId::Synchronized {
            self.ctx.now_ms = now_ms;
            self.ctx.arm_timeout(TimeoutKind::Unsynchronized);
        }

        let slot = packet.response_slot(self.address.esl_id());
        let mut acc = ResponseAccumulator::new();

        for tlv in packet.tlvs() {
            if !self.address.accepts(tlv.esl_id) {
                continue;
            }
            // Broadcast answers ride along; they are only sent with a slot.
            if let Some(r) = self.process(tlv.bytes, CommandSource::SyncPacket, now_ms, io, sink) {
                acc.push_response(&r);
            }
        }

        let queued = match slot {
            Some(slot) if !acc.is_empty() => match self.response.encrypt(acc.as_slice()) {
                Ok(env) => {
                    io.set_pawr_response(slot, &env);
                    Some(slot)
                }
                Err(e) => {
                    warn!("Response encryption failed: {}", e);
                    None
                }
            },
            _ => None,
        };

        self.run_deferred(io, sink);
        queued
    }

    /// React to a link-layer notification.
    pub fn handle_link_event(
        &mut self,
        event: LinkEvent,
        now_ms: u64,
        io: &mut impl TagPorts,
        sink: &mut impl EventSink,
    ) {
        match event {
            LinkEvent::Connected => {
                self.connected = true;
                self.ctx.update_complete = false;
                info!("AP connected");
            }
            LinkEvent::SecurityChanged { ok: true } => {
                self.dispatch(LifecycleEvent::SecurityEstablished, now_ms, io, sink);
            }
            LinkEvent::SecurityChanged { ok: false } => {
                if self.fsm.current_state() == StateId::Synchronized {
                    warn!("Pairing failed while synchronized, dropping link");
                    io.disconnect();
                }
            }
            LinkEvent::Disconnected(reason) => {
                self.connected = false;
                self.dispatch(LifecycleEvent::Disconnected(reason), now_ms, io, sink);
            }
            LinkEvent::SyncEstablished => {
                self.dispatch(LifecycleEvent::SyncEstablished, now_ms, io, sink);
            }
            LinkEvent::SyncLost => {
                self.dispatch(LifecycleEvent::SyncLost, now_ms, io, sink);
            }
        }
    }

    /// Fire expired lifecycle timeouts and due timed work.
    pub fn poll(&mut self, now_ms: u64, io: &mut impl TagPorts, sink: &mut impl EventSink) {
        if let Some(t) = self.ctx.timeout.filter(|t| now_ms >= t.deadline_ms) {
            self.ctx.timeout = None;
            self.dispatch(LifecycleEvent::TimeoutExpired(t.kind), now_ms, io, sink);
        }

        for out in self.scheduler.poll(now_ms) {
            match out {
                TimedOutput::Led(led) => Self::drive_led(io, led),
                TimedOutput::Display { index, image } => {
                    if let Err(e) = io.display_control(index, image, true) {
                        warn!("Display {} timed image {} failed: {}", index, image, e);
                    }
                    sink.emit(&TagEvent::DisplayChanged {
                        display: index,
                        image,
                    });
                }
            }
        }
    }

    /// Earliest monotonic time at which [`poll`](Self::poll) has work.
    pub fn next_deadline(&self) -> Option<u64> {
        let timeout = self.ctx.timeout.map(|t| t.deadline_ms);
        match (timeout, self.scheduler.next_deadline()) {
            (Some(a), Some(b)) => Some(a.min(b)),
            (a, b) => a.or(b),
        }
    }

    // ── Application hooks ─────────────────────────────────────

    pub fn set_service_needed(&mut self, needed: bool) {
        self.ctx.basic_state.set(BasicState::SERVICE_NEEDED, needed);
    }

    /// Answer the next addressed command with `ERR_RETRY`.
    pub fn set_busy(&mut self) {
        self.busy = true;
    }

    // ── Queries ───────────────────────────────────────────────

    pub fn state(&self) -> StateId {
        self.fsm.current_state()
    }

    pub fn address(&self) -> EslAddress {
        self.address
    }

    pub fn configuring(&self) -> ConfiguringBits {
        self.ctx.configuring
    }

    pub fn is_update_complete(&self) -> bool {
        self.ctx.update_complete
    }

    pub fn is_connected(&self) -> bool {
        self.connected
    }

    pub fn is_busy(&self) -> bool {
        self.busy
    }

    pub fn scheduler(&self) -> &TimedScheduler {
        &self.scheduler
    }

    pub fn config(&self) -> &TagConfig {
        &self.ctx.config
    }

    /// Basic state with the LED / display bits refreshed from the scheduler.
    pub fn basic_state(&self) -> BasicState {
        let mut s = self.ctx.basic_state;
        s.set(BasicState::ACTIVE_LED, self.scheduler.any_led_active());
        s.set(BasicState::PENDING_LED_UPDATE, self.scheduler.any_led_pending());
        s.set(
            BasicState::PENDING_DISPLAY_UPDATE,
            self.scheduler.any_display_pending(),
        );
        s
    }

    // ── Command pipeline ──────────────────────────────────────

    fn view(&self, now_ms: u64) -> TagView<'_> {
        TagView {
            address: self.address,
            state: self.fsm.current_state(),
            config: &self.ctx.config,
            scheduler: &self.scheduler,
            now_ms,
        }
    }

    fn process(
        &mut self,
        bytes: &[u8],
        source: CommandSource,
        now_ms: u64,
        io: &mut impl TagPorts,
        sink: &mut impl EventSink,
    ) -> Option<EcpResponse> {
        let opcode = bytes.first().copied().unwrap_or_default();

        let validated = processor::validate(bytes, &self.view(now_ms));
        let planned = match validated {
            Err(e) => Err(e),
            Ok(_) if self.busy => {
                self.busy = false;
                Err(EcpError::Retry)
            }
            Ok(cmd) => processor::plan(cmd, source, &self.view(now_ms), &*io),
        };

        let rsp = match planned {
            Ok(effect) => self.apply(effect, now_ms, io, sink),
            Err(error) => {
                warn!("ECP 0x{:02X} via {:?} rejected: {}", opcode, source, error);
                sink.emit(&TagEvent::CommandRejected {
                    source,
                    opcode,
                    error,
                });
                return Some(EcpResponse::Error(error));
            }
        };

        if let Some(r) = &rsp {
            sink.emit(&TagEvent::Responded {
                source,
                opcode,
                len: r.encode().len(),
            });
        }
        rsp
    }

    fn apply(
        &mut self,
        effect: Effect,
        now_ms: u64,
        io: &mut impl TagPorts,
        sink: &mut impl EventSink,
    ) -> Option<EcpResponse> {
        Some(match effect {
            Effect::BasicState => EcpResponse::BasicState(self.basic_state()),
            Effect::ServiceReset => {
                self.set_service_needed(false);
                EcpResponse::BasicState(self.basic_state())
            }
            Effect::Unassociate => {
                let mut s = self.basic_state();
                s.set(BasicState::SYNCHRONIZED, false);
                self.deferred = Some(Deferred::Unassociate);
                EcpResponse::BasicState(s)
            }
            Effect::FactoryReset => {
                self.deferred = Some(Deferred::FactoryReset);
                return None;
            }
            Effect::UpdateComplete => {
                self.ctx.update_complete = true;
                self.dispatch(LifecycleEvent::UpdateComplete, now_ms, io, sink);
                EcpResponse::BasicState(self.basic_state())
            }
            Effect::ReadSensor { index } => Self::read_sensor(io, index),
            Effect::RefreshDisplay { display, image } | Effect::ShowImage { display, image } => {
                if let Err(e) = io.display_control(display, image, true) {
                    warn!("Display {} image {} failed: {}", display, image, e);
                    return Some(EcpResponse::Error(EcpError::Unspecified));
                }
                self.scheduler.set_display_image(display, image);
                EcpResponse::DisplayState { display, image }
            }
            Effect::ScheduleDisplay {
                display,
                image,
                abs_time,
                fire_at,
            } => {
                self.scheduler.schedule_display(display, image, abs_time, fire_at);
                EcpResponse::DisplayState { display, image }
            }
            Effect::CancelDisplay { display, image } => {
                self.scheduler.cancel_display(display);
                EcpResponse::DisplayState { display, image }
            }
            Effect::StartLed(led) => {
                if let Some(out) = self.scheduler.start_led(led, now_ms) {
                    Self::drive_led(io, out);
                }
                EcpResponse::LedState { index: led.index }
            }
            Effect::ScheduleLed {
                led,
                abs_time,
                fire_at,
            } => {
                self.scheduler.schedule_led(led, abs_time, fire_at);
                EcpResponse::LedState { index: led.index }
            }
            Effect::CancelLed { led } => {
                if let Some(off) = self.scheduler.cancel_led(led.index) {
                    Self::drive_led(io, off);
                }
                EcpResponse::LedState { index: led.index }
            }
            Effect::Vendor { opcode, params } => {
                let mut echo = Vec::new();
                let _ = echo.push(self.address.esl_id());
                let _ = echo.extend_from_slice(&params);
                EcpResponse::Vendor {
                    opcode,
                    params: echo,
                }
            }
        })
    }

    fn read_sensor(hw: &mut impl HardwarePort, index: u8) -> EcpResponse {
        let mut buf = [0u8; 15];
        match hw.sensor_read(index, &mut buf) {
            Ok(n) => {
                let mut data = SensorData::new();
                let _ = data.extend_from_slice(&buf[..n.min(buf.len())]);
                EcpResponse::SensorData { index, data }
            }
            Err(super::ports::HwError::Busy) => {
                debug!("Sensor {} busy, measurement started", index);
                EcpResponse::Error(EcpError::Retry)
            }
            Err(e) => {
                warn!("Sensor {} read failed: {}", index, e);
                EcpResponse::Error(EcpError::Unspecified)
            }
        }
    }

    fn run_deferred(&mut self, io: &mut impl TagPorts, sink: &mut impl EventSink) {
        match self.deferred.take() {
            Some(Deferred::Unassociate) => {
                info!("Unassociate requested by AP");
                self.unassociate(io, sink);
            }
            Some(Deferred::FactoryReset) => {
                info!("Factory reset requested by AP");
                if let Err(e) = io.delete_all() {
                    warn!("Image erase failed: {}", e);
                }
                io.stop_sync();
                self.unassociate(io, sink);
            }
            None => {}
        }
    }

    // ── Lifecycle plumbing ────────────────────────────────────

    fn dispatch(
        &mut self,
        event: LifecycleEvent,
        now_ms: u64,
        io: &mut impl TagPorts,
        sink: &mut impl EventSink,
    ) {
        self.ctx.now_ms = now_ms;
        let from = self.fsm.current_state();
        self.fsm.dispatch(event, &mut self.ctx);
        self.apply_actions(io, sink);
        self.emit_transition(from, sink);
    }

    fn emit_transition(&self, from: StateId, sink: &mut impl EventSink) {
        let to = self.fsm.current_state();
        if to != from {
            sink.emit(&TagEvent::StateChanged { from, to });
        }
    }

    fn apply_actions(&mut self, io: &mut impl TagPorts, sink: &mut impl EventSink) {
        let actions = core::mem::take(&mut self.ctx.actions);
        for action in actions {
            debug!("Radio action {:?}", action);
            match action {
                RadioAction::StartAdvertising => io.start_advertising(),
                RadioAction::StopAdvertising => io.stop_advertising(),
                RadioAction::Disconnect => {
                    if self.connected {
                        io.disconnect();
                    }
                }
                RadioAction::SubscribePast => io.subscribe_past(),
                RadioAction::StopSync => io.stop_sync(),
                RadioAction::Unassociate => self.wipe(io, sink),
            }
        }
    }

    /// Forget keys, address and timed work.  Lifecycle state is left to
    /// the caller.
    fn wipe(&mut self, io: &mut impl TagPorts, sink: &mut impl EventSink) {
        info!("Wiping provisioned data for {}", self.address);
        self.address = EslAddress::UNASSIGNED;
        self.ap_key = KeyMaterial::zeroed();
        self.response.rekey(KeyMaterial::zeroed());
        self.busy = false;
        Self::erase_settings(io);
        for off in self.scheduler.reset() {
            Self::drive_led(io, off);
        }
        self.ctx.wipe();
        sink.emit(&TagEvent::Unassociated);
    }

    fn drive_led(hw: &mut impl HardwarePort, out: LedOutput) {
        if let Err(e) = hw.led_control(out.index, out.color_brightness, out.on) {
            warn!("LED {} drive failed: {}", out.index, e);
        }
    }

    // ── Settings ──────────────────────────────────────────────

    fn restore(&mut self, store: &impl SettingsPort) {
        if let Some(address) = Self::load::<EslAddress>(store, settings_key::ADDRESS) {
            self.address = address;
            self.ctx.configuring.set(ConfiguringBits::ADDRESS);
        }
        if let Some(key) = Self::load::<KeyMaterial>(store, settings_key::AP_KEY) {
            self.ap_key = key;
            self.ctx.configuring.set(ConfiguringBits::AP_KEY);
        }
        if let Some(key) = Self::load::<KeyMaterial>(store, settings_key::RESPONSE_KEY) {
            self.response.rekey(key);
            self.ctx.configuring.set(ConfiguringBits::RESPONSE_KEY);
        }
        if Self::load::<bool>(store, settings_key::ABS_TIME_SET).unwrap_or(false) {
            self.ctx.configuring.set(ConfiguringBits::ABS_TIME);
        }
        info!(
            "Restored provisioning bits 0b{:04b}",
            self.ctx.configuring.bits()
        );
    }

    fn load<T: DeserializeOwned>(store: &impl SettingsPort, key: &str) -> Option<T> {
        let mut buf = [0u8; 64];
        let n = store.read(SETTINGS_NAMESPACE, key, &mut buf).ok()?;
        match postcard::from_bytes(&buf[..n]) {
            Ok(v) => Some(v),
            Err(_) => {
                warn!("Stored '{}' is corrupted, ignoring", key);
                None
            }
        }
    }

    fn persist<T: Serialize>(store: &mut impl SettingsPort, key: &str, value: &T) {
        let result = postcard::to_allocvec(value)
            .map_err(|_| super::ports::StorageError::Corrupted)
            .and_then(|bytes| store.write(SETTINGS_NAMESPACE, key, &bytes));
        if let Err(e) = result {
            warn!("Persisting '{}' failed: {}", key, e);
        }
    }

    fn erase_settings(store: &mut impl SettingsPort) {
        for key in settings_key::ALL {
            if let Err(e) = store.delete(SETTINGS_NAMESPACE, key) {
                warn!("Deleting '{}' failed: {}", key, e);
            }
        }
    }
}
