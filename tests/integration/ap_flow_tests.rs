//! Access point ↔ tag flows.  The AP's link port is wired straight into a
//! `TagService`, so every characteristic write and sync packet goes through
//! the real tag pipeline.

use futures_lite::future::block_on;
use rand::SeedableRng;
use rand::rngs::StdRng;

use shelflink::ap::client::{ConnHandle, InfoKind};
use shelflink::ap::{AccessPoint, ApLinkPort, BufferStatus, LinkError, WriteGate, WriteTarget};
use shelflink::app::commands::LinkEvent;
use shelflink::app::service::TagService;
use shelflink::config::{ApConfig, TagConfig};
use shelflink::ead::KeyMaterial;
use shelflink::ecp::{BasicState, EcpCommand, EcpFrame, EcpResponse, EslAddress};
use shelflink::fsm::StateId;
use shelflink::fsm::context::DisconnectReason;

use crate::mock_hw::{MockTag, RecordingSink};

const CONN: ConnHandle = 1;

struct TagLink<'a> {
    gate: &'a WriteGate,
    tag: &'a mut TagService,
    io: &'a mut MockTag,
    sink: &'a mut RecordingSink,
    connected: bool,
    pasts: usize,
}

impl<'a> TagLink<'a> {
    fn new(
        gate: &'a WriteGate,
        tag: &'a mut TagService,
        io: &'a mut MockTag,
        sink: &'a mut RecordingSink,
    ) -> Self {
        tag.handle_link_event(LinkEvent::Connected, 0, &mut *io, &mut *sink);
        Self {
            gate,
            tag,
            io,
            sink,
            connected: true,
            pasts: 0,
        }
    }
}

impl ApLinkPort for TagLink<'_> {
    fn write(
        &mut self,
        _conn: ConnHandle,
        target: WriteTarget,
        data: &[u8],
    ) -> Result<(), LinkError> {
        if !self.connected {
            return Err(LinkError::NotConnected);
        }
        let result = match target {
            WriteTarget::Characteristic(chrc) => self
                .tag
                .write_characteristic(chrc, data, 0, &mut *self.io, &mut *self.sink)
                .map_err(|_| LinkError::Rejected(0x80)),
            WriteTarget::ControlPoint => {
                self.tag
                    .handle_control_point(data, 0, &mut *self.io, &mut *self.sink);
                Ok(())
            }
        };
        self.gate.complete(result);
        Ok(())
    }

    fn read_info(
        &mut self,
        _conn: ConnHandle,
        kind: InfoKind,
        buf: &mut [u8],
    ) -> Result<usize, LinkError> {
        let data: &[u8] = match kind {
            InfoKind::Display => &[0x28, 0x01, 0x80, 0x00, 0x01],
            InfoKind::Image => &[3],
            InfoKind::Sensor => &[0x00, 0x4D, 0x00],
            InfoKind::Led => &[0x00, 0x00],
        };
        buf[..data.len()].copy_from_slice(data);
        Ok(data.len())
    }

    fn send_past(&mut self, _conn: ConnHandle) -> Result<(), LinkError> {
        self.pasts += 1;
        self.tag
            .handle_link_event(LinkEvent::SyncEstablished, 0, &mut *self.io, &mut *self.sink);
        if self.tag.state() == StateId::Synchronized {
            // The tag drops the link once it has the sync.
            self.connected = false;
        }
        Ok(())
    }

    fn is_connected(&self, _conn: ConnHandle) -> bool {
        self.connected
    }

    fn disconnect(&mut self, _conn: ConnHandle) {
        self.connected = false;
        self.tag.handle_link_event(
            LinkEvent::Disconnected(DisconnectReason::Remote),
            0,
            &mut *self.io,
            &mut *self.sink,
        );
    }
}

struct NoDelay;

impl embedded_hal::delay::DelayNs for NoDelay {
    fn delay_ns(&mut self, _ns: u32) {}
}

fn ap_key() -> KeyMaterial {
    KeyMaterial::new([0x5A; 16], [0x3C; 8])
}

fn new_ap() -> AccessPoint {
    let mut rng = StdRng::seed_from_u64(100);
    AccessPoint::new(ApConfig::default(), ap_key(), &mut rng).unwrap()
}

fn new_tag() -> (TagService, MockTag, RecordingSink) {
    let mut rng = StdRng::seed_from_u64(200);
    let mut tag = TagService::new(TagConfig::default(), &mut rng).unwrap();
    let mut io = MockTag::new();
    let mut sink = RecordingSink::new();
    tag.start(0, &mut io, &mut sink);
    (tag, io, sink)
}

/// Configure and PAST a tag at `address`; returns it synchronized.
fn synchronized_tag(
    ap: &mut AccessPoint,
    address: EslAddress,
) -> (TagService, MockTag, RecordingSink) {
    let (mut tag, mut io, mut sink) = new_tag();
    let gate = WriteGate::new();
    let mut rng = StdRng::seed_from_u64(300);
    {
        let mut link = TagLink::new(&gate, &mut tag, &mut io, &mut sink);
        block_on(ap.past_unsynced_tag(
            CONN,
            address,
            &mut link,
            &gate,
            &mut NoDelay,
            0,
            &mut rng,
        ))
        .unwrap();
        assert_eq!(link.pasts, 1);
    }
    assert_eq!(tag.state(), StateId::Synchronized);
    (tag, io, sink)
}

#[test]
fn configure_sequence_provisions_tag() {
    let mut ap = new_ap();
    ap.set_abs_time(0, 10_000);
    let (mut tag, mut io, mut sink) = new_tag();
    let gate = WriteGate::new();
    let mut rng = StdRng::seed_from_u64(1);
    let address = EslAddress::new(3, 1);

    {
        let mut link = TagLink::new(&gate, &mut tag, &mut io, &mut sink);
        block_on(ap.configure_tag(CONN, address, &mut link, &gate, 0, &mut rng)).unwrap();
    }

    assert_eq!(tag.state(), StateId::Configured);
    assert_eq!(tag.address(), address);
    assert!(tag.configuring().is_complete());
    assert_eq!(tag.scheduler().abs_now(0), 10_000);

    let rec = ap.tag(CONN).unwrap();
    assert!(rec.past_needed);
    assert_eq!(rec.info.displays, 1);
    assert_eq!(rec.info.leds, 2);
}

#[test]
fn past_synchronizes_and_forgets_connection() {
    let mut ap = new_ap();
    let (tag, _io, _sink) = synchronized_tag(&mut ap, EslAddress::new(3, 1));
    assert!(tag.basic_state().contains(BasicState::SYNCHRONIZED));
    assert!(ap.tag(CONN).is_none());
}

#[test]
fn tag_answers_ping_in_slot_one() {
    let mut ap = new_ap();
    let address = EslAddress::new(3, 1);
    let (mut tag, mut io, mut sink) = synchronized_tag(&mut ap, address);

    let buffers = ap.buffers();
    assert_eq!(buffers.status(3), Some(BufferStatus::Empty));

    let frames = [
        EcpFrame::new(0, EcpCommand::Ping),
        EcpFrame::new(1, EcpCommand::Ping),
    ];
    let slots = ap.send_sync(3, &frames).unwrap();
    assert_eq!(slots.as_slice(), &[0, 1]);
    assert_eq!(ap.buffers().status(3), Some(BufferStatus::ReadyToPush));

    let out = ap.buffers().service_groups(&[3]);
    assert_eq!(out.len(), 1);
    assert_eq!(ap.buffers().status(3), Some(BufferStatus::Pushed));

    let slot = tag.handle_sync_packet(&out[0].payload, 100, &mut io, &mut sink);
    assert_eq!(slot, Some(1));
    let (slot, data) = io.last_pawr_response().unwrap();

    let decoded = ap.buffers().on_response(3, slot, &data).unwrap().unwrap();
    assert_eq!(ap.buffers().status(3), Some(BufferStatus::RespFull));
    assert_eq!(
        EcpResponse::iter(&decoded).next(),
        Some(EcpResponse::BasicState(tag.basic_state()))
    );

    let collected = ap.collect_responses(3).unwrap();
    assert_eq!(collected.len(), 1);
    assert_eq!(collected[0].slot, 1);
    assert!(matches!(
        collected[0].responses.as_slice(),
        [EcpResponse::BasicState(s)] if s.contains(BasicState::SYNCHRONIZED)
    ));
    assert_eq!(ap.buffers().status(3), Some(BufferStatus::Empty));
}

#[test]
fn tag_ignores_other_groups() {
    let mut ap = new_ap();
    let (mut tag, mut io, mut sink) = synchronized_tag(&mut ap, EslAddress::new(2, 0));

    ap.send_sync(1, &[EcpFrame::new(0, EcpCommand::Ping)]).unwrap();
    let out = ap.buffers().service(1, 1);
    assert_eq!(tag.handle_sync_packet(&out[0].payload, 0, &mut io, &mut sink), None);
}

#[test]
fn response_outside_slot_range_is_unreadable() {
    let mut ap = new_ap();
    // ESL id 6 is beyond the four response slots, so no key is installed.
    let (mut tag, mut io, mut sink) = synchronized_tag(&mut ap, EslAddress::new(0, 6));

    let slots = ap.send_sync(0, &[EcpFrame::new(6, EcpCommand::Ping)]).unwrap();
    assert_eq!(slots.as_slice(), &[0]);
    let out = ap.buffers().service_groups(&[0]);
    assert_eq!(tag.handle_sync_packet(&out[0].payload, 0, &mut io, &mut sink), Some(0));

    let (slot, data) = io.last_pawr_response().unwrap();
    assert_eq!(ap.buffers().on_response(0, slot, &data), Ok(None));
}

#[test]
fn unassociate_over_control_point() {
    let mut ap = new_ap();
    let (mut tag, mut io, mut sink) = new_tag();
    let gate = WriteGate::new();
    let mut rng = StdRng::seed_from_u64(1);

    {
        let mut link = TagLink::new(&gate, &mut tag, &mut io, &mut sink);
        block_on(ap.configure_tag(CONN, EslAddress::new(0, 2), &mut link, &gate, 0, &mut rng))
            .unwrap();
        block_on(ap.unassociate_tag(CONN, &mut link, &gate)).unwrap();
    }

    assert_eq!(tag.state(), StateId::Unassociated);
    assert!(tag.address().is_unassigned());
    assert!(ap.tag(CONN).is_none());
}

#[test]
fn refused_write_surfaces_with_context() {
    let mut ap = new_ap();
    let (mut tag, mut io, mut sink) = new_tag();
    let gate = WriteGate::new();
    let mut rng = StdRng::seed_from_u64(1);

    let err = {
        let mut link = TagLink::new(&gate, &mut tag, &mut io, &mut sink);
        // 0xFF is the broadcast id; the tag refuses it.
        block_on(ap.configure_tag(CONN, EslAddress::new(0, 0xFF), &mut link, &gate, 0, &mut rng))
            .unwrap_err()
    };
    assert!(format!("{err:#}").contains("ESL address"));
    assert_eq!(tag.state(), StateId::Unassociated);
}

#[test]
fn second_send_waits_for_first_to_go_out() {
    let mut ap = new_ap();
    let (mut tag, mut io, mut sink) = synchronized_tag(&mut ap, EslAddress::new(3, 1));

    ap.send_sync(3, &ping_slot_one()).unwrap();
    assert!(ap.send_sync(3, &[EcpFrame::new(1, EcpCommand::ServiceReset)]).is_err());

    // The first command set is the one broadcast.
    let out = ap.buffers().service_groups(&[3]);
    assert_eq!(tag.handle_sync_packet(&out[0].payload, 0, &mut io, &mut sink), Some(1));
    let (slot, data) = io.last_pawr_response().unwrap();
    let decoded = ap.buffers().on_response(3, slot, &data).unwrap().unwrap();
    assert!(matches!(
        EcpResponse::iter(&decoded).next(),
        Some(EcpResponse::BasicState(_))
    ));
}

#[test]
fn responses_block_new_commands_until_collected() {
    let mut ap = new_ap();
    let (mut tag, mut io, mut sink) = synchronized_tag(&mut ap, EslAddress::new(3, 1));

    ap.send_sync(3, &ping_slot_one()).unwrap();
    let out = ap.buffers().service_groups(&[3]);
    tag.handle_sync_packet(&out[0].payload, 0, &mut io, &mut sink);
    let (slot, data) = io.last_pawr_response().unwrap();
    ap.buffers().on_response(3, slot, &data).unwrap();

    assert!(ap.send_sync(3, &[EcpFrame::new(1, EcpCommand::Ping)]).is_err());
    assert_eq!(ap.buffers().status(3), Some(BufferStatus::RespFull));

    assert_eq!(ap.collect_responses(3).unwrap().len(), 1);
    assert!(ap.send_sync(3, &ping_slot_one()).is_ok());
}
