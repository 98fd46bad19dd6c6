//! End-to-end tag lifecycle: provisioning, sync, timeouts and teardown,
//! driven through `TagService` against the recording mock.

use rand::SeedableRng;
use rand::rngs::StdRng;

use shelflink::app::commands::{Characteristic, LinkEvent};
use shelflink::app::events::TagEvent;
use shelflink::app::service::TagService;
use shelflink::config::TagConfig;
use shelflink::ead::{Direction, EadCodec, KeyMaterial, RandomizerSource};
use shelflink::ecp::{BasicState, EcpCommand, EcpFrame, EcpResponse, EslAddress, SyncPacketBuilder};
use shelflink::error::EcpError;
use shelflink::fsm::StateId;
use shelflink::fsm::context::DisconnectReason;

use crate::mock_hw::{Call, MockTag, RecordingSink};

const ADDRESS: u16 = 0x0105;

fn k1() -> KeyMaterial {
    KeyMaterial::new([0x11; 16], [0xA1; 8])
}

fn k2() -> KeyMaterial {
    KeyMaterial::new([0x22; 16], [0xA2; 8])
}

fn make_tag(config: TagConfig) -> (TagService, MockTag, RecordingSink) {
    let mut rng = StdRng::seed_from_u64(42);
    let mut tag = TagService::new(config, &mut rng).unwrap();
    let mut io = MockTag::new().with_image(1, 128);
    let mut sink = RecordingSink::new();
    tag.start(0, &mut io, &mut sink);
    (tag, io, sink)
}

fn write_all(tag: &mut TagService, io: &mut MockTag, sink: &mut RecordingSink, t0: u32) {
    tag.handle_link_event(LinkEvent::Connected, 0, io, sink);
    tag.write_characteristic(Characteristic::Address, &ADDRESS.to_le_bytes(), 0, io, sink)
        .unwrap();
    tag.write_characteristic(Characteristic::ApSyncKey, &k1().to_wire(), 0, io, sink)
        .unwrap();
    tag.write_characteristic(Characteristic::ResponseKey, &k2().to_wire(), 0, io, sink)
        .unwrap();
    tag.write_characteristic(Characteristic::AbsoluteTime, &t0.to_le_bytes(), 0, io, sink)
        .unwrap();
}

fn update_complete(
    tag: &mut TagService,
    io: &mut MockTag,
    sink: &mut RecordingSink,
) -> Option<EcpResponse> {
    let esl_id = tag.address().esl_id();
    let frame = EcpFrame::new(esl_id, EcpCommand::UpdateComplete).encode();
    tag.handle_control_point(&frame, 0, io, sink)
}

/// Tag provisioned and in CONFIGURED.
fn configured() -> (TagService, MockTag, RecordingSink) {
    let (mut tag, mut io, mut sink) = make_tag(TagConfig::default());
    write_all(&mut tag, &mut io, &mut sink, 1_000);
    update_complete(&mut tag, &mut io, &mut sink);
    assert_eq!(tag.state(), StateId::Configured);
    (tag, io, sink)
}

/// Tag provisioned and in SYNCHRONIZED.
fn synchronized() -> (TagService, MockTag, RecordingSink) {
    let (mut tag, mut io, mut sink) = configured();
    tag.handle_link_event(LinkEvent::SyncEstablished, 0, &mut io, &mut sink);
    assert_eq!(tag.state(), StateId::Synchronized);
    (tag, io, sink)
}

fn sync_packet(frames: &[EcpFrame], group: u8, key: KeyMaterial) -> Vec<u8> {
    let mut builder = SyncPacketBuilder::new(group);
    for f in frames {
        builder.push(&f.encode()).unwrap();
    }
    let mut codec = EadCodec::with_source(key, RandomizerSource::from_seed(5, Direction::ApToTag));
    codec.encrypt(builder.as_slice()).unwrap().to_vec()
}

// ── TP7: provisioning ─────────────────────────────────────────

#[test]
fn fresh_tag_is_unassociated_and_advertising() {
    let (tag, io, sink) = make_tag(TagConfig::default());
    assert_eq!(tag.state(), StateId::Unassociated);
    assert_eq!(io.count(&Call::StartAdvertising), 1);
    assert_eq!(io.calls.first(), Some(&Call::Init));
    assert!(sink.contains(&TagEvent::Started(StateId::Unassociated)));
}

#[test]
fn provisioning_reaches_configuring_then_configured() {
    let (mut tag, mut io, mut sink) = make_tag(TagConfig::default());

    write_all(&mut tag, &mut io, &mut sink, 1_000);
    assert_eq!(tag.state(), StateId::Configuring);
    assert_eq!(tag.address(), EslAddress::from_raw(ADDRESS));
    assert!(tag.configuring().is_complete());

    let rsp = update_complete(&mut tag, &mut io, &mut sink);
    assert!(matches!(rsp, Some(EcpResponse::BasicState(_))));
    assert_eq!(tag.state(), StateId::Configured);
    assert!(tag.is_update_complete());
    assert_eq!(io.count(&Call::SubscribePast), 1);

    let notified = io.notifications();
    assert_eq!(notified.last().map(|n| n[0]), Some(0x10));
    assert!(sink.contains(&TagEvent::StateChanged {
        from: StateId::Configuring,
        to: StateId::Configured,
    }));
}

#[test]
fn partial_provisioning_stays_unassociated() {
    let (mut tag, mut io, mut sink) = make_tag(TagConfig::default());
    tag.write_characteristic(Characteristic::Address, &[0x05, 0x01], 0, &mut io, &mut sink)
        .unwrap();
    tag.write_characteristic(Characteristic::ApSyncKey, &k1().to_wire(), 0, &mut io, &mut sink)
        .unwrap();
    assert_eq!(tag.state(), StateId::Unassociated);
}

#[test]
fn bad_writes_are_refused() {
    let (mut tag, mut io, mut sink) = make_tag(TagConfig::default());
    assert!(
        tag.write_characteristic(Characteristic::ApSyncKey, &[0; 16], 0, &mut io, &mut sink)
            .is_err()
    );
    // ESL id 0xFF is the broadcast id.
    assert!(
        tag.write_characteristic(Characteristic::Address, &[0xFF, 0x01], 0, &mut io, &mut sink)
            .is_err()
    );
    assert_eq!(tag.configuring().bits(), 0);
}

#[test]
fn keys_and_address_are_persisted() {
    let (_tag, io, _sink) = configured();
    for key in ["addr", "ap_key", "rsp_key", "abs_set"] {
        assert!(io.settings.contains_key(&format!("esl::{key}")), "{key} missing");
    }
}

#[test]
fn link_loss_while_configuring_unassociates() {
    let (mut tag, mut io, mut sink) = make_tag(TagConfig::default());
    write_all(&mut tag, &mut io, &mut sink, 0);
    tag.handle_link_event(
        LinkEvent::Disconnected(DisconnectReason::Remote),
        0,
        &mut io,
        &mut sink,
    );
    assert_eq!(tag.state(), StateId::Unassociated);
    assert!(tag.address().is_unassigned());
    assert!(io.settings.is_empty());
    assert!(sink.contains(&TagEvent::Unassociated));
}

// ── Sync ──────────────────────────────────────────────────────

#[test]
fn sync_established_enters_synchronized_and_drops_link() {
    let (tag, io, _sink) = synchronized();
    assert!(tag.basic_state().contains(BasicState::SYNCHRONIZED));
    assert_eq!(io.count(&Call::Disconnect), 1);
    assert!(io.calls.contains(&Call::StopAdvertising));
    assert!(tag.next_deadline().is_some());
}

#[test]
fn sync_before_update_complete_is_ignored() {
    let (mut tag, mut io, mut sink) = make_tag(TagConfig::default());
    write_all(&mut tag, &mut io, &mut sink, 0);
    tag.handle_link_event(LinkEvent::SyncEstablished, 0, &mut io, &mut sink);
    assert_ne!(tag.state(), StateId::Synchronized);
}

#[test]
fn sync_packet_answers_in_last_own_slot() {
    let (mut tag, mut io, mut sink) = synchronized();
    let frames = [
        EcpFrame::new(0x05, EcpCommand::Ping),
        EcpFrame::new(0x07, EcpCommand::Ping),
        EcpFrame::new(0x05, EcpCommand::ReadSensor { index: 0 }),
    ];
    let env = sync_packet(&frames, 0x01, k1());

    let slot = tag.handle_sync_packet(&env, 10, &mut io, &mut sink);
    assert_eq!(slot, Some(2));

    let (slot, data) = io.last_pawr_response().unwrap();
    assert_eq!(slot, 2);
    let payload = shelflink::ead::open(&data, &k2()).unwrap();
    let responses: Vec<EcpResponse> = EcpResponse::iter(&payload).collect();
    assert_eq!(responses.len(), 2);
    assert!(matches!(responses[0], EcpResponse::BasicState(_)));
    assert!(matches!(responses[1], EcpResponse::SensorData { index: 0, .. }));
}

#[test]
fn broadcast_only_packet_gets_no_response() {
    let (mut tag, mut io, mut sink) = synchronized();
    let env = sync_packet(&[EcpFrame::new(0xFF, EcpCommand::Ping)], 0x01, k1());
    assert_eq!(tag.handle_sync_packet(&env, 10, &mut io, &mut sink), None);
    assert!(io.last_pawr_response().is_none());
}

#[test]
fn broadcast_answers_ride_with_own_response() {
    let (mut tag, mut io, mut sink) = synchronized();
    let frames = [
        EcpFrame::new(0xFF, EcpCommand::Ping),
        EcpFrame::new(0x05, EcpCommand::ReadSensor { index: 0 }),
        EcpFrame::new(0x09, EcpCommand::Ping),
    ];
    let env = sync_packet(&frames, 0x01, k1());
    assert_eq!(tag.handle_sync_packet(&env, 10, &mut io, &mut sink), Some(1));

    let (_, data) = io.last_pawr_response().unwrap();
    let payload = shelflink::ead::open(&data, &k2()).unwrap();
    let responses: Vec<EcpResponse> = EcpResponse::iter(&payload).collect();
    assert_eq!(responses.len(), 2);
    assert!(matches!(responses[0], EcpResponse::BasicState(_)));
    assert!(matches!(responses[1], EcpResponse::SensorData { index: 0, .. }));
}

#[test]
fn wrong_group_or_key_is_dropped() {
    let (mut tag, mut io, mut sink) = synchronized();
    let frames = [EcpFrame::new(0x05, EcpCommand::Ping)];

    let other_group = sync_packet(&frames, 0x02, k1());
    assert_eq!(tag.handle_sync_packet(&other_group, 10, &mut io, &mut sink), None);

    let wrong_key = sync_packet(&frames, 0x01, k2());
    assert_eq!(tag.handle_sync_packet(&wrong_key, 10, &mut io, &mut sink), None);
    assert!(
        sink.events
            .iter()
            .any(|e| matches!(e, TagEvent::SyncPacketDropped(_)))
    );
    assert_eq!(tag.state(), StateId::Synchronized);
}

#[test]
fn sync_packet_renews_unsynchronized_timeout() {
    let (mut tag, mut io, mut sink) = synchronized();
    let first = tag.next_deadline().unwrap();
    let env = sync_packet(&[EcpFrame::new(0x05, EcpCommand::Ping)], 0x01, k1());
    tag.handle_sync_packet(&env, 5_000, &mut io, &mut sink);
    assert_eq!(tag.next_deadline(), Some(first + 5_000));
}

#[test]
fn unsynchronized_timeout_drops_sync() {
    let (mut tag, mut io, mut sink) = synchronized();
    let deadline = tag.next_deadline().unwrap();
    tag.poll(deadline, &mut io, &mut sink);
    assert_eq!(tag.state(), StateId::Unsynchronized);
    assert!(io.calls.contains(&Call::StopSync));
    assert!(!tag.basic_state().contains(BasicState::SYNCHRONIZED));
}

#[test]
fn unassociated_timeout_wipes_tag() {
    let (mut tag, mut io, mut sink) = synchronized();
    tag.handle_link_event(LinkEvent::SyncLost, 0, &mut io, &mut sink);
    assert_eq!(tag.state(), StateId::Unsynchronized);

    let deadline = tag.next_deadline().unwrap();
    assert_eq!(deadline, u64::from(tag.config().unassociated_timeout_ms()));
    tag.poll(deadline, &mut io, &mut sink);
    assert_eq!(tag.state(), StateId::Unassociated);
    assert!(tag.address().is_unassigned());
}

#[test]
fn update_cycle_returns_to_synchronized() {
    let (mut tag, mut io, mut sink) = synchronized();
    tag.handle_link_event(LinkEvent::Connected, 0, &mut io, &mut sink);
    tag.handle_link_event(LinkEvent::SecurityChanged { ok: true }, 0, &mut io, &mut sink);
    assert_eq!(tag.state(), StateId::Updating);

    update_complete(&mut tag, &mut io, &mut sink);
    assert_eq!(tag.state(), StateId::Synchronized);
}

#[test]
fn pairing_failure_while_synchronized_disconnects() {
    let (mut tag, mut io, mut sink) = synchronized();
    io.clear();
    tag.handle_link_event(LinkEvent::SecurityChanged { ok: false }, 0, &mut io, &mut sink);
    assert_eq!(io.calls, [Call::Disconnect]);
    assert_eq!(tag.state(), StateId::Synchronized);
}

#[test]
fn reboot_resumes_unsynchronized() {
    let (_tag, io, _sink) = configured();
    let settings = io.settings.clone();

    let mut rng = StdRng::seed_from_u64(7);
    let mut tag = TagService::new(TagConfig::default(), &mut rng).unwrap();
    let mut io = MockTag::new();
    io.settings = settings;
    let mut sink = RecordingSink::new();
    tag.start(0, &mut io, &mut sink);

    assert_eq!(tag.state(), StateId::Unsynchronized);
    assert_eq!(tag.address(), EslAddress::from_raw(ADDRESS));
    assert!(tag.configuring().is_complete());
}

#[test]
fn reboot_reacquires_sync_without_update() {
    let (_tag, io, _sink) = configured();
    let settings = io.settings.clone();

    let mut rng = StdRng::seed_from_u64(7);
    let mut tag = TagService::new(TagConfig::default(), &mut rng).unwrap();
    let mut io = MockTag::new();
    io.settings = settings;
    let mut sink = RecordingSink::new();
    tag.start(0, &mut io, &mut sink);
    assert!(!tag.is_update_complete());

    tag.handle_link_event(LinkEvent::SyncEstablished, 0, &mut io, &mut sink);
    assert_eq!(tag.state(), StateId::Synchronized);
}

#[test]
fn resync_after_reconnect_dropped_mid_update() {
    let (mut tag, mut io, mut sink) = synchronized();
    tag.handle_link_event(LinkEvent::SyncLost, 0, &mut io, &mut sink);
    tag.handle_link_event(LinkEvent::Connected, 0, &mut io, &mut sink);
    tag.handle_link_event(
        LinkEvent::Disconnected(DisconnectReason::Remote),
        0,
        &mut io,
        &mut sink,
    );
    assert_eq!(tag.state(), StateId::Unsynchronized);
    assert!(!tag.is_update_complete());

    tag.handle_link_event(LinkEvent::SyncEstablished, 0, &mut io, &mut sink);
    assert_eq!(tag.state(), StateId::Synchronized);
    assert!(tag.basic_state().contains(BasicState::SYNCHRONIZED));
}

#[test]
fn forget_on_boot_discards_settings() {
    let (_tag, io, _sink) = configured();
    let config = TagConfig {
        forget_provisioned_data: true,
        ..TagConfig::default()
    };
    let mut rng = StdRng::seed_from_u64(7);
    let mut tag = TagService::new(config, &mut rng).unwrap();
    let mut io2 = MockTag::new();
    io2.settings = io.settings.clone();
    let mut sink = RecordingSink::new();
    tag.start(0, &mut io2, &mut sink);
    assert_eq!(tag.state(), StateId::Unassociated);
    assert!(io2.settings.is_empty());
}

// ── Teardown ──────────────────────────────────────────────────

#[test]
fn unassociate_replies_then_wipes() {
    let (mut tag, mut io, mut sink) = configured();
    let frame = EcpFrame::new(0x05, EcpCommand::Unassociate).encode();
    let rsp = tag.handle_control_point(&frame, 0, &mut io, &mut sink);

    match rsp {
        Some(EcpResponse::BasicState(s)) => assert!(!s.contains(BasicState::SYNCHRONIZED)),
        other => panic!("unexpected {other:?}"),
    }
    assert_eq!(tag.state(), StateId::Unassociated);
    assert!(tag.address().is_unassigned());

    // The response went out before the wipe.
    let notify_at = io.calls.iter().position(|c| matches!(c, Call::Notify(_)));
    let advert_at = io.calls.iter().rposition(|c| *c == Call::StartAdvertising);
    assert!(notify_at < advert_at);
}

#[test]
fn broadcast_unassociate_asks_for_retry() {
    let (mut tag, mut io, mut sink) = configured();
    let frame = EcpFrame::new(0xFF, EcpCommand::Unassociate).encode();
    let rsp = tag.handle_control_point(&frame, 0, &mut io, &mut sink);
    assert_eq!(rsp, Some(EcpResponse::Error(EcpError::Retry)));
    assert_eq!(tag.state(), StateId::Configured);
}

#[test]
fn factory_reset_erases_images_without_response() {
    let (mut tag, mut io, mut sink) = configured();
    let frame = EcpFrame::new(0x05, EcpCommand::FactoryReset).encode();
    assert_eq!(tag.handle_control_point(&frame, 0, &mut io, &mut sink), None);
    assert!(io.calls.contains(&Call::DeleteImages));
    assert!(io.calls.contains(&Call::StopSync));
    assert_eq!(tag.state(), StateId::Unassociated);
}

#[test]
fn factory_reset_refused_while_synchronized() {
    let (mut tag, mut io, mut sink) = synchronized();
    let env = sync_packet(&[EcpFrame::new(0x05, EcpCommand::FactoryReset)], 0x01, k1());
    tag.handle_sync_packet(&env, 0, &mut io, &mut sink);
    let (_, data) = io.last_pawr_response().unwrap();
    let payload = shelflink::ead::open(&data, &k2()).unwrap();
    assert_eq!(
        EcpResponse::iter(&payload).next(),
        Some(EcpResponse::Error(EcpError::InvalidState))
    );
    assert_eq!(tag.state(), StateId::Synchronized);
}

// ── Commands ──────────────────────────────────────────────────

#[test]
fn busy_tag_answers_retry_once() {
    let (mut tag, mut io, mut sink) = configured();
    tag.set_busy();
    let ping = EcpFrame::new(0x05, EcpCommand::Ping).encode();
    assert_eq!(
        tag.handle_control_point(&ping, 0, &mut io, &mut sink),
        Some(EcpResponse::Error(EcpError::Retry))
    );
    assert!(matches!(
        tag.handle_control_point(&ping, 0, &mut io, &mut sink),
        Some(EcpResponse::BasicState(_))
    ));
}

#[test]
fn sensor_busy_maps_to_retry() {
    let (mut tag, mut io, mut sink) = configured();
    io.sensor_busy = true;
    let frame = EcpFrame::new(0x05, EcpCommand::ReadSensor { index: 0 }).encode();
    assert_eq!(
        tag.handle_control_point(&frame, 0, &mut io, &mut sink),
        Some(EcpResponse::Error(EcpError::Retry))
    );
}

#[test]
fn display_image_and_refresh() {
    let (mut tag, mut io, mut sink) = configured();
    let refresh = EcpFrame::new(0x05, EcpCommand::RefreshDisplay { display: 0 }).encode();
    assert_eq!(
        tag.handle_control_point(&refresh, 0, &mut io, &mut sink),
        Some(EcpResponse::Error(EcpError::InvalidImageIndex))
    );

    let show = EcpFrame::new(0x05, EcpCommand::DisplayImage { display: 0, image: 1 }).encode();
    assert_eq!(
        tag.handle_control_point(&show, 0, &mut io, &mut sink),
        Some(EcpResponse::DisplayState { display: 0, image: 1 })
    );
    assert!(io.calls.contains(&Call::Display {
        index: 0,
        image: 1,
        enable: true
    }));

    assert_eq!(
        tag.handle_control_point(&refresh, 0, &mut io, &mut sink),
        Some(EcpResponse::DisplayState { display: 0, image: 1 })
    );

    let missing = EcpFrame::new(0x05, EcpCommand::DisplayImage { display: 0, image: 2 }).encode();
    assert_eq!(
        tag.handle_control_point(&missing, 0, &mut io, &mut sink),
        Some(EcpResponse::Error(EcpError::ImageNotAvailable))
    );
}

#[test]
fn timed_display_fires_at_abs_time() {
    let (mut tag, mut io, mut sink) = configured();
    // Absolute time was set to 1000 at t = 0.
    let frame = EcpFrame::new(
        0x05,
        EcpCommand::DisplayTimed {
            display: 0,
            image: 1,
            abs_time: 3_000,
        },
    )
    .encode();
    tag.handle_control_point(&frame, 0, &mut io, &mut sink);
    assert!(tag.basic_state().contains(BasicState::PENDING_DISPLAY_UPDATE));
    assert_eq!(tag.next_deadline(), Some(2_000));

    tag.poll(1_999, &mut io, &mut sink);
    assert!(!sink.contains(&TagEvent::DisplayChanged { display: 0, image: 1 }));
    tag.poll(2_000, &mut io, &mut sink);
    assert!(sink.contains(&TagEvent::DisplayChanged { display: 0, image: 1 }));
    assert!(!tag.basic_state().contains(BasicState::PENDING_DISPLAY_UPDATE));
}

#[test]
fn vendor_opcode_needs_mask_bit() {
    let config = TagConfig {
        vendor_opcode_mask: 1 << 0x1,
        ..TagConfig::default()
    };
    let (mut tag, mut io, mut sink) = make_tag(config);
    write_all(&mut tag, &mut io, &mut sink, 0);

    // Tag 0xF, length nibble 1: one parameter byte after the ESL id.
    let rsp = tag.handle_control_point(&[0x1F, 0x05, 0xAB], 0, &mut io, &mut sink);
    match rsp {
        Some(EcpResponse::Vendor { opcode, params }) => {
            assert_eq!(opcode, 0x1F);
            assert_eq!(params.as_slice(), &[0x05, 0xAB]);
        }
        other => panic!("unexpected {other:?}"),
    }

    let rsp = tag.handle_control_point(&[0x2F, 0x05, 0xAB, 0xCD], 0, &mut io, &mut sink);
    assert_eq!(rsp, Some(EcpResponse::Error(EcpError::InvalidOpcode)));
}

// ── TP9: LED pattern ──────────────────────────────────────────

#[test]
fn led_pattern_toggles_and_stops_after_duration() {
    let (mut tag, mut io, mut sink) = configured();
    io.clear();

    // LED_CONTROL: index 0, colour 0x3F, pattern 0x0000001041,
    // off 0x32, on 0xFA, repeat type 1 duration 31.
    let frame = [
        0xB0, 0x05, 0x00, 0x3F, 0x41, 0x10, 0x00, 0x00, 0x00, 0x32, 0xFA, 0x3F, 0x00,
    ];
    let rsp = tag.handle_control_point(&frame, 0, &mut io, &mut sink);
    assert_eq!(rsp, Some(EcpResponse::LedState { index: 0 }));
    assert!(tag.basic_state().contains(BasicState::ACTIVE_LED));

    let mut steps = vec![(0u64, true)];
    while let Some(t) = tag.next_deadline() {
        assert!(t <= 40_000, "walker never stopped");
        let before = io.calls.len();
        tag.poll(t, &mut io, &mut sink);
        for c in &io.calls[before..] {
            if let Call::Led { index: 0, on, .. } = c {
                steps.push((t, *on));
            }
        }
    }

    // Bit 12 on for 500 ms, then off bits at 100 ms each.
    assert_eq!(steps[1], (500, false));
    assert_eq!(steps[2], (600, false));
    // Bit 6 lights again one second in.
    assert!(steps.contains(&(1_000, true)));

    let (last_t, last_on) = *steps.last().unwrap();
    assert!(!last_on);
    assert!(last_t >= 31_000);
    assert!(steps[..steps.len() - 1].iter().all(|(t, _)| *t < 31_000));
    assert!(!tag.basic_state().contains(BasicState::ACTIVE_LED));
}

#[test]
fn timed_led_cancelled_by_zero_time() {
    let (mut tag, mut io, mut sink) = configured();
    let led = [0x00, 0x3F, 0x01, 0x00, 0x00, 0x00, 0x00, 0x05, 0x05, 0x02, 0x00];
    let mut frame = vec![0xF0, 0x05];
    frame.extend_from_slice(&led);
    frame.extend_from_slice(&5_000u32.to_le_bytes());
    tag.handle_control_point(&frame, 0, &mut io, &mut sink);
    assert!(tag.basic_state().contains(BasicState::PENDING_LED_UPDATE));

    let mut cancel = vec![0xF0, 0x05];
    cancel.extend_from_slice(&led);
    cancel.extend_from_slice(&0u32.to_le_bytes());
    assert_eq!(
        tag.handle_control_point(&cancel, 0, &mut io, &mut sink),
        Some(EcpResponse::LedState { index: 0 })
    );
    assert!(!tag.basic_state().contains(BasicState::PENDING_LED_UPDATE));
    assert_eq!(tag.next_deadline(), None);
}

#[test]
fn immediate_led_replaces_timed_pattern() {
    let (mut tag, mut io, mut sink) = configured();
    let led = [0x00, 0x3F, 0x01, 0x00, 0x00, 0x00, 0x00, 0x05, 0x05, 0x02, 0x00];
    let mut timed = vec![0xF0, 0x05];
    timed.extend_from_slice(&led);
    timed.extend_from_slice(&5_000u32.to_le_bytes());
    tag.handle_control_point(&timed, 0, &mut io, &mut sink);
    assert!(tag.basic_state().contains(BasicState::PENDING_LED_UPDATE));

    let mut now = vec![0xB0, 0x05];
    now.extend_from_slice(&led);
    assert_eq!(
        tag.handle_control_point(&now, 0, &mut io, &mut sink),
        Some(EcpResponse::LedState { index: 0 })
    );
    assert!(!tag.basic_state().contains(BasicState::PENDING_LED_UPDATE));
    assert!(tag.scheduler().led_pending(0).is_none());

    // Run the immediate pattern out; the old timed one must never restart it.
    io.clear();
    while let Some(t) = tag.next_deadline() {
        assert!(t < 4_000, "timed pattern still armed");
        tag.poll(t, &mut io, &mut sink);
    }
    assert!(!tag.basic_state().contains(BasicState::ACTIVE_LED));
}

#[test]
fn timed_cancel_switches_running_led_off() {
    let (mut tag, mut io, mut sink) = configured();
    // Steady on: repeat type time, duration 0.
    let led = [0x00, 0x3F, 0x01, 0x00, 0x00, 0x00, 0x00, 0x05, 0x05, 0x01, 0x00];
    let mut now = vec![0xB0, 0x05];
    now.extend_from_slice(&led);
    tag.handle_control_point(&now, 0, &mut io, &mut sink);
    assert!(tag.basic_state().contains(BasicState::ACTIVE_LED));

    io.clear();
    let mut cancel = vec![0xF0, 0x05];
    cancel.extend_from_slice(&led);
    cancel.extend_from_slice(&0u32.to_le_bytes());
    tag.handle_control_point(&cancel, 0, &mut io, &mut sink);

    assert!(
        io.calls
            .iter()
            .any(|c| matches!(c, Call::Led { index: 0, on: false, .. }))
    );
    assert!(!tag.basic_state().contains(BasicState::ACTIVE_LED));
}
