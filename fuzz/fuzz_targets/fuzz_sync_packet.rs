//! Fuzz target: `SyncPacket::parse`
//!
//! Walks every TLV of an arbitrary payload; the iterator must stay inside
//! the buffer and the response slot must index a TLV that exists.
//!
//! cargo fuzz run fuzz_sync_packet

#![no_main]

use libfuzzer_sys::fuzz_target;
use shelflink::ecp::SyncPacket;

fuzz_target!(|data: &[u8]| {
    let Some(packet) = SyncPacket::parse(data) else {
        return;
    };
    let mut count = 0usize;
    for tlv in packet.tlvs() {
        assert!(!tlv.bytes.is_empty());
        count += 1;
    }
    if let Some(&id) = data.get(2) {
        if let Some(slot) = packet.response_slot(id) {
            assert!((slot as usize) < count, "slot beyond last TLV");
        }
    }
});
