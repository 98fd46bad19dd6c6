//! Fuzz target: `ead::open`
//!
//! Arbitrary envelopes must be rejected without panicking; anything that
//! does authenticate has to fit one ESL payload.
//!
//! cargo fuzz run fuzz_ead_open

#![no_main]

use libfuzzer_sys::fuzz_target;
use shelflink::ead::{self, KeyMaterial, PAYLOAD_MAX_LEN};

fuzz_target!(|data: &[u8]| {
    let key = KeyMaterial::new([0x11; 16], [0x22; 8]);
    let _ = ead::peek_randomizer(data);
    if let Ok(payload) = ead::open(data, &key) {
        assert!(payload.len() <= PAYLOAD_MAX_LEN);
    }
});
