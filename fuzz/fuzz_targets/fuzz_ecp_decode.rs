//! Fuzz target: ECP command and response decoding
//!
//! Any byte string must either decode or be rejected, and a decoded
//! command must re-encode to exactly the bytes it came from.
//!
//! cargo fuzz run fuzz_ecp_decode

#![no_main]

use libfuzzer_sys::fuzz_target;
use shelflink::ecp::{EcpFrame, EcpResponse};

fuzz_target!(|data: &[u8]| {
    if let Ok(frame) = EcpFrame::decode(data) {
        assert_eq!(frame.encode().as_slice(), data, "command did not re-encode");
    }

    for rsp in EcpResponse::iter(data) {
        assert!(rsp.encode().len() <= 17, "response exceeds one TLV");
    }
});
