//! Per-packet response accumulator for broadcast-sourced commands.
//!
//! Responses to every TLV in one sync packet are concatenated into a
//! single PAwR response.  When the next response would not fit, the most
//! recently appended entry is replaced with `ERR_CAP_LIMIT`; nothing is
//! dropped without the AP being told.

use heapless::Vec;
use log::warn;

use super::response::EcpResponse;
use crate::ead::PAYLOAD_MAX_LEN;
use crate::error::EcpError;

#[derive(Debug, Default)]
pub struct ResponseAccumulator {
    buf: Vec<u8, PAYLOAD_MAX_LEN>,
    last_len: usize,
}

impl ResponseAccumulator {
    pub fn new() -> Self {
        Self::default()
    }

    /// Append one encoded response.  Returns `false` when the capacity
    /// limit was hit and the last entry was replaced.
    pub fn push(&mut self, rsp: &[u8]) -> bool {
        if self.buf.len() + rsp.len() <= PAYLOAD_MAX_LEN {
            let _ = self.buf.extend_from_slice(rsp);
            self.last_len = rsp.len();
            return true;
        }

        warn!(
            "response accumulator full ({} + {} bytes), replacing last entry",
            self.buf.len(),
            rsp.len()
        );
        let keep = self.buf.len() - self.last_len;
        self.buf.truncate(keep);
        let cap = EcpResponse::Error(EcpError::CapacityLimit).encode();
        let _ = self.buf.extend_from_slice(&cap);
        self.last_len = cap.len();
        false
    }

    pub fn push_response(&mut self, rsp: &EcpResponse) -> bool {
        self.push(&rsp.encode())
    }

    pub fn as_slice(&self) -> &[u8] {
        &self.buf
    }

    pub fn is_empty(&self) -> bool {
        self.buf.is_empty()
    }

    pub fn len(&self) -> usize {
        self.buf.len()
    }

    pub fn clear(&mut self) {
        self.buf.clear();
        self.last_len = 0;
    }
}
