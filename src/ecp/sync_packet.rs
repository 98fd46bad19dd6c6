//! Decrypted sync packet payload: `[group-id][TLV]*`.

use heapless::Vec;

use super::tlv_len;
use crate::ead::PAYLOAD_MAX_LEN;
use crate::error::EcpError;

/// Borrowed view of a decrypted sync packet.
#[derive(Debug, Clone, Copy)]
pub struct SyncPacket<'a> {
    group_id: u8,
    body: &'a [u8],
}

/// One TLV extracted from a sync packet.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct SyncTlv<'a> {
    /// Position of this TLV in the packet; also the response slot used
    /// when the TLV is addressed to a specific tag.
    pub index: u8,
    pub esl_id: u8,
    pub bytes: &'a [u8],
}

impl<'a> SyncPacket<'a> {
    /// `None` for an empty payload.
    pub fn parse(payload: &'a [u8]) -> Option<Self> {
        let (&group_id, body) = payload.split_first()?;
        Some(Self { group_id, body })
    }

    pub fn group_id(&self) -> u8 {
        self.group_id
    }

    /// Walk the TLVs.  A TLV whose declared length runs past the end of
    /// the payload stops the walk.
    pub fn tlvs(&self) -> TlvIter<'a> {
        TlvIter {
            body: self.body,
            cursor: 0,
            index: 0,
        }
    }

    /// Response slot for `esl_id`: index of the last TLV addressed to it.
    pub fn response_slot(&self, esl_id: u8) -> Option<u8> {
        self.tlvs()
            .filter(|t| t.esl_id == esl_id)
            .last()
            .map(|t| t.index)
    }
}

pub struct TlvIter<'a> {
    body: &'a [u8],
    cursor: usize,
    index: u8,
}

impl<'a> Iterator for TlvIter<'a> {
    type Item = SyncTlv<'a>;

    fn next(&mut self) -> Option<Self::Item> {
        let op = *self.body.get(self.cursor)?;
        let len = tlv_len(op);
        let bytes = self.body.get(self.cursor..self.cursor + len)?;
        self.cursor += len;
        let tlv = SyncTlv {
            index: self.index,
            esl_id: bytes[1],
            bytes,
        };
        self.index = self.index.wrapping_add(1);
        Some(tlv)
    }
}

// ---------------------------------------------------------------------------
// Builder (AP side)
// ---------------------------------------------------------------------------

/// Packs commands for one group into a sync packet payload.
#[derive(Debug, Clone)]
pub struct SyncPacketBuilder {
    buf: Vec<u8, PAYLOAD_MAX_LEN>,
    count: u8,
}

impl SyncPacketBuilder {
    pub fn new(group_id: u8) -> Self {
        let mut buf = Vec::new();
        let _ = buf.push(group_id);
        Self { buf, count: 0 }
    }

    /// Append one encoded command TLV.  Returns the response slot the
    /// addressed tag will answer in.
    pub fn push(&mut self, tlv: &[u8]) -> Result<u8, EcpError> {
        if tlv.len() < 2 || tlv.len() != tlv_len(tlv[0]) {
            return Err(EcpError::InvalidParameters);
        }
        self.buf
            .extend_from_slice(tlv)
            .map_err(|_| EcpError::CapacityLimit)?;
        let slot = self.count;
        self.count += 1;
        Ok(slot)
    }

    pub fn len(&self) -> usize {
        self.buf.len()
    }

    pub fn is_empty(&self) -> bool {
        self.count == 0
    }

    pub fn as_slice(&self) -> &[u8] {
        &self.buf
    }
}
