//! ESL address: RFU bit, 7-bit group id, 8-bit ESL id.

use core::fmt;

use log::warn;
use serde::{Deserialize, Serialize};

use super::ESL_ADDR_BROADCAST;
use crate::error::WriteError;

/// Address a tag holds before it has been provisioned.
pub const ESL_ADDR_DEFAULT: u16 = 0x8000;
const RFU_BIT: u16 = 0x8000;

#[derive(Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct EslAddress(u16);

impl EslAddress {
    pub const UNASSIGNED: Self = Self(ESL_ADDR_DEFAULT);

    pub const fn new(group_id: u8, esl_id: u8) -> Self {
        Self((((group_id & 0x7F) as u16) << 8) | esl_id as u16)
    }

    pub const fn from_raw(raw: u16) -> Self {
        Self(raw)
    }

    pub const fn raw(self) -> u16 {
        self.0
    }

    pub const fn group_id(self) -> u8 {
        ((self.0 >> 8) & 0x7F) as u8
    }

    pub const fn esl_id(self) -> u8 {
        (self.0 & 0xFF) as u8
    }

    /// True for the post-wipe default address.
    pub const fn is_unassigned(self) -> bool {
        self.0 & RFU_BIT != 0
    }

    /// Whether a command addressed to `esl_id` is for us.
    pub const fn accepts(self, esl_id: u8) -> bool {
        esl_id == ESL_ADDR_BROADCAST || esl_id == self.esl_id()
    }

    /// Parse an ESL Address characteristic write (2 bytes, LE).
    pub fn from_wire(bytes: &[u8]) -> Result<Self, WriteError> {
        let raw: [u8; 2] = bytes.try_into().map_err(|_| WriteError::InvalidLength)?;
        let mut raw = u16::from_le_bytes(raw);
        if raw & RFU_BIT != 0 {
            warn!("ESL address 0x{raw:04x} has RFU bit set, clearing");
            raw &= !RFU_BIT;
        }
        let addr = Self(raw);
        if addr.esl_id() == ESL_ADDR_BROADCAST {
            return Err(WriteError::ValueNotAllowed);
        }
        Ok(addr)
    }

    pub fn to_wire(self) -> [u8; 2] {
        self.0.to_le_bytes()
    }
}

impl Default for EslAddress {
    fn default() -> Self {
        Self::UNASSIGNED
    }
}

impl fmt::Debug for EslAddress {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "EslAddress(0x{:04x})", self.0)
    }
}

impl fmt::Display for EslAddress {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "group {} esl {}", self.group_id(), self.esl_id())
    }
}
