//! ECP responses and the Basic State bitset they report.

use heapless::Vec;

use super::command::TlvBuf;
use super::{is_vendor, len_nibble, rsp_opcode, tlv_len};
use crate::error::EcpError;

/// Sensor payload bytes after the sensor index.
pub type SensorData = Vec<u8, 15>;

// ---------------------------------------------------------------------------
// Basic state
// ---------------------------------------------------------------------------

/// Basic State bitfield reported in `OP_BASIC_STATE`.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub struct BasicState(u16);

impl BasicState {
    pub const SERVICE_NEEDED: u16 = 1 << 0;
    pub const SYNCHRONIZED: u16 = 1 << 1;
    pub const ACTIVE_LED: u16 = 1 << 2;
    pub const PENDING_LED_UPDATE: u16 = 1 << 3;
    pub const PENDING_DISPLAY_UPDATE: u16 = 1 << 4;

    pub const fn from_bits(bits: u16) -> Self {
        Self(bits)
    }

    pub const fn bits(self) -> u16 {
        self.0
    }

    pub const fn contains(self, flag: u16) -> bool {
        self.0 & flag == flag
    }

    pub fn set(&mut self, flag: u16, on: bool) {
        if on {
            self.0 |= flag;
        } else {
            self.0 &= !flag;
        }
    }
}

// ---------------------------------------------------------------------------
// Response union
// ---------------------------------------------------------------------------

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum EcpResponse {
    Error(EcpError),
    LedState { index: u8 },
    BasicState(BasicState),
    DisplayState { display: u8, image: u8 },
    SensorData { index: u8, data: SensorData },
    /// Vendor response; `params` holds everything after the opcode.
    Vendor { opcode: u8, params: Vec<u8, 16> },
}

impl From<EcpError> for EcpResponse {
    fn from(e: EcpError) -> Self {
        Self::Error(e)
    }
}

impl EcpResponse {
    pub fn encode(&self) -> TlvBuf {
        let mut out = TlvBuf::new();
        match self {
            Self::Error(e) => {
                let _ = out.extend_from_slice(&[rsp_opcode::ERROR, e.code()]);
            }
            Self::LedState { index } => {
                let _ = out.extend_from_slice(&[rsp_opcode::LED_STATE, *index]);
            }
            Self::BasicState(s) => {
                let _ = out.push(rsp_opcode::BASIC_STATE);
                let _ = out.extend_from_slice(&s.bits().to_le_bytes());
            }
            Self::DisplayState { display, image } => {
                let _ = out.extend_from_slice(&[rsp_opcode::DISPLAY_STATE, *display, *image]);
            }
            Self::SensorData { index, data } => {
                let _ = out.push(len_nibble(data.len() + 1) | rsp_opcode::SENSOR_TAG);
                let _ = out.push(*index);
                let _ = out.extend_from_slice(data);
            }
            Self::Vendor { opcode, params } => {
                let _ = out.push(*opcode);
                let _ = out.extend_from_slice(params);
            }
        }
        out
    }

    /// Decode one response TLV from the front of `bytes`.
    ///
    /// Returns the response and the number of bytes consumed, or `None` if
    /// the TLV is truncated or not a known response.
    pub fn decode(bytes: &[u8]) -> Option<(Self, usize)> {
        let op = *bytes.first()?;
        let len = tlv_len(op);
        let tlv = bytes.get(..len)?;
        let p = &tlv[1..];

        let rsp = if is_vendor(op) {
            let mut params = Vec::new();
            params.extend_from_slice(p).ok()?;
            Self::Vendor { opcode: op, params }
        } else if op & 0x0F == rsp_opcode::SENSOR_TAG {
            let mut data = SensorData::new();
            data.extend_from_slice(&p[1..]).ok()?;
            Self::SensorData { index: p[0], data }
        } else {
            match op {
                rsp_opcode::ERROR => Self::Error(EcpError::from_code(p[0])?),
                rsp_opcode::LED_STATE => Self::LedState { index: p[0] },
                rsp_opcode::BASIC_STATE => {
                    Self::BasicState(BasicState::from_bits(u16::from_le_bytes([p[0], p[1]])))
                }
                rsp_opcode::DISPLAY_STATE => Self::DisplayState {
                    display: p[0],
                    image: p[1],
                },
                _ => return None,
            }
        };
        Some((rsp, len))
    }

    /// Iterate the responses packed in a decrypted PAwR response payload.
    pub fn iter(bytes: &[u8]) -> ResponseIter<'_> {
        ResponseIter { bytes, cursor: 0 }
    }
}

pub struct ResponseIter<'a> {
    bytes: &'a [u8],
    cursor: usize,
}

impl Iterator for ResponseIter<'_> {
    type Item = EcpResponse;

    fn next(&mut self) -> Option<Self::Item> {
        let (rsp, used) = EcpResponse::decode(self.bytes.get(self.cursor..)?)?;
        self.cursor += used;
        Some(rsp)
    }
}
