//! ECP commands: tagged union plus its byte codec.

use heapless::Vec;

use super::{is_vendor, opcode, tlv_len, TLV_MAX_LEN};
use crate::error::EcpError;

/// One TLV worth of bytes.
pub type TlvBuf = Vec<u8, TLV_MAX_LEN>;

/// Vendor parameters after the ESL id (op `0xFF` carries 15).
pub type VendorParams = Vec<u8, 15>;

// ---------------------------------------------------------------------------
// LED command parameters
// ---------------------------------------------------------------------------

/// 40-bit flash pattern; scanned from the highest set bit toward bit 0.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub struct FlashPattern(u64);

impl FlashPattern {
    pub const BITS: u32 = 40;
    const MASK: u64 = (1 << Self::BITS) - 1;

    pub const fn new(bits: u64) -> Self {
        Self(bits & Self::MASK)
    }

    pub fn from_le_bytes(b: [u8; 5]) -> Self {
        Self(u64::from_le_bytes([b[0], b[1], b[2], b[3], b[4], 0, 0, 0]))
    }

    pub fn to_le_bytes(self) -> [u8; 5] {
        let b = self.0.to_le_bytes();
        [b[0], b[1], b[2], b[3], b[4]]
    }

    pub const fn bits(self) -> u64 {
        self.0
    }

    /// Position of the highest set bit, `None` for an empty pattern.
    pub const fn top_bit(self) -> Option<u32> {
        if self.0 == 0 {
            None
        } else {
            Some(63 - self.0.leading_zeros())
        }
    }

    pub const fn bit(self, n: u32) -> bool {
        (self.0 >> n) & 1 != 0
    }
}

/// How Repeats-Duration is interpreted.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RepeatKind {
    /// Duration counts pattern repetitions.
    Count,
    /// Duration counts seconds.
    Time,
}

/// Packed repeat field: bit 0 type, bits 1..=15 duration.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Repeat {
    pub kind: RepeatKind,
    pub duration: u16,
}

impl Repeat {
    pub const fn from_raw(raw: u16) -> Self {
        Self {
            kind: if raw & 1 != 0 {
                RepeatKind::Time
            } else {
                RepeatKind::Count
            },
            duration: raw >> 1,
        }
    }

    pub const fn raw(self) -> u16 {
        let t = match self.kind {
            RepeatKind::Count => 0,
            RepeatKind::Time => 1,
        };
        ((self.duration & 0x7FFF) << 1) | t
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct LedCommand {
    pub index: u8,
    pub color_brightness: u8,
    pub pattern: FlashPattern,
    /// Half-period after an off bit, in units of 2 ms.
    pub off_period: u8,
    /// Half-period after an on bit, in units of 2 ms.
    pub on_period: u8,
    pub repeat: Repeat,
}

const LED_PARAMS_LEN: usize = 11;

impl LedCommand {
    fn parse(p: &[u8]) -> Result<Self, EcpError> {
        if p.len() < LED_PARAMS_LEN {
            return Err(EcpError::InvalidParameters);
        }
        Ok(Self {
            index: p[0],
            color_brightness: p[1],
            pattern: FlashPattern::from_le_bytes([p[2], p[3], p[4], p[5], p[6]]),
            off_period: p[7],
            on_period: p[8],
            repeat: Repeat::from_raw(u16::from_le_bytes([p[9], p[10]])),
        })
    }

    fn write(&self, out: &mut TlvBuf) {
        let _ = out.push(self.index);
        let _ = out.push(self.color_brightness);
        let _ = out.extend_from_slice(&self.pattern.to_le_bytes());
        let _ = out.push(self.off_period);
        let _ = out.push(self.on_period);
        let _ = out.extend_from_slice(&self.repeat.raw().to_le_bytes());
    }
}

// ---------------------------------------------------------------------------
// Command union
// ---------------------------------------------------------------------------

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum EcpCommand {
    Ping,
    Unassociate,
    ServiceReset,
    FactoryReset,
    UpdateComplete,
    ReadSensor { index: u8 },
    RefreshDisplay { display: u8 },
    DisplayImage { display: u8, image: u8 },
    DisplayTimed { display: u8, image: u8, abs_time: u32 },
    Led(LedCommand),
    LedTimed { led: LedCommand, abs_time: u32 },
    Vendor { opcode: u8, params: VendorParams },
}

fn read_u32(p: &[u8], at: usize) -> Result<u32, EcpError> {
    p.get(at..at + 4)
        .and_then(|s| s.try_into().ok())
        .map(u32::from_le_bytes)
        .ok_or(EcpError::InvalidParameters)
}

/// Check the declared length and split `[op][esl-id][params]`.
pub fn split(bytes: &[u8]) -> Result<(u8, u8, &[u8]), EcpError> {
    let op = *bytes.first().ok_or(EcpError::InvalidParameters)?;
    if bytes.len() != tlv_len(op) {
        return Err(EcpError::InvalidParameters);
    }
    Ok((op, bytes[1], &bytes[2..]))
}

impl EcpCommand {
    /// Decode the parameters of `op`.  The caller has already checked the
    /// TLV length with [`split`].
    pub fn decode(op: u8, p: &[u8]) -> Result<Self, EcpError> {
        let byte = |i: usize| p.get(i).copied().ok_or(EcpError::InvalidParameters);

        if is_vendor(op) {
            let mut params = VendorParams::new();
            params
                .extend_from_slice(p)
                .map_err(|_| EcpError::InvalidParameters)?;
            return Ok(Self::Vendor { opcode: op, params });
        }

        Ok(match op {
            opcode::PING => Self::Ping,
            opcode::UNASSOCIATE => Self::Unassociate,
            opcode::SERVICE_RESET => Self::ServiceReset,
            opcode::FACTORY_RESET => Self::FactoryReset,
            opcode::UPDATE_COMPLETE => Self::UpdateComplete,
            opcode::READ_SENSOR => Self::ReadSensor { index: byte(0)? },
            opcode::REFRESH_DISPLAY => Self::RefreshDisplay { display: byte(0)? },
            opcode::DISPLAY_IMAGE => Self::DisplayImage {
                display: byte(0)?,
                image: byte(1)?,
            },
            opcode::DISPLAY_TIMED => Self::DisplayTimed {
                display: byte(0)?,
                image: byte(1)?,
                abs_time: read_u32(p, 2)?,
            },
            opcode::LED_CONTROL => Self::Led(LedCommand::parse(p)?),
            opcode::LED_TIMED => Self::LedTimed {
                led: LedCommand::parse(p)?,
                abs_time: read_u32(p, LED_PARAMS_LEN)?,
            },
            _ => return Err(EcpError::InvalidOpcode),
        })
    }

    pub fn opcode(&self) -> u8 {
        match self {
            Self::Ping => opcode::PING,
            Self::Unassociate => opcode::UNASSOCIATE,
            Self::ServiceReset => opcode::SERVICE_RESET,
            Self::FactoryReset => opcode::FACTORY_RESET,
            Self::UpdateComplete => opcode::UPDATE_COMPLETE,
            Self::ReadSensor { .. } => opcode::READ_SENSOR,
            Self::RefreshDisplay { .. } => opcode::REFRESH_DISPLAY,
            Self::DisplayImage { .. } => opcode::DISPLAY_IMAGE,
            Self::DisplayTimed { .. } => opcode::DISPLAY_TIMED,
            Self::Led(_) => opcode::LED_CONTROL,
            Self::LedTimed { .. } => opcode::LED_TIMED,
            Self::Vendor { opcode, .. } => *opcode,
        }
    }

    /// Encode as a TLV addressed to `esl_id`.
    pub fn encode(&self, esl_id: u8) -> TlvBuf {
        let mut out = TlvBuf::new();
        let _ = out.push(self.opcode());
        let _ = out.push(esl_id);
        match self {
            Self::Ping
            | Self::Unassociate
            | Self::ServiceReset
            | Self::FactoryReset
            | Self::UpdateComplete => {}
            Self::ReadSensor { index } => {
                let _ = out.push(*index);
            }
            Self::RefreshDisplay { display } => {
                let _ = out.push(*display);
            }
            Self::DisplayImage { display, image } => {
                let _ = out.extend_from_slice(&[*display, *image]);
            }
            Self::DisplayTimed {
                display,
                image,
                abs_time,
            } => {
                let _ = out.extend_from_slice(&[*display, *image]);
                let _ = out.extend_from_slice(&abs_time.to_le_bytes());
            }
            Self::Led(led) => led.write(&mut out),
            Self::LedTimed { led, abs_time } => {
                led.write(&mut out);
                let _ = out.extend_from_slice(&abs_time.to_le_bytes());
            }
            Self::Vendor { params, .. } => {
                let _ = out.extend_from_slice(params);
            }
        }
        out
    }
}

/// A decoded command together with the ESL id it was addressed to.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct EcpFrame {
    pub esl_id: u8,
    pub command: EcpCommand,
}

impl EcpFrame {
    pub fn new(esl_id: u8, command: EcpCommand) -> Self {
        Self { esl_id, command }
    }

    pub fn decode(bytes: &[u8]) -> Result<Self, EcpError> {
        let (op, esl_id, params) = split(bytes)?;
        Ok(Self {
            esl_id,
            command: EcpCommand::decode(op, params)?,
        })
    }

    pub fn encode(&self) -> TlvBuf {
        self.command.encode(self.esl_id)
    }
}
