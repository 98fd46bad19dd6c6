//! ESL Control Point grammar.
//!
//! Every command and response is a TLV whose first byte packs the opcode
//! tag (low nibble) with a length nibble (high nibble):
//!
//! ```text
//!  command  = [op][esl-id][params ...]      total = (op >> 4) + 2
//!  response = [op][params ...]              total = (op >> 4) + 2
//! ```
//!
//! The same grammar is used on the Control Point characteristic and inside
//! decrypted sync packets (which prefix the TLV stream with a group id).

pub mod accumulator;
pub mod address;
pub mod command;
pub mod response;
pub mod sync_packet;

pub use accumulator::ResponseAccumulator;
pub use address::EslAddress;
pub use command::{EcpCommand, EcpFrame, FlashPattern, LedCommand, Repeat, RepeatKind};
pub use response::{BasicState, EcpResponse};
pub use sync_packet::{SyncPacket, SyncPacketBuilder};

/// Command opcodes (full byte, length nibble included).
pub mod opcode {
    pub const PING: u8 = 0x00;
    pub const UNASSOCIATE: u8 = 0x01;
    pub const SERVICE_RESET: u8 = 0x02;
    pub const FACTORY_RESET: u8 = 0x03;
    pub const UPDATE_COMPLETE: u8 = 0x04;
    pub const READ_SENSOR: u8 = 0x10;
    pub const REFRESH_DISPLAY: u8 = 0x11;
    pub const DISPLAY_IMAGE: u8 = 0x20;
    pub const DISPLAY_TIMED: u8 = 0x60;
    pub const LED_CONTROL: u8 = 0xB0;
    pub const LED_TIMED: u8 = 0xF0;
}

/// Response opcodes.  Sensor and vendor responses carry their length in
/// the high nibble, so only the tag is fixed.
pub mod rsp_opcode {
    pub const ERROR: u8 = 0x00;
    pub const LED_STATE: u8 = 0x01;
    pub const BASIC_STATE: u8 = 0x10;
    pub const DISPLAY_STATE: u8 = 0x11;
    pub const SENSOR_TAG: u8 = 0x0E;
}

/// Low-nibble tag shared by vendor-specific commands and responses.
pub const VENDOR_TAG: u8 = 0x0F;

/// ESL id addressing every tag in the group.
pub const ESL_ADDR_BROADCAST: u8 = 0xFF;

/// Largest TLV the grammar can express.
pub const TLV_MAX_LEN: usize = 17;

/// Total TLV length (header included) declared by `op`.
pub const fn tlv_len(op: u8) -> usize {
    (op >> 4) as usize + 2
}

/// Length nibble needed to carry `params` parameter bytes.
pub const fn len_nibble(params: usize) -> u8 {
    ((params.saturating_sub(1) as u8) & 0x0F) << 4
}

pub const fn is_vendor(op: u8) -> bool {
    op & 0x0F == VENDOR_TAG
}
