//! Unified error types for the ESL protocol layer.
//!
//! A single `Error` enum that every subsystem can convert into keeps the
//! service entry points uniform.  All variants are `Copy` so they can be
//! passed through the processor and FSM without allocation.
//!
//! Protocol-level failures are a separate channel: [`EcpError`] values are
//! carried in-band inside an ECP response and never surface as `Err` from
//! the tag service.

use core::fmt;

use crate::app::ports::{ConfigError, HwError, StorageError};

// ---------------------------------------------------------------------------
// Top-level error
// ---------------------------------------------------------------------------

/// Every fallible local operation funnels into this type.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Error {
    /// Encrypted advertising data could not be built or opened.
    Ead(EadError),
    /// A control point command was rejected.
    Ecp(EcpError),
    /// AP sync buffer operation failed.
    Buffer(BufferError),
    /// A characteristic write was refused.
    Write(WriteError),
    /// Persistent storage failed.
    Storage(StorageError),
    /// Display / LED / sensor collaborator failed.
    Hardware(HwError),
    /// Configuration is invalid.
    Config(&'static str),
}

impl fmt::Display for Error {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Ead(e) => write!(f, "ead: {e}"),
            Self::Ecp(e) => write!(f, "ecp: {e}"),
            Self::Buffer(e) => write!(f, "sync buffer: {e}"),
            Self::Write(e) => write!(f, "write: {e}"),
            Self::Storage(e) => write!(f, "storage: {e}"),
            Self::Hardware(e) => write!(f, "hardware: {e}"),
            Self::Config(msg) => write!(f, "config: {msg}"),
        }
    }
}

impl core::error::Error for Error {}

// ---------------------------------------------------------------------------
// EAD errors
// ---------------------------------------------------------------------------

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum EadError {
    /// Shorter than header + randomizer + MIC.
    Truncated,
    /// Plaintext would not fit in one advertising payload.
    TooLong,
    /// Length byte disagrees with the buffer length.
    LengthMismatch,
    /// Outer AD type is not Encrypted Advertising Data.
    NotEncrypted,
    /// Inner AD type is not ESL.
    NotEsl,
    /// MIC check failed: wrong key, wrong IV or tampered payload.
    AuthenticationFailed,
}

impl fmt::Display for EadError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Truncated => write!(f, "payload truncated"),
            Self::TooLong => write!(f, "payload too long"),
            Self::LengthMismatch => write!(f, "AD length mismatch"),
            Self::NotEncrypted => write!(f, "not encrypted AD"),
            Self::NotEsl => write!(f, "not ESL AD"),
            Self::AuthenticationFailed => write!(f, "authentication failed"),
        }
    }
}

impl From<EadError> for Error {
    fn from(e: EadError) -> Self {
        Self::Ead(e)
    }
}

// ---------------------------------------------------------------------------
// ECP protocol errors (wire codes)
// ---------------------------------------------------------------------------

/// ESL control point error codes, as carried in an `OP_ERR` response.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
#[repr(u8)]
pub enum EcpError {
    Unspecified = 0x01,
    InvalidOpcode = 0x02,
    InvalidState = 0x03,
    InvalidImageIndex = 0x04,
    ImageNotAvailable = 0x05,
    InvalidParameters = 0x06,
    CapacityLimit = 0x07,
    InsufficientBattery = 0x08,
    InsufficientResources = 0x09,
    Retry = 0x0A,
    QueueFull = 0x0B,
    ImplausibleAbsoluteTime = 0x0C,
}

impl EcpError {
    /// Wire code for this error.
    pub const fn code(self) -> u8 {
        self as u8
    }

    /// Decode a wire error code.  Unknown / RFU codes yield `None`.
    pub fn from_code(code: u8) -> Option<Self> {
        Some(match code {
            0x01 => Self::Unspecified,
            0x02 => Self::InvalidOpcode,
            0x03 => Self::InvalidState,
            0x04 => Self::InvalidImageIndex,
            0x05 => Self::ImageNotAvailable,
            0x06 => Self::InvalidParameters,
            0x07 => Self::CapacityLimit,
            0x08 => Self::InsufficientBattery,
            0x09 => Self::InsufficientResources,
            0x0A => Self::Retry,
            0x0B => Self::QueueFull,
            0x0C => Self::ImplausibleAbsoluteTime,
            _ => return None,
        })
    }
}

impl fmt::Display for EcpError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let s = match self {
            Self::Unspecified => "unspecified error",
            Self::InvalidOpcode => "invalid opcode",
            Self::InvalidState => "invalid state",
            Self::InvalidImageIndex => "invalid image index",
            Self::ImageNotAvailable => "image not available",
            Self::InvalidParameters => "invalid parameter(s)",
            Self::CapacityLimit => "capacity limit",
            Self::InsufficientBattery => "insufficient battery",
            Self::InsufficientResources => "insufficient resources",
            Self::Retry => "retry",
            Self::QueueFull => "queue full",
            Self::ImplausibleAbsoluteTime => "implausible absolute time",
        };
        write!(f, "{s} (0x{:02x})", self.code())
    }
}

impl From<EcpError> for Error {
    fn from(e: EcpError) -> Self {
        Self::Ecp(e)
    }
}

// ---------------------------------------------------------------------------
// Sync buffer errors (AP role)
// ---------------------------------------------------------------------------

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum BufferError {
    /// Buffer is READY_TO_PUSH or RESP_FULL; caller must retry later.
    Busy,
    /// Group id beyond the configured subevent count.
    InvalidGroup,
    /// Response slot beyond the configured slot count.
    InvalidSlot,
    /// Response bytes exceed one advertising payload.
    ResponseTooLong,
    /// Composing the encrypted payload failed.
    Ead(EadError),
}

impl fmt::Display for BufferError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Busy => write!(f, "buffer busy"),
            Self::InvalidGroup => write!(f, "invalid group id"),
            Self::InvalidSlot => write!(f, "invalid response slot"),
            Self::ResponseTooLong => write!(f, "response too long"),
            Self::Ead(e) => write!(f, "{e}"),
        }
    }
}

impl From<EadError> for BufferError {
    fn from(e: EadError) -> Self {
        Self::Ead(e)
    }
}

impl From<BufferError> for Error {
    fn from(e: BufferError) -> Self {
        Self::Buffer(e)
    }
}

// ---------------------------------------------------------------------------
// Characteristic write errors (ATT-level)
// ---------------------------------------------------------------------------

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum WriteError {
    /// Value length does not match the characteristic.
    InvalidLength,
    /// Value is well-formed but not permitted (e.g. broadcast ESL id).
    ValueNotAllowed,
}

impl fmt::Display for WriteError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::InvalidLength => write!(f, "invalid attribute value length"),
            Self::ValueNotAllowed => write!(f, "value not allowed"),
        }
    }
}

impl From<WriteError> for Error {
    fn from(e: WriteError) -> Self {
        Self::Write(e)
    }
}

impl From<StorageError> for Error {
    fn from(e: StorageError) -> Self {
        Self::Storage(e)
    }
}

impl From<HwError> for Error {
    fn from(e: HwError) -> Self {
        Self::Hardware(e)
    }
}

impl From<ConfigError> for Error {
    fn from(e: ConfigError) -> Self {
        match e {
            ConfigError::ValidationFailed(msg) => Self::Config(msg),
        }
    }
}

// ---------------------------------------------------------------------------
// Convenience Result alias
// ---------------------------------------------------------------------------

/// Crate-wide `Result` alias.
pub type Result<T> = core::result::Result<T, Error>;
