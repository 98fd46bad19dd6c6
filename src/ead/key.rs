//! EAD key material: 16-byte session key + 8-byte IV.

use core::fmt;

use rand::RngCore;
use serde::{Deserialize, Serialize};

use crate::error::WriteError;

pub const SESSION_KEY_LEN: usize = 16;
pub const IV_LEN: usize = 8;
pub const KEY_MATERIAL_LEN: usize = SESSION_KEY_LEN + IV_LEN;

/// Session key and IV as used by the AES-CCM engine (at-rest order).
///
/// The characteristic wire form carries the session key byte-reversed;
/// [`KeyMaterial::from_wire`] and [`KeyMaterial::to_wire`] convert.
#[derive(Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
pub struct KeyMaterial {
    session_key: [u8; SESSION_KEY_LEN],
    iv: [u8; IV_LEN],
}

impl KeyMaterial {
    pub const fn new(session_key: [u8; SESSION_KEY_LEN], iv: [u8; IV_LEN]) -> Self {
        Self { session_key, iv }
    }

    /// All-zero material, meaning "not provisioned".
    pub const fn zeroed() -> Self {
        Self {
            session_key: [0; SESSION_KEY_LEN],
            iv: [0; IV_LEN],
        }
    }

    /// Fresh random material.
    pub fn generate(rng: &mut impl RngCore) -> Self {
        let mut k = Self::zeroed();
        rng.fill_bytes(&mut k.session_key);
        rng.fill_bytes(&mut k.iv);
        k
    }

    /// Parse a 24-byte characteristic value (session key reversed).
    pub fn from_wire(bytes: &[u8]) -> Result<Self, WriteError> {
        let mut k = Self::from_bytes(bytes)?;
        k.session_key.reverse();
        Ok(k)
    }

    /// Encode for a characteristic write (session key reversed).
    pub fn to_wire(&self) -> [u8; KEY_MATERIAL_LEN] {
        let mut out = self.to_bytes();
        out[..SESSION_KEY_LEN].reverse();
        out
    }

    /// Parse 24 bytes in at-rest order.
    pub fn from_bytes(bytes: &[u8]) -> Result<Self, WriteError> {
        if bytes.len() != KEY_MATERIAL_LEN {
            return Err(WriteError::InvalidLength);
        }
        let mut k = Self::zeroed();
        k.session_key.copy_from_slice(&bytes[..SESSION_KEY_LEN]);
        k.iv.copy_from_slice(&bytes[SESSION_KEY_LEN..]);
        Ok(k)
    }

    /// 24 bytes in at-rest order.
    pub fn to_bytes(&self) -> [u8; KEY_MATERIAL_LEN] {
        let mut out = [0u8; KEY_MATERIAL_LEN];
        out[..SESSION_KEY_LEN].copy_from_slice(&self.session_key);
        out[SESSION_KEY_LEN..].copy_from_slice(&self.iv);
        out
    }

    pub fn session_key(&self) -> &[u8; SESSION_KEY_LEN] {
        &self.session_key
    }

    pub fn iv(&self) -> &[u8; IV_LEN] {
        &self.iv
    }

    pub fn is_zero(&self) -> bool {
        self.session_key.iter().chain(self.iv.iter()).all(|b| *b == 0)
    }
}

// Never print key bytes.
impl fmt::Debug for KeyMaterial {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("KeyMaterial")
            .field("provisioned", &!self.is_zero())
            .finish()
    }
}
