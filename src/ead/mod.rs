//! Encrypted Advertising Data envelope.
//!
//! ```text
//!  envelope  = [len][0x31][randomizer 5B][ciphertext][MIC 4B]
//!  plaintext = [len][0x34][payload ...]
//!  nonce     = randomizer ‖ IV           (13 bytes)
//!  AAD       = 0xEA
//! ```
//!
//! [`seal`] and [`open`] are pure functions.  [`EadCodec`] pairs a key with
//! its own [`RandomizerSource`] so callers cannot encrypt twice with the
//! same randomizer.

pub mod key;
pub mod randomizer;

use ccm::aead::generic_array::GenericArray;
use ccm::aead::{AeadInPlace, KeyInit};
use ccm::consts::{U4, U13};
use ccm::Ccm;
use heapless::Vec;
use rand::RngCore;

use crate::error::EadError;

pub use key::{KeyMaterial, IV_LEN, KEY_MATERIAL_LEN, SESSION_KEY_LEN};
pub use randomizer::{Direction, Randomizer, RandomizerSource, RANDOMIZER_LEN};

/// AES-128-CCM, 4-byte MIC, 13-byte nonce.
type EadCipher = Ccm<aes::Aes128, U4, U13>;

pub const AD_TYPE_ENCRYPTED: u8 = 0x31;
pub const AD_TYPE_ESL: u8 = 0x34;
pub const MIC_LEN: usize = 4;
pub const AAD: [u8; 1] = [0xEA];

/// Largest sync packet / response payload carried inside one envelope.
pub const PAYLOAD_MAX_LEN: usize = 48;
/// `[len][0x34]` + payload.
pub const PLAINTEXT_MAX_LEN: usize = 2 + PAYLOAD_MAX_LEN;
/// `[len][0x31]` + randomizer + plaintext + MIC.
pub const ENVELOPE_MAX_LEN: usize = 2 + RANDOMIZER_LEN + PLAINTEXT_MAX_LEN + MIC_LEN;

const NONCE_LEN: usize = RANDOMIZER_LEN + IV_LEN;
const ENVELOPE_MIN_LEN: usize = 2 + RANDOMIZER_LEN + 2 + MIC_LEN;

pub type Payload = Vec<u8, PAYLOAD_MAX_LEN>;
pub type Envelope = Vec<u8, ENVELOPE_MAX_LEN>;

fn nonce(randomizer: &Randomizer, key: &KeyMaterial) -> [u8; NONCE_LEN] {
    let mut n = [0u8; NONCE_LEN];
    n[..RANDOMIZER_LEN].copy_from_slice(randomizer.as_bytes());
    n[RANDOMIZER_LEN..].copy_from_slice(key.iv());
    n
}

fn cipher(key: &KeyMaterial) -> EadCipher {
    EadCipher::new(GenericArray::from_slice(key.session_key()))
}

/// Encrypt `payload` into a complete envelope.
pub fn seal(
    payload: &[u8],
    key: &KeyMaterial,
    randomizer: Randomizer,
) -> Result<Envelope, EadError> {
    if payload.len() > PAYLOAD_MAX_LEN {
        return Err(EadError::TooLong);
    }

    let mut body: Vec<u8, PLAINTEXT_MAX_LEN> = Vec::new();
    // Lengths are bounded above, so none of these pushes can fail.
    let _ = body.push((payload.len() + 1) as u8);
    let _ = body.push(AD_TYPE_ESL);
    let _ = body.extend_from_slice(payload);

    let n = nonce(&randomizer, key);
    let tag = cipher(key)
        .encrypt_in_place_detached(GenericArray::from_slice(&n), &AAD, &mut body)
        .map_err(|_| EadError::TooLong)?;

    let mut out = Envelope::new();
    let inner_len = RANDOMIZER_LEN + body.len() + MIC_LEN;
    let _ = out.push((inner_len + 1) as u8);
    let _ = out.push(AD_TYPE_ENCRYPTED);
    let _ = out.extend_from_slice(randomizer.as_bytes());
    let _ = out.extend_from_slice(&body);
    let _ = out.extend_from_slice(&tag);
    Ok(out)
}

/// Decrypt and authenticate an envelope, returning the ESL payload.
///
/// Any failure means the caller drops the packet without reacting.
pub fn open(envelope: &[u8], key: &KeyMaterial) -> Result<Payload, EadError> {
    let (randomizer, ct, mic) = split(envelope)?;

    let mut body: Vec<u8, PLAINTEXT_MAX_LEN> = Vec::new();
    body.extend_from_slice(ct).map_err(|_| EadError::TooLong)?;

    let n = nonce(&randomizer, key);
    cipher(key)
        .decrypt_in_place_detached(
            GenericArray::from_slice(&n),
            &AAD,
            &mut body,
            GenericArray::from_slice(mic),
        )
        .map_err(|_| EadError::AuthenticationFailed)?;

    if body.len() < 2 || body[0] as usize + 1 != body.len() {
        return Err(EadError::LengthMismatch);
    }
    if body[1] != AD_TYPE_ESL {
        return Err(EadError::NotEsl);
    }

    let mut out = Payload::new();
    out.extend_from_slice(&body[2..])
        .map_err(|_| EadError::TooLong)?;
    Ok(out)
}

/// Validate the outer framing and split it into its three parts.
fn split(envelope: &[u8]) -> Result<(Randomizer, &[u8], &[u8]), EadError> {
    if envelope.len() < ENVELOPE_MIN_LEN {
        return Err(EadError::Truncated);
    }
    if envelope.len() > ENVELOPE_MAX_LEN {
        return Err(EadError::TooLong);
    }
    if envelope[0] as usize + 1 != envelope.len() {
        return Err(EadError::LengthMismatch);
    }
    if envelope[1] != AD_TYPE_ENCRYPTED {
        return Err(EadError::NotEncrypted);
    }

    let mut r = [0u8; RANDOMIZER_LEN];
    r.copy_from_slice(&envelope[2..2 + RANDOMIZER_LEN]);
    let mic_at = envelope.len() - MIC_LEN;
    Ok((
        Randomizer::from_received(r),
        &envelope[2 + RANDOMIZER_LEN..mic_at],
        &envelope[mic_at..],
    ))
}

/// Randomizer carried by an envelope, without decrypting it.
pub fn peek_randomizer(envelope: &[u8]) -> Result<Randomizer, EadError> {
    split(envelope).map(|(r, _, _)| r)
}

// ---------------------------------------------------------------------------
// Stateful codec
// ---------------------------------------------------------------------------

/// A key together with the randomizer source used for every encryption
/// under that key.
#[derive(Debug, Clone)]
pub struct EadCodec {
    key: KeyMaterial,
    randomizers: RandomizerSource,
}

impl EadCodec {
    pub fn new(key: KeyMaterial, direction: Direction, rng: &mut impl RngCore) -> Self {
        Self {
            key,
            randomizers: RandomizerSource::new(rng, direction),
        }
    }

    pub fn with_source(key: KeyMaterial, randomizers: RandomizerSource) -> Self {
        Self { key, randomizers }
    }

    /// Encrypt with the next randomizer.
    pub fn encrypt(&mut self, payload: &[u8]) -> Result<Envelope, EadError> {
        let r = self.randomizers.next_randomizer();
        seal(payload, &self.key, r)
    }

    pub fn decrypt(&self, envelope: &[u8]) -> Result<Payload, EadError> {
        open(envelope, &self.key)
    }

    pub fn key(&self) -> &KeyMaterial {
        &self.key
    }

    /// Replace the key.  The counter keeps running so a re-installed key
    /// never sees an old randomizer again.
    pub fn rekey(&mut self, key: KeyMaterial) {
        self.key = key;
    }
}
