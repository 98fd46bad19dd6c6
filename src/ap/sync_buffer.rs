//! Per-group sync packet and response buffers.
//!
//! One buffer per PAwR subevent.  The command task pushes encrypted sync
//! packets; the radio task services them once per broadcast interval and
//! delivers tag responses back.  The bytes live behind a critical-section
//! mutex and every status change is made while holding it; the status is
//! mirrored in an atomic so readers can peek without the lock.
//!
//! ```text
//!            push             service              on_response
//!  EMPTY ───────────▶ READY ──────────▶ PUSHED ─────────────────▶ RESP_FULL
//!    ▲                  ▲                 │                          │
//!    │                  └──── push ───────┘                          │
//!    └──────────────────────────── dump ─────────────────────────────┘
//! ```

use core::cell::RefCell;
use core::sync::atomic::{AtomicU8, Ordering};

use embassy_sync::blocking_mutex::Mutex;
use embassy_sync::blocking_mutex::raw::CriticalSectionRawMutex;
use heapless::Vec;
use log::{debug, warn};
use rand::RngCore;

use super::{MAX_GROUPS, MAX_RESPONSE_SLOTS};
use crate::app::ports::ConfigError;
use crate::config::ApConfig;
use crate::ead::{self, Direction, EadCodec, Envelope, KeyMaterial, Payload, ENVELOPE_MAX_LEN};
use crate::error::BufferError;

// ---------------------------------------------------------------------------
// Status
// ---------------------------------------------------------------------------

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
#[repr(u8)]
pub enum BufferStatus {
    Empty = 0,
    ReadyToPush = 1,
    Pushed = 2,
    RespFull = 3,
}

impl BufferStatus {
    const fn from_u8(v: u8) -> Self {
        match v {
            1 => Self::ReadyToPush,
            2 => Self::Pushed,
            3 => Self::RespFull,
            _ => Self::Empty,
        }
    }

    pub const fn as_str(self) -> &'static str {
        match self {
            Self::Empty => "EMPTY",
            Self::ReadyToPush => "READY_TO_PUSH",
            Self::Pushed => "PUSHED",
            Self::RespFull => "RESP_FULL",
        }
    }
}

// ---------------------------------------------------------------------------
// Storage
// ---------------------------------------------------------------------------

#[derive(Debug, Default)]
struct ResponseSlot {
    key: Option<KeyMaterial>,
    data: Envelope,
}

#[derive(Debug)]
struct GroupData {
    payload: Envelope,
    slots: [ResponseSlot; MAX_RESPONSE_SLOTS],
}

impl GroupData {
    fn new() -> Self {
        Self {
            payload: Envelope::new(),
            slots: core::array::from_fn(|_| ResponseSlot::default()),
        }
    }
}

/// Bytes handed to the radio for one subevent.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SubeventData {
    pub group: u8,
    pub payload: Envelope,
}

/// One response taken out of a group by [`GroupSyncBuffers::dump`].
///
/// `payload` is `None` when the slot has no key or the envelope did not
/// authenticate.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SlotResponse {
    pub slot: u8,
    pub payload: Option<Payload>,
}

// ---------------------------------------------------------------------------
// Buffers
// ---------------------------------------------------------------------------

pub struct GroupSyncBuffers {
    max_groups: u8,
    response_slots: u8,
    status: [AtomicU8; MAX_GROUPS],
    groups: Mutex<CriticalSectionRawMutex, RefCell<Vec<GroupData, MAX_GROUPS>>>,
    /// AP-Sync-Key codec.  A single randomizer source serves every group,
    /// so no two packets share a nonce regardless of which group they go to.
    codec: Mutex<CriticalSectionRawMutex, RefCell<EadCodec>>,
}

impl GroupSyncBuffers {
    pub fn new(
        config: &ApConfig,
        ap_key: KeyMaterial,
        rng: &mut impl RngCore,
    ) -> Result<Self, ConfigError> {
        config.validate()?;

        let mut groups = Vec::new();
        for _ in 0..config.max_groups {
            // Bounded by `validate`.
            let _ = groups.push(GroupData::new());
        }

        Ok(Self {
            max_groups: config.max_groups,
            response_slots: config.response_slots,
            status: core::array::from_fn(|_| AtomicU8::new(BufferStatus::Empty as u8)),
            groups: Mutex::new(RefCell::new(groups)),
            codec: Mutex::new(RefCell::new(EadCodec::new(ap_key, Direction::ApToTag, rng))),
        })
    }

    pub fn max_groups(&self) -> u8 {
        self.max_groups
    }

    pub fn response_slots(&self) -> u8 {
        self.response_slots
    }

    fn check_group(&self, group: u8) -> Result<usize, BufferError> {
        if group < self.max_groups {
            Ok(group as usize)
        } else {
            Err(BufferError::InvalidGroup)
        }
    }

    fn check_slot(&self, slot: u8) -> Result<usize, BufferError> {
        if slot < self.response_slots {
            Ok(slot as usize)
        } else {
            Err(BufferError::InvalidSlot)
        }
    }

    fn load(&self, idx: usize) -> BufferStatus {
        BufferStatus::from_u8(self.status[idx].load(Ordering::Acquire))
    }

    fn store(&self, idx: usize, status: BufferStatus) {
        self.status[idx].store(status as u8, Ordering::Release);
    }

    pub fn status(&self, group: u8) -> Option<BufferStatus> {
        self.check_group(group).ok().map(|idx| self.load(idx))
    }

    /// Diagnostic name of the group's status; `"INVALID"` out of range.
    pub fn status_str(&self, group: u8) -> &'static str {
        self.status(group).map_or("INVALID", BufferStatus::as_str)
    }

    /// Replace the AP-Sync-Key.  The randomizer counter keeps running.
    pub fn set_ap_key(&self, key: KeyMaterial) {
        self.codec.lock(|c| c.borrow_mut().rekey(key));
    }

    pub fn ap_key(&self) -> KeyMaterial {
        self.codec.lock(|c| *c.borrow().key())
    }

    // ── Command side ──────────────────────────────────────────

    /// Encrypt `plaintext` (a `[group][TLV]*` payload) and queue it for the
    /// next broadcast of `group`.
    pub fn push(&self, group: u8, plaintext: &[u8]) -> Result<(), BufferError> {
        let idx = self.check_group(group)?;
        // Skip encrypting for a group that is plainly busy.
        self.check_writable(group, idx)?;

        let envelope = self.codec.lock(|c| c.borrow_mut().encrypt(plaintext))?;
        self.groups.lock(|g| {
            // Re-check under the lock: another push or a response may have
            // landed while encrypting.
            self.check_writable(group, idx)?;
            let mut groups = g.borrow_mut();
            let data = groups.get_mut(idx).ok_or(BufferError::InvalidGroup)?;
            data.payload = envelope;
            self.store(idx, BufferStatus::ReadyToPush);
            Ok(())
        })
    }

    fn check_writable(&self, group: u8, idx: usize) -> Result<(), BufferError> {
        match self.load(idx) {
            BufferStatus::Empty | BufferStatus::Pushed => Ok(()),
            other => {
                debug!("Group {group} busy ({})", other.as_str());
                Err(BufferError::Busy)
            }
        }
    }

    /// Install the Response-Key used to decode `slot` of `group`.
    pub fn set_response_key(
        &self,
        group: u8,
        slot: u8,
        key: KeyMaterial,
    ) -> Result<(), BufferError> {
        let idx = self.check_group(group)?;
        let slot = self.check_slot(slot)?;
        self.groups.lock(|g| {
            if let Some(data) = g.borrow_mut().get_mut(idx) {
                data.slots[slot].key = Some(key);
            }
        });
        Ok(())
    }

    pub fn clear_response_key(&self, group: u8, slot: u8) -> Result<(), BufferError> {
        let idx = self.check_group(group)?;
        let slot = self.check_slot(slot)?;
        self.groups.lock(|g| {
            if let Some(data) = g.borrow_mut().get_mut(idx) {
                data.slots[slot].key = None;
            }
        });
        Ok(())
    }

    /// Take every response out of a RESP_FULL group and return it to EMPTY.
    ///
    /// Any other status returns an empty list and leaves the group alone.
    pub fn dump(&self, group: u8) -> Result<Vec<SlotResponse, MAX_RESPONSE_SLOTS>, BufferError> {
        let idx = self.check_group(group)?;
        let mut out = Vec::new();

        self.groups.lock(|g| {
            if self.load(idx) != BufferStatus::RespFull {
                return;
            }
            let mut groups = g.borrow_mut();
            let Some(data) = groups.get_mut(idx) else {
                return;
            };
            let live = self.response_slots as usize;
            for (slot, rsp) in data.slots.iter_mut().enumerate().take(live) {
                if rsp.data.is_empty() {
                    continue;
                }
                let payload = decode_slot(rsp, group, slot);
                rsp.data.clear();
                let _ = out.push(SlotResponse {
                    slot: slot as u8,
                    payload,
                });
            }
            self.store(idx, BufferStatus::Empty);
        });
        Ok(out)
    }

    // ── Radio side ────────────────────────────────────────────

    /// Collect READY groups among `count` consecutive ids from `start`
    /// (wrapping) and mark them PUSHED.
    pub fn service(&self, start: u8, count: u8) -> Vec<SubeventData, MAX_GROUPS> {
        let n = count.min(self.max_groups);
        let ids = (0..n).map(|i| ((start as u16 + i as u16) % self.max_groups as u16) as u8);
        self.collect(ids)
    }

    /// Same as [`service`](Self::service) for an explicit id list.
    pub fn service_groups(&self, ids: &[u8]) -> Vec<SubeventData, MAX_GROUPS> {
        let max = self.max_groups;
        self.collect(ids.iter().map(move |&id| id % max))
    }

    fn collect(&self, ids: impl Iterator<Item = u8>) -> Vec<SubeventData, MAX_GROUPS> {
        let mut out = Vec::new();
        for group in ids {
            let idx = group as usize;
            if out.is_full() {
                warn!("Subevent output full, group {group} left for next interval");
                break;
            }
            self.groups.lock(|g| {
                if self.load(idx) != BufferStatus::ReadyToPush {
                    return;
                }
                if let Some(d) = g.borrow().get(idx) {
                    let payload = d.payload.clone();
                    // Capacity checked above.
                    let _ = out.push(SubeventData { group, payload });
                    self.store(idx, BufferStatus::Pushed);
                }
            });
        }
        out
    }

    /// Store a response received in `slot` of `group`.
    ///
    /// The other slots of the group are cleared.  Returns the decoded
    /// payload when the slot has a key and the envelope authenticates.
    pub fn on_response(
        &self,
        group: u8,
        slot: u8,
        bytes: &[u8],
    ) -> Result<Option<Payload>, BufferError> {
        let idx = self.check_group(group)?;
        let slot = self.check_slot(slot)?;
        if bytes.len() > ENVELOPE_MAX_LEN {
            warn!("Group {group} slot {slot}: response of {} bytes dropped", bytes.len());
            return Err(BufferError::ResponseTooLong);
        }

        let payload = self.groups.lock(|g| {
            let mut groups = g.borrow_mut();
            let data = groups.get_mut(idx)?;
            for rsp in data.slots.iter_mut() {
                rsp.data.clear();
            }
            let rsp = &mut data.slots[slot];
            // Length checked above.
            let _ = rsp.data.extend_from_slice(bytes);
            let payload = decode_slot(rsp, group, slot);
            self.store(idx, BufferStatus::RespFull);
            payload
        });
        Ok(payload)
    }
}

fn decode_slot(rsp: &ResponseSlot, group: u8, slot: usize) -> Option<Payload> {
    if let Err(e) = ead::peek_randomizer(&rsp.data) {
        warn!("Group {group} slot {slot}: malformed response ({e})");
        return None;
    }
    let Some(key) = rsp.key.as_ref() else {
        debug!("Group {group} slot {slot}: no response key");
        return None;
    };
    match ead::open(&rsp.data, key) {
        Ok(p) => Some(p),
        Err(e) => {
            warn!("Group {group} slot {slot}: {e}");
            None
        }
    }
}
