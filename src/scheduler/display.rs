//! Per-display state: shown image and one pending timed image.

/// Marker for "no image displayed".
pub const NO_IMAGE: u8 = 0xFF;

/// A timed action waiting for its absolute time.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Pending<T> {
    /// Absolute time the AP asked for.
    pub abs_time: u32,
    /// Monotonic deadline derived from `abs_time`.
    pub fire_at: u64,
    pub item: T,
}

#[derive(Debug, Clone, Copy)]
pub struct DisplaySlot {
    index: u8,
    image: u8,
    pending: Option<Pending<u8>>,
}

impl DisplaySlot {
    pub const fn new(index: u8) -> Self {
        Self {
            index,
            image: NO_IMAGE,
            pending: None,
        }
    }

    pub fn index(&self) -> u8 {
        self.index
    }

    /// Image currently shown, `NO_IMAGE` if none.
    pub fn image(&self) -> u8 {
        self.image
    }

    pub fn set_image(&mut self, image: u8) {
        self.image = image;
    }

    pub fn pending(&self) -> Option<&Pending<u8>> {
        self.pending.as_ref()
    }

    pub fn schedule(&mut self, pending: Pending<u8>) {
        self.pending = Some(pending);
    }

    pub fn cancel(&mut self) {
        self.pending = None;
    }

    /// Take the pending image if its deadline has passed.
    pub fn take_due(&mut self, now_ms: u64) -> Option<u8> {
        match self.pending {
            Some(p) if now_ms >= p.fire_at => {
                self.pending = None;
                Some(p.item)
            }
            _ => None,
        }
    }

    pub fn reset(&mut self) {
        self.image = NO_IMAGE;
        self.pending = None;
    }
}
