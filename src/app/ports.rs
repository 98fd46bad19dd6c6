//! Port traits: the hexagonal boundary between the ESL core and the radio,
//! display, LED, sensor and flash collaborators.
//!
//! ```text
//!   Adapter ──▶ Port trait ──▶ TagService / AccessPoint (domain)
//! ```
//!
//! Adapters implement these traits.  [`TagService`](super::service::TagService)
//! consumes them through generics at call sites, so the protocol core never
//! touches a controller or a GPIO directly.
//!
//! ## Security notes
//!
//! - **SettingsPort** holds key material.  Implementations SHOULD place the
//!   `esl` namespace on encrypted storage.
//! - All port errors are typed; callers map them onto ECP error codes.

// ───────────────────────────────────────────────────────────────
// Hardware port (driven adapter: domain → display / LED / sensor)
// ───────────────────────────────────────────────────────────────

/// Display, LED and sensor elements of one tag.
pub trait HardwarePort {
    /// Bring every element up.  Called once from `TagService::start`.
    fn init(&mut self) -> Result<(), HwError>;

    /// Show (`enable`) or blank image `image` on display `index`.
    fn display_control(&mut self, index: u8, image: u8, enable: bool) -> Result<(), HwError>;

    /// Drive LED `index` on or off with the given colour/brightness byte.
    fn led_control(&mut self, index: u8, color_brightness: u8, on: bool) -> Result<(), HwError>;

    /// Read sensor `index` into `buf`.  Returns the number of bytes written.
    ///
    /// [`HwError::Busy`] means a measurement has been started and the
    /// controller should ask again later.
    fn sensor_read(&mut self, index: u8, buf: &mut [u8]) -> Result<usize, HwError>;
}

// ───────────────────────────────────────────────────────────────
// Image store port (driven adapter: domain ↔ image flash)
// ───────────────────────────────────────────────────────────────

/// Indexed image storage backing the Object Transfer image slots.
pub trait ImageStorePort {
    /// Write `data` into image `index` at `offset`.  Returns bytes written.
    fn write(&mut self, index: u8, data: &[u8], offset: usize) -> Result<usize, StorageError>;

    /// Read from image `index` at `offset` into `buf`.  Returns bytes read.
    fn read(&self, index: u8, offset: usize, buf: &mut [u8]) -> Result<usize, StorageError>;

    /// Stored size of image `index` (0 = empty slot).
    fn read_size(&self, index: u8) -> Result<usize, StorageError>;

    /// Erase every stored image.
    fn delete_all(&mut self) -> Result<(), StorageError>;
}

// ───────────────────────────────────────────────────────────────
// Settings port (driven adapter: domain ↔ flash key/value store)
// ───────────────────────────────────────────────────────────────

/// Persistent key-value storage for provisioned data.
///
/// The tag keeps its address, both keys and the abs-time flag under one
/// namespace.  A write that returns `Ok` must survive a power cut.
pub trait SettingsPort {
    /// Copy the stored value into `buf`, returning its length.
    fn read(&self, namespace: &str, key: &str, buf: &mut [u8]) -> Result<usize, StorageError>;

    fn write(&mut self, namespace: &str, key: &str, data: &[u8]) -> Result<(), StorageError>;

    /// Removing a missing key is not an error.
    fn delete(&mut self, namespace: &str, key: &str) -> Result<(), StorageError>;

    fn exists(&self, namespace: &str, key: &str) -> bool;
}

// ───────────────────────────────────────────────────────────────
// Radio port (driven adapter: domain → BLE controller)
// ───────────────────────────────────────────────────────────────

/// Link-layer actions requested by the tag lifecycle.
///
/// Calls are fire-and-forget; completion comes back later as a
/// [`LinkEvent`](super::commands::LinkEvent).
pub trait RadioPort {
    /// Start connectable advertising so an AP can (re)configure us.
    fn start_advertising(&mut self);

    /// Stop connectable advertising.
    fn stop_advertising(&mut self);

    /// Drop the current AP connection, if any.
    fn disconnect(&mut self);

    /// Accept periodic advertising sync transfer from the connected AP.
    fn subscribe_past(&mut self);

    /// Terminate the PAwR sync.
    fn stop_sync(&mut self);

    /// Notify the Control Point characteristic with an ECP response.
    fn notify_control_point(&mut self, response: &[u8]);

    /// Queue an encrypted response for the next PAwR response slot.
    fn set_pawr_response(&mut self, slot: u8, data: &[u8]);
}

// ───────────────────────────────────────────────────────────────
// Event sink port (driven adapter: domain → logging / telemetry)
// ───────────────────────────────────────────────────────────────

/// The domain emits structured [`TagEvent`](super::events::TagEvent)s
/// through this port.
pub trait EventSink {
    fn emit(&mut self, event: &super::events::TagEvent);
}

// ───────────────────────────────────────────────────────────────
// Combined tag I/O
// ───────────────────────────────────────────────────────────────

/// Everything a tag touches.  Blanket-implemented, so a single adapter (or
/// a single mock) that satisfies all four ports can be passed as `io`.
pub trait TagPorts: HardwarePort + ImageStorePort + SettingsPort + RadioPort {}

impl<T: HardwarePort + ImageStorePort + SettingsPort + RadioPort> TagPorts for T {}

// ───────────────────────────────────────────────────────────────
// Error types
// ───────────────────────────────────────────────────────────────

/// Errors from [`HardwarePort`] operations.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum HwError {
    /// Element is busy; a fresh measurement has been started.
    Busy,
    /// Index outside what the hardware provides.
    InvalidIndex,
    /// Driver reported a failure.
    Failed,
}

/// Rejected `TagConfig` / `ApConfig`.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ConfigError {
    /// Names the offending field.
    ValidationFailed(&'static str),
}

/// Errors from [`SettingsPort`] and [`ImageStorePort`] operations.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum StorageError {
    /// Requested key or image does not exist.
    NotFound,
    /// Storage partition is full.
    Full,
    /// Stored blob failed to decode.
    Corrupted,
    /// Generic I/O error.
    IoError,
}

impl core::fmt::Display for HwError {
    fn fmt(&self, f: &mut core::fmt::Formatter<'_>) -> core::fmt::Result {
        match self {
            Self::Busy => write!(f, "busy"),
            Self::InvalidIndex => write!(f, "invalid element index"),
            Self::Failed => write!(f, "driver failure"),
        }
    }
}

impl core::fmt::Display for ConfigError {
    fn fmt(&self, f: &mut core::fmt::Formatter<'_>) -> core::fmt::Result {
        match self {
            Self::ValidationFailed(msg) => write!(f, "invalid configuration: {msg}"),
        }
    }
}

impl core::fmt::Display for StorageError {
    fn fmt(&self, f: &mut core::fmt::Formatter<'_>) -> core::fmt::Result {
        match self {
            Self::NotFound => write!(f, "no such key or image"),
            Self::Full => write!(f, "out of storage"),
            Self::Corrupted => write!(f, "stored value corrupted"),
            Self::IoError => write!(f, "storage I/O failure"),
        }
    }
}
