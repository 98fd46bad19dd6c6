//! Recording mock for every tag port.
//!
//! Records each hardware and radio call so tests can assert on the full
//! history without a controller, and keeps settings / images in memory.

use std::collections::HashMap;

use shelflink::app::events::TagEvent;
use shelflink::app::ports::{
    EventSink, HardwarePort, HwError, ImageStorePort, RadioPort, SettingsPort, StorageError,
};

// ── Call record ───────────────────────────────────────────────

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Call {
    Init,
    Display { index: u8, image: u8, enable: bool },
    Led { index: u8, color_brightness: u8, on: bool },
    SensorRead { index: u8 },
    StartAdvertising,
    StopAdvertising,
    Disconnect,
    SubscribePast,
    StopSync,
    Notify(Vec<u8>),
    PawrResponse { slot: u8, data: Vec<u8> },
    DeleteImages,
}

// ── MockTag ───────────────────────────────────────────────────

pub struct MockTag {
    pub calls: Vec<Call>,
    pub settings: HashMap<String, Vec<u8>>,
    pub image_sizes: HashMap<u8, usize>,
    pub sensor_value: Vec<u8>,
    pub sensor_busy: bool,
}

#[allow(dead_code)]
impl MockTag {
    pub fn new() -> Self {
        Self {
            calls: Vec::new(),
            settings: HashMap::new(),
            image_sizes: HashMap::new(),
            sensor_value: vec![0x12, 0x34],
            sensor_busy: false,
        }
    }

    /// Mark image `index` as stored with `size` bytes.
    pub fn with_image(mut self, index: u8, size: usize) -> Self {
        self.image_sizes.insert(index, size);
        self
    }

    pub fn clear(&mut self) {
        self.calls.clear();
    }

    pub fn count(&self, call: &Call) -> usize {
        self.calls.iter().filter(|c| *c == call).count()
    }

    pub fn notifications(&self) -> Vec<Vec<u8>> {
        self.calls
            .iter()
            .filter_map(|c| match c {
                Call::Notify(b) => Some(b.clone()),
                _ => None,
            })
            .collect()
    }

    pub fn last_pawr_response(&self) -> Option<(u8, Vec<u8>)> {
        self.calls.iter().rev().find_map(|c| match c {
            Call::PawrResponse { slot, data } => Some((*slot, data.clone())),
            _ => None,
        })
    }

    pub fn led_calls(&self, index: u8) -> Vec<bool> {
        self.calls
            .iter()
            .filter_map(|c| match c {
                Call::Led { index: i, on, .. } if *i == index => Some(*on),
                _ => None,
            })
            .collect()
    }

    fn key(namespace: &str, key: &str) -> String {
        format!("{namespace}::{key}")
    }
}

impl Default for MockTag {
    fn default() -> Self {
        Self::new()
    }
}

impl HardwarePort for MockTag {
    fn init(&mut self) -> Result<(), HwError> {
        self.calls.push(Call::Init);
        Ok(())
    }

    fn display_control(&mut self, index: u8, image: u8, enable: bool) -> Result<(), HwError> {
        self.calls.push(Call::Display {
            index,
            image,
            enable,
        });
        Ok(())
    }

    fn led_control(&mut self, index: u8, color_brightness: u8, on: bool) -> Result<(), HwError> {
        self.calls.push(Call::Led {
            index,
            color_brightness,
            on,
        });
        Ok(())
    }

    fn sensor_read(&mut self, index: u8, buf: &mut [u8]) -> Result<usize, HwError> {
        self.calls.push(Call::SensorRead { index });
        if self.sensor_busy {
            return Err(HwError::Busy);
        }
        let n = self.sensor_value.len().min(buf.len());
        buf[..n].copy_from_slice(&self.sensor_value[..n]);
        Ok(n)
    }
}

impl ImageStorePort for MockTag {
    fn write(&mut self, index: u8, data: &[u8], offset: usize) -> Result<usize, StorageError> {
        let size = self.image_sizes.entry(index).or_default();
        *size = (*size).max(offset + data.len());
        Ok(data.len())
    }

    fn read(&self, _index: u8, _offset: usize, _buf: &mut [u8]) -> Result<usize, StorageError> {
        Ok(0)
    }

    fn read_size(&self, index: u8) -> Result<usize, StorageError> {
        Ok(self.image_sizes.get(&index).copied().unwrap_or(0))
    }

    fn delete_all(&mut self) -> Result<(), StorageError> {
        self.calls.push(Call::DeleteImages);
        self.image_sizes.clear();
        Ok(())
    }
}

impl SettingsPort for MockTag {
    fn read(&self, namespace: &str, key: &str, buf: &mut [u8]) -> Result<usize, StorageError> {
        let data = self
            .settings
            .get(&Self::key(namespace, key))
            .ok_or(StorageError::NotFound)?;
        let n = data.len().min(buf.len());
        buf[..n].copy_from_slice(&data[..n]);
        Ok(n)
    }

    fn write(&mut self, namespace: &str, key: &str, data: &[u8]) -> Result<(), StorageError> {
        self.settings.insert(Self::key(namespace, key), data.to_vec());
        Ok(())
    }

    fn delete(&mut self, namespace: &str, key: &str) -> Result<(), StorageError> {
        self.settings.remove(&Self::key(namespace, key));
        Ok(())
    }

    fn exists(&self, namespace: &str, key: &str) -> bool {
        self.settings.contains_key(&Self::key(namespace, key))
    }
}

impl RadioPort for MockTag {
    fn start_advertising(&mut self) {
        self.calls.push(Call::StartAdvertising);
    }

    fn stop_advertising(&mut self) {
        self.calls.push(Call::StopAdvertising);
    }

    fn disconnect(&mut self) {
        self.calls.push(Call::Disconnect);
    }

    fn subscribe_past(&mut self) {
        self.calls.push(Call::SubscribePast);
    }

    fn stop_sync(&mut self) {
        self.calls.push(Call::StopSync);
    }

    fn notify_control_point(&mut self, response: &[u8]) {
        self.calls.push(Call::Notify(response.to_vec()));
    }

    fn set_pawr_response(&mut self, slot: u8, data: &[u8]) {
        self.calls.push(Call::PawrResponse {
            slot,
            data: data.to_vec(),
        });
    }
}

// ── RecordingSink ─────────────────────────────────────────────

pub struct RecordingSink {
    pub events: Vec<TagEvent>,
}

#[allow(dead_code)]
impl RecordingSink {
    pub fn new() -> Self {
        Self { events: Vec::new() }
    }

    pub fn contains(&self, event: &TagEvent) -> bool {
        self.events.contains(event)
    }
}

impl Default for RecordingSink {
    fn default() -> Self {
        Self::new()
    }
}

impl EventSink for RecordingSink {
    fn emit(&mut self, event: &TagEvent) {
        self.events.push(*event);
    }
}
