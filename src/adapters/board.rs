//! Composite adapter that bundles one implementation of each tag port.
//!
//! [`TagService`](crate::app::service::TagService) takes a single `io`
//! value implementing every port.  `TagBoard` assembles that value from
//! independent adapters so each can be swapped on its own.

use crate::app::ports::{
    HardwarePort, HwError, ImageStorePort, RadioPort, SettingsPort, StorageError,
};

pub struct TagBoard<H, I, S, R> {
    pub hardware: H,
    pub images: I,
    pub settings: S,
    pub radio: R,
}

impl<H, I, S, R> TagBoard<H, I, S, R> {
    pub fn new(hardware: H, images: I, settings: S, radio: R) -> Self {
        Self {
            hardware,
            images,
            settings,
            radio,
        }
    }
}

impl<H: HardwarePort, I, S, R> HardwarePort for TagBoard<H, I, S, R> {
    fn init(&mut self) -> Result<(), HwError> {
        self.hardware.init()
    }

    fn display_control(&mut self, index: u8, image: u8, enable: bool) -> Result<(), HwError> {
        self.hardware.display_control(index, image, enable)
    }

    fn led_control(&mut self, index: u8, color_brightness: u8, on: bool) -> Result<(), HwError> {
        self.hardware.led_control(index, color_brightness, on)
    }

    fn sensor_read(&mut self, index: u8, buf: &mut [u8]) -> Result<usize, HwError> {
        self.hardware.sensor_read(index, buf)
    }
}

impl<H, I: ImageStorePort, S, R> ImageStorePort for TagBoard<H, I, S, R> {
    fn write(&mut self, index: u8, data: &[u8], offset: usize) -> Result<usize, StorageError> {
        self.images.write(index, data, offset)
    }

    fn read(&self, index: u8, offset: usize, buf: &mut [u8]) -> Result<usize, StorageError> {
        self.images.read(index, offset, buf)
    }

    fn read_size(&self, index: u8) -> Result<usize, StorageError> {
        self.images.read_size(index)
    }

    fn delete_all(&mut self) -> Result<(), StorageError> {
        self.images.delete_all()
    }
}

impl<H, I, S: SettingsPort, R> SettingsPort for TagBoard<H, I, S, R> {
    fn read(&self, namespace: &str, key: &str, buf: &mut [u8]) -> Result<usize, StorageError> {
        self.settings.read(namespace, key, buf)
    }

    fn write(&mut self, namespace: &str, key: &str, data: &[u8]) -> Result<(), StorageError> {
        self.settings.write(namespace, key, data)
    }

    fn delete(&mut self, namespace: &str, key: &str) -> Result<(), StorageError> {
        self.settings.delete(namespace, key)
    }

    fn exists(&self, namespace: &str, key: &str) -> bool {
        self.settings.exists(namespace, key)
    }
}

impl<H, I, S, R: RadioPort> RadioPort for TagBoard<H, I, S, R> {
    fn start_advertising(&mut self) {
        self.radio.start_advertising();
    }

    fn stop_advertising(&mut self) {
        self.radio.stop_advertising();
    }

    fn disconnect(&mut self) {
        self.radio.disconnect();
    }

    fn subscribe_past(&mut self) {
        self.radio.subscribe_past();
    }

    fn stop_sync(&mut self) {
        self.radio.stop_sync();
    }

    fn notify_control_point(&mut self, response: &[u8]) {
        self.radio.notify_control_point(response);
    }

    fn set_pawr_response(&mut self, slot: u8, data: &[u8]) {
        self.radio.set_pawr_response(slot, data);
    }
}
