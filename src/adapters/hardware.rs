//! Hardware adapter: LEDs on GPIO, displays and sensors tracked in memory.
//!
//! LEDs are `embedded-hal` output pins, so any HAL (or a test double) can
//! drive them.  Displays record the image currently shown; sensors return
//! whatever value was last loaded with [`PinHardware::set_sensor`].

use embedded_hal::digital::OutputPin;
use heapless::Vec;
use log::{debug, info, warn};

use crate::app::ports::{HardwarePort, HwError};
use crate::ecp::response::SensorData;
use crate::scheduler::{MAX_DISPLAYS, MAX_LEDS};

/// Maximum sensors tracked.
pub const MAX_SENSORS: usize = 4;

#[derive(Debug, Clone, Default)]
struct Sensor {
    value: SensorData,
    /// Reads left before the measurement is ready.
    pending: u8,
}

pub struct PinHardware<P: OutputPin> {
    leds: Vec<P, MAX_LEDS>,
    led_levels: [Option<u8>; MAX_LEDS],
    displays: [Option<u8>; MAX_DISPLAYS],
    display_count: u8,
    sensors: Vec<Sensor, MAX_SENSORS>,
    initialised: bool,
}

impl<P: OutputPin> PinHardware<P> {
    /// `leds` are driven in index order; extra pins beyond `MAX_LEDS` are
    /// dropped with a warning.
    pub fn new(leds: impl IntoIterator<Item = P>, display_count: u8, sensor_count: u8) -> Self {
        let mut pins = Vec::new();
        for pin in leds {
            if pins.push(pin).is_err() {
                warn!("PinHardware: more than {MAX_LEDS} LED pins, extra ignored");
                break;
            }
        }
        let mut sensors = Vec::new();
        for _ in 0..(sensor_count as usize).min(MAX_SENSORS) {
            let _ = sensors.push(Sensor::default());
        }
        Self {
            leds: pins,
            led_levels: [None; MAX_LEDS],
            displays: [None; MAX_DISPLAYS],
            display_count: display_count.min(MAX_DISPLAYS as u8),
            sensors,
            initialised: false,
        }
    }

    /// Load the value sensor `index` reports.  `busy_reads` reads return
    /// [`HwError::Busy`] first.
    pub fn set_sensor(&mut self, index: u8, value: &[u8], busy_reads: u8) -> Result<(), HwError> {
        let s = self
            .sensors
            .get_mut(index as usize)
            .ok_or(HwError::InvalidIndex)?;
        s.value = SensorData::from_slice(value).map_err(|_| HwError::Failed)?;
        s.pending = busy_reads;
        Ok(())
    }

    /// Image shown on `display`, if any.
    pub fn shown(&self, display: u8) -> Option<u8> {
        self.displays.get(display as usize).copied().flatten()
    }

    /// Colour/brightness of a lit LED, `None` when off.
    pub fn led_level(&self, index: u8) -> Option<u8> {
        self.led_levels.get(index as usize).copied().flatten()
    }

    pub fn is_initialised(&self) -> bool {
        self.initialised
    }

    pub fn release(self) -> Vec<P, MAX_LEDS> {
        self.leds
    }
}

impl<P: OutputPin> HardwarePort for PinHardware<P> {
    fn init(&mut self) -> Result<(), HwError> {
        for pin in self.leds.iter_mut() {
            pin.set_low().map_err(|_| HwError::Failed)?;
        }
        self.led_levels = [None; MAX_LEDS];
        self.initialised = true;
        info!(
            "PinHardware: {} LED(s), {} display(s), {} sensor(s)",
            self.leds.len(),
            self.display_count,
            self.sensors.len()
        );
        Ok(())
    }

    fn display_control(&mut self, index: u8, image: u8, enable: bool) -> Result<(), HwError> {
        if index >= self.display_count {
            return Err(HwError::InvalidIndex);
        }
        self.displays[index as usize] = enable.then_some(image);
        debug!("display {index}: {}", if enable { "show" } else { "blank" });
        Ok(())
    }

    fn led_control(&mut self, index: u8, color_brightness: u8, on: bool) -> Result<(), HwError> {
        let pin = self
            .leds
            .get_mut(index as usize)
            .ok_or(HwError::InvalidIndex)?;
        let driven = if on { pin.set_high() } else { pin.set_low() };
        driven.map_err(|_| HwError::Failed)?;
        self.led_levels[index as usize] = on.then_some(color_brightness);
        Ok(())
    }

    fn sensor_read(&mut self, index: u8, buf: &mut [u8]) -> Result<usize, HwError> {
        let s = self
            .sensors
            .get_mut(index as usize)
            .ok_or(HwError::InvalidIndex)?;
        if s.pending > 0 {
            s.pending -= 1;
            return Err(HwError::Busy);
        }
        let n = s.value.len().min(buf.len());
        buf[..n].copy_from_slice(&s.value[..n]);
        Ok(n)
    }
}
