//! Tag and access point configuration parameters
//!
//! Capability counts and timeouts for both roles.  Values can be
//! overridden from the settings store; `validate()` guards every load.

use serde::{Deserialize, Serialize};

use crate::app::ports::ConfigError;

/// Tag-side configuration
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct TagConfig {
    // --- Capabilities ---
    /// Number of displays (0 = display opcodes are invalid)
    pub display_count: u8,
    /// Number of LEDs (0 = LED opcodes are invalid)
    pub led_count: u8,
    /// Number of sensors (0 = sensor opcode is invalid)
    pub sensor_count: u8,
    /// Highest image index the tag can store
    pub max_image_index: u8,
    /// Bit `n` accepts vendor opcode `0x(n)F`
    pub vendor_opcode_mask: u16,

    // --- Timeouts ---
    /// Seconds without a valid sync packet before dropping to Unsynchronized
    pub unsynchronized_timeout_secs: u32,
    /// Seconds in Unsynchronized before wiping provisioned data
    pub unassociated_timeout_secs: u32,

    // --- Behaviour ---
    /// Wipe provisioned data on every boot instead of restoring it
    pub forget_provisioned_data: bool,
}

impl Default for TagConfig {
    fn default() -> Self {
        Self {
            // Capabilities
            display_count: 1,
            led_count: 2,
            sensor_count: 1,
            max_image_index: 3,
            vendor_opcode_mask: 0,

            // Timeouts
            unsynchronized_timeout_secs: 3600,         // 1 h
            unassociated_timeout_secs: 60 * 60 * 24, // 1 day

            forget_provisioned_data: false,
        }
    }
}

impl TagConfig {
    /// Unsynchronized timeout in milliseconds.
    pub fn unsynchronized_timeout_ms(&self) -> u32 {
        self.unsynchronized_timeout_secs.saturating_mul(1000)
    }

    /// Unassociated timeout in milliseconds.
    pub fn unassociated_timeout_ms(&self) -> u32 {
        self.unassociated_timeout_secs.saturating_mul(1000)
    }

    /// Whether vendor opcode `opcode` (tag 0xF) is enabled.
    pub fn vendor_opcode_enabled(&self, opcode: u8) -> bool {
        self.vendor_opcode_mask & (1 << (opcode >> 4)) != 0
    }

    pub fn validate(&self) -> Result<(), ConfigError> {
        if self.led_count as usize > crate::scheduler::MAX_LEDS {
            return Err(ConfigError::ValidationFailed("led_count exceeds MAX_LEDS"));
        }
        if self.display_count as usize > crate::scheduler::MAX_DISPLAYS {
            return Err(ConfigError::ValidationFailed(
                "display_count exceeds MAX_DISPLAYS",
            ));
        }
        if self.max_image_index == crate::scheduler::NO_IMAGE {
            return Err(ConfigError::ValidationFailed(
                "max_image_index collides with the no-image marker",
            ));
        }
        if self.unsynchronized_timeout_secs == 0 || self.unassociated_timeout_secs == 0 {
            return Err(ConfigError::ValidationFailed("timeouts must be non-zero"));
        }
        Ok(())
    }
}

/// Access point configuration
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ApConfig {
    // --- PAwR layout ---
    /// Number of subevents; one group per subevent
    pub max_groups: u8,
    /// Response slots per subevent
    pub response_slots: u8,
    /// Periodic advertising interval (milliseconds)
    pub pawr_interval_ms: u32,

    // --- Provisioning ---
    /// First ESL id handed out inside a group
    pub default_esl_id: u8,
    /// PAST attempts before the AP forces a disconnect
    pub auto_past_retry: u8,
}

impl Default for ApConfig {
    fn default() -> Self {
        Self {
            max_groups: 4,
            response_slots: 4,
            pawr_interval_ms: 1000,

            default_esl_id: 0,
            auto_past_retry: 3,
        }
    }
}

impl ApConfig {
    pub fn validate(&self) -> Result<(), ConfigError> {
        if self.max_groups == 0 || self.max_groups as usize > crate::ap::MAX_GROUPS {
            return Err(ConfigError::ValidationFailed("max_groups out of range"));
        }
        if self.response_slots == 0 || self.response_slots as usize > crate::ap::MAX_RESPONSE_SLOTS
        {
            return Err(ConfigError::ValidationFailed("response_slots out of range"));
        }
        if self.pawr_interval_ms == 0 {
            return Err(ConfigError::ValidationFailed("pawr_interval_ms must be non-zero"));
        }
        Ok(())
    }
}
