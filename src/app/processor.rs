//! ECP command processor: validate → plan → apply.
//!
//! ```text
//!  bytes ──▶ validate() ──▶ plan() ──▶ Effect ──▶ TagService::apply ──▶ EcpResponse
//!             length          opcode       │          ports, fsm
//!             vendor mask     capability   │
//!             ESL id          timed policy └── pure, no I/O
//! ```
//!
//! `validate` and `plan` only read the tag through a [`TagView`]; every
//! side effect is described by an [`Effect`] that the service applies.
//! The busy check sits between the two because it mutates service state.

use log::debug;

use super::commands::CommandSource;
use super::ports::ImageStorePort;
use crate::config::TagConfig;
use crate::ecp::command::{split, LedCommand, VendorParams};
use crate::ecp::{is_vendor, EcpCommand, EslAddress, ESL_ADDR_BROADCAST};
use crate::error::EcpError;
use crate::fsm::StateId;
use crate::scheduler::{TimedPlan, TimedScheduler, NO_IMAGE};

/// Read-only snapshot of the tag used by `validate` and `plan`.
pub struct TagView<'a> {
    pub address: EslAddress,
    pub state: StateId,
    pub config: &'a TagConfig,
    pub scheduler: &'a TimedScheduler,
    pub now_ms: u64,
}

/// A command that passed the framing checks.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Validated<'a> {
    pub opcode: u8,
    pub esl_id: u8,
    pub params: &'a [u8],
}

impl Validated<'_> {
    pub fn is_broadcast(&self) -> bool {
        self.esl_id == ESL_ADDR_BROADCAST
    }
}

/// What an accepted command will do.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Effect {
    /// Answer with the current basic state (PING).
    BasicState,
    /// Clear service-needed, answer basic state.
    ServiceReset,
    /// Answer basic state (synchronized cleared), then wipe.
    Unassociate,
    /// Delete images, stop sync, wipe.  No response.
    FactoryReset,
    /// Mark the update complete and feed the lifecycle.
    UpdateComplete,
    /// Read the sensor through the hardware port.
    ReadSensor { index: u8 },
    /// Re-drive the image currently shown.
    RefreshDisplay { display: u8, image: u8 },
    ShowImage { display: u8, image: u8 },
    ScheduleDisplay { display: u8, image: u8, abs_time: u32, fire_at: u64 },
    CancelDisplay { display: u8, image: u8 },
    StartLed(LedCommand),
    ScheduleLed { led: LedCommand, abs_time: u32, fire_at: u64 },
    CancelLed { led: LedCommand },
    Vendor { opcode: u8, params: VendorParams },
}

// ───────────────────────────────────────────────────────────────
// Validate
// ───────────────────────────────────────────────────────────────

/// Framing checks in wire order: declared length, vendor mask, ESL id.
pub fn validate<'a>(bytes: &'a [u8], view: &TagView<'_>) -> Result<Validated<'a>, EcpError> {
    let (opcode, esl_id, params) = split(bytes)?;

    if is_vendor(opcode) && !view.config.vendor_opcode_enabled(opcode) {
        debug!("vendor opcode 0x{:02X} not enabled", opcode);
        return Err(EcpError::InvalidOpcode);
    }

    if !view.address.accepts(esl_id) {
        debug!(
            "ESL id 0x{:02X} is not ours ({})",
            esl_id, view.address
        );
        return Err(EcpError::InvalidParameters);
    }

    Ok(Validated {
        opcode,
        esl_id,
        params,
    })
}

// ───────────────────────────────────────────────────────────────
// Plan
// ───────────────────────────────────────────────────────────────

/// Decode and check a validated command against the tag's capabilities
/// and lifecycle state.
pub fn plan(
    cmd: Validated<'_>,
    source: CommandSource,
    view: &TagView<'_>,
    images: &impl ImageStorePort,
) -> Result<Effect, EcpError> {
    let command = EcpCommand::decode(cmd.opcode, cmd.params)?;
    debug!("{:?} via {:?}", command, source);

    match command {
        EcpCommand::Ping => Ok(Effect::BasicState),
        EcpCommand::ServiceReset => Ok(Effect::ServiceReset),
        EcpCommand::UpdateComplete => Ok(Effect::UpdateComplete),
        EcpCommand::Unassociate => {
            if cmd.is_broadcast() {
                return Err(EcpError::Retry);
            }
            Ok(Effect::Unassociate)
        }
        EcpCommand::FactoryReset => {
            if view.state == StateId::Synchronized {
                return Err(EcpError::InvalidState);
            }
            if cmd.is_broadcast() {
                return Err(EcpError::Retry);
            }
            Ok(Effect::FactoryReset)
        }
        EcpCommand::ReadSensor { index } => {
            check_index(index, view.config.sensor_count)?;
            Ok(Effect::ReadSensor { index })
        }
        EcpCommand::RefreshDisplay { display } => {
            check_index(display, view.config.display_count)?;
            match view.scheduler.display_image(display) {
                Some(image) if image != NO_IMAGE => Ok(Effect::RefreshDisplay { display, image }),
                _ => Err(EcpError::InvalidImageIndex),
            }
        }
        EcpCommand::DisplayImage { display, image } => {
            check_display(display, image, view.config, images)?;
            Ok(Effect::ShowImage { display, image })
        }
        EcpCommand::DisplayTimed {
            display,
            image,
            abs_time,
        } => {
            check_display(display, image, view.config, images)?;
            Ok(
                match view
                    .scheduler
                    .plan_timed_display(display, abs_time, view.now_ms)?
                {
                    TimedPlan::Cancel => Effect::CancelDisplay { display, image },
                    TimedPlan::Schedule { fire_at } => Effect::ScheduleDisplay {
                        display,
                        image,
                        abs_time,
                        fire_at,
                    },
                },
            )
        }
        EcpCommand::Led(led) => {
            check_index(led.index, view.config.led_count)?;
            Ok(Effect::StartLed(led))
        }
        EcpCommand::LedTimed { led, abs_time } => {
            check_index(led.index, view.config.led_count)?;
            Ok(
                match view.scheduler.plan_timed_led(led.index, abs_time, view.now_ms)? {
                    TimedPlan::Cancel => Effect::CancelLed { led },
                    TimedPlan::Schedule { fire_at } => Effect::ScheduleLed {
                        led,
                        abs_time,
                        fire_at,
                    },
                },
            )
        }
        EcpCommand::Vendor { opcode, params } => Ok(Effect::Vendor { opcode, params }),
    }
}

/// No elements of the class at all means the opcode is unsupported.
fn check_index(index: u8, count: u8) -> Result<(), EcpError> {
    if count == 0 {
        return Err(EcpError::InvalidOpcode);
    }
    if index >= count {
        return Err(EcpError::InvalidParameters);
    }
    Ok(())
}

fn check_display(
    display: u8,
    image: u8,
    config: &TagConfig,
    images: &impl ImageStorePort,
) -> Result<(), EcpError> {
    check_index(display, config.display_count)?;
    if image > config.max_image_index {
        return Err(EcpError::InvalidParameters);
    }
    match images.read_size(image) {
        Ok(0) | Err(_) => Err(EcpError::ImageNotAvailable),
        Ok(_) => Ok(()),
    }
}
