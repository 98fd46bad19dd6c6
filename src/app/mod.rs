//! Application core: tag-side domain logic, zero I/O.
//!
//! This module contains the business rules of an ESL tag: lifecycle
//! orchestration, ECP command processing and timed work.  All interaction
//! with the radio, hardware and flash happens through **port traits**
//! defined in [`ports`], keeping this layer testable without a controller.

pub mod commands;
pub mod events;
pub mod ports;
pub mod processor;
pub mod service;
