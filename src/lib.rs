//! ShelfLink: Bluetooth LE Electronic Shelf Label protocol layer.
//!
//! Tag side: lifecycle state machine, ECP command processing, encrypted
//! sync packets and timed LED / display work, all behind port traits.
//! AP side: per-group sync buffers and the tag configuration client.
//!
//! Nothing here touches a controller directly; see [`adapters`] for the
//! host implementations of each port.

#![deny(unused_must_use)]

pub mod adapters;
pub mod ap;
pub mod app;
pub mod config;
pub mod ead;
pub mod ecp;
pub mod error;
pub mod events;
pub mod fsm;
pub mod scheduler;

pub use error::{Error, Result};
