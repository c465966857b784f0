//! Allen & Heath AHM processor driver
//!
//! Mirrors mute, send-mute and level state of an AHM-16/32/64 over its TCP
//! MIDI port:
//! - Full paced readout on every connect
//! - Inbound reports applied in arrival order
//! - Optional periodic refresh of monitored feedbacks
//! - Reconnect and state reset on device reconfiguration

// Module declarations
mod actions;
mod connection;
mod driver;
mod poller;

// Re-export main types
pub use driver::AhmDriver;
pub use poller::{encode_plan, readout_plan, refresh_plan, run_paced, FrameSink, RequestPacer};

use super::Driver;
