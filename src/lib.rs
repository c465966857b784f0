//! AHM Link - state mirror and control driver for Allen & Heath AHM processors
//!
//! Speaks the processor's MIDI-over-TCP protocol: paced state readout,
//! inbound report decoding, a local mute/send-mute/level mirror, and host
//! callbacks for feedbacks and level variables.

pub mod config;
pub mod dbu;
pub mod drivers;
pub mod error;
pub mod feedback;
pub mod protocol;
pub mod state;
pub mod status;

pub use config::{AppConfig, ConfigWatcher};
pub use drivers::{AhmDriver, Driver};
pub use error::ProtocolError;
pub use status::{ConnectionState, ConnectionStatus};
