//! Device state module - local mirror of the processor
//!
//! Holds the unit presets and the mute mirror that feedback consumers read.
//! Rebuilt from scratch whenever the unit is (re)configured.

mod store;
mod types;

pub use store::{DeviceState, MuteTable, SendMuteMatrix, StateChange};
pub use types::{DeviceUnit, UnitType};
