//! AHM wire protocol
//!
//! Pure functions only: building request frames, classifying inbound buffers.
//! No state, no I/O.

mod codec;
mod types;

pub use codec::{
    decode, encode_level_query, encode_mute_query, encode_send_mute_query, DeviceEvent, Request,
    MUTED_VALUE, SYSEX_END, SYSEX_START, UNMUTED_VALUE, VENDOR_PREFIX,
};
pub use types::{ChannelType, Frame, SendType};

/// Format frame bytes as hex string for traces
pub fn format_hex(data: &[u8]) -> String {
    data.iter()
        .map(|b| format!("{:02X}", b))
        .collect::<Vec<_>>()
        .join(" ")
}
