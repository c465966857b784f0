//! Protocol-level enumerations shared by the codec and the state model

use serde::{Deserialize, Serialize};
use std::fmt;

use crate::error::ProtocolError;

/// Kind of channel addressed by a frame
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ChannelType {
    /// Input channel
    Input,
    /// Zone (output bus)
    Zone,
}

impl ChannelType {
    /// All channel types, in readout order
    pub fn all() -> &'static [ChannelType] {
        &[ChannelType::Input, ChannelType::Zone]
    }

    /// Protocol code (the `N` nibble of channel messages)
    pub fn code(self) -> u8 {
        match self {
            ChannelType::Input => 0x00,
            ChannelType::Zone => 0x01,
        }
    }

    /// Parse a protocol code
    pub fn from_code(code: u8) -> Result<Self, ProtocolError> {
        match code {
            0x00 => Ok(ChannelType::Input),
            0x01 => Ok(ChannelType::Zone),
            other => Err(ProtocolError::UnknownChannelType(other)),
        }
    }

    /// Short prefix used in variable names
    pub fn short_name(self) -> &'static str {
        match self {
            ChannelType::Input => "ip",
            ChannelType::Zone => "zn",
        }
    }
}

impl fmt::Display for ChannelType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            ChannelType::Input => write!(f, "input"),
            ChannelType::Zone => write!(f, "zone"),
        }
    }
}

/// Routing relationship described by a send-mute frame
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum SendType {
    #[serde(rename = "inputToZone")]
    InputToZone,
}

impl SendType {
    /// Source and destination channel types
    pub fn channels(self) -> (ChannelType, ChannelType) {
        match self {
            SendType::InputToZone => (ChannelType::Input, ChannelType::Zone),
        }
    }

    pub fn as_str(self) -> &'static str {
        match self {
            SendType::InputToZone => "inputToZone",
        }
    }

    /// Resolve the send type whose endpoints match the given channel types
    pub fn from_channels(source: ChannelType, dest: ChannelType) -> Option<Self> {
        match (source, dest) {
            (ChannelType::Input, ChannelType::Zone) => Some(SendType::InputToZone),
            _ => None,
        }
    }
}

impl std::str::FromStr for SendType {
    type Err = ProtocolError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "inputToZone" => Ok(SendType::InputToZone),
            other => Err(ProtocolError::UnknownSendType(other.to_string())),
        }
    }
}

impl fmt::Display for SendType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// A complete outbound byte sequence, ready for the socket
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Frame(Vec<u8>);

impl Frame {
    pub fn new(bytes: Vec<u8>) -> Self {
        Self(bytes)
    }

    pub fn as_bytes(&self) -> &[u8] {
        &self.0
    }

    pub fn into_bytes(self) -> Vec<u8> {
        self.0
    }

    pub fn len(&self) -> usize {
        self.0.len()
    }

    pub fn is_empty(&self) -> bool {
        self.0.is_empty()
    }
}

impl AsRef<[u8]> for Frame {
    fn as_ref(&self) -> &[u8] {
        &self.0
    }
}

impl fmt::Display for Frame {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&super::format_hex(&self.0))
    }
}
