//! Frame encoding and decoding
//!
//! Requests go out as SysEx frames:
//!
//! ```text
//! F0 | 00 00 1A 50 12 | 01 00 | N | 01 | CMD | payload.. | F7
//! ```
//!
//! Feedback comes back either as channel messages (mute: `9N`, level: `BN`)
//! or as a SysEx send-mute report. Decoding looks only at the first status
//! byte; the device is trusted to send well-formed frames.

use std::fmt;

use super::types::{ChannelType, Frame, SendType};
use crate::error::ProtocolError;

pub const SYSEX_START: u8 = 0xF0;
pub const SYSEX_END: u8 = 0xF7;

/// Manufacturer / product header following `F0`
pub const VENDOR_PREFIX: [u8; 5] = [0x00, 0x00, 0x1A, 0x50, 0x12];
const PROTOCOL_VERSION: [u8; 2] = [0x01, 0x00];
const REQUEST_MARKER: u8 = 0x01;

const CMD_GET_MUTE: u8 = 0x09;
const CMD_GET_LEVEL: u8 = 0x0B;
const CMD_GET_SEND_MUTE: u8 = 0x0F;

const LEVEL_PARAM: u8 = 0x17;
const SEND_PARAM: u8 = 0x03;

const NRPN_MSB: u8 = 0x63;
const NRPN_LSB: u8 = 0x62;
const DATA_ENTRY: u8 = 0x06;

/// Channel-message status bases (`+N` for the channel type)
pub const MUTE_STATUS: u8 = 0x90;
pub const LEVEL_STATUS: u8 = 0xB0;

/// Mute data byte reported for an unmuted channel
pub const UNMUTED_VALUE: u8 = 0x3F;
pub const MUTED_VALUE: u8 = 0x7F;

const MAX_CHANNEL: u8 = 128;
const MAX_LEVEL: u8 = 0x7F;

/// Outbound request, before encoding
///
/// Channel numbers are 1-based, as presented to users.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Request {
    MuteQuery {
        ch_type: ChannelType,
        channel: u8,
    },
    LevelQuery {
        ch_type: ChannelType,
        channel: u8,
    },
    SendMuteQuery {
        send_type: SendType,
        channel: u8,
        send_channel: u8,
    },
    SetMute {
        ch_type: ChannelType,
        channel: u8,
        muted: bool,
    },
    SetLevel {
        ch_type: ChannelType,
        channel: u8,
        level: u8,
    },
}

/// Convert a 1-based channel number to its wire index
fn channel_index(channel: u8) -> Result<u8, ProtocolError> {
    if channel == 0 || channel > MAX_CHANNEL {
        return Err(ProtocolError::ChannelOutOfRange(channel));
    }
    Ok(channel - 1)
}

fn sysex_request(ch_type: ChannelType, command: u8, payload: &[u8]) -> Frame {
    let mut bytes = Vec::with_capacity(12 + payload.len());
    bytes.push(SYSEX_START);
    bytes.extend_from_slice(&VENDOR_PREFIX);
    bytes.extend_from_slice(&PROTOCOL_VERSION);
    bytes.push(ch_type.code());
    bytes.push(REQUEST_MARKER);
    bytes.push(command);
    bytes.extend_from_slice(payload);
    bytes.push(SYSEX_END);
    Frame::new(bytes)
}

impl Request {
    /// Encode the request to its wire frame
    pub fn encode(&self) -> Result<Frame, ProtocolError> {
        match *self {
            Request::MuteQuery { ch_type, channel } => {
                let index = channel_index(channel)?;
                Ok(sysex_request(ch_type, CMD_GET_MUTE, &[index]))
            }
            Request::LevelQuery { ch_type, channel } => {
                let index = channel_index(channel)?;
                Ok(sysex_request(ch_type, CMD_GET_LEVEL, &[LEVEL_PARAM, index]))
            }
            Request::SendMuteQuery {
                send_type,
                channel,
                send_channel,
            } => {
                let (source, dest) = send_type.channels();
                let index = channel_index(channel)?;
                let send_index = channel_index(send_channel)?;
                Ok(sysex_request(
                    source,
                    CMD_GET_SEND_MUTE,
                    &[SEND_PARAM, index, dest.code(), send_index],
                ))
            }
            Request::SetMute {
                ch_type,
                channel,
                muted,
            } => {
                let index = channel_index(channel)?;
                let event = DeviceEvent::Mute {
                    ch_type,
                    index,
                    muted,
                };
                Ok(Frame::new(event.encode()))
            }
            Request::SetLevel {
                ch_type,
                channel,
                level,
            } => {
                let index = channel_index(channel)?;
                if level > MAX_LEVEL {
                    return Err(ProtocolError::LevelOutOfDomain(level as i64));
                }
                let status = LEVEL_STATUS | ch_type.code();
                Ok(Frame::new(vec![
                    status, NRPN_MSB, index, status, NRPN_LSB, LEVEL_PARAM, status, DATA_ENTRY,
                    level,
                ]))
            }
        }
    }

    /// Recover a request from an outbound frame
    ///
    /// Used to describe traffic in traces and by test doubles of the device.
    pub fn parse(data: &[u8]) -> Option<Self> {
        let status = *data.first()?;

        if status == SYSEX_START {
            if data.len() < 13
                || data[1..6] != VENDOR_PREFIX
                || data[6..8] != PROTOCOL_VERSION
                || data[9] != REQUEST_MARKER
            {
                return None;
            }
            let ch_type = ChannelType::from_code(data[8]).ok()?;
            return match data[10] {
                CMD_GET_MUTE => Some(Request::MuteQuery {
                    ch_type,
                    channel: data[11].checked_add(1)?,
                }),
                CMD_GET_LEVEL if data.get(11) == Some(&LEVEL_PARAM) => Some(Request::LevelQuery {
                    ch_type,
                    channel: data.get(12)?.checked_add(1)?,
                }),
                CMD_GET_SEND_MUTE if data.get(11) == Some(&SEND_PARAM) => {
                    let dest = ChannelType::from_code(*data.get(13)?).ok()?;
                    Some(Request::SendMuteQuery {
                        send_type: SendType::from_channels(ch_type, dest)?,
                        channel: data.get(12)?.checked_add(1)?,
                        send_channel: data.get(14)?.checked_add(1)?,
                    })
                }
                _ => None,
            };
        }

        let ch_type = ChannelType::from_code(status & 0x0F).ok()?;
        match status & 0xF0 {
            MUTE_STATUS if data.len() >= 3 => Some(Request::SetMute {
                ch_type,
                channel: data[1].checked_add(1)?,
                muted: data[2] != UNMUTED_VALUE,
            }),
            LEVEL_STATUS if data.len() >= 9 && data[1] == NRPN_MSB => Some(Request::SetLevel {
                ch_type,
                channel: data[2].checked_add(1)?,
                level: data[8],
            }),
            _ => None,
        }
    }
}

impl fmt::Display for Request {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match *self {
            Request::MuteQuery { ch_type, channel } => {
                write!(f, "GetMute {} {}", ch_type, channel)
            }
            Request::LevelQuery { ch_type, channel } => {
                write!(f, "GetLevel {} {}", ch_type, channel)
            }
            Request::SendMuteQuery {
                send_type,
                channel,
                send_channel,
            } => write!(f, "GetSendMute {} {}->{}", send_type, channel, send_channel),
            Request::SetMute {
                ch_type,
                channel,
                muted,
            } => write!(f, "SetMute {} {} {}", ch_type, channel, muted),
            Request::SetLevel {
                ch_type,
                channel,
                level,
            } => write!(f, "SetLevel {} {} {}", ch_type, channel, level),
        }
    }
}

/// Build a mute-state query for a 1-based channel
pub fn encode_mute_query(ch_type: ChannelType, channel: u8) -> Result<Frame, ProtocolError> {
    Request::MuteQuery { ch_type, channel }.encode()
}

/// Build a send-mute query (source channel → destination channel)
pub fn encode_send_mute_query(
    send_type: SendType,
    channel: u8,
    send_channel: u8,
) -> Result<Frame, ProtocolError> {
    Request::SendMuteQuery {
        send_type,
        channel,
        send_channel,
    }
    .encode()
}

/// Build a level query for a 1-based channel
pub fn encode_level_query(ch_type: ChannelType, channel: u8) -> Result<Frame, ProtocolError> {
    Request::LevelQuery { ch_type, channel }.encode()
}

/// Decoded inbound frame
///
/// Indices are 0-based, exactly as carried on the wire.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum DeviceEvent {
    Mute {
        ch_type: ChannelType,
        index: u8,
        muted: bool,
    },
    SendMute {
        send_type: SendType,
        source: u8,
        dest: u8,
        muted: bool,
    },
    Level {
        ch_type: ChannelType,
        index: u8,
        level: u8,
    },
}

impl DeviceEvent {
    /// Classify a raw inbound buffer by its first status byte
    ///
    /// Unrecognized buffers yield `None`. A recognized status whose buffer is
    /// too short to hold the fields is treated the same way.
    pub fn parse(data: &[u8]) -> Option<Self> {
        let status = *data.first()?;

        match status {
            0x90 | 0x91 => {
                if data.len() < 3 {
                    return None;
                }
                Some(DeviceEvent::Mute {
                    ch_type: mute_or_level_type(status),
                    index: data[1],
                    muted: data[2] != UNMUTED_VALUE,
                })
            }
            SYSEX_START => {
                if data.len() < 14 {
                    return None;
                }
                Some(DeviceEvent::SendMute {
                    send_type: SendType::InputToZone,
                    source: data[10],
                    dest: data[12],
                    muted: data[13] != UNMUTED_VALUE,
                })
            }
            0xB0 | 0xB1 => {
                if data.len() < 7 {
                    return None;
                }
                Some(DeviceEvent::Level {
                    ch_type: mute_or_level_type(status),
                    index: data[2],
                    level: data[6],
                })
            }
            _ => None,
        }
    }

    /// Classify a buffer and return the bytes left after the first report
    ///
    /// Only the first report of a buffer is decoded; the remainder lets
    /// callers see what was not applied.
    pub fn parse_with_rest(data: &[u8]) -> Option<(Self, &[u8])> {
        let event = Self::parse(data)?;
        let consumed = match event {
            DeviceEvent::Mute { .. } => {
                // Note-on may be followed by its zero-velocity release
                if data.len() >= 6 && data[3] == data[0] && data[4] == data[1] {
                    6
                } else {
                    3
                }
            }
            DeviceEvent::SendMute { .. } => data
                .iter()
                .position(|b| *b == SYSEX_END)
                .map_or(data.len(), |end| end + 1),
            DeviceEvent::Level { .. } => 7,
        };
        Some((event, &data[consumed.min(data.len())..]))
    }

    /// Encode the event the way the device reports it
    pub fn encode(&self) -> Vec<u8> {
        match *self {
            DeviceEvent::Mute {
                ch_type,
                index,
                muted,
            } => {
                let status = MUTE_STATUS | ch_type.code();
                let value = if muted { MUTED_VALUE } else { UNMUTED_VALUE };
                vec![status, index, value, status, index, 0x00]
            }
            DeviceEvent::SendMute {
                send_type,
                source,
                dest,
                muted,
            } => {
                let (source_type, dest_type) = send_type.channels();
                let value = if muted { MUTED_VALUE } else { UNMUTED_VALUE };
                let mut bytes = vec![SYSEX_START];
                bytes.extend_from_slice(&VENDOR_PREFIX);
                bytes.extend_from_slice(&PROTOCOL_VERSION);
                bytes.extend_from_slice(&[
                    source_type.code(),
                    CMD_GET_SEND_MUTE,
                    source,
                    dest_type.code(),
                    dest,
                    value,
                    SYSEX_END,
                ]);
                bytes
            }
            DeviceEvent::Level {
                ch_type,
                index,
                level,
            } => {
                // Running status: the repeated BN bytes are omitted
                let status = LEVEL_STATUS | ch_type.code();
                vec![status, NRPN_MSB, index, NRPN_LSB, LEVEL_PARAM, DATA_ENTRY, level]
            }
        }
    }
}

fn mute_or_level_type(status: u8) -> ChannelType {
    if status & 0x0F == 0 {
        ChannelType::Input
    } else {
        ChannelType::Zone
    }
}

impl fmt::Display for DeviceEvent {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match *self {
            DeviceEvent::Mute {
                ch_type,
                index,
                muted,
            } => write!(f, "Mute {} {} {}", ch_type, index as u16 + 1, muted),
            DeviceEvent::SendMute {
                send_type,
                source,
                dest,
                muted,
            } => write!(
                f,
                "SendMute {} {}->{} {}",
                send_type,
                source as u16 + 1,
                dest as u16 + 1,
                muted
            ),
            DeviceEvent::Level {
                ch_type,
                index,
                level,
            } => write!(f, "Level {} {} {}", ch_type, index as u16 + 1, level),
        }
    }
}

/// Decode a raw inbound buffer
pub fn decode(data: &[u8]) -> Option<DeviceEvent> {
    DeviceEvent::parse(data)
}
