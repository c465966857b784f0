//! Typed errors for the wire codec and level translation

use thiserror::Error;

/// Errors raised while building or interpreting protocol values
///
/// None of these are fatal: request issuance drops the frame and logs,
/// level publication skips the variable.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum ProtocolError {
    #[error("unknown channel type code 0x{0:02X}")]
    UnknownChannelType(u8),

    #[error("unknown send type '{0}'")]
    UnknownSendType(String),

    #[error("channel number {0} out of range (1-128)")]
    ChannelOutOfRange(u8),

    #[error("level value {0} outside encoded domain 0-127")]
    LevelOutOfDomain(i64),
}
