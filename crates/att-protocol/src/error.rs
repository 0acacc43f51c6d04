//! Error types for attenuation protocol decoding

use thiserror::Error;

use crate::command::CommandKind;

/// Errors that can occur while decoding protocol data
///
/// Apart from [`ProtocolError::UnknownCommand`], every variant means the byte
/// stream can no longer be trusted: the protocol has no resynchronization.
#[derive(Debug, Error, Clone, PartialEq, Eq)]
pub enum ProtocolError {
    /// Header declares a payload size that does not match the command kind
    #[error("{kind} payload size mismatch: expected {expected} bytes, header declares {actual}")]
    PayloadSizeMismatch {
        kind: CommandKind,
        expected: usize,
        actual: usize,
    },

    /// Header was read but the payload that must follow it was not there
    #[error("{kind} payload truncated: expected {expected} bytes after the header")]
    TruncatedPayload { kind: CommandKind, expected: usize },

    /// Unknown or unsupported command word
    #[error("unknown command: 0x{0:04X}")]
    UnknownCommand(u16),

    /// Buffer is incomplete - need more data
    #[error("incomplete packet: need {needed} more bytes")]
    Incomplete { needed: usize },

    /// Trailing bytes after a complete packet
    #[error("packet has {0} trailing bytes")]
    TrailingBytes(usize),
}
