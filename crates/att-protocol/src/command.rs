//! Attenuation command representation
//!
//! Every packet is a fixed 4-byte header followed by a payload whose size is
//! fully determined by the command word. Fields are byte-packed with no
//! padding and use host-native endianness, since reader and writers always
//! run on the same machine.
//!
//! # Packet Format
//! ```text
//! header:        [command: u16][payload_size: u16]
//! RESET:         (no payload)
//! SET_ATT_ALL:   [device: u16][attenuation: f64]                                   10 bytes
//! SET_ATT_ONE:   [device: u16][peer: u16][attenuation_rx: f64][attenuation_tx: f64] 20 bytes
//! ```

use std::fmt;

use crate::error::ProtocolError;
use crate::EncodeCommand;

/// Size of the packet header in bytes
pub const HEADER_SIZE: usize = 4;

/// Payload size of a SET_ATT_ALL packet
pub const SET_ALL_PAYLOAD_SIZE: usize = 10;

/// Payload size of a SET_ATT_ONE packet
pub const SET_ONE_PAYLOAD_SIZE: usize = 20;

/// Largest packet the protocol can carry
pub const MAX_PACKET_SIZE: usize = HEADER_SIZE + SET_ONE_PAYLOAD_SIZE;

/// Device number reserved for the background reader's shutdown frame
pub const TERMINATE_SENTINEL: u16 = u16::MAX;

/// Command word carried in the packet header
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
#[cfg_attr(feature = "serde", derive(serde::Serialize, serde::Deserialize))]
pub enum CommandKind {
    /// Restore every path to the default attenuation (0x0000)
    Reset = 0x0000,
    /// Same attenuation between one device and all others (0x0001)
    SetAttenuationAll = 0x0001,
    /// Attenuation between one device and one peer (0x0002)
    SetAttenuationOne = 0x0002,
}

impl CommandKind {
    /// Returns the command word as sent on the wire
    pub fn code(&self) -> u16 {
        *self as u16
    }

    /// Returns the exact payload size this command requires
    pub fn payload_size(&self) -> usize {
        match self {
            Self::Reset => 0,
            Self::SetAttenuationAll => SET_ALL_PAYLOAD_SIZE,
            Self::SetAttenuationOne => SET_ONE_PAYLOAD_SIZE,
        }
    }

    /// Returns a human-readable name for the command
    pub fn name(&self) -> &'static str {
        match self {
            Self::Reset => "RESET",
            Self::SetAttenuationAll => "SET_ATT_ALL",
            Self::SetAttenuationOne => "SET_ATT_ONE",
        }
    }
}

impl fmt::Display for CommandKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.name())
    }
}

impl TryFrom<u16> for CommandKind {
    type Error = ProtocolError;

    fn try_from(value: u16) -> Result<Self, Self::Error> {
        match value {
            0x0000 => Ok(Self::Reset),
            0x0001 => Ok(Self::SetAttenuationAll),
            0x0002 => Ok(Self::SetAttenuationOne),
            _ => Err(ProtocolError::UnknownCommand(value)),
        }
    }
}

/// Packet header as read from the wire
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Header {
    /// Raw command word
    pub command: u16,
    /// Payload size in bytes, excluding the header
    pub payload_size: u16,
}

impl Header {
    /// Create the header for a known command kind
    pub fn for_kind(kind: CommandKind) -> Self {
        Self {
            command: kind.code(),
            payload_size: kind.payload_size() as u16,
        }
    }

    /// Parse a header from the first [`HEADER_SIZE`] bytes of `bytes`
    pub fn parse(bytes: &[u8]) -> Result<Self, ProtocolError> {
        if bytes.len() < HEADER_SIZE {
            return Err(ProtocolError::Incomplete {
                needed: HEADER_SIZE - bytes.len(),
            });
        }
        Ok(Self {
            command: read_u16(bytes, 0),
            payload_size: read_u16(bytes, 2),
        })
    }

    /// Encode the header to its wire format
    pub fn to_bytes(&self) -> [u8; HEADER_SIZE] {
        let mut out = [0u8; HEADER_SIZE];
        out[..2].copy_from_slice(&self.command.to_ne_bytes());
        out[2..].copy_from_slice(&self.payload_size.to_ne_bytes());
        out
    }

    /// Check the declared payload size against what `kind` requires
    pub fn validate_for(&self, kind: CommandKind) -> Result<(), ProtocolError> {
        let expected = kind.payload_size();
        let actual = self.payload_size as usize;
        if actual != expected {
            return Err(ProtocolError::PayloadSizeMismatch {
                kind,
                expected,
                actual,
            });
        }
        Ok(())
    }
}

/// A decoded attenuation command
#[derive(Debug, Clone, Copy, PartialEq)]
#[cfg_attr(
    feature = "serde",
    derive(serde::Serialize, serde::Deserialize),
    serde(tag = "command", rename_all = "snake_case")
)]
pub enum Command {
    /// Reset all attenuations to the default
    Reset,

    /// Set the same Rx and Tx attenuation between `device` and all others
    SetAttenuationAll { device: u16, attenuation: f64 },

    /// Set attenuation between `device` and `peer_device`
    ///
    /// `attenuation_rx` is meant for packets sent from the peer to the
    /// device, `attenuation_tx` for packets sent from the device to the peer.
    SetAttenuationOne {
        device: u16,
        peer_device: u16,
        attenuation_rx: f64,
        attenuation_tx: f64,
    },
}

impl Command {
    /// Returns the command word for this command
    pub fn kind(&self) -> CommandKind {
        match self {
            Self::Reset => CommandKind::Reset,
            Self::SetAttenuationAll { .. } => CommandKind::SetAttenuationAll,
            Self::SetAttenuationOne { .. } => CommandKind::SetAttenuationOne,
        }
    }

    /// Returns the header that precedes this command on the wire
    pub fn header(&self) -> Header {
        Header::for_kind(self.kind())
    }

    /// Encode only the payload part of the packet
    pub fn encode_payload(&self) -> Vec<u8> {
        let mut out = Vec::with_capacity(self.kind().payload_size());
        match self {
            Self::Reset => {}
            Self::SetAttenuationAll {
                device,
                attenuation,
            } => {
                out.extend_from_slice(&device.to_ne_bytes());
                out.extend_from_slice(&attenuation.to_ne_bytes());
            }
            Self::SetAttenuationOne {
                device,
                peer_device,
                attenuation_rx,
                attenuation_tx,
            } => {
                out.extend_from_slice(&device.to_ne_bytes());
                out.extend_from_slice(&peer_device.to_ne_bytes());
                out.extend_from_slice(&attenuation_rx.to_ne_bytes());
                out.extend_from_slice(&attenuation_tx.to_ne_bytes());
            }
        }
        out
    }

    /// Decode a payload that has already been checked against its header
    ///
    /// `payload` must be exactly `kind.payload_size()` bytes long.
    pub fn decode_payload(kind: CommandKind, payload: &[u8]) -> Result<Self, ProtocolError> {
        let expected = kind.payload_size();
        if payload.len() < expected {
            return Err(ProtocolError::TruncatedPayload { kind, expected });
        }
        if payload.len() > expected {
            return Err(ProtocolError::TrailingBytes(payload.len() - expected));
        }

        let cmd = match kind {
            CommandKind::Reset => Self::Reset,
            CommandKind::SetAttenuationAll => Self::SetAttenuationAll {
                device: read_u16(payload, 0),
                attenuation: read_f64(payload, 2),
            },
            CommandKind::SetAttenuationOne => Self::SetAttenuationOne {
                device: read_u16(payload, 0),
                peer_device: read_u16(payload, 2),
                attenuation_rx: read_f64(payload, 4),
                attenuation_tx: read_f64(payload, 12),
            },
        };
        Ok(cmd)
    }

    /// Decode one complete packet (header and payload) from `bytes`
    ///
    /// Unlike the streaming decoders this is strict: unknown command words
    /// and trailing bytes are errors.
    pub fn decode(bytes: &[u8]) -> Result<Self, ProtocolError> {
        let header = Header::parse(bytes)?;
        let kind = CommandKind::try_from(header.command)?;
        header.validate_for(kind)?;
        Self::decode_payload(kind, &bytes[HEADER_SIZE..])
    }

    /// Returns the device that issued this command, if any
    pub fn device(&self) -> Option<u16> {
        match self {
            Self::Reset => None,
            Self::SetAttenuationAll { device, .. } | Self::SetAttenuationOne { device, .. } => {
                Some(*device)
            }
        }
    }
}

impl EncodeCommand for Command {
    fn encode(&self) -> Vec<u8> {
        let mut out = Vec::with_capacity(HEADER_SIZE + self.kind().payload_size());
        out.extend_from_slice(&self.header().to_bytes());
        out.extend_from_slice(&self.encode_payload());
        out
    }
}

impl fmt::Display for Command {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Reset => write!(f, "RESET"),
            Self::SetAttenuationAll {
                device,
                attenuation,
            } => write!(f, "SET_ATT_ALL dev={} att={:.1} dB", device, attenuation),
            Self::SetAttenuationOne {
                device,
                peer_device,
                attenuation_rx,
                attenuation_tx,
            } => write!(
                f,
                "SET_ATT_ONE dev={} peer={} rx={:.1} dB tx={:.1} dB",
                device, peer_device, attenuation_rx, attenuation_tx
            ),
        }
    }
}

/// Encode the frame the background reader treats as a shutdown request
pub fn terminate_frame() -> Vec<u8> {
    Command::SetAttenuationAll {
        device: TERMINATE_SENTINEL,
        attenuation: 0.0,
    }
    .encode()
}

fn read_u16(bytes: &[u8], at: usize) -> u16 {
    u16::from_ne_bytes([bytes[at], bytes[at + 1]])
}

fn read_f64(bytes: &[u8], at: usize) -> f64 {
    let mut raw = [0u8; 8];
    raw.copy_from_slice(&bytes[at..at + 8]);
    f64::from_ne_bytes(raw)
}
