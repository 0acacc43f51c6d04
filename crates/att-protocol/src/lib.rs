//! Dynamic Attenuation Protocol Library
//!
//! This crate provides encoding and decoding for the command protocol that
//! test tooling uses to reconfigure the dynamic attenuation channel while a
//! simulation is running:
//!
//! - **RESET**: restore every path to the default attenuation
//! - **SET_ATT_ALL**: same attenuation between one device and all others
//! - **SET_ATT_ONE**: attenuation between one device and one peer
//!
//! # Architecture
//!
//! Packets are a fixed 4-byte header plus a payload whose size is implied by
//! the command word. Writers must emit each packet with a single write, so
//! the channel side never has to reassemble fragments:
//!
//! - [`decode_next`] reads packets through a [`FrameSource`] (the channel's
//!   non-blocking pipe)
//! - [`StreamDecoder`] buffers arbitrary chunks for blocking/async readers
//! - [`EncodeCommand`] produces the exact wire bytes a client writes
//!
//! # Example
//!
//! ```rust
//! use std::collections::VecDeque;
//! use att_protocol::{decode_next, Command, EncodeCommand};
//!
//! let cmd = Command::SetAttenuationAll { device: 2, attenuation: 100.0 };
//! let mut pipe: VecDeque<u8> = cmd.encode().into_iter().collect();
//!
//! assert_eq!(decode_next(&mut pipe), Ok(Some(cmd)));
//! assert_eq!(decode_next(&mut pipe), Ok(None));
//! ```

pub mod codec;
pub mod command;
pub mod defaults;
pub mod error;

pub use codec::{decode_next, Frame, StreamDecoder};
pub use command::{
    terminate_frame, Command, CommandKind, Header, HEADER_SIZE, MAX_PACKET_SIZE,
    SET_ALL_PAYLOAD_SIZE, SET_ONE_PAYLOAD_SIZE, TERMINATE_SENTINEL,
};
pub use error::ProtocolError;

/// Trait for byte sources that can hand out exactly-sized reads without blocking
pub trait FrameSource {
    /// Error type of the source; decode errors convert into it
    type Error: From<ProtocolError>;

    /// Read exactly `len` bytes if they are available right now
    ///
    /// Returns `Ok(None)` when nothing (or only part of a packet) is ready.
    fn read_exact_now(&mut self, len: usize) -> Result<Option<Vec<u8>>, Self::Error>;
}

/// Trait for commands that can be encoded to bytes
pub trait EncodeCommand {
    /// Encode this command to its wire format
    fn encode(&self) -> Vec<u8>;
}
