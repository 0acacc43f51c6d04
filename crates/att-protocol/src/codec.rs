//! Packet decoders
//!
//! Two decoders share the same framing rules:
//!
//! - [`decode_next`] pulls one packet at a time from a [`FrameSource`] that
//!   performs its own exact-size reads (the non-blocking pipe transport).
//! - [`StreamDecoder`] buffers raw chunks for readers that cannot control
//!   read boundaries (the background reader task).

use std::collections::VecDeque;

use tracing::{debug, warn};

use crate::command::{
    Command, CommandKind, Header, HEADER_SIZE, MAX_PACKET_SIZE, TERMINATE_SENTINEL,
};
use crate::error::ProtocolError;
use crate::FrameSource;

/// Decode the next packet available from `source`
///
/// Returns `Ok(None)` when no header is ready. A header whose declared size
/// does not match its command word, or a header without its payload, is an
/// error: the stream cannot be resynchronized after misframing. Packets with
/// an unknown command word are logged, their declared payload is discarded,
/// and decoding moves on to the next packet.
pub fn decode_next<S>(source: &mut S) -> Result<Option<Command>, S::Error>
where
    S: FrameSource + ?Sized,
{
    loop {
        let Some(raw) = source.read_exact_now(HEADER_SIZE)? else {
            return Ok(None);
        };
        let header = Header::parse(&raw)?;

        let kind = match CommandKind::try_from(header.command) {
            Ok(kind) => kind,
            Err(_) => {
                warn!(
                    "Ignoring unknown command 0x{:04X} ({} payload bytes)",
                    header.command, header.payload_size
                );
                if header.payload_size > 0 {
                    source.read_exact_now(header.payload_size as usize)?;
                }
                continue;
            }
        };

        header.validate_for(kind)?;

        let payload = if kind.payload_size() == 0 {
            Vec::new()
        } else {
            source
                .read_exact_now(kind.payload_size())?
                .ok_or(ProtocolError::TruncatedPayload {
                    kind,
                    expected: kind.payload_size(),
                })?
        };

        let cmd = Command::decode_payload(kind, &payload)?;
        debug!("Decoded {}", cmd);
        return Ok(Some(cmd));
    }
}

/// In-memory source with pipe-like semantics: a read either yields exactly
/// the requested length or drains whatever is left and reports nothing ready
impl FrameSource for VecDeque<u8> {
    type Error = ProtocolError;

    fn read_exact_now(&mut self, len: usize) -> Result<Option<Vec<u8>>, Self::Error> {
        if self.len() >= len {
            Ok(Some(self.drain(..len).collect()))
        } else {
            self.clear();
            Ok(None)
        }
    }
}

/// A unit decoded by [`StreamDecoder`]
#[derive(Debug, Clone, PartialEq)]
pub enum Frame {
    /// A valid attenuation command
    Command(Command),
    /// The background reader's shutdown frame
    Terminate,
    /// A packet with an unrecognized command word (payload discarded)
    Unknown { command: u16, payload_size: u16 },
}

/// Streaming decoder that handles partial data
pub struct StreamDecoder {
    buffer: Vec<u8>,
}

impl StreamDecoder {
    /// Create a new stream decoder
    pub fn new() -> Self {
        Self {
            buffer: Vec::with_capacity(MAX_PACKET_SIZE * 4),
        }
    }

    /// Push raw bytes into the decoder's buffer
    pub fn push_bytes(&mut self, data: &[u8]) {
        self.buffer.extend_from_slice(data);
    }

    /// Try to extract the next complete frame from the buffer
    ///
    /// Returns `Ok(None)` until a whole packet has been buffered.
    pub fn next_frame(&mut self) -> Result<Option<Frame>, ProtocolError> {
        if self.buffer.len() < HEADER_SIZE {
            return Ok(None);
        }
        let header = Header::parse(&self.buffer)?;

        let kind = match CommandKind::try_from(header.command) {
            Ok(kind) => kind,
            Err(_) => {
                let total = HEADER_SIZE + header.payload_size as usize;
                if self.buffer.len() < total {
                    return Ok(None);
                }
                self.buffer.drain(..total);
                warn!(
                    "Ignoring unknown command 0x{:04X} ({} payload bytes)",
                    header.command, header.payload_size
                );
                return Ok(Some(Frame::Unknown {
                    command: header.command,
                    payload_size: header.payload_size,
                }));
            }
        };

        header.validate_for(kind)?;

        let total = HEADER_SIZE + kind.payload_size();
        if self.buffer.len() < total {
            return Ok(None);
        }
        let packet: Vec<u8> = self.buffer.drain(..total).collect();
        let cmd = Command::decode_payload(kind, &packet[HEADER_SIZE..])?;

        if let Command::SetAttenuationAll {
            device: TERMINATE_SENTINEL,
            ..
        } = cmd
        {
            return Ok(Some(Frame::Terminate));
        }

        Ok(Some(Frame::Command(cmd)))
    }

    /// Number of bytes waiting for the rest of their packet
    pub fn buffered(&self) -> usize {
        self.buffer.len()
    }

    /// Clear the internal buffer
    pub fn clear(&mut self) {
        self.buffer.clear();
    }
}

impl Default for StreamDecoder {
    fn default() -> Self {
        Self::new()
    }
}
