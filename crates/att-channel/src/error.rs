//! Error types for the attenuation channel

use std::fmt;
use std::io;
use std::path::PathBuf;

use thiserror::Error;

/// Errors in the channel configuration
#[derive(Debug, Error)]
pub enum ConfigError {
    /// The simulation id is mandatory
    #[error("sim_id is mandatory")]
    MissingSimId,

    /// Default attenuation outside the legal range
    #[error("attenuation must be between {min} dB and {max} dB (is {value})")]
    AttenuationOutOfRange { value: f64, min: f64, max: f64 },

    /// Pipe name is empty or not a plain file name
    #[error("invalid pipe name: {0:?}")]
    InvalidPipeName(String),

    /// Configuration file could not be read
    #[error("failed to read config {}: {source}", .path.display())]
    Read {
        path: PathBuf,
        #[source]
        source: io::Error,
    },

    /// Configuration file is not valid JSON for a channel config
    #[error("failed to parse config {}: {source}", .path.display())]
    Parse {
        path: PathBuf,
        #[source]
        source: serde_json::Error,
    },
}

/// Lifecycle state of a channel
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ChannelState {
    /// Configured but not yet initialized
    Uninitialized,
    /// Matrix allocated and command pipe open
    Ready,
    /// Torn down; terminal
    Closed,
}

impl fmt::Display for ChannelState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            Self::Uninitialized => "uninitialized",
            Self::Ready => "ready",
            Self::Closed => "closed",
        };
        f.write_str(name)
    }
}

/// Errors that can occur in the channel
///
/// Every variant is fatal for the simulation: the channel performs no retry
/// and no resynchronization of the command stream.
#[derive(Debug, Error)]
pub enum ChannelError {
    /// Invalid configuration
    #[error("configuration error: {0}")]
    Config(#[from] ConfigError),

    /// Command pipe could not be created, opened or read
    #[error("transport error on {}: {source}", .path.display())]
    Transport {
        path: PathBuf,
        #[source]
        source: io::Error,
    },

    /// Misframed command stream
    #[error("protocol error: {0}")]
    Protocol(#[from] att_protocol::ProtocolError),

    /// Device number not smaller than the number of devices
    #[error("device {device} out of range (simulation has {num_devices} devices)")]
    OutOfRangeDevice { device: usize, num_devices: usize },

    /// Pairwise update addressed a device to itself
    #[error("device {0} cannot be its own peer")]
    SameDevice(usize),

    /// Query slices do not cover every device
    #[error("query arrays hold {len} entries, need {num_devices}")]
    QueryTooShort { len: usize, num_devices: usize },

    /// Operation not valid in the current lifecycle state
    #[error("channel is {actual}, expected {expected}")]
    InvalidState {
        actual: ChannelState,
        expected: ChannelState,
    },

    /// Background reader stopped or could not be started
    #[error("background reader failed: {0}")]
    IngestFailed(String),
}
