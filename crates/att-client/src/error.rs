//! Error types for the attenuation client

use std::io;
use std::path::PathBuf;

use thiserror::Error;

/// Errors that can occur while talking to the channel
#[derive(Debug, Error)]
pub enum ClientError {
    /// Pipe missing, or no channel is reading it
    #[error("failed to open {}: {source}", .path.display())]
    Open {
        path: PathBuf,
        #[source]
        source: io::Error,
    },

    /// Write failed; usually the channel went away
    #[error("failed to write to {}: {source}", .path.display())]
    Write {
        path: PathBuf,
        #[source]
        source: io::Error,
    },

    /// Client already closed
    #[error("client is closed")]
    Closed,
}
