//! Command pipe transport
//!
//! The channel owns a single FIFO at `<com_root>/<sim_id>/<pipe_name>`.
//! Clients open it for writing and emit whole packets with one `write` each;
//! packets are far below `PIPE_BUF`, so the kernel never interleaves or
//! splits them. The channel reads without blocking and never buffers.

use std::fs::{self, File, OpenOptions};
use std::io::{self, Read};
use std::os::unix::fs::{FileTypeExt, OpenOptionsExt};
use std::path::{Path, PathBuf};

use att_protocol::FrameSource;
use nix::errno::Errno;
use nix::fcntl::OFlag;
use nix::sys::stat::Mode;
use nix::unistd::mkfifo;
use tracing::{debug, info, warn};

use crate::error::ChannelError;

/// Path of the command pipe for a simulation
pub fn pipe_path(com_root: &Path, sim_id: &str, pipe_name: &str) -> PathBuf {
    com_root.join(sim_id).join(pipe_name)
}

/// Create the communication folder and the FIFO unless they already exist
pub fn create_fifo_if_not_there(path: &Path) -> Result<(), ChannelError> {
    if let Some(folder) = path.parent() {
        fs::create_dir_all(folder).map_err(|source| ChannelError::Transport {
            path: folder.to_path_buf(),
            source,
        })?;
    }

    match fs::metadata(path) {
        Ok(meta) if meta.file_type().is_fifo() => {
            debug!("Reusing existing pipe {}", path.display());
            Ok(())
        }
        Ok(_) => Err(ChannelError::Transport {
            path: path.to_path_buf(),
            source: io::Error::new(io::ErrorKind::AlreadyExists, "path exists and is not a FIFO"),
        }),
        Err(e) if e.kind() == io::ErrorKind::NotFound => {
            match mkfifo(path, Mode::S_IRWXU | Mode::S_IRWXG) {
                // Another process created it between the check and mkfifo
                Ok(()) | Err(Errno::EEXIST) => Ok(()),
                Err(errno) => Err(ChannelError::Transport {
                    path: path.to_path_buf(),
                    source: io::Error::from(errno),
                }),
            }
        }
        Err(source) => Err(ChannelError::Transport {
            path: path.to_path_buf(),
            source,
        }),
    }
}

/// Non-blocking reader end of the command pipe
#[derive(Debug)]
pub struct PipeTransport {
    path: PathBuf,
    file: Option<File>,
}

impl PipeTransport {
    /// Create (if needed) and open the pipe for non-blocking reads
    pub fn open(com_root: &Path, sim_id: &str, pipe_name: &str) -> Result<Self, ChannelError> {
        Self::open_path(pipe_path(com_root, sim_id, pipe_name))
    }

    /// Create (if needed) and open the pipe at an explicit path
    pub fn open_path(path: PathBuf) -> Result<Self, ChannelError> {
        create_fifo_if_not_there(&path)?;

        let file = OpenOptions::new()
            .read(true)
            .custom_flags(OFlag::O_NONBLOCK.bits())
            .open(&path)
            .map_err(|source| ChannelError::Transport {
                path: path.clone(),
                source,
            })?;

        info!("Dynamic attenuation pipe ready at {}", path.display());
        Ok(Self {
            path,
            file: Some(file),
        })
    }

    /// Location of the pipe
    pub fn path(&self) -> &Path {
        &self.path
    }

    /// Whether the pipe is still open
    pub fn is_open(&self) -> bool {
        self.file.is_some()
    }

    /// Read exactly `len` bytes if they are available right now
    ///
    /// Nothing written, no writer connected, and a short read all report
    /// `Ok(None)`. Bytes of a short read are dropped.
    pub fn read_exact_now(&mut self, len: usize) -> Result<Option<Vec<u8>>, ChannelError> {
        let Some(file) = self.file.as_mut() else {
            return Err(ChannelError::Transport {
                path: self.path.clone(),
                source: io::Error::new(io::ErrorKind::NotConnected, "pipe is closed"),
            });
        };

        let mut buf = vec![0u8; len];
        loop {
            match file.read(&mut buf) {
                Ok(n) if n == len => return Ok(Some(buf)),
                Ok(0) => return Ok(None),
                Ok(n) => {
                    warn!(
                        "Dropping short read of {} bytes from {} (expected {})",
                        n,
                        self.path.display(),
                        len
                    );
                    return Ok(None);
                }
                Err(e) if e.kind() == io::ErrorKind::WouldBlock => return Ok(None),
                Err(e) if e.kind() == io::ErrorKind::Interrupted => continue,
                Err(source) => {
                    return Err(ChannelError::Transport {
                        path: self.path.clone(),
                        source,
                    })
                }
            }
        }
    }

    /// Close and remove the pipe; safe to call more than once
    pub fn close(&mut self) {
        if self.file.take().is_none() {
            return;
        }
        match fs::remove_file(&self.path) {
            Ok(()) => debug!("Removed pipe {}", self.path.display()),
            Err(e) if e.kind() == io::ErrorKind::NotFound => {}
            Err(e) => warn!("Failed to remove pipe {}: {}", self.path.display(), e),
        }
    }
}

impl FrameSource for PipeTransport {
    type Error = ChannelError;

    fn read_exact_now(&mut self, len: usize) -> Result<Option<Vec<u8>>, Self::Error> {
        PipeTransport::read_exact_now(self, len)
    }
}

impl Drop for PipeTransport {
    fn drop(&mut self) {
        self.close();
    }
}
