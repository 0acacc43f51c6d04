//! Attenuation client
//!
//! Writer side of the command pipe. The client never reads anything back;
//! a successful call means the packet reached the pipe, not that the channel
//! applied it.

use std::fs::{File, OpenOptions};
use std::io::{self, Write};
use std::os::unix::fs::OpenOptionsExt;
use std::path::{Path, PathBuf};

use att_protocol::defaults::DEFAULT_PIPE_NAME;
use att_protocol::{Command, EncodeCommand};
use nix::fcntl::OFlag;
use tracing::{debug, info, warn};

use crate::error::ClientError;

/// Connection from one simulated device to the channel's command pipe
#[derive(Debug)]
pub struct AttenuationClient {
    path: PathBuf,
    device: u16,
    pipe: Option<File>,
}

impl AttenuationClient {
    /// Open `<com_root>/<sim_id>/<name>` for writing on behalf of `device`
    ///
    /// `name` defaults to the channel's default pipe name. Fails when the
    /// pipe does not exist or no channel has it open for reading.
    pub fn open(
        com_root: &Path,
        sim_id: &str,
        device: u16,
        name: Option<&str>,
    ) -> Result<Self, ClientError> {
        let path = com_root
            .join(sim_id)
            .join(name.unwrap_or(DEFAULT_PIPE_NAME));
        Self::open_path(path, device)
    }

    /// Open a pipe at an explicit path
    pub fn open_path(path: PathBuf, device: u16) -> Result<Self, ClientError> {
        // Non-blocking so a missing reader fails fast with ENXIO instead of
        // hanging in open()
        let pipe = OpenOptions::new()
            .write(true)
            .custom_flags(OFlag::O_NONBLOCK.bits())
            .open(&path)
            .map_err(|source| ClientError::Open {
                path: path.clone(),
                source,
            })?;

        info!("Device {} connected to {}", device, path.display());
        Ok(Self {
            path,
            device,
            pipe: Some(pipe),
        })
    }

    /// Device this client speaks for
    pub fn device(&self) -> u16 {
        self.device
    }

    /// Location of the pipe
    pub fn path(&self) -> &Path {
        &self.path
    }

    /// Whether the client is still open
    pub fn is_open(&self) -> bool {
        self.pipe.is_some()
    }

    /// Close the pipe; safe to call more than once
    pub fn close(&mut self) {
        if self.pipe.take().is_some() {
            debug!("Device {} disconnected", self.device);
        }
    }

    /// Restore every path to the default attenuation
    pub fn reset(&mut self) -> Result<bool, ClientError> {
        self.send(&Command::Reset)
    }

    /// Set the attenuation between this device and every other device
    pub fn set_attenuation_all(&mut self, attenuation: f64) -> Result<bool, ClientError> {
        self.send(&Command::SetAttenuationAll {
            device: self.device,
            attenuation,
        })
    }

    /// Set the attenuation between this device and `peer_device`
    pub fn set_attenuation_one(
        &mut self,
        peer_device: u16,
        attenuation_rx: f64,
        attenuation_tx: f64,
    ) -> Result<bool, ClientError> {
        self.send(&Command::SetAttenuationOne {
            device: self.device,
            peer_device,
            attenuation_rx,
            attenuation_tx,
        })
    }

    /// Encode and write one command
    pub fn send(&mut self, cmd: &Command) -> Result<bool, ClientError> {
        debug!("Device {} sending {}", self.device, cmd);
        self.send_raw(&cmd.encode())
    }

    /// Write `bytes` with a single `write` call
    ///
    /// Returns `Ok(true)` iff every byte was written. A full pipe reports
    /// `Ok(false)`.
    pub fn send_raw(&mut self, bytes: &[u8]) -> Result<bool, ClientError> {
        let pipe = self.pipe.as_mut().ok_or(ClientError::Closed)?;

        match pipe.write(bytes) {
            Ok(n) if n == bytes.len() => Ok(true),
            Ok(n) => {
                warn!(
                    "Partial write of {} of {} bytes to {}",
                    n,
                    bytes.len(),
                    self.path.display()
                );
                Ok(false)
            }
            Err(e) if e.kind() == io::ErrorKind::WouldBlock => {
                warn!("Pipe {} is full, packet not sent", self.path.display());
                Ok(false)
            }
            Err(source) => Err(ClientError::Write {
                path: self.path.clone(),
                source,
            }),
        }
    }
}

#[cfg(test)]
mod tests {
    use std::io::Read;

    use att_protocol::{HEADER_SIZE, SET_ALL_PAYLOAD_SIZE, SET_ONE_PAYLOAD_SIZE};
    use nix::sys::stat::Mode;
    use nix::unistd::mkfifo;

    use super::*;

    /// Create a FIFO and open its read end so clients can connect
    fn reader(root: &Path, sim_id: &str) -> File {
        let folder = root.join(sim_id);
        std::fs::create_dir_all(&folder).unwrap();
        let path = folder.join(DEFAULT_PIPE_NAME);
        mkfifo(&path, Mode::S_IRWXU).unwrap();
        OpenOptions::new()
            .read(true)
            .custom_flags(OFlag::O_NONBLOCK.bits())
            .open(&path)
            .unwrap()
    }

    fn read_available(reader: &mut File) -> Vec<u8> {
        let mut buf = [0u8; 256];
        let n = reader.read(&mut buf).unwrap();
        buf[..n].to_vec()
    }

    #[test]
    fn test_open_without_pipe_fails() {
        let root = tempfile::tempdir().unwrap();
        let result = AttenuationClient::open(root.path(), "missing", 0, None);
        assert!(matches!(result, Err(ClientError::Open { .. })));
    }

    #[test]
    fn test_open_without_reader_fails() {
        let root = tempfile::tempdir().unwrap();
        let path = root.path().join("fifo");
        mkfifo(&path, Mode::S_IRWXU).unwrap();

        let result = AttenuationClient::open_path(path, 0);
        assert!(matches!(result, Err(ClientError::Open { .. })));
    }

    #[test]
    fn test_set_attenuation_all_uses_own_device() {
        let root = tempfile::tempdir().unwrap();
        let mut rx = reader(root.path(), "sim");
        let mut client = AttenuationClient::open(root.path(), "sim", 3, None).unwrap();

        assert!(client.set_attenuation_all(45.5).unwrap());

        let bytes = read_available(&mut rx);
        assert_eq!(bytes.len(), HEADER_SIZE + SET_ALL_PAYLOAD_SIZE);
        assert_eq!(
            Command::decode(&bytes).unwrap(),
            Command::SetAttenuationAll {
                device: 3,
                attenuation: 45.5
            }
        );
    }

    #[test]
    fn test_set_attenuation_one_and_reset() {
        let root = tempfile::tempdir().unwrap();
        let mut rx = reader(root.path(), "sim");
        let mut client = AttenuationClient::open(root.path(), "sim", 1, None).unwrap();

        assert!(client.set_attenuation_one(2, 5.0, 9.0).unwrap());
        assert!(client.reset().unwrap());

        let bytes = read_available(&mut rx);
        let (one, reset) = bytes.split_at(HEADER_SIZE + SET_ONE_PAYLOAD_SIZE);
        assert_eq!(
            Command::decode(one).unwrap(),
            Command::SetAttenuationOne {
                device: 1,
                peer_device: 2,
                attenuation_rx: 5.0,
                attenuation_tx: 9.0
            }
        );
        assert_eq!(Command::decode(reset).unwrap(), Command::Reset);
    }

    #[test]
    fn test_send_after_close() {
        let root = tempfile::tempdir().unwrap();
        let _rx = reader(root.path(), "sim");
        let mut client = AttenuationClient::open(root.path(), "sim", 0, None).unwrap();

        client.close();
        client.close();
        assert!(!client.is_open());
        assert!(matches!(client.reset(), Err(ClientError::Closed)));
    }

    #[test]
    fn test_write_after_reader_gone() {
        let root = tempfile::tempdir().unwrap();
        let rx = reader(root.path(), "sim");
        let mut client = AttenuationClient::open(root.path(), "sim", 0, None).unwrap();

        drop(rx);
        assert!(matches!(client.reset(), Err(ClientError::Write { .. })));
    }
}
