//! Background command ingest
//!
//! Legacy variant of the channel: a reader task on a dedicated single-worker
//! runtime blocks on the command pipe and applies every command to a
//! [`SharedMatrix`] as soon as it arrives. Queries only take the lock.
//!
//! The channel keeps its own write end of the pipe open for its whole
//! lifetime. The reader therefore never sees end-of-file when clients come
//! and go, and shutdown can reach the reader in-band by writing a
//! SET_ATT_ALL frame addressed to the terminate sentinel device.

use std::fs::{self, File, OpenOptions};
use std::io::{self, Write};
use std::os::unix::fs::OpenOptionsExt;
use std::path::{Path, PathBuf};
use std::time::Duration;

use att_protocol::defaults::ISI_SNR_MARGIN;
use att_protocol::{terminate_frame, Frame, StreamDecoder, MAX_PACKET_SIZE};
use nix::fcntl::OFlag;
use tokio::io::AsyncReadExt;
use tokio::net::unix::pipe;
use tokio::runtime::{Builder, Runtime};
use tokio::task::JoinHandle;
use tracing::{debug, info, warn};

use crate::config::ChannelConfig;
use crate::controller::check_query;
use crate::error::{ChannelError, ChannelState};
use crate::matrix::AttenuationMatrix;
use crate::shared::SharedMatrix;
use crate::transport::create_fifo_if_not_there;
use crate::AttenuationChannel;

/// How long shutdown waits for the reader to acknowledge the sentinel
const SHUTDOWN_TIMEOUT: Duration = Duration::from_secs(2);

/// Dynamic attenuation channel fed by a background reader task
pub struct BackgroundChannel {
    config: ChannelConfig,
    path: PathBuf,
    matrix: SharedMatrix,
    runtime: Option<Runtime>,
    reader: Option<JoinHandle<Result<(), ChannelError>>>,
    /// Self-held write end; keeps the pipe from reporting EOF
    writer: Option<File>,
    /// Why the reader stopped, once it has failed
    failure: Option<String>,
    closed: bool,
}

impl BackgroundChannel {
    /// Create the pipe, allocate the matrix and start the reader task
    pub fn start(config: ChannelConfig, num_devices: usize) -> Result<Self, ChannelError> {
        config.validate()?;
        let path = config.pipe_path();
        create_fifo_if_not_there(&path)?;

        let runtime = Builder::new_multi_thread()
            .worker_threads(1)
            .thread_name("dynatt-ingest")
            .enable_all()
            .build()
            .map_err(|e| ChannelError::IngestFailed(format!("failed to build runtime: {}", e)))?;

        let receiver = {
            let _guard = runtime.enter();
            pipe::OpenOptions::new()
                .open_receiver(&path)
                .map_err(|source| transport_error(&path, source))?
        };

        // Opening the write end only succeeds once a reader exists
        let writer = OpenOptions::new()
            .write(true)
            .custom_flags(OFlag::O_NONBLOCK.bits())
            .open(&path)
            .map_err(|source| transport_error(&path, source))?;

        let matrix = SharedMatrix::new(
            AttenuationMatrix::new(num_devices, config.default_attenuation)
                .with_pair_update(config.pair_update),
        );
        let reader = runtime.spawn(run_ingest(receiver, matrix.clone(), path.clone()));

        info!(
            "Background attenuation channel started: {} devices, default {:.1} dB, pipe {}",
            num_devices,
            config.default_attenuation,
            path.display()
        );

        Ok(Self {
            config,
            path,
            matrix,
            runtime: Some(runtime),
            reader: Some(reader),
            writer: Some(writer),
            failure: None,
            closed: false,
        })
    }

    /// Current lifecycle state
    pub fn state(&self) -> ChannelState {
        if self.closed {
            ChannelState::Closed
        } else {
            ChannelState::Ready
        }
    }

    /// Configuration the channel was started with
    pub fn config(&self) -> &ChannelConfig {
        &self.config
    }

    /// Location of the command pipe
    pub fn pipe_path(&self) -> &Path {
        &self.path
    }

    /// Handle to the shared matrix
    pub fn matrix(&self) -> SharedMatrix {
        self.matrix.clone()
    }

    /// Number of devices (N)
    pub fn num_devices(&self) -> usize {
        self.matrix.num_devices()
    }

    /// Current attenuation from `tx` at `rx`
    pub fn lookup(&self, tx: usize, rx: usize) -> Option<f64> {
        self.matrix.with(|m| m.get(tx, rx))
    }

    /// Whether the reader task is still applying commands
    pub fn is_ingesting(&self) -> bool {
        self.reader.as_ref().is_some_and(|h| !h.is_finished())
    }

    /// Answer a tick's query from the shared matrix
    ///
    /// All entries are read under a single lock acquisition. A reader that
    /// failed turns every later query into an error; a reader stopped by the
    /// sentinel leaves the matrix frozen and queries keep answering.
    pub fn query(
        &mut self,
        tx_active: &[bool],
        rx_device: usize,
        att: &mut [f64],
    ) -> Result<f64, ChannelError> {
        if self.closed {
            return Err(ChannelError::InvalidState {
                actual: ChannelState::Closed,
                expected: ChannelState::Ready,
            });
        }
        self.check_reader()?;

        self.matrix.with(|m| -> Result<f64, ChannelError> {
            let num_devices = m.num_devices();
            check_query(num_devices, tx_active, rx_device, att)?;
            for device in 0..num_devices {
                if tx_active[device] {
                    att[device] = m.lookup(device, rx_device);
                }
            }
            Ok(ISI_SNR_MARGIN)
        })
    }

    /// Stop the reader, close the pipe and remove it; a no-op once closed
    pub fn shutdown(&mut self) {
        if self.closed {
            return;
        }
        self.closed = true;

        if self.is_ingesting() {
            if let Err(e) = self.send_terminate() {
                warn!("Failed to signal reader on {}: {}", self.path.display(), e);
                if let Some(handle) = &self.reader {
                    handle.abort();
                }
            }
        }

        if let Err(e) = self.join_reader() {
            warn!("Reader stopped with error: {}", e);
        }

        self.writer = None;
        if let Some(runtime) = self.runtime.take() {
            runtime.shutdown_timeout(Duration::from_millis(100));
        }

        match fs::remove_file(&self.path) {
            Ok(()) => debug!("Removed pipe {}", self.path.display()),
            Err(e) if e.kind() == io::ErrorKind::NotFound => {}
            Err(e) => warn!("Failed to remove pipe {}: {}", self.path.display(), e),
        }
        info!("Background attenuation channel closed");
    }

    fn send_terminate(&mut self) -> io::Result<()> {
        let writer = self
            .writer
            .as_mut()
            .ok_or_else(|| io::Error::new(io::ErrorKind::NotConnected, "writer closed"))?;
        writer.write_all(&terminate_frame())
    }

    /// Surface a reader failure to the caller
    fn check_reader(&mut self) -> Result<(), ChannelError> {
        if let Some(msg) = &self.failure {
            return Err(ChannelError::IngestFailed(msg.clone()));
        }
        if !self.reader.as_ref().is_some_and(|h| h.is_finished()) {
            return Ok(());
        }

        match self.join_reader() {
            Ok(()) => {
                warn!("Reader stopped; attenuations are frozen");
                Ok(())
            }
            Err(e) => {
                self.failure = Some(e.to_string());
                Err(e)
            }
        }
    }

    fn join_reader(&mut self) -> Result<(), ChannelError> {
        let (Some(handle), Some(runtime)) = (self.reader.take(), self.runtime.as_ref()) else {
            return Ok(());
        };

        let abort = handle.abort_handle();
        let joined =
            runtime.block_on(async { tokio::time::timeout(SHUTDOWN_TIMEOUT, handle).await });
        match joined {
            Ok(Ok(result)) => result,
            // Only shutdown aborts the reader
            Ok(Err(e)) if e.is_cancelled() => {
                debug!("Reader task cancelled");
                Ok(())
            }
            Ok(Err(e)) => Err(ChannelError::IngestFailed(format!("reader task panicked: {}", e))),
            Err(_) => {
                abort.abort();
                Err(ChannelError::IngestFailed(
                    "reader did not stop in time".to_string(),
                ))
            }
        }
    }
}

impl AttenuationChannel for BackgroundChannel {
    fn calc(
        &mut self,
        tx_active: &[bool],
        rx_device: usize,
        att: &mut [f64],
    ) -> Result<f64, ChannelError> {
        self.query(tx_active, rx_device, att)
    }

    fn close(&mut self) {
        self.shutdown();
    }
}

impl Drop for BackgroundChannel {
    fn drop(&mut self) {
        self.shutdown();
    }
}

fn transport_error(path: &Path, source: io::Error) -> ChannelError {
    ChannelError::Transport {
        path: path.to_path_buf(),
        source,
    }
}

/// Read the pipe until the terminate sentinel or a fatal error
async fn run_ingest(
    mut receiver: pipe::Receiver,
    matrix: SharedMatrix,
    path: PathBuf,
) -> Result<(), ChannelError> {
    info!("Reader listening on {}", path.display());

    let mut decoder = StreamDecoder::new();
    let mut buf = vec![0u8; 4 * MAX_PACKET_SIZE];

    loop {
        let n = receiver
            .read(&mut buf)
            .await
            .map_err(|source| transport_error(&path, source))?;
        if n == 0 {
            return Err(ChannelError::IngestFailed(
                "command pipe reported end of file".to_string(),
            ));
        }
        decoder.push_bytes(&buf[..n]);

        while let Some(frame) = decoder.next_frame()? {
            match frame {
                Frame::Command(cmd) => {
                    debug!("Applying {}", cmd);
                    matrix.apply(&cmd)?;
                }
                Frame::Terminate => {
                    info!("Reader received terminate sentinel");
                    return Ok(());
                }
                Frame::Unknown { .. } => {}
            }
        }
    }
}
