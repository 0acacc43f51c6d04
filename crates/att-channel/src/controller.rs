//! Channel controller
//!
//! Runs entirely on the host's stepping thread. Every query first drains the
//! command pipe without blocking, applying each command to the matrix, and
//! then answers from the updated matrix. There is no lock and no background
//! task, so a query can never observe a half-applied update.

use std::path::PathBuf;

use att_protocol::decode_next;
use att_protocol::defaults::ISI_SNR_MARGIN;
use tracing::{debug, info};

use crate::config::ChannelConfig;
use crate::error::{ChannelError, ChannelState};
use crate::matrix::AttenuationMatrix;
use crate::transport::PipeTransport;
use crate::AttenuationChannel;

enum Stage {
    Uninitialized,
    Ready {
        matrix: AttenuationMatrix,
        transport: PipeTransport,
    },
    Closed,
}

/// Single-threaded dynamic attenuation channel
pub struct ChannelController {
    config: ChannelConfig,
    stage: Stage,
}

impl ChannelController {
    /// Create a controller from a validated configuration
    pub fn new(config: ChannelConfig) -> Result<Self, ChannelError> {
        config.validate()?;
        Ok(Self {
            config,
            stage: Stage::Uninitialized,
        })
    }

    /// Create and initialize in one step
    pub fn open(config: ChannelConfig, num_devices: usize) -> Result<Self, ChannelError> {
        let mut controller = Self::new(config)?;
        controller.init(num_devices)?;
        Ok(controller)
    }

    /// Allocate the matrix and open the command pipe
    pub fn init(&mut self, num_devices: usize) -> Result<(), ChannelError> {
        if !matches!(self.stage, Stage::Uninitialized) {
            return Err(ChannelError::InvalidState {
                actual: self.state(),
                expected: ChannelState::Uninitialized,
            });
        }

        let mut matrix = AttenuationMatrix::new(num_devices, self.config.default_attenuation)
            .with_pair_update(self.config.pair_update);
        matrix.reset();

        let transport = PipeTransport::open_path(self.config.pipe_path())?;

        info!(
            "Dynamic attenuation channel initialized: {} devices, default {:.1} dB, {} pair updates",
            num_devices,
            self.config.default_attenuation,
            self.config.pair_update.name()
        );
        self.stage = Stage::Ready { matrix, transport };
        Ok(())
    }

    /// Current lifecycle state
    pub fn state(&self) -> ChannelState {
        match self.stage {
            Stage::Uninitialized => ChannelState::Uninitialized,
            Stage::Ready { .. } => ChannelState::Ready,
            Stage::Closed => ChannelState::Closed,
        }
    }

    /// Configuration the controller was created with
    pub fn config(&self) -> &ChannelConfig {
        &self.config
    }

    /// Location of the command pipe
    pub fn pipe_path(&self) -> PathBuf {
        self.config.pipe_path()
    }

    /// Number of devices, once initialized
    pub fn num_devices(&self) -> Option<usize> {
        match &self.stage {
            Stage::Ready { matrix, .. } => Some(matrix.num_devices()),
            _ => None,
        }
    }

    /// Current attenuation from `tx` at `rx`, once initialized
    pub fn lookup(&self, tx: usize, rx: usize) -> Option<f64> {
        match &self.stage {
            Stage::Ready { matrix, .. } => matrix.get(tx, rx),
            _ => None,
        }
    }

    /// Decode and apply every command currently waiting in the pipe
    ///
    /// Returns the number of commands applied.
    pub fn poll_commands(&mut self) -> Result<usize, ChannelError> {
        let Stage::Ready { matrix, transport } = &mut self.stage else {
            return Err(self.not_ready());
        };

        let mut applied = 0;
        while let Some(cmd) = decode_next(transport)? {
            debug!("Applying {}", cmd);
            matrix.apply(&cmd)?;
            applied += 1;
        }
        Ok(applied)
    }

    /// Answer a tick's query
    ///
    /// Writes the attenuation from every active transmitter `d` to
    /// `rx_device` into `att[d]`; entries of inactive transmitters are left
    /// untouched. Returns the ISI SNR margin.
    pub fn query(
        &mut self,
        tx_active: &[bool],
        rx_device: usize,
        att: &mut [f64],
    ) -> Result<f64, ChannelError> {
        self.poll_commands()?;

        let Stage::Ready { matrix, .. } = &self.stage else {
            return Err(self.not_ready());
        };
        let num_devices = matrix.num_devices();
        check_query(num_devices, tx_active, rx_device, att)?;

        for (device, _) in tx_active[..num_devices]
            .iter()
            .enumerate()
            .filter(|(_, active)| **active)
        {
            att[device] = matrix.lookup(device, rx_device);
        }
        Ok(ISI_SNR_MARGIN)
    }

    /// Close the pipe and free the matrix; a no-op once closed
    pub fn teardown(&mut self) {
        if let Stage::Ready { mut transport, .. } =
            std::mem::replace(&mut self.stage, Stage::Closed)
        {
            transport.close();
            info!("Dynamic attenuation channel closed");
        }
    }

    fn not_ready(&self) -> ChannelError {
        ChannelError::InvalidState {
            actual: self.state(),
            expected: ChannelState::Ready,
        }
    }
}

impl AttenuationChannel for ChannelController {
    fn calc(
        &mut self,
        tx_active: &[bool],
        rx_device: usize,
        att: &mut [f64],
    ) -> Result<f64, ChannelError> {
        self.query(tx_active, rx_device, att)
    }

    fn close(&mut self) {
        self.teardown();
    }
}

impl Drop for ChannelController {
    fn drop(&mut self) {
        self.teardown();
    }
}

/// Validate query arguments against the number of devices
pub(crate) fn check_query(
    num_devices: usize,
    tx_active: &[bool],
    rx_device: usize,
    att: &[f64],
) -> Result<(), ChannelError> {
    if rx_device >= num_devices {
        return Err(ChannelError::OutOfRangeDevice {
            device: rx_device,
            num_devices,
        });
    }
    let len = tx_active.len().min(att.len());
    if len < num_devices {
        return Err(ChannelError::QueryTooShort { len, num_devices });
    }
    Ok(())
}
