//! Attenuation matrix store
//!
//! `M[tx][rx]` is the attenuation applied to a transmission from device `tx`
//! as observed at device `rx`. The matrix is not symmetric in general.

use att_protocol::Command;

use crate::config::PairUpdate;
use crate::error::ChannelError;

/// NxN grid of directional attenuations in dB
#[derive(Debug, Clone, PartialEq)]
pub struct AttenuationMatrix {
    num_devices: usize,
    default_attenuation: f64,
    pair_update: PairUpdate,
    /// Row-major, `cells[tx * num_devices + rx]`
    cells: Vec<f64>,
}

impl AttenuationMatrix {
    /// Create a matrix with every path set to `default_attenuation`
    pub fn new(num_devices: usize, default_attenuation: f64) -> Self {
        Self {
            num_devices,
            default_attenuation,
            pair_update: PairUpdate::default(),
            cells: vec![default_attenuation; num_devices * num_devices],
        }
    }

    /// Select how SET_ATT_ONE is written
    pub fn with_pair_update(mut self, mode: PairUpdate) -> Self {
        self.pair_update = mode;
        self
    }

    /// Number of devices (N)
    pub fn num_devices(&self) -> usize {
        self.num_devices
    }

    /// Attenuation used to seed and reset the matrix
    pub fn default_attenuation(&self) -> f64 {
        self.default_attenuation
    }

    /// SET_ATT_ONE semantics in use
    pub fn pair_update(&self) -> PairUpdate {
        self.pair_update
    }

    /// Restore every path to the default attenuation
    pub fn reset(&mut self) {
        self.cells.fill(self.default_attenuation);
    }

    /// Set the attenuation between `device` and every device, both directions
    ///
    /// The row and column of `device` become uniform; paths between other
    /// devices are untouched.
    pub fn apply_all(&mut self, device: usize, attenuation: f64) -> Result<(), ChannelError> {
        self.check_device(device)?;

        for peer in 0..self.num_devices {
            let (out, back) = (self.index(device, peer), self.index(peer, device));
            self.cells[out] = attenuation;
            self.cells[back] = attenuation;
        }
        Ok(())
    }

    /// Set the attenuation between `device` and `peer_device`
    ///
    /// With [`PairUpdate::Symmetric`] both directions take `attenuation_tx`
    /// and `attenuation_rx` is ignored.
    pub fn apply_one(
        &mut self,
        device: usize,
        peer_device: usize,
        attenuation_rx: f64,
        attenuation_tx: f64,
    ) -> Result<(), ChannelError> {
        self.check_device(device)?;
        self.check_device(peer_device)?;
        if device == peer_device {
            return Err(ChannelError::SameDevice(device));
        }

        let back = match self.pair_update {
            PairUpdate::Symmetric => attenuation_tx,
            PairUpdate::Directional => attenuation_rx,
        };
        let (out_idx, back_idx) = (
            self.index(device, peer_device),
            self.index(peer_device, device),
        );
        self.cells[out_idx] = attenuation_tx;
        self.cells[back_idx] = back;
        Ok(())
    }

    /// Apply a decoded protocol command
    pub fn apply(&mut self, cmd: &Command) -> Result<(), ChannelError> {
        match *cmd {
            Command::Reset => {
                self.reset();
                Ok(())
            }
            Command::SetAttenuationAll {
                device,
                attenuation,
            } => self.apply_all(device as usize, attenuation),
            Command::SetAttenuationOne {
                device,
                peer_device,
                attenuation_rx,
                attenuation_tx,
            } => self.apply_one(
                device as usize,
                peer_device as usize,
                attenuation_rx,
                attenuation_tx,
            ),
        }
    }

    /// Attenuation from `tx` as observed at `rx`
    ///
    /// Callers guarantee both indices are below [`Self::num_devices`]; an
    /// out-of-range index panics.
    pub fn lookup(&self, tx: usize, rx: usize) -> f64 {
        self.cells[self.index(tx, rx)]
    }

    /// Checked variant of [`Self::lookup`]
    pub fn get(&self, tx: usize, rx: usize) -> Option<f64> {
        if tx < self.num_devices && rx < self.num_devices {
            Some(self.lookup(tx, rx))
        } else {
            None
        }
    }

    /// All attenuations from `tx`, indexed by receiver
    pub fn row(&self, tx: usize) -> &[f64] {
        let start = tx * self.num_devices;
        &self.cells[start..start + self.num_devices]
    }

    fn index(&self, tx: usize, rx: usize) -> usize {
        tx * self.num_devices + rx
    }

    fn check_device(&self, device: usize) -> Result<(), ChannelError> {
        if device >= self.num_devices {
            return Err(ChannelError::OutOfRangeDevice {
                device,
                num_devices: self.num_devices,
            });
        }
        Ok(())
    }
}
