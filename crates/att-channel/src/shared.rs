//! Lock-protected matrix for the background reader
//!
//! Every accessor takes the lock for exactly one matrix operation and never
//! holds it across I/O, so a multi-cell update is never observed half
//! applied.

use std::sync::{Arc, Mutex, PoisonError};

use att_protocol::Command;

use crate::error::ChannelError;
use crate::matrix::AttenuationMatrix;

/// Attenuation matrix shared between the reader task and the query thread
#[derive(Debug, Clone)]
pub struct SharedMatrix {
    inner: Arc<Mutex<AttenuationMatrix>>,
}

impl SharedMatrix {
    /// Wrap a matrix for shared access
    pub fn new(matrix: AttenuationMatrix) -> Self {
        Self {
            inner: Arc::new(Mutex::new(matrix)),
        }
    }

    /// Run `f` with exclusive access to the matrix
    pub fn with<R>(&self, f: impl FnOnce(&mut AttenuationMatrix) -> R) -> R {
        // A panic inside `f` cannot leave a half-written cell pair behind, so
        // a poisoned lock still guards a consistent matrix.
        let mut guard = self.inner.lock().unwrap_or_else(PoisonError::into_inner);
        f(&mut guard)
    }

    /// Apply a decoded protocol command
    pub fn apply(&self, cmd: &Command) -> Result<(), ChannelError> {
        self.with(|m| m.apply(cmd))
    }

    /// See [`AttenuationMatrix::apply_all`]
    pub fn apply_all(&self, device: usize, attenuation: f64) -> Result<(), ChannelError> {
        self.with(|m| m.apply_all(device, attenuation))
    }

    /// See [`AttenuationMatrix::apply_one`]
    pub fn apply_one(
        &self,
        device: usize,
        peer_device: usize,
        attenuation_rx: f64,
        attenuation_tx: f64,
    ) -> Result<(), ChannelError> {
        self.with(|m| m.apply_one(device, peer_device, attenuation_rx, attenuation_tx))
    }

    /// See [`AttenuationMatrix::reset`]
    pub fn reset(&self) {
        self.with(|m| m.reset())
    }

    /// See [`AttenuationMatrix::lookup`]
    pub fn lookup(&self, tx: usize, rx: usize) -> f64 {
        self.with(|m| m.lookup(tx, rx))
    }

    /// Both directions between `a` and `b`, read under one lock
    pub fn lookup_pair(&self, a: usize, b: usize) -> (f64, f64) {
        self.with(|m| (m.lookup(a, b), m.lookup(b, a)))
    }

    /// Number of devices (N)
    pub fn num_devices(&self) -> usize {
        self.with(|m| m.num_devices())
    }

    /// Copy of the current matrix
    pub fn snapshot(&self) -> AttenuationMatrix {
        self.with(|m| m.clone())
    }
}
