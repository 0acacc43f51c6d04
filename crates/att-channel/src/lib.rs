//! Dynamic Attenuation Channel
//!
//! This crate provides a propagation channel for a discrete-event radio
//! simulator in which the attenuation between every ordered pair of devices
//! can be changed by an external process while the simulation runs.
//!
//! # Architecture
//!
//! The channel keeps an NxN [`AttenuationMatrix`] seeded with a default
//! attenuation. Test tooling reconfigures it through a named pipe using the
//! `att-protocol` command format. Two variants are provided:
//!
//! - **[`ChannelController`]**: drains the pipe on the caller's thread at
//!   every query. No lock, no background task (default)
//! - **[`BackgroundChannel`]**: a reader task applies commands as they
//!   arrive; queries read a lock-protected matrix
//!
//! Both implement [`AttenuationChannel`], the interface the simulator's
//! physical layer drives.
//!
//! # Example
//!
//! ```rust,no_run
//! use att_channel::{AttenuationChannel, ChannelConfig, ChannelController};
//!
//! let config = ChannelConfig::new("sim1").with_default_attenuation(60.0);
//! let mut channel = ChannelController::open(config, 4)?;
//!
//! let tx_active = [false, true, true, false];
//! let mut att = [0.0; 4];
//! let isi_margin = channel.calc(&tx_active, 2, &mut att)?;
//! assert_eq!(isi_margin, 100.0);
//!
//! channel.close();
//! # Ok::<(), att_channel::ChannelError>(())
//! ```

pub mod config;
pub mod controller;
pub mod error;
pub mod ingest;
pub mod matrix;
pub mod shared;
pub mod transport;

pub use config::{default_com_root, ChannelConfig, PairUpdate};
pub use controller::ChannelController;
pub use error::{ChannelError, ChannelState, ConfigError};
pub use ingest::BackgroundChannel;
pub use matrix::AttenuationMatrix;
pub use shared::SharedMatrix;
pub use transport::{create_fifo_if_not_there, pipe_path, PipeTransport};

/// Propagation channel as seen by the simulator's physical layer
pub trait AttenuationChannel {
    /// Compute the attenuation from every active transmitter to `rx_device`
    ///
    /// For each `d` with `tx_active[d]`, writes the attenuation from `d` at
    /// `rx_device` into `att[d]`. Returns the SNR margin used for ISI.
    fn calc(
        &mut self,
        tx_active: &[bool],
        rx_device: usize,
        att: &mut [f64],
    ) -> Result<f64, ChannelError>;

    /// Release the command pipe; further queries fail
    fn close(&mut self);
}
