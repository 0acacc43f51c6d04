//! Dynamic Attenuation Client Library
//!
//! This crate lets test tooling reconfigure a running dynamic attenuation
//! channel. Each [`AttenuationClient`] speaks for one simulated device and
//! writes protocol packets into the channel's command pipe.
//!
//! # Example
//!
//! ```rust,no_run
//! use std::path::Path;
//! use att_client::AttenuationClient;
//!
//! let mut client = AttenuationClient::open(Path::new("/tmp/bs_user"), "sim1", 2, None)?;
//!
//! // Isolate device 2 from everyone
//! client.set_attenuation_all(100.0)?;
//! // Bring device 0 back closer
//! client.set_attenuation_one(0, 40.0, 40.0)?;
//!
//! client.close();
//! # Ok::<(), att_client::ClientError>(())
//! ```

pub mod client;
pub mod error;

pub use client::AttenuationClient;
pub use error::ClientError;
