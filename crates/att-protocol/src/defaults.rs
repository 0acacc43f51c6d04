//! Values shared by the channel and its clients

/// Attenuation in dB used for all NxN paths until changed
pub const DEFAULT_ATTENUATION: f64 = 60.0;

/// Lowest configurable default attenuation in dB
pub const MIN_ATTENUATION: f64 = -100.0;

/// Highest configurable default attenuation in dB
pub const MAX_ATTENUATION: f64 = 100.0;

/// Name of the command pipe inside the simulation's communication folder
pub const DEFAULT_PIPE_NAME: &str = "dynamic_att.dtc";

/// ISI SNR limit reported for every query; no multipath is modeled
pub const ISI_SNR_MARGIN: f64 = 100.0;
