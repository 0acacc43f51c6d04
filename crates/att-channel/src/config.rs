//! Channel configuration

use std::path::{Path, PathBuf};

use att_protocol::defaults::{
    DEFAULT_ATTENUATION, DEFAULT_PIPE_NAME, MAX_ATTENUATION, MIN_ATTENUATION,
};
use serde::{Deserialize, Serialize};

use crate::error::ConfigError;
use crate::transport::pipe_path;

/// How a SET_ATT_ONE command is written into the matrix
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum PairUpdate {
    /// Both directions take the Tx attenuation
    #[default]
    Symmetric,
    /// Device-to-peer takes Tx, peer-to-device takes Rx
    Directional,
}

impl PairUpdate {
    /// Get human-readable name
    pub fn name(&self) -> &'static str {
        match self {
            Self::Symmetric => "Symmetric",
            Self::Directional => "Directional",
        }
    }
}

/// Configuration consumed when the channel is initialized
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ChannelConfig {
    /// Simulation id; selects the communication folder
    pub sim_id: String,
    /// Initial attenuation in dB, used in all NxN paths until changed
    #[serde(default = "default_attenuation")]
    pub default_attenuation: f64,
    /// Name of the command pipe
    #[serde(default = "default_pipe_name")]
    pub pipe_name: String,
    /// Root of the simulation communication folders
    #[serde(default)]
    pub com_root: Option<PathBuf>,
    /// SET_ATT_ONE semantics
    #[serde(default)]
    pub pair_update: PairUpdate,
}

fn default_attenuation() -> f64 {
    DEFAULT_ATTENUATION
}

fn default_pipe_name() -> String {
    DEFAULT_PIPE_NAME.to_string()
}

/// Communication root shared by all processes of a simulation
///
/// Matches the simulator's convention of `<tmp>/bs_<user>`.
pub fn default_com_root() -> PathBuf {
    let user = std::env::var("USER").unwrap_or_else(|_| "unknown".to_string());
    std::env::temp_dir().join(format!("bs_{}", user))
}

impl ChannelConfig {
    /// Create a configuration with defaults for everything but the sim id
    pub fn new(sim_id: impl Into<String>) -> Self {
        Self {
            sim_id: sim_id.into(),
            default_attenuation: DEFAULT_ATTENUATION,
            pipe_name: default_pipe_name(),
            com_root: None,
            pair_update: PairUpdate::default(),
        }
    }

    /// Set the default attenuation
    pub fn with_default_attenuation(mut self, attenuation: f64) -> Self {
        self.default_attenuation = attenuation;
        self
    }

    /// Set the command pipe name
    pub fn with_pipe_name(mut self, name: impl Into<String>) -> Self {
        self.pipe_name = name.into();
        self
    }

    /// Set the communication root
    pub fn with_com_root(mut self, root: impl Into<PathBuf>) -> Self {
        self.com_root = Some(root.into());
        self
    }

    /// Set the SET_ATT_ONE semantics
    pub fn with_pair_update(mut self, mode: PairUpdate) -> Self {
        self.pair_update = mode;
        self
    }

    /// Check every field against its legal range
    pub fn validate(&self) -> Result<(), ConfigError> {
        if self.sim_id.trim().is_empty() {
            return Err(ConfigError::MissingSimId);
        }

        if !(MIN_ATTENUATION..=MAX_ATTENUATION).contains(&self.default_attenuation) {
            return Err(ConfigError::AttenuationOutOfRange {
                value: self.default_attenuation,
                min: MIN_ATTENUATION,
                max: MAX_ATTENUATION,
            });
        }

        if self.pipe_name.is_empty() || self.pipe_name.contains('/') {
            return Err(ConfigError::InvalidPipeName(self.pipe_name.clone()));
        }

        Ok(())
    }

    /// Communication root, falling back to [`default_com_root`]
    pub fn com_root(&self) -> PathBuf {
        self.com_root.clone().unwrap_or_else(default_com_root)
    }

    /// Full path of the command pipe
    pub fn pipe_path(&self) -> PathBuf {
        pipe_path(&self.com_root(), &self.sim_id, &self.pipe_name)
    }

    /// Load a configuration from a JSON file
    ///
    /// The result is not validated; callers go through [`Self::validate`]
    /// when the channel is created.
    pub fn load(path: &Path) -> Result<Self, ConfigError> {
        let text = std::fs::read_to_string(path).map_err(|source| ConfigError::Read {
            path: path.to_path_buf(),
            source,
        })?;
        serde_json::from_str(&text).map_err(|source| ConfigError::Parse {
            path: path.to_path_buf(),
            source,
        })
    }
}
