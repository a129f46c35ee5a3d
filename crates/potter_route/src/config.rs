//! Router parameters.
//!
//! Everything tunable about the engine lives in [`RouterConfig`]: cost-model
//! weights, the initial congestion factors, the bounding-box margins (which
//! are hardware-family specific), the iteration cap, and the parallel
//! scheduling mode. A config can be loaded from a TOML file; missing fields
//! keep their defaults.

use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};

/// Tunable parameters of the routing engine.
#[derive(Clone, Debug, Serialize, Deserialize)]
#[serde(default)]
pub struct RouterConfig {
    /// Number of worker threads.
    pub num_threads: usize,
    /// Use the runtime-first (region-partitioned, atomic) scheduler instead
    /// of the stable-first (batch-synchronized) one.
    pub runtime_first: bool,
    /// Hard cap on rip-up-and-reroute iterations.
    pub max_iterations: u32,

    /// Bounding-box widening margin along x.
    pub x_margin: i32,
    /// Bounding-box widening margin along y.
    pub y_margin: i32,

    /// Initial present-congestion factor.
    pub present_factor: f32,
    /// Multiplier applied to the present factor each iteration.
    pub present_multiplier: f32,
    /// Cap on the present-congestion factor.
    pub max_present_factor: f32,
    /// Historical-congestion increment per unit of overuse.
    pub historical_factor: f32,

    /// Weight of the congestion node cost in the partial path cost.
    pub rnode_cost_weight: f64,
    /// Weight of a node's user count in the sharing factor.
    pub sharing_weight: f64,
    /// Weight of a node's wirelength in the partial path cost.
    pub rnode_wl_weight: f64,
    /// Weight of the remaining-distance estimate.
    pub est_wl_weight: f64,
}

impl Default for RouterConfig {
    fn default() -> Self {
        Self {
            num_threads: 32,
            runtime_first: false,
            max_iterations: 500,
            x_margin: 3,
            y_margin: 15,
            present_factor: 0.5,
            present_multiplier: 2.0,
            max_present_factor: 1e6,
            historical_factor: 1.0,
            rnode_cost_weight: 1.0,
            sharing_weight: 1.0,
            rnode_wl_weight: 0.2,
            est_wl_weight: 0.8,
        }
    }
}

/// Errors loading a router config file.
#[derive(Debug, thiserror::Error)]
pub enum ConfigError {
    /// The file could not be read.
    #[error("config i/o failed for {path}: {source}")]
    Io {
        /// Path of the config file.
        path: PathBuf,
        /// Underlying I/O error.
        #[source]
        source: std::io::Error,
    },
    /// The file is not valid TOML for a [`RouterConfig`].
    #[error("config file {path} is invalid: {reason}")]
    Invalid {
        /// Path of the config file.
        path: PathBuf,
        /// Parser failure description.
        reason: String,
    },
}

impl RouterConfig {
    /// Loads a config from a TOML file, defaulting unspecified fields.
    pub fn load(path: &Path) -> Result<Self, ConfigError> {
        let text = std::fs::read_to_string(path).map_err(|source| ConfigError::Io {
            path: path.to_path_buf(),
            source,
        })?;
        toml::from_str(&text).map_err(|e| ConfigError::Invalid {
            path: path.to_path_buf(),
            reason: e.to_string(),
        })
    }
}
