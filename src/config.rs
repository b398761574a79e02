//! Runtime configuration, loaded from a TOML file.
//!
//! Mirrors the shape of the pack's `evo_common::config` module: a
//! plain `serde`-derived struct with a typed load error, rather than
//! hand-rolled `env::var` lookups.

use std::path::Path;

use serde::{Deserialize, Serialize};
use thiserror::Error;

/// Tunables for the path finder, reservation engine and train
/// controller that the distilled spec leaves to the implementer
/// ("Settings", §4.2; leading/trailing defaults, §3).
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
#[serde(deny_unknown_fields, default)]
pub struct RuntimeConfig {
    /// Path finder overflow limit (§4.2 "overflow limit").
    pub path_finder_overflow_limit: usize,
    /// Number of randomized samples drawn when multi-sample-shortest
    /// applies (§4.2 "Multi-sample shortest").
    pub path_finder_samples: usize,
    /// Default number of leading blocks reserved ahead of a train when
    /// a train does not specify its own `maxLeadingReservedBlocks`.
    pub default_leading_reserved_blocks: usize,
    /// Default number of trailing steps kept reserved for train length
    /// when a train does not specify its own `trailingReservedSteps`.
    pub default_trailing_reserved_steps: usize,
    /// Fallback station waiting time (seconds) used when neither the
    /// route step nor the block declare one (§9 open question).
    pub default_station_wait_secs: u64,
    /// Default running speed (km/h) commanded by the `Start` handler.
    pub default_running_speed_kph: u16,
    /// Braking speed (km/h) commanded once the brake feedback fires.
    pub default_braking_speed_kph: u16,
    /// Whether to re-assert locomotive functions (f0..fN) after a
    /// restart (§9 open question; optional enhancement).
    pub reassert_functions_on_restart: bool,
    /// Size in bytes of one control-bus frame (§6).
    pub bus_frame_size: usize,
}

impl Default for RuntimeConfig {
    fn default() -> Self {
        RuntimeConfig {
            path_finder_overflow_limit: 256,
            path_finder_samples: 10,
            default_leading_reserved_blocks: 2,
            default_trailing_reserved_steps: 1,
            default_station_wait_secs: 10,
            default_running_speed_kph: 60,
            default_braking_speed_kph: 20,
            reassert_functions_on_restart: false,
            bus_frame_size: 13,
        }
    }
}

#[derive(Debug, Error)]
pub enum ConfigError {
    #[error("failed to read configuration file: {0}")]
    Io(#[from] std::io::Error),
    #[error("failed to parse configuration: {0}")]
    Parse(#[from] toml::de::Error),
}

impl RuntimeConfig {
    /// Loads a [`RuntimeConfig`] from a TOML file, falling back to
    /// built-in defaults for any field the file omits.
    pub fn load(path: &Path) -> Result<Self, ConfigError> {
        let text = std::fs::read_to_string(path)?;
        Ok(toml::from_str(&text)?)
    }
}
