//! Runtime configuration.
//!
//! Settings come from an optional JSON file; any field left out keeps its
//! default:
//!
//! ```json
//! { "slow_period_ms": 250, "fast_period_ms": 0, "max_cycles": 100000 }
//! ```

use std::path::Path;
use std::time::Duration;

use serde::{Serialize, Deserialize};
use thiserror::Error;

use crate::cpu::Cadence;

/// Emulator settings.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default, deny_unknown_fields)]
pub struct Config {
    /// Milliseconds between cycles when running slowly.
    pub slow_period_ms: u64,
    /// Milliseconds between cycles when running fast (0 = only yield).
    pub fast_period_ms: u64,
    /// Cycle limit for batch runs.
    pub max_cycles: u64,
}

impl Default for Config {
    fn default() -> Self {
        Self {
            slow_period_ms: 250,
            fast_period_ms: 0,
            max_cycles: 100_000,
        }
    }
}

impl Config {
    /// Parse a JSON config document.
    pub fn from_json(text: &str) -> Result<Self, ConfigError> {
        Ok(serde_json::from_str(text)?)
    }

    /// Read a JSON config file.
    pub fn load<P: AsRef<Path>>(path: P) -> Result<Self, ConfigError> {
        let text = std::fs::read_to_string(path.as_ref())?;
        Self::from_json(&text)
    }

    /// Run cadence described by this config.
    pub fn cadence(&self) -> Cadence {
        Cadence {
            slow: Duration::from_millis(self.slow_period_ms),
            fast: Duration::from_millis(self.fast_period_ms),
        }
    }
}

/// Errors that can occur while loading configuration.
#[derive(Debug, Error)]
pub enum ConfigError {
    #[error("cannot read config: {0}")]
    Io(#[from] std::io::Error),

    #[error("invalid config: {0}")]
    Parse(#[from] serde_json::Error),
}
