//! Monitor configuration.
//!
//! Loaded from TOML; every field has a default so a file only needs the
//! values it changes:
//!
//! ```toml
//! pids = [1, 1234]
//! interval_secs = 5
//! proc_path = "/host/proc"
//! ```

use std::path::{Path, PathBuf};
use std::time::Duration;

use serde::Deserialize;

use crate::collector::procfs::{DEFAULT_PAGE_SIZE, DEFAULT_TICK_RATE};
use crate::error::ConfigError;

#[derive(Debug, Clone, PartialEq, Deserialize)]
#[serde(default)]
pub struct MonitorConfig {
    /// Process identifiers to watch.
    pub pids: Vec<u32>,
    /// Sampling interval in seconds.
    pub interval_secs: u64,
    /// Clock ticks per second used by the kernel's time counters (USER_HZ).
    pub tick_rate: u64,
    /// Memory page size in bytes.
    pub page_size: u64,
    /// Mount point of the proc filesystem.
    pub proc_path: PathBuf,
    /// Upper bound on concurrent per-pid assemblies in one tick; 1 is sequential.
    pub workers: usize,
}

impl Default for MonitorConfig {
    fn default() -> Self {
        MonitorConfig {
            pids: Vec::new(),
            interval_secs: 2,
            tick_rate: DEFAULT_TICK_RATE,
            page_size: DEFAULT_PAGE_SIZE,
            proc_path: PathBuf::from("/proc"),
            workers: 1,
        }
    }
}

impl MonitorConfig {
    /// Reads and parses a TOML config file. Does not validate.
    pub fn from_path(path: &Path) -> Result<Self, ConfigError> {
        let content = std::fs::read_to_string(path).map_err(|source| ConfigError::Read {
            path: path.display().to_string(),
            source,
        })?;
        toml::from_str(&content).map_err(|source| ConfigError::Parse {
            path: path.display().to_string(),
            source,
        })
    }

    pub fn interval(&self) -> Duration {
        Duration::from_secs(self.interval_secs)
    }

    pub fn validate(&self) -> Result<(), ConfigError> {
        if self.pids.is_empty() {
            return Err(ConfigError::NoPids);
        }
        if self.interval_secs == 0 {
            return Err(ConfigError::Zero("interval_secs"));
        }
        if self.tick_rate == 0 {
            return Err(ConfigError::Zero("tick_rate"));
        }
        if self.page_size == 0 {
            return Err(ConfigError::Zero("page_size"));
        }
        if self.workers == 0 {
            return Err(ConfigError::Zero("workers"));
        }
        Ok(())
    }
}
