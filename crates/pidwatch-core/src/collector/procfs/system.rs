//! System collector for the normalization baseline: aggregate CPU time,
//! boot time and processor count.

use std::path::Path;
use std::sync::OnceLock;

use tracing::debug;

use crate::collector::procfs::parser::{parse_cpuinfo, parse_global_stat};
use crate::collector::traits::FileSystem;
use crate::error::CollectError;
use crate::model::SystemCpuSample;

/// Clock ticks per second (USER_HZ). Standard value for Linux.
pub const DEFAULT_TICK_RATE: u64 = 100;

/// Collects system-wide CPU statistics from `/proc/`.
pub struct SystemCollector<F: FileSystem> {
    fs: F,
    proc_path: String,
    tick_rate: u64,
    processors: OnceLock<usize>,
}

impl<F: FileSystem> SystemCollector<F> {
    /// Creates a new system collector.
    ///
    /// # Arguments
    /// * `fs` - Filesystem implementation (real or mock)
    /// * `proc_path` - Base path to proc filesystem (usually "/proc")
    pub fn new(fs: F, proc_path: impl Into<String>) -> Self {
        Self {
            fs,
            proc_path: proc_path.into(),
            tick_rate: DEFAULT_TICK_RATE,
            processors: OnceLock::new(),
        }
    }

    /// Sets the tick rate used to convert `/proc/stat` ticks to seconds.
    pub fn with_tick_rate(mut self, tick_rate: u64) -> Self {
        self.tick_rate = tick_rate.max(1);
        self
    }

    pub fn fs(&self) -> &F {
        &self.fs
    }

    pub fn fs_mut(&mut self) -> &mut F {
        &mut self.fs
    }

    pub fn proc_path(&self) -> &str {
        &self.proc_path
    }

    pub fn tick_rate(&self) -> u64 {
        self.tick_rate
    }

    /// Takes a fresh sample of `/proc/stat`.
    ///
    /// Any failure here is fatal for the caller: without the aggregate CPU
    /// total there is no baseline to normalize against.
    pub fn sample_cpu(&self) -> Result<SystemCpuSample, CollectError> {
        let path = format!("{}/stat", self.proc_path);
        let content = self
            .fs
            .read_to_string(Path::new(&path))
            .map_err(|e| CollectError::SystemStat(format!("{}: {}", path, e)))?;
        let stat = parse_global_stat(&content).map_err(|e| CollectError::SystemStat(e.message))?;

        let total = stat
            .total()
            .ok_or_else(|| CollectError::SystemStat("missing aggregate cpu line".to_string()))?;

        let ticks = total.user
            + total.nice
            + total.system
            + total.idle
            + total.iowait
            + total.irq
            + total.softirq
            + total.guest;

        Ok(SystemCpuSample {
            total_seconds: ticks as f64 / self.tick_rate as f64,
            boot_time: stat.btime,
            processors: stat.cpu_count(),
        })
    }

    /// Returns the number of logical processors.
    ///
    /// Counts `processor` entries in `/proc/cpuinfo`, falling back to the
    /// `cpuN` lines of `/proc/stat`. The first successful answer is cached.
    pub fn processor_count(&self) -> Result<usize, CollectError> {
        if let Some(count) = self.processors.get() {
            return Ok(*count);
        }

        let path = format!("{}/cpuinfo", self.proc_path);
        let from_cpuinfo = match self.fs.read_to_string(Path::new(&path)) {
            Ok(content) => parse_cpuinfo(&content),
            Err(e) => {
                debug!("{} unreadable, falling back to /proc/stat: {}", path, e);
                0
            }
        };

        let count = if from_cpuinfo > 0 {
            from_cpuinfo
        } else {
            self.sample_cpu()?.processors
        };

        if count == 0 {
            return Err(CollectError::SystemStat("no processors listed".to_string()));
        }

        let _ = self.processors.set(count);
        Ok(count)
    }
}
