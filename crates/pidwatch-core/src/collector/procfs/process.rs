//! Process collector assembling one [`ProcessSnapshot`] from `/proc/[pid]/`.
//!
//! Every per-process fact is read independently. A failed read leaves its
//! fields zeroed and is recorded in the snapshot's `assembly_error`; only an
//! unresolvable pid or an unreadable `/proc/stat` fails the whole call.

use std::fmt;
use std::path::{Path, PathBuf};

use chrono::{DateTime, TimeDelta, Utc};
use tracing::{debug, trace};

use crate::collector::procfs::parser::{
    ParseError, ProcStat, parse_cmdline, parse_net_dev, parse_proc_io, parse_proc_limits,
    parse_proc_stat, parse_proc_status,
};
use crate::collector::procfs::system::SystemCollector;
use crate::collector::traits::FileSystem;
use crate::error::{CollectError, ErrorAggregator};
use crate::model::{CpuUsage, ProcessSnapshot};

/// Default memory page size in bytes.
pub const DEFAULT_PAGE_SIZE: u64 = 4096;

/// Per-process facts read during assembly, in reading order.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Fact {
    Stat,
    Cmdline,
    Status,
    Io,
    Limits,
    NetDev,
    Fd,
}

impl Fact {
    /// Label used in composite errors.
    pub fn as_str(self) -> &'static str {
        match self {
            Fact::Stat => "stat",
            Fact::Cmdline => "cmdline",
            Fact::Status => "status",
            Fact::Io => "io",
            Fact::Limits => "limits",
            Fact::NetDev => "net_dev",
            Fact::Fd => "fd",
        }
    }
}

impl fmt::Display for Fact {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Collects per-process snapshots.
///
/// Owns the [`SystemCollector`] used for the CPU baseline, so both always
/// read the same `/proc` mount.
pub struct ProcessCollector<F: FileSystem> {
    system: SystemCollector<F>,
    page_size: u64,
}

impl<F: FileSystem> ProcessCollector<F> {
    /// Creates a new process collector.
    ///
    /// # Arguments
    /// * `fs` - Filesystem implementation (real or mock)
    /// * `proc_path` - Base path to proc filesystem (usually "/proc")
    pub fn new(fs: F, proc_path: impl Into<String>) -> Self {
        Self {
            system: SystemCollector::new(fs, proc_path),
            page_size: DEFAULT_PAGE_SIZE,
        }
    }

    /// Sets the tick rate used to convert CPU ticks to seconds.
    pub fn with_tick_rate(mut self, tick_rate: u64) -> Self {
        self.system = self.system.with_tick_rate(tick_rate);
        self
    }

    /// Sets the page size used to convert RSS pages to bytes.
    pub fn with_page_size(mut self, page_size: u64) -> Self {
        self.page_size = page_size.max(1);
        self
    }

    pub fn system(&self) -> &SystemCollector<F> {
        &self.system
    }

    pub fn fs_mut(&mut self) -> &mut F {
        self.system.fs_mut()
    }

    fn fs(&self) -> &F {
        self.system.fs()
    }

    fn tick_rate(&self) -> u64 {
        self.system.tick_rate()
    }

    fn ticks_to_seconds(&self, ticks: u64) -> f64 {
        ticks as f64 / self.tick_rate() as f64
    }

    /// Calculates process start time.
    ///
    /// Formula: boot_time + (starttime_ticks / tick_rate)
    ///
    /// Returns `None` if boot_time is unknown.
    fn calculate_start_time(&self, boot_time: u64, starttime_ticks: u64) -> Option<DateTime<Utc>> {
        if boot_time == 0 {
            return None;
        }
        let boot = DateTime::from_timestamp(i64::try_from(boot_time).ok()?, 0)?;
        let offset_ms = u128::from(starttime_ticks) * 1000 / u128::from(self.tick_rate());
        let offset = TimeDelta::try_milliseconds(i64::try_from(offset_ms).ok()?)?;
        boot.checked_add_signed(offset)
    }

    fn read_fact<T>(
        &self,
        dir: &Path,
        file: &str,
        parse: impl FnOnce(&str) -> Result<T, ParseError>,
    ) -> Result<T, CollectError> {
        let content = self.fs().read_to_string(&dir.join(file))?;
        parse(&content).map_err(|e| CollectError::Parse(e.message))
    }

    /// Assembles a snapshot of a single process.
    ///
    /// Returns `ProcessNotFound` if `/proc/[pid]` does not exist and
    /// `SystemStat` if the CPU baseline cannot be sampled. Any other read
    /// failure is recorded in `assembly_error` and the snapshot is returned
    /// with the affected fields left at zero.
    pub fn collect_process(&self, pid: u32) -> Result<ProcessSnapshot, CollectError> {
        let proc_dir = PathBuf::from(format!("{}/{}", self.system.proc_path(), pid));
        if !self.fs().exists(&proc_dir) {
            return Err(CollectError::ProcessNotFound(pid));
        }

        let system = self.system.sample_cpu()?;

        let mut errors = ErrorAggregator::new();
        let mut record = |fact: Fact, err: CollectError| {
            debug!(pid, fact = fact.as_str(), "read failed: {}", err);
            errors.record(fact.as_str(), err);
        };

        let mut snapshot = ProcessSnapshot::empty(pid);

        // Read /proc/[pid]/stat
        match self.read_fact(&proc_dir, "stat", parse_proc_stat) {
            Ok(stat) => {
                self.apply_stat(&mut snapshot, &stat);
                snapshot.start_time = self.calculate_start_time(system.boot_time, stat.starttime);
            }
            Err(e) => record(Fact::Stat, e),
        }

        // Read /proc/[pid]/cmdline
        match self.read_fact(&proc_dir, "cmdline", |c| Ok(parse_cmdline(c))) {
            Ok(cmdline) => snapshot.command_line = cmdline,
            Err(e) => record(Fact::Cmdline, e),
        }

        // Read /proc/[pid]/status
        match self.read_fact(&proc_dir, "status", parse_proc_status) {
            Ok(status) => {
                snapshot.counts.ctx_switch_voluntary = status.voluntary_ctxt_switches;
                snapshot.counts.ctx_switch_involuntary = status.nonvoluntary_ctxt_switches;
                snapshot.memory.swap_bytes = status.vm_swap * 1024;
            }
            Err(e) => record(Fact::Status, e),
        }

        // Read /proc/[pid]/io (needs ptrace access for other users' processes)
        match self.read_fact(&proc_dir, "io", parse_proc_io) {
            Ok(io) => {
                snapshot.io.read_bytes = io.read_bytes;
                snapshot.io.write_bytes = io.write_bytes;
            }
            Err(e) => record(Fact::Io, e),
        }

        // Read /proc/[pid]/limits
        match self.read_fact(&proc_dir, "limits", parse_proc_limits) {
            Ok(limits) => snapshot.file_descriptors.limit = limits.open_files_soft,
            Err(e) => record(Fact::Limits, e),
        }

        // Read /proc/[pid]/net/dev, summed over all interfaces
        match self.read_fact(&proc_dir, "net/dev", parse_net_dev) {
            Ok(devices) => {
                snapshot.io.net_read_bytes = devices.iter().map(|d| d.rx_bytes).sum();
                snapshot.io.net_write_bytes = devices.iter().map(|d| d.tx_bytes).sum();
            }
            Err(e) => record(Fact::NetDev, e),
        }

        // Count /proc/[pid]/fd entries
        match self.fs().read_dir(&proc_dir.join("fd")) {
            Ok(entries) => snapshot.file_descriptors.open = entries.len() as i64,
            Err(e) => record(Fact::Fd, e.into()),
        }

        let counts = &snapshot.counts;
        snapshot.cpu_usage = CpuUsage {
            proc_cpu: counts.cpu_user
                + counts.cpu_system
                + counts.cpu_children_user
                + counts.cpu_children_system,
            system_total: system.total_seconds,
        };

        snapshot.assembly_error = errors.result();
        if snapshot.assembly_error.is_none() {
            trace!(pid, name = %snapshot.name, "snapshot assembled");
        }

        Ok(snapshot)
    }

    fn apply_stat(&self, snapshot: &mut ProcessSnapshot, stat: &ProcStat) {
        snapshot.parent_pid = stat.ppid;
        snapshot.name = stat.comm.clone();
        snapshot.state = stat.state;
        snapshot.num_threads = stat.num_threads.max(0) as u32;

        snapshot.counts.cpu_user = self.ticks_to_seconds(stat.utime);
        snapshot.counts.cpu_system = self.ticks_to_seconds(stat.stime);
        // Children times are signed in the kernel ABI
        snapshot.counts.cpu_children_user = self.ticks_to_seconds(stat.cutime.max(0) as u64);
        snapshot.counts.cpu_children_system = self.ticks_to_seconds(stat.cstime.max(0) as u64);
        snapshot.counts.major_page_faults = stat.majflt;
        snapshot.counts.minor_page_faults = stat.minflt;

        snapshot.memory.resident_bytes = (stat.rss.max(0) as u64) * self.page_size;
        snapshot.memory.virtual_bytes = stat.vsize;
    }
}
