//! Snapshot value types.
//!
//! A [`ProcessSnapshot`] is one immutable capture of a process's counters.
//! Cumulative fields only grow while the same process is alive; a decrease
//! between two snapshots of one pid means the pid was reused.

use chrono::{DateTime, Utc};
use serde::Serialize;

use crate::error::CompositeError;

/// Cumulative CPU and scheduling counters.
///
/// Source: `/proc/[pid]/stat`, `/proc/[pid]/status`
#[derive(Clone, Serialize, Debug, PartialEq, Default)]
pub struct ProcessCounts {
    /// Time spent in user mode (seconds).
    /// Source: `/proc/[pid]/stat` field 14 (utime) / tick rate
    pub cpu_user: f64,

    /// Time spent in kernel mode (seconds).
    /// Source: `/proc/[pid]/stat` field 15 (stime) / tick rate
    pub cpu_system: f64,

    /// User time of waited-for children (seconds).
    /// Source: `/proc/[pid]/stat` field 16 (cutime) / tick rate
    pub cpu_children_user: f64,

    /// Kernel time of waited-for children (seconds).
    /// Source: `/proc/[pid]/stat` field 17 (cstime) / tick rate
    pub cpu_children_system: f64,

    /// Source: `/proc/[pid]/stat` field 12 (majflt)
    pub major_page_faults: u64,

    /// Source: `/proc/[pid]/stat` field 10 (minflt)
    pub minor_page_faults: u64,

    /// Source: `/proc/[pid]/status` (voluntary_ctxt_switches)
    pub ctx_switch_voluntary: u64,

    /// Source: `/proc/[pid]/status` (nonvoluntary_ctxt_switches)
    pub ctx_switch_involuntary: u64,
}

/// Cumulative block and network I/O in bytes.
#[derive(Clone, Serialize, Debug, PartialEq, Default)]
pub struct ProcessIo {
    /// Source: `/proc/[pid]/io` (read_bytes)
    pub read_bytes: u64,

    /// Source: `/proc/[pid]/io` (write_bytes)
    pub write_bytes: u64,

    /// Received bytes summed over every interface in the process's namespace.
    /// Source: `/proc/[pid]/net/dev`
    pub net_read_bytes: u64,

    /// Transmitted bytes summed over every interface in the process's namespace.
    /// Source: `/proc/[pid]/net/dev`
    pub net_write_bytes: u64,
}

/// File descriptor usage and soft limit.
#[derive(Clone, Serialize, Debug, PartialEq)]
pub struct FileDescriptors {
    /// Open descriptors, `-1` if the fd directory could not be listed.
    pub open: i64,

    /// Soft limit; `u64::MAX` when unlimited.
    /// Source: `/proc/[pid]/limits` (Max open files)
    pub limit: u64,
}

impl Default for FileDescriptors {
    fn default() -> Self {
        Self { open: -1, limit: 0 }
    }
}

/// Memory usage in bytes.
#[derive(Clone, Serialize, Debug, PartialEq, Default)]
pub struct ProcessMemory {
    /// Source: `/proc/[pid]/stat` field 24 (rss) * page size
    pub resident_bytes: u64,

    /// Source: `/proc/[pid]/stat` field 23 (vsize)
    pub virtual_bytes: u64,

    /// Source: `/proc/[pid]/status` (VmSwap) * 1024
    pub swap_bytes: u64,
}

/// CPU seconds used for utilization deltas.
#[derive(Clone, Serialize, Debug, PartialEq, Default)]
pub struct CpuUsage {
    /// The process's own cumulative CPU seconds (user + system + children).
    pub proc_cpu: f64,

    /// System-wide cumulative CPU seconds observed at the same instant.
    pub system_total: f64,
}

/// One capture of a process's counters.
#[derive(Clone, Serialize, Debug, PartialEq)]
pub struct ProcessSnapshot {
    pub pid: u32,
    pub parent_pid: u32,
    /// Short name (comm), truncated by the kernel to 15 bytes.
    pub name: String,
    /// Empty for kernel threads, zombies, or when unreadable.
    pub command_line: Vec<String>,
    pub num_threads: u32,
    /// Unset when boot time or the stat record is unavailable.
    pub start_time: Option<DateTime<Utc>>,
    /// Run-state code (R, S, D, Z, ...). `'?'` when stat was unreadable.
    pub state: char,
    pub counts: ProcessCounts,
    pub io: ProcessIo,
    pub file_descriptors: FileDescriptors,
    pub memory: ProcessMemory,
    pub cpu_usage: CpuUsage,
    /// Sub-reads that failed while assembling this snapshot.
    pub assembly_error: Option<CompositeError>,
}

impl ProcessSnapshot {
    /// An all-zero snapshot for `pid`, the starting point for assembly.
    pub fn empty(pid: u32) -> Self {
        Self {
            pid,
            parent_pid: 0,
            name: String::new(),
            command_line: Vec::new(),
            num_threads: 0,
            start_time: None,
            state: '?',
            counts: ProcessCounts::default(),
            io: ProcessIo::default(),
            file_descriptors: FileDescriptors::default(),
            memory: ProcessMemory::default(),
            cpu_usage: CpuUsage::default(),
            assembly_error: None,
        }
    }

    /// Whether every sub-read succeeded.
    pub fn is_complete(&self) -> bool {
        self.assembly_error.is_none()
    }
}

/// System-wide CPU totals at one instant.
///
/// Source: `/proc/stat`
#[derive(Clone, Serialize, Debug, PartialEq, Default)]
pub struct SystemCpuSample {
    /// user + nice + system + idle + iowait + irq + softirq + guest, in seconds.
    /// Steal and guest_nice are excluded.
    pub total_seconds: f64,

    /// Boot time, seconds since epoch (`btime`), 0 if absent.
    pub boot_time: u64,

    /// Logical CPUs listed in `/proc/stat` (`cpuN` lines).
    pub processors: usize,
}
