//! Delta computation between two snapshots of the same process.
//!
//! Every function here returns `None` when the result is undefined: a
//! zero-length sampling interval, a counter regression (pid reuse), or
//! snapshots of different processes. `None` is not an error.

use serde::Serialize;

use crate::collector::procfs::Fact;
use crate::model::ProcessSnapshot;

/// Compute u64 delta, returning `None` on counter regression.
pub fn counter_delta(curr: u64, prev: u64) -> Option<u64> {
    curr.checked_sub(prev)
}

/// Compute f64 delta, returning `None` on counter regression.
pub fn seconds_delta(curr: f64, prev: f64) -> Option<f64> {
    (curr >= prev).then_some(curr - prev)
}

/// Whether `current` can be a later observation of the process in `previous`.
///
/// A different start time means the pid was handed to a new process.
fn same_process(current: &ProcessSnapshot, previous: &ProcessSnapshot) -> bool {
    if current.pid != previous.pid {
        return false;
    }
    match (current.start_time, previous.start_time) {
        (Some(a), Some(b)) => a == b,
        _ => true,
    }
}

/// Whether `fact` was read successfully in both snapshots.
///
/// A failed read leaves its counters at zero, so a delta across it would
/// count the whole cumulative value as growth.
fn fact_readable(current: &ProcessSnapshot, previous: &ProcessSnapshot, fact: Fact) -> bool {
    [current, previous].iter().all(|snap| {
        snap.assembly_error
            .as_ref()
            .is_none_or(|err| !err.mentions(fact.as_str()))
    })
}

/// CPU utilization of the process between two snapshots.
///
/// `(proc_delta / total_delta) * processor_count`, where `1.0` means one
/// logical CPU fully busy. The system total covers all CPUs, so the ratio
/// alone is a share of the whole machine.
///
/// Returns `None` if the snapshots belong to different processes, if the
/// stat record failed in either of them, if `total_delta <= 0`, or if
/// `proc_delta < 0`.
pub fn compute_usage(
    current: &ProcessSnapshot,
    previous: &ProcessSnapshot,
    processor_count: usize,
) -> Option<f64> {
    if !same_process(current, previous) || !fact_readable(current, previous, Fact::Stat) {
        return None;
    }

    let proc_delta = seconds_delta(current.cpu_usage.proc_cpu, previous.cpu_usage.proc_cpu)?;
    let total_delta = current.cpu_usage.system_total - previous.cpu_usage.system_total;
    if total_delta <= 0.0 {
        return None;
    }

    Some(proc_delta / total_delta * processor_count as f64)
}

/// Growth of the cumulative counters between two snapshots.
///
/// A counter is `None` when it went backwards or its source failed in
/// either snapshot.
#[derive(Debug, Clone, PartialEq, Default, Serialize)]
pub struct ProcessDelta {
    pub cpu_seconds: Option<f64>,
    pub read_bytes: Option<u64>,
    pub write_bytes: Option<u64>,
    pub net_read_bytes: Option<u64>,
    pub net_write_bytes: Option<u64>,
    pub major_page_faults: Option<u64>,
    pub minor_page_faults: Option<u64>,
    pub ctx_switch_voluntary: Option<u64>,
    pub ctx_switch_involuntary: Option<u64>,
}

impl ProcessDelta {
    /// Computes every counter delta, or `None` if the snapshots belong to
    /// different processes.
    pub fn between(current: &ProcessSnapshot, previous: &ProcessSnapshot) -> Option<Self> {
        if !same_process(current, previous) {
            return None;
        }

        let readable = |fact| fact_readable(current, previous, fact);
        let (stat, status, io, net) = (
            readable(Fact::Stat),
            readable(Fact::Status),
            readable(Fact::Io),
            readable(Fact::NetDev),
        );

        let (c, p) = (&current.counts, &previous.counts);
        let (ci, pi) = (&current.io, &previous.io);
        let counter = |ok: bool, curr: u64, prev: u64| {
            if ok { counter_delta(curr, prev) } else { None }
        };

        Some(Self {
            cpu_seconds: stat
                .then(|| seconds_delta(current.cpu_usage.proc_cpu, previous.cpu_usage.proc_cpu))
                .flatten(),
            read_bytes: counter(io, ci.read_bytes, pi.read_bytes),
            write_bytes: counter(io, ci.write_bytes, pi.write_bytes),
            net_read_bytes: counter(net, ci.net_read_bytes, pi.net_read_bytes),
            net_write_bytes: counter(net, ci.net_write_bytes, pi.net_write_bytes),
            major_page_faults: counter(stat, c.major_page_faults, p.major_page_faults),
            minor_page_faults: counter(stat, c.minor_page_faults, p.minor_page_faults),
            ctx_switch_voluntary: counter(status, c.ctx_switch_voluntary, p.ctx_switch_voluntary),
            ctx_switch_involuntary: counter(
                status,
                c.ctx_switch_involuntary,
                p.ctx_switch_involuntary,
            ),
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::error::ErrorAggregator;
    use chrono::DateTime;

    fn snap(pid: u32, proc_cpu: f64, system_total: f64) -> ProcessSnapshot {
        let mut s = ProcessSnapshot::empty(pid);
        s.cpu_usage.proc_cpu = proc_cpu;
        s.cpu_usage.system_total = system_total;
        s
    }

    fn approx(a: f64, b: f64) -> bool {
        (a - b).abs() < 1e-9
    }

    #[test]
    fn test_usage_basic() {
        let prev = snap(42, 10.0, 1000.0);
        let curr = snap(42, 10.5, 1010.0);

        let usage = compute_usage(&curr, &prev, 4).unwrap();
        assert!(approx(usage, 0.2), "got {}", usage);
    }

    #[test]
    fn test_usage_idle_process() {
        let prev = snap(42, 10.0, 1000.0);
        let curr = snap(42, 10.0, 1010.0);
        assert_eq!(compute_usage(&curr, &prev, 8), Some(0.0));
    }

    #[test]
    fn test_usage_saturating_all_cpus() {
        // Process consumed every CPU-second the system accounted for
        let prev = snap(42, 0.0, 0.0);
        let curr = snap(42, 40.0, 40.0);
        assert!(approx(compute_usage(&curr, &prev, 4).unwrap(), 4.0));
    }

    #[test]
    fn test_usage_zero_interval() {
        let prev = snap(42, 10.0, 1000.0);
        let curr = snap(42, 10.5, 1000.0);
        assert_eq!(compute_usage(&curr, &prev, 4), None);
    }

    #[test]
    fn test_usage_clock_skew() {
        let prev = snap(42, 10.0, 1000.0);
        let curr = snap(42, 10.5, 999.0);
        assert_eq!(compute_usage(&curr, &prev, 4), None);
    }

    #[test]
    fn test_usage_negative_proc_delta() {
        let prev = snap(42, 10.0, 1000.0);
        let curr = snap(42, 0.3, 1010.0);
        assert_eq!(compute_usage(&curr, &prev, 4), None);
    }

    #[test]
    fn test_usage_different_pids() {
        let prev = snap(42, 10.0, 1000.0);
        let curr = snap(43, 10.5, 1010.0);
        assert_eq!(compute_usage(&curr, &prev, 4), None);
    }

    #[test]
    fn test_usage_restarted_process() {
        let mut prev = snap(42, 10.0, 1000.0);
        let mut curr = snap(42, 10.5, 1010.0);
        prev.start_time = DateTime::from_timestamp(1_700_000_000, 0);
        curr.start_time = DateTime::from_timestamp(1_700_000_500, 0);
        assert_eq!(compute_usage(&curr, &prev, 4), None);

        // Unknown start time on one side does not block the delta
        curr.start_time = None;
        assert!(compute_usage(&curr, &prev, 4).is_some());
    }

    #[test]
    fn test_counter_delta() {
        assert_eq!(counter_delta(10, 4), Some(6));
        assert_eq!(counter_delta(4, 4), Some(0));
        assert_eq!(counter_delta(3, 4), None);
        assert_eq!(seconds_delta(1.5, 1.0), Some(0.5));
        assert_eq!(seconds_delta(0.5, 1.0), None);
    }

    #[test]
    fn test_process_delta() {
        let mut prev = snap(7, 1.0, 100.0);
        prev.io.read_bytes = 4096;
        prev.io.net_write_bytes = 100;
        prev.counts.minor_page_faults = 10;
        prev.counts.ctx_switch_voluntary = 5;

        let mut curr = snap(7, 1.25, 110.0);
        curr.io.read_bytes = 8192;
        curr.io.net_write_bytes = 150;
        curr.counts.minor_page_faults = 30;
        curr.counts.ctx_switch_voluntary = 5;

        let delta = ProcessDelta::between(&curr, &prev).unwrap();
        assert_eq!(delta.cpu_seconds, Some(0.25));
        assert_eq!(delta.read_bytes, Some(4096));
        assert_eq!(delta.net_write_bytes, Some(50));
        assert_eq!(delta.minor_page_faults, Some(20));
        assert_eq!(delta.ctx_switch_voluntary, Some(0));
    }

    #[test]
    fn test_process_delta_regression() {
        let mut prev = snap(7, 1.0, 100.0);
        prev.io.write_bytes = 1000;
        let curr = snap(7, 2.0, 110.0);

        let delta = ProcessDelta::between(&curr, &prev).unwrap();
        assert_eq!(delta.write_bytes, None);
        assert_eq!(delta.cpu_seconds, Some(1.0));
        assert_eq!(delta.read_bytes, Some(0));
    }

    #[test]
    fn test_process_delta_other_process() {
        let prev = snap(7, 1.0, 100.0);
        let curr = snap(8, 2.0, 110.0);
        assert!(ProcessDelta::between(&curr, &prev).is_none());
    }

    fn failed(mut s: ProcessSnapshot, labels: &[&str]) -> ProcessSnapshot {
        let mut errors = ErrorAggregator::new();
        for label in labels {
            errors.record(*label, "permission denied");
        }
        s.assembly_error = errors.result();
        s
    }

    #[test]
    fn test_usage_none_when_stat_failed() {
        // A failed stat read leaves proc_cpu at zero.
        let prev = snap(7, 10.0, 100.0);
        let curr = failed(snap(7, 0.0, 110.0), &["stat"]);
        assert_eq!(compute_usage(&curr, &prev, 4), None);

        // Recovery: the zeroed previous must not count all cumulative CPU.
        let next = snap(7, 10.5, 120.0);
        assert_eq!(compute_usage(&next, &curr, 4), None);

        // Other failed facts do not affect usage.
        let partial = failed(snap(7, 11.0, 130.0), &["io", "fd"]);
        assert!(compute_usage(&partial, &next, 1).is_some());
    }

    #[test]
    fn test_process_delta_skips_failed_sources() {
        let mut prev = snap(7, 1.0, 100.0);
        prev.io.read_bytes = 5000;
        prev.io.net_read_bytes = 700;
        prev.counts.minor_page_faults = 40;
        prev.counts.ctx_switch_voluntary = 3;

        // io and status failed, so their counters read as zero.
        let mut curr = failed(snap(7, 1.5, 110.0), &["io", "status"]);
        curr.io.net_read_bytes = 900;
        curr.counts.minor_page_faults = 45;

        let delta = ProcessDelta::between(&curr, &prev).unwrap();
        assert_eq!(delta.read_bytes, None);
        assert_eq!(delta.write_bytes, None);
        assert_eq!(delta.ctx_switch_voluntary, None);
        assert_eq!(delta.ctx_switch_involuntary, None);
        assert_eq!(delta.net_read_bytes, Some(200));
        assert_eq!(delta.minor_page_faults, Some(5));
        assert_eq!(delta.cpu_seconds, Some(0.5));

        // The failure on the previous side blocks the next delta too.
        let mut next = snap(7, 2.0, 120.0);
        next.io.read_bytes = 6000;
        next.io.net_read_bytes = 950;
        next.counts.minor_page_faults = 50;
        let delta = ProcessDelta::between(&next, &curr).unwrap();
        assert_eq!(delta.read_bytes, None);
        assert_eq!(delta.net_read_bytes, Some(50));

        let stat_failed = failed(snap(7, 0.0, 130.0), &["stat", "net_dev"]);
        let delta = ProcessDelta::between(&stat_failed, &next).unwrap();
        assert_eq!(delta.cpu_seconds, None);
        assert_eq!(delta.minor_page_faults, None);
        assert_eq!(delta.major_page_faults, None);
        assert_eq!(delta.net_read_bytes, None);
        assert_eq!(delta.read_bytes, Some(0));
    }
}
