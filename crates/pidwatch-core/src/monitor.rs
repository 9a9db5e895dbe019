//! Periodic sampling over a fixed set of pids.
//!
//! Each tick assembles a fresh snapshot per pid, pairs it with the snapshot
//! retained from the previous successful tick and computes usage. The
//! previous-snapshot table is owned by the [`Monitor`]; only the committing
//! thread writes to it.

use std::collections::{HashMap, HashSet};
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::mpsc;
use std::thread;
use std::time::Duration;

use tracing::{debug, info, trace, warn};

use crate::collector::procfs::ProcessCollector;
use crate::collector::traits::FileSystem;
use crate::config::MonitorConfig;
use crate::error::{CollectError, CompositeError};
use crate::model::ProcessSnapshot;
use crate::usage::{ProcessDelta, compute_usage};

/// Granularity of the stop-flag check while sleeping between ticks.
const SLEEP_SLICE: Duration = Duration::from_millis(100);

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum MonitorState {
    Idle,
    Sampling,
    Stopped,
}

/// Outcome of one tick for one pid.
#[derive(Debug)]
pub struct PidReport {
    pub pid: u32,
    /// Fresh snapshot, `None` when assembly failed outright.
    pub snapshot: Option<ProcessSnapshot>,
    /// Snapshot retained from the last successful tick.
    pub previous: Option<ProcessSnapshot>,
    /// CPU utilization since `previous`; `None` on first observation or an
    /// undefined delta.
    pub usage: Option<f64>,
    /// Counter growth since `previous`.
    pub delta: Option<ProcessDelta>,
    /// Fatal assembly failure. Nothing was committed for this pid.
    pub failure: Option<CollectError>,
}

impl PidReport {
    /// Partial-read diagnostics of the fresh snapshot.
    pub fn assembly_error(&self) -> Option<&CompositeError> {
        self.snapshot.as_ref()?.assembly_error.as_ref()
    }

    pub fn is_usage_available(&self) -> bool {
        self.usage.is_some()
    }
}

/// Consumer of per-pid reports.
pub trait ReportSink {
    fn report(&mut self, report: &PidReport);

    /// Called once after every pid of a tick has been reported.
    fn flush(&mut self) {}
}

impl ReportSink for Vec<PidReport> {
    fn report(&mut self, report: &PidReport) {
        self.push(PidReport {
            pid: report.pid,
            snapshot: report.snapshot.clone(),
            previous: report.previous.clone(),
            usage: report.usage,
            delta: report.delta.clone(),
            failure: report.failure.as_ref().map(duplicate_failure),
        });
    }
}

fn duplicate_failure(err: &CollectError) -> CollectError {
    match err {
        CollectError::ProcessNotFound(pid) => CollectError::ProcessNotFound(*pid),
        CollectError::SystemStat(msg) => CollectError::SystemStat(msg.clone()),
        CollectError::Io(e) => CollectError::Io(std::io::Error::new(e.kind(), e.to_string())),
        CollectError::Parse(msg) => CollectError::Parse(msg.clone()),
    }
}

/// Sampling loop over a fixed pid list.
pub struct Monitor<F: FileSystem> {
    collector: ProcessCollector<F>,
    pids: Vec<u32>,
    workers: usize,
    previous: HashMap<u32, ProcessSnapshot>,
    state: MonitorState,
    ticks: u64,
}

impl<F: FileSystem> Monitor<F> {
    /// Creates a monitor reading `fs` at `config.proc_path`.
    ///
    /// Duplicate pids are collapsed, keeping first-occurrence order.
    pub fn new(fs: F, config: &MonitorConfig) -> Self {
        let collector = ProcessCollector::new(fs, config.proc_path.display().to_string())
            .with_tick_rate(config.tick_rate)
            .with_page_size(config.page_size);

        let mut seen = HashSet::new();
        let pids: Vec<u32> = config
            .pids
            .iter()
            .copied()
            .filter(|pid| seen.insert(*pid))
            .collect();
        if pids.len() != config.pids.len() {
            debug!(
                "Ignoring {} duplicate pid(s)",
                config.pids.len() - pids.len()
            );
        }

        Self {
            collector,
            pids,
            workers: config.workers.max(1),
            previous: HashMap::new(),
            state: MonitorState::Idle,
            ticks: 0,
        }
    }

    pub fn state(&self) -> MonitorState {
        self.state
    }

    pub fn pids(&self) -> &[u32] {
        &self.pids
    }

    /// Number of completed ticks.
    pub fn ticks(&self) -> u64 {
        self.ticks
    }

    pub fn collector(&self) -> &ProcessCollector<F> {
        &self.collector
    }

    pub fn collector_mut(&mut self) -> &mut ProcessCollector<F> {
        &mut self.collector
    }

    /// Snapshot currently retained for `pid`.
    pub fn previous(&self, pid: u32) -> Option<&ProcessSnapshot> {
        self.previous.get(&pid)
    }

    /// Runs one sampling pass over every configured pid.
    ///
    /// Reports are returned in configured pid order. A failure for one pid
    /// never affects another.
    pub fn tick(&mut self) -> Vec<PidReport> {
        self.state = MonitorState::Sampling;

        let processors = match self.collector.system().processor_count() {
            Ok(count) => Some(count),
            Err(e) => {
                warn!("Processor count unavailable, usage not computed: {}", e);
                None
            }
        };

        let Self {
            collector,
            pids,
            workers,
            previous,
            ..
        } = self;
        let mut reports = Vec::with_capacity(pids.len());
        fan_out(collector, pids, *workers, |idx, pid, result| {
            reports.push((idx, commit(previous, pid, result, processors)));
        });
        reports.sort_by_key(|(idx, _)| *idx);
        let reports = reports.into_iter().map(|(_, report)| report).collect();

        self.ticks += 1;
        self.state = MonitorState::Idle;
        reports
    }

    /// Ticks every `interval` until `running` is cleared.
    ///
    /// The flag is checked before each tick and while sleeping; a tick that
    /// has started always completes.
    pub fn run(&mut self, interval: Duration, running: &AtomicBool, sink: &mut impl ReportSink) {
        info!(
            "Sampling {} pid(s) every {}s",
            self.pids.len(),
            interval.as_secs_f64()
        );

        while running.load(Ordering::SeqCst) {
            for report in self.tick() {
                sink.report(&report);
            }
            sink.flush();

            // Sleep with periodic checks for shutdown signal
            let mut remaining = interval;
            while remaining > Duration::ZERO && running.load(Ordering::SeqCst) {
                let sleep_time = remaining.min(SLEEP_SLICE);
                thread::sleep(sleep_time);
                remaining = remaining.saturating_sub(sleep_time);
            }
        }

        self.state = MonitorState::Stopped;
        info!("Sampling stopped after {} tick(s)", self.ticks);
    }
}

/// Assembles a snapshot for every pid and hands each result to `on_result`
/// together with its position in `pids`.
///
/// With more than one worker the pids are split into contiguous chunks, one
/// scoped thread per chunk. Results are delivered on the calling thread as
/// soon as each assembly finishes, so arrival order is not pid order.
fn fan_out<F: FileSystem>(
    collector: &ProcessCollector<F>,
    pids: &[u32],
    workers: usize,
    mut on_result: impl FnMut(usize, u32, Result<ProcessSnapshot, CollectError>),
) {
    if workers <= 1 || pids.len() <= 1 {
        for (idx, &pid) in pids.iter().enumerate() {
            on_result(idx, pid, collector.collect_process(pid));
        }
        return;
    }

    let chunk_size = pids.len().div_ceil(workers);
    let (tx, rx) = mpsc::channel();

    thread::scope(|s| {
        for (chunk_idx, chunk) in pids.chunks(chunk_size).enumerate() {
            let tx = tx.clone();
            s.spawn(move || {
                for (offset, &pid) in chunk.iter().enumerate() {
                    let result = collector.collect_process(pid);
                    // Receiver lives until every sender is gone
                    let _ = tx.send((chunk_idx * chunk_size + offset, pid, result));
                }
            });
        }
        drop(tx);

        for (idx, pid, result) in rx {
            on_result(idx, pid, result);
        }
    });
}

/// Applies the commit rule for one assembly result and builds its report.
///
/// A snapshot, partial or complete, replaces the retained one. A failure
/// leaves the retained snapshot untouched.
fn commit(
    previous: &mut HashMap<u32, ProcessSnapshot>,
    pid: u32,
    result: Result<ProcessSnapshot, CollectError>,
    processors: Option<usize>,
) -> PidReport {
    match result {
        Ok(snapshot) => {
            if let Some(err) = &snapshot.assembly_error {
                debug!(pid, "partial snapshot: {}", err);
            }

            let prev = previous.insert(pid, snapshot.clone());
            let (usage, delta) = match &prev {
                Some(prev) => (
                    processors.and_then(|n| compute_usage(&snapshot, prev, n)),
                    ProcessDelta::between(&snapshot, prev),
                ),
                None => {
                    trace!(pid, "first observation");
                    (None, None)
                }
            };

            PidReport {
                pid,
                snapshot: Some(snapshot),
                previous: prev,
                usage,
                delta,
                failure: None,
            }
        }
        Err(err) => {
            debug!(pid, "snapshot failed: {}", err);
            PidReport {
                pid,
                snapshot: None,
                previous: previous.get(&pid).cloned(),
                usage: None,
                delta: None,
                failure: Some(err),
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::collector::mock::MockFs;
    use std::io;
    use std::path::{Path, PathBuf};
    use std::sync::{Arc, Condvar, Mutex};

    fn config(pids: &[u32]) -> MonitorConfig {
        MonitorConfig {
            pids: pids.to_vec(),
            ..MonitorConfig::default()
        }
    }

    fn approx(a: f64, b: f64) -> bool {
        (a - b).abs() < 1e-9
    }

    /// 10.0s of process CPU against 1000.0s of system CPU at 100 ticks/s.
    fn baseline_system() -> MockFs {
        let mut fs = MockFs::typical_system();
        fs.set_cpu_ticks(1000, 1000, 0, 0, 0);
        fs.set_system_ticks(60000, 20000, 20000);
        fs
    }

    fn advance(fs: &mut MockFs) {
        fs.set_cpu_ticks(1000, 1050, 0, 0, 0);
        fs.set_system_ticks(60600, 20200, 20200);
    }

    #[test]
    fn test_first_tick_has_no_usage() {
        let mut monitor = Monitor::new(MockFs::typical_system(), &config(&[1000, 1001]));

        let reports = monitor.tick();
        assert_eq!(reports.len(), 2);
        for report in &reports {
            assert!(report.snapshot.is_some());
            assert!(report.previous.is_none());
            assert!(!report.is_usage_available());
            assert!(report.delta.is_none());
        }
        assert!(monitor.previous(1000).is_some());
        assert_eq!(monitor.state(), MonitorState::Idle);
        assert_eq!(monitor.ticks(), 1);
    }

    #[test]
    fn test_usage_between_two_ticks() {
        let mut monitor = Monitor::new(baseline_system(), &config(&[1000]));
        monitor.tick();

        advance(monitor.collector_mut().fs_mut());
        let reports = monitor.tick();

        let report = &reports[0];
        let usage = report.usage.unwrap();
        assert!(approx(usage, 0.2), "got {}", usage);
        let previous = report.previous.as_ref().unwrap();
        assert!(approx(previous.cpu_usage.proc_cpu, 10.0));
        assert!(approx(previous.cpu_usage.system_total, 1000.0));
        assert!(approx(report.delta.as_ref().unwrap().cpu_seconds.unwrap(), 0.5));
    }

    #[test]
    fn test_unchanged_system_total_gives_no_usage() {
        let mut monitor = Monitor::new(baseline_system(), &config(&[1000]));
        monitor.tick();

        let reports = monitor.tick();
        assert!(reports[0].snapshot.is_some());
        assert_eq!(reports[0].usage, None);
    }

    #[test]
    fn test_missing_process_preserves_previous() {
        let fs = baseline_system();
        let restored = fs.clone();
        let mut monitor = Monitor::new(fs, &config(&[1000]));

        // Tick N-1
        monitor.tick();
        let retained = monitor.previous(1000).cloned().unwrap();

        // Tick N: pid unresolvable
        monitor.collector_mut().fs_mut().remove_tree("/proc/1000");
        let reports = monitor.tick();
        assert!(matches!(
            reports[0].failure,
            Some(CollectError::ProcessNotFound(1000))
        ));
        assert!(reports[0].snapshot.is_none());
        assert_eq!(reports[0].previous.as_ref(), Some(&retained));
        assert_eq!(monitor.previous(1000), Some(&retained));

        // Tick N+1: delta against tick N-1
        *monitor.collector_mut().fs_mut() = restored;
        advance(monitor.collector_mut().fs_mut());
        let reports = monitor.tick();
        assert!(approx(reports[0].usage.unwrap(), 0.2));
        assert_eq!(reports[0].previous.as_ref(), Some(&retained));
    }

    #[test]
    fn test_unreadable_system_stat_is_not_committed() {
        let fs = baseline_system();
        let mut monitor = Monitor::new(fs, &config(&[1000, 1001]));
        monitor.tick();
        let retained = monitor.previous(1000).cloned().unwrap();

        monitor.collector_mut().fs_mut().deny("/proc/stat");
        let reports = monitor.tick();
        for report in &reports {
            assert!(matches!(report.failure, Some(CollectError::SystemStat(_))));
        }
        assert_eq!(monitor.previous(1000), Some(&retained));
    }

    #[test]
    fn test_partial_snapshot_is_committed() {
        let mut monitor = Monitor::new(baseline_system(), &config(&[1000]));
        monitor.tick();

        let fs = monitor.collector_mut().fs_mut();
        advance(fs);
        fs.deny("/proc/1000/io");
        let reports = monitor.tick();

        let report = &reports[0];
        let err = report.assembly_error().unwrap();
        assert_eq!(err.labels().collect::<Vec<_>>(), vec!["io"]);
        // Stat was readable, so usage still has a defined delta
        assert!(approx(report.usage.unwrap(), 0.2));
        // io counters dropped to zero, so only the io deltas are undefined
        let delta = report.delta.as_ref().unwrap();
        assert_eq!(delta.read_bytes, None);
        assert_eq!(delta.write_bytes, None);
        assert!(approx(delta.cpu_seconds.unwrap(), 0.5));
        assert_eq!(delta.minor_page_faults, Some(0));

        let committed = monitor.previous(1000).unwrap();
        assert!(!committed.is_complete());
        assert_eq!(committed.io.read_bytes, 0);
    }

    #[test]
    fn test_stat_gap_gives_no_usage() {
        let fs = baseline_system();
        let restored = fs.clone();
        let mut monitor = Monitor::new(fs, &config(&[1000]));
        monitor.tick();

        // Stat missing: committed with zeroed CPU counters
        monitor
            .collector_mut()
            .fs_mut()
            .remove_file("/proc/1000/stat");
        let reports = monitor.tick();
        assert!(reports[0].assembly_error().unwrap().mentions("stat"));
        assert_eq!(reports[0].usage, None);
        assert!(approx(
            monitor.previous(1000).unwrap().cpu_usage.proc_cpu,
            0.0
        ));

        // Stat back: the zeroed baseline must not count as growth
        *monitor.collector_mut().fs_mut() = restored;
        advance(monitor.collector_mut().fs_mut());
        let reports = monitor.tick();
        assert!(reports[0].snapshot.as_ref().unwrap().is_complete());
        assert_eq!(reports[0].usage, None);
        let delta = reports[0].delta.as_ref().unwrap();
        assert_eq!(delta.cpu_seconds, None);
        assert_eq!(delta.minor_page_faults, None);
        assert_eq!(delta.major_page_faults, None);

        // Two complete snapshots in a row again
        let fs = monitor.collector_mut().fs_mut();
        fs.set_cpu_ticks(1000, 1100, 0, 0, 0);
        fs.set_system_ticks(61200, 20400, 20400);
        let reports = monitor.tick();
        let usage = reports[0].usage.unwrap();
        assert!(approx(usage, 0.2), "got {}", usage);
    }

    #[test]
    fn test_failing_pid_does_not_affect_others() {
        let mut monitor = Monitor::new(baseline_system(), &config(&[1000, 4242, 1001]));
        let reports = monitor.tick();

        let pids: Vec<u32> = reports.iter().map(|r| r.pid).collect();
        assert_eq!(pids, vec![1000, 4242, 1001]);
        assert!(reports[0].snapshot.is_some());
        assert!(matches!(
            reports[1].failure,
            Some(CollectError::ProcessNotFound(4242))
        ));
        assert!(reports[2].snapshot.is_some());
        assert!(monitor.previous(4242).is_none());
    }

    #[test]
    fn test_recycled_pid_has_no_usage() {
        let mut monitor = Monitor::new(baseline_system(), &config(&[1000]));
        monitor.tick();

        let fs = monitor.collector_mut().fs_mut();
        fs.set_system_ticks(60600, 20200, 20200);
        // New process behind the same pid: lower counters, later start
        fs.set_cpu_ticks(1000, 5, 0, 0, 0);
        fs.set_start_ticks(1000, 900000);
        let reports = monitor.tick();

        assert!(reports[0].snapshot.is_some());
        assert_eq!(reports[0].usage, None);
        assert!(reports[0].delta.is_none());
        // The new process becomes the baseline
        assert!(approx(
            monitor.previous(1000).unwrap().cpu_usage.proc_cpu,
            0.05
        ));
    }

    #[test]
    fn test_duplicate_pids_collapsed() {
        let monitor = Monitor::new(MockFs::typical_system(), &config(&[1000, 1, 1000]));
        assert_eq!(monitor.pids(), &[1000, 1]);
    }

    #[test]
    fn test_workers_match_sequential() {
        let pids = [1, 1000, 4242, 1001];
        let mut sequential = Monitor::new(baseline_system(), &config(&pids));
        let mut parallel = Monitor::new(
            baseline_system(),
            &MonitorConfig {
                workers: 3,
                ..config(&pids)
            },
        );

        for monitor in [&mut sequential, &mut parallel] {
            monitor.tick();
            advance(monitor.collector_mut().fs_mut());
        }

        let a = sequential.tick();
        let b = parallel.tick();
        assert_eq!(a.len(), b.len());
        for (x, y) in a.iter().zip(&b) {
            assert_eq!(x.pid, y.pid);
            assert_eq!(x.snapshot, y.snapshot);
            assert_eq!(x.usage, y.usage);
            assert_eq!(x.failure.is_some(), y.failure.is_some());
        }
        assert!(approx(b[1].usage.unwrap(), 0.2));
    }

    /// Holds reads of one pid's stat until the gate opens.
    struct GatedFs {
        inner: MockFs,
        held: PathBuf,
        gate: Arc<Gate>,
    }

    #[derive(Default)]
    struct Gate {
        open: Mutex<bool>,
        cv: Condvar,
        timed_out: AtomicBool,
    }

    impl Gate {
        fn open(&self) {
            *self.open.lock().unwrap() = true;
            self.cv.notify_all();
        }

        fn wait(&self) {
            let guard = self.open.lock().unwrap();
            let (_guard, result) = self
                .cv
                .wait_timeout_while(guard, Duration::from_secs(5), |open| !*open)
                .unwrap();
            if result.timed_out() {
                self.timed_out.store(true, Ordering::SeqCst);
            }
        }
    }

    impl FileSystem for GatedFs {
        fn read_to_string(&self, path: &Path) -> io::Result<String> {
            if path == self.held {
                self.gate.wait();
            }
            self.inner.read_to_string(path)
        }

        fn exists(&self, path: &Path) -> bool {
            self.inner.exists(path)
        }

        fn read_dir(&self, path: &Path) -> io::Result<Vec<PathBuf>> {
            self.inner.read_dir(path)
        }
    }

    #[test]
    fn test_slow_pid_does_not_hold_back_others() {
        let gate = Arc::new(Gate::default());
        let fs = GatedFs {
            inner: MockFs::typical_system(),
            held: PathBuf::from("/proc/1001/stat"),
            gate: Arc::clone(&gate),
        };
        let collector = ProcessCollector::new(fs, "/proc");

        // 1001 is first in pid order but stays blocked until 1000 is delivered
        let mut arrivals = Vec::new();
        fan_out(&collector, &[1001, 1000], 2, |idx, pid, result| {
            assert!(result.is_ok());
            arrivals.push((idx, pid));
            if pid == 1000 {
                gate.open();
            }
        });

        assert!(!gate.timed_out.load(Ordering::SeqCst));
        assert_eq!(arrivals, vec![(1, 1000), (0, 1001)]);
    }

    #[test]
    fn test_run_stops_when_flag_cleared() {
        let mut monitor = Monitor::new(MockFs::typical_system(), &config(&[1000]));
        let running = AtomicBool::new(false);
        let mut sink: Vec<PidReport> = Vec::new();

        monitor.run(Duration::from_secs(60), &running, &mut sink);

        assert!(sink.is_empty());
        assert_eq!(monitor.state(), MonitorState::Stopped);
    }

    struct StopAfter<'a> {
        running: &'a AtomicBool,
        ticks_left: usize,
        reports: Vec<PidReport>,
    }

    impl ReportSink for StopAfter<'_> {
        fn report(&mut self, report: &PidReport) {
            self.reports.report(report);
        }

        fn flush(&mut self) {
            self.ticks_left -= 1;
            if self.ticks_left == 0 {
                self.running.store(false, Ordering::SeqCst);
            }
        }
    }

    #[test]
    fn test_run_completes_ticks_and_reports() {
        let mut monitor = Monitor::new(MockFs::typical_system(), &config(&[1000, 1001]));
        let running = AtomicBool::new(true);
        let mut sink = StopAfter {
            running: &running,
            ticks_left: 2,
            reports: Vec::new(),
        };

        monitor.run(Duration::from_millis(10), &running, &mut sink);

        assert_eq!(monitor.ticks(), 2);
        assert_eq!(sink.reports.len(), 4);
        assert!(sink.reports[2].previous.is_some());
        assert_eq!(monitor.state(), MonitorState::Stopped);
    }
}
