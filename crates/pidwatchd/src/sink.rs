//! Report sinks: log lines or JSON objects.

use std::io::Write;

use chrono::{DateTime, Utc};
use serde::Serialize;
use tracing::{info, warn};

use pidwatch_core::model::ProcessSnapshot;
use pidwatch_core::monitor::{PidReport, ReportSink};
use pidwatch_core::usage::ProcessDelta;

/// Formats bytes as human-readable size string.
fn format_size(bytes: u64) -> String {
    const GB: u64 = 1024 * 1024 * 1024;
    const MB: u64 = 1024 * 1024;
    const KB: u64 = 1024;

    if bytes >= GB {
        format!("{:.1}G", bytes as f64 / GB as f64)
    } else if bytes >= MB {
        format!("{:.1}M", bytes as f64 / MB as f64)
    } else if bytes >= KB {
        format!("{:.1}K", bytes as f64 / KB as f64)
    } else {
        format!("{}B", bytes)
    }
}

/// Usage as percent of one CPU.
fn format_usage(usage: Option<f64>) -> String {
    match usage {
        Some(u) => format!("{:.1}%", u * 100.0),
        None => "n/a".to_string(),
    }
}

fn format_start(start: Option<DateTime<Utc>>) -> String {
    match start {
        Some(t) => t.format("%Y-%m-%d %H:%M:%S").to_string(),
        None => "?".to_string(),
    }
}

fn format_limit(limit: u64) -> String {
    if limit == u64::MAX {
        "unlimited".to_string()
    } else {
        limit.to_string()
    }
}

/// Writes one summary line per pid to the log.
pub struct TextSink;

impl TextSink {
    fn describe(report: &PidReport) -> Option<String> {
        let snapshot = report.snapshot.as_ref()?;
        Some(format!(
            "pid {} ({}) state={} threads={} started={} cpu={} utime={:.2}s stime={:.2}s \
             rss={} vsz={} swap={} fds={}/{} io={}/{} net={}/{}",
            report.pid,
            snapshot.name,
            snapshot.state,
            snapshot.num_threads,
            format_start(snapshot.start_time),
            format_usage(report.usage),
            snapshot.counts.cpu_user,
            snapshot.counts.cpu_system,
            format_size(snapshot.memory.resident_bytes),
            format_size(snapshot.memory.virtual_bytes),
            format_size(snapshot.memory.swap_bytes),
            snapshot.file_descriptors.open,
            format_limit(snapshot.file_descriptors.limit),
            format_size(snapshot.io.read_bytes),
            format_size(snapshot.io.write_bytes),
            format_size(snapshot.io.net_read_bytes),
            format_size(snapshot.io.net_write_bytes),
        ))
    }
}

impl ReportSink for TextSink {
    fn report(&mut self, report: &PidReport) {
        if let Some(line) = Self::describe(report) {
            info!("{}", line);
        }
        if let Some(err) = report.assembly_error() {
            warn!("pid {}: partial snapshot: {}", report.pid, err);
        }
        if let Some(err) = &report.failure {
            warn!("pid {}: {}", report.pid, err);
        }
    }
}

#[derive(Serialize)]
struct JsonReport<'a> {
    timestamp: DateTime<Utc>,
    pid: u32,
    snapshot: Option<&'a ProcessSnapshot>,
    previous_snapshot: Option<&'a ProcessSnapshot>,
    usage: Option<f64>,
    delta: Option<&'a ProcessDelta>,
    assembly_error: Option<String>,
    failure: Option<String>,
}

impl<'a> JsonReport<'a> {
    fn new(report: &'a PidReport, timestamp: DateTime<Utc>) -> Self {
        Self {
            timestamp,
            pid: report.pid,
            snapshot: report.snapshot.as_ref(),
            previous_snapshot: report.previous.as_ref(),
            usage: report.usage,
            delta: report.delta.as_ref(),
            assembly_error: report.assembly_error().map(ToString::to_string),
            failure: report.failure.as_ref().map(ToString::to_string),
        }
    }
}

/// Writes one JSON object per line per pid.
pub struct JsonSink<W: Write> {
    out: W,
}

impl<W: Write> JsonSink<W> {
    pub fn new(out: W) -> Self {
        Self { out }
    }

    fn write(&mut self, report: &PidReport) -> std::io::Result<()> {
        serde_json::to_writer(&mut self.out, &JsonReport::new(report, Utc::now()))?;
        self.out.write_all(b"\n")
    }
}

impl<W: Write> ReportSink for JsonSink<W> {
    fn report(&mut self, report: &PidReport) {
        if let Err(e) = self.write(report) {
            warn!("Failed to write report for pid {}: {}", report.pid, e);
        }
    }

    fn flush(&mut self) {
        if let Err(e) = self.out.flush() {
            warn!("Failed to flush reports: {}", e);
        }
    }
}
