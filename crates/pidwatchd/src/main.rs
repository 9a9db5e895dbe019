//! pidwatchd - per-process resource usage monitor.
//!
//! Samples a fixed set of pids from the /proc filesystem at a fixed interval
//! and reports CPU utilization and counter totals per pid.

use tikv_jemallocator::Jemalloc;
#[global_allocator]
static GLOBAL: Jemalloc = Jemalloc;

mod sink;

use std::path::PathBuf;
use std::process::ExitCode;
use std::sync::Arc;
use std::sync::atomic::{AtomicBool, Ordering};

use clap::{Parser, ValueEnum};
use tracing::{Level, error, info, warn};
use tracing_subscriber::EnvFilter;

use pidwatch_core::collector::RealFs;
use pidwatch_core::config::MonitorConfig;
use pidwatch_core::error::ConfigError;
use pidwatch_core::monitor::Monitor;

use crate::sink::{JsonSink, TextSink};

#[derive(Clone, Copy, Debug, PartialEq, Eq, ValueEnum)]
enum OutputFormat {
    /// One log line per pid.
    Text,
    /// One JSON object per pid on stdout.
    Json,
}

/// Per-process resource usage monitor.
#[derive(Parser)]
#[command(name = "pidwatchd", about = "Per-process resource usage monitor", version)]
struct Args {
    /// Process ID to monitor. Repeat for several processes.
    #[arg(short, long = "pid", value_name = "PID")]
    pids: Vec<u32>,

    /// Sampling interval in seconds.
    #[arg(short, long)]
    interval: Option<u64>,

    /// Path to /proc filesystem (for testing/mocking).
    #[arg(long)]
    proc_path: Option<PathBuf>,

    /// Clock ticks per second used by /proc time counters.
    #[arg(long)]
    tick_rate: Option<u64>,

    /// Memory page size in bytes.
    #[arg(long)]
    page_size: Option<u64>,

    /// Number of threads assembling snapshots within one tick.
    #[arg(short, long)]
    workers: Option<usize>,

    /// TOML config file. Command-line flags override its values.
    #[arg(short, long, value_name = "FILE")]
    config: Option<PathBuf>,

    /// Report format.
    #[arg(short, long, value_enum, default_value_t = OutputFormat::Text)]
    format: OutputFormat,

    /// Increase logging verbosity (-v for debug, -vv for trace). Default is info level.
    #[arg(short, long, action = clap::ArgAction::Count)]
    verbose: u8,

    /// Quiet mode - only show errors.
    #[arg(short, long)]
    quiet: bool,
}

/// Initializes the tracing subscriber with the appropriate log level.
/// Default level is INFO. Use -q for quiet mode (errors only).
fn init_logging(verbose: u8, quiet: bool) {
    let level = if quiet {
        Level::ERROR
    } else {
        match verbose {
            0 => Level::INFO,
            1 => Level::DEBUG,
            _ => Level::TRACE,
        }
    };

    let mut filter = EnvFilter::from_default_env();
    for target in ["pidwatchd", "pidwatch_core"] {
        if let Ok(directive) = format!("{}={}", target, level).parse() {
            filter = filter.add_directive(directive);
        }
    }

    // Logs go to stderr so JSON reports on stdout stay parseable
    tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_target(false)
        .with_writer(std::io::stderr)
        .init();
}

/// Loads the config file (if any) and applies command-line overrides.
fn build_config(args: &Args) -> Result<MonitorConfig, ConfigError> {
    let mut config = match &args.config {
        Some(path) => MonitorConfig::from_path(path)?,
        None => MonitorConfig::default(),
    };

    if !args.pids.is_empty() {
        config.pids = args.pids.clone();
    }
    if let Some(interval) = args.interval {
        config.interval_secs = interval;
    }
    if let Some(proc_path) = &args.proc_path {
        config.proc_path = proc_path.clone();
    }
    if let Some(tick_rate) = args.tick_rate {
        config.tick_rate = tick_rate;
    }
    if let Some(page_size) = args.page_size {
        config.page_size = page_size;
    }
    if let Some(workers) = args.workers {
        config.workers = workers;
    }

    config.validate()?;
    Ok(config)
}

fn main() -> ExitCode {
    let args = Args::parse();

    init_logging(args.verbose, args.quiet);

    let config = match build_config(&args) {
        Ok(config) => config,
        Err(e) => {
            error!("Invalid configuration: {}", e);
            return ExitCode::FAILURE;
        }
    };

    info!("pidwatchd {} starting", env!("CARGO_PKG_VERSION"));
    info!(
        "Config: pids={:?}, interval={}s, proc={}, tick_rate={}, page_size={}, workers={}",
        config.pids,
        config.interval_secs,
        config.proc_path.display(),
        config.tick_rate,
        config.page_size,
        config.workers
    );

    let mut monitor = Monitor::new(RealFs::new(), &config);

    // Setup graceful shutdown
    let running = Arc::new(AtomicBool::new(true));
    let r = running.clone();

    if let Err(e) = ctrlc::set_handler(move || {
        info!("Received shutdown signal");
        r.store(false, Ordering::SeqCst);
    }) {
        warn!("Failed to set Ctrl-C handler: {}", e);
    }

    match args.format {
        OutputFormat::Text => monitor.run(config.interval(), &running, &mut TextSink),
        OutputFormat::Json => {
            monitor.run(config.interval(), &running, &mut JsonSink::new(std::io::stdout()))
        }
    }

    info!("Shutting down...");
    ExitCode::SUCCESS
}
