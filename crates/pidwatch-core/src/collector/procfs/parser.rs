//! Parsers for `/proc` filesystem files.
//!
//! Pure functions over file content, so every format quirk can be tested
//! with string fixtures. Only the fields a [`ProcessSnapshot`] needs are
//! extracted.
//!
//! [`ProcessSnapshot`]: crate::model::ProcessSnapshot

use std::collections::HashMap;
use std::fmt;
use std::str::FromStr;

/// Error type for parsing failures.
#[derive(Debug, Clone, PartialEq)]
pub struct ParseError {
    pub message: String,
}

impl ParseError {
    pub fn new(msg: impl Into<String>) -> Self {
        Self {
            message: msg.into(),
        }
    }
}

impl fmt::Display for ParseError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "Parse error: {}", self.message)
    }
}

impl std::error::Error for ParseError {}

/// Minimum number of fields after `(comm)` on any kernel since 3.5.
const STAT_MIN_FIELDS: usize = 42;

/// Parsed data from `/proc/[pid]/stat`.
#[derive(Debug, Clone, Default)]
pub struct ProcStat {
    pub pid: u32,
    pub comm: String,
    pub state: char,
    pub ppid: u32,
    pub minflt: u64,
    pub majflt: u64,
    pub utime: u64,
    pub stime: u64,
    pub cutime: i64,
    pub cstime: i64,
    pub num_threads: i32,
    pub starttime: u64,
    pub vsize: u64,
    pub rss: i64,
}

/// Parses field `idx` (0 = state) of the part of a stat line after `(comm)`.
fn stat_field<T: FromStr>(fields: &[&str], idx: usize, name: &str) -> Result<T, ParseError> {
    fields
        .get(idx)
        .ok_or_else(|| ParseError::new(format!("missing field {}", name)))?
        .parse()
        .map_err(|_| ParseError::new(format!("invalid {}", name)))
}

/// Parses `/proc/[pid]/stat` content.
///
/// `comm` may itself contain spaces and parentheses, so it is taken as
/// everything between the first `(` and the last `)`.
pub fn parse_proc_stat(content: &str) -> Result<ProcStat, ParseError> {
    let content = content.trim();

    let (Some(open), Some(close)) = (content.find('('), content.rfind(')')) else {
        return Err(ParseError::new("comm not enclosed in parentheses"));
    };
    if close < open {
        return Err(ParseError::new("comm not enclosed in parentheses"));
    }

    let pid = content[..open]
        .trim()
        .parse()
        .map_err(|_| ParseError::new("invalid pid"))?;

    let fields: Vec<&str> = content[close + 1..].split_whitespace().collect();
    if fields.len() < STAT_MIN_FIELDS {
        return Err(ParseError::new(format!(
            "not enough fields in stat: expected {}+, got {}",
            STAT_MIN_FIELDS,
            fields.len()
        )));
    }

    Ok(ProcStat {
        pid,
        comm: content[open + 1..close].to_string(),
        state: fields[0].chars().next().unwrap_or('?'),
        ppid: stat_field(&fields, 1, "ppid")?,
        minflt: stat_field(&fields, 7, "minflt")?,
        majflt: stat_field(&fields, 9, "majflt")?,
        utime: stat_field(&fields, 11, "utime")?,
        stime: stat_field(&fields, 12, "stime")?,
        cutime: stat_field(&fields, 13, "cutime")?,
        cstime: stat_field(&fields, 14, "cstime")?,
        num_threads: stat_field(&fields, 17, "num_threads")?,
        starttime: stat_field(&fields, 19, "starttime")?,
        vsize: stat_field(&fields, 20, "vsize")?,
        rss: stat_field(&fields, 21, "rss")?,
    })
}

/// Parsed data from `/proc/[pid]/status`.
#[derive(Debug, Clone, Default)]
pub struct ProcStatus {
    pub pid: u32,
    /// Swapped-out virtual memory, kB.
    pub vm_swap: u64,
    pub voluntary_ctxt_switches: u64,
    pub nonvoluntary_ctxt_switches: u64,
}

/// Parses `/proc/[pid]/status` content.
///
/// Lines are `Key:\tvalue`. A `Pid` line is required; the kernel emits it
/// for every task, zombies included. Other keys default to zero when absent
/// (kernel threads have no `Vm*` lines).
pub fn parse_proc_status(content: &str) -> Result<ProcStatus, ParseError> {
    let fields: HashMap<&str, &str> = content
        .lines()
        .filter_map(|line| line.split_once(':'))
        .map(|(key, value)| (key.trim(), value.trim()))
        .collect();

    let pid = fields
        .get("Pid")
        .ok_or_else(|| ParseError::new("missing Pid in status"))?
        .parse()
        .map_err(|_| ParseError::new("invalid Pid in status"))?;

    // "VmSwap:	     512 kB" -> 512
    let number = |key: &str| -> u64 {
        fields
            .get(key)
            .and_then(|v| v.split_whitespace().next())
            .and_then(|v| v.parse().ok())
            .unwrap_or(0)
    };

    Ok(ProcStatus {
        pid,
        vm_swap: number("VmSwap"),
        voluntary_ctxt_switches: number("voluntary_ctxt_switches"),
        nonvoluntary_ctxt_switches: number("nonvoluntary_ctxt_switches"),
    })
}

/// Storage I/O from `/proc/[pid]/io`, in bytes.
#[derive(Debug, Clone, Default)]
pub struct ProcIo {
    pub read_bytes: u64,
    pub write_bytes: u64,
}

/// Parses `/proc/[pid]/io` content.
///
/// Every line must carry a numeric value; empty content is an error since
/// the kernel always emits all seven counters.
pub fn parse_proc_io(content: &str) -> Result<ProcIo, ParseError> {
    let mut io = ProcIo::default();
    let mut lines = 0;

    for (key, value) in content.lines().filter_map(|line| line.split_once(':')) {
        let key = key.trim();
        let value: u64 = value
            .trim()
            .parse()
            .map_err(|_| ParseError::new(format!("invalid value for {}", key)))?;
        lines += 1;

        match key {
            "read_bytes" => io.read_bytes = value,
            "write_bytes" => io.write_bytes = value,
            _ => {}
        }
    }

    if lines == 0 {
        return Err(ParseError::new("empty io"));
    }
    Ok(io)
}

/// Parses `/proc/[pid]/cmdline` content into its arguments.
///
/// Arguments are NUL separated with a trailing NUL. Kernel threads and
/// zombies have an empty cmdline, which yields an empty vector.
pub fn parse_cmdline(content: &str) -> Vec<String> {
    content
        .split('\0')
        .filter(|arg| !arg.is_empty())
        .map(str::to_string)
        .collect()
}

/// Open-files limits from `/proc/[pid]/limits`.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct ProcLimits {
    /// Soft limit; `u64::MAX` when unlimited.
    pub open_files_soft: u64,
    /// Hard limit; `u64::MAX` when unlimited.
    pub open_files_hard: u64,
}

/// Parses the "Max open files" row of `/proc/[pid]/limits`.
///
/// Format:
/// Limit                     Soft Limit           Hard Limit           Units
/// Max open files            1024                 4096                 files
pub fn parse_proc_limits(content: &str) -> Result<ProcLimits, ParseError> {
    let line = content
        .lines()
        .find(|line| line.starts_with("Max open files"))
        .ok_or_else(|| ParseError::new("missing 'Max open files' in limits"))?;

    let parts: Vec<&str> = line.split_whitespace().collect();
    let limit = |idx: usize, which: &str| {
        parts
            .get(idx)
            .and_then(|v| parse_limit_value(v))
            .ok_or_else(|| ParseError::new(format!("invalid open files {} limit", which)))
    };

    Ok(ProcLimits {
        open_files_soft: limit(3, "soft")?,
        open_files_hard: limit(4, "hard")?,
    })
}

fn parse_limit_value(value: &str) -> Option<u64> {
    if value.eq_ignore_ascii_case("unlimited") {
        return Some(u64::MAX);
    }
    value.parse().ok()
}

/// Single CPU line from `/proc/stat`, in clock ticks.
#[derive(Debug, Clone, Default)]
pub struct CpuStat {
    /// `None` for the aggregate `cpu` line.
    pub cpu_id: Option<u32>,
    pub user: u64,
    pub nice: u64,
    pub system: u64,
    pub idle: u64,
    pub iowait: u64,
    pub irq: u64,
    pub softirq: u64,
    pub steal: u64,
    pub guest: u64,
    pub guest_nice: u64,
}

/// CPU lines and boot time from `/proc/stat`.
#[derive(Debug, Clone, Default)]
pub struct GlobalStat {
    pub cpus: Vec<CpuStat>,
    /// Seconds since epoch, 0 if the line is absent.
    pub btime: u64,
}

impl GlobalStat {
    /// The aggregate `cpu` line, if present.
    pub fn total(&self) -> Option<&CpuStat> {
        self.cpus.iter().find(|cpu| cpu.cpu_id.is_none())
    }

    /// Number of per-CPU (`cpuN`) lines.
    pub fn cpu_count(&self) -> usize {
        self.cpus.iter().filter(|cpu| cpu.cpu_id.is_some()).count()
    }
}

fn parse_cpu_line(label: &str, values: &[&str]) -> Result<CpuStat, ParseError> {
    let cpu_id = match label.strip_prefix("cpu") {
        Some("") => None,
        Some(id) => Some(
            id.parse()
                .map_err(|_| ParseError::new(format!("invalid cpu line {}", label)))?,
        ),
        None => return Err(ParseError::new(format!("not a cpu line: {}", label))),
    };

    // Older kernels print fewer columns; missing ones are zero
    let tick = |idx: usize| values.get(idx).and_then(|v| v.parse().ok()).unwrap_or(0);

    Ok(CpuStat {
        cpu_id,
        user: tick(0),
        nice: tick(1),
        system: tick(2),
        idle: tick(3),
        iowait: tick(4),
        irq: tick(5),
        softirq: tick(6),
        steal: tick(7),
        guest: tick(8),
        guest_nice: tick(9),
    })
}

/// Parses `/proc/stat` content.
pub fn parse_global_stat(content: &str) -> Result<GlobalStat, ParseError> {
    let mut stat = GlobalStat::default();

    for line in content.lines() {
        let mut parts = line.split_whitespace();
        let Some(label) = parts.next() else {
            continue;
        };
        let values: Vec<&str> = parts.collect();

        if label.starts_with("cpu") {
            stat.cpus.push(parse_cpu_line(label, &values)?);
        } else if label == "btime" {
            stat.btime = values.first().and_then(|v| v.parse().ok()).unwrap_or(0);
        }
    }

    Ok(stat)
}

/// Counts logical processors (`processor` entries) in `/proc/cpuinfo`.
pub fn parse_cpuinfo(content: &str) -> usize {
    content
        .lines()
        .filter(|line| {
            line.split_once(':')
                .is_some_and(|(key, _)| key.trim() == "processor")
        })
        .count()
}

/// Byte counters of one interface from `/proc/[pid]/net/dev`.
#[derive(Debug, Clone, Default)]
pub struct NetDevStats {
    pub interface: String,
    pub rx_bytes: u64,
    pub tx_bytes: u64,
}

/// Columns per interface: 8 receive then 8 transmit.
const NET_DEV_COLUMNS: usize = 16;

/// Parses `/proc/[pid]/net/dev` content.
///
/// The first two lines are headers (they contain `|`). Each following line
/// is `iface: <8 rx columns> <8 tx columns>`, bytes first in each group.
pub fn parse_net_dev(content: &str) -> Result<Vec<NetDevStats>, ParseError> {
    let mut devices = Vec::new();

    for line in content.lines() {
        if line.contains('|') || line.trim().is_empty() {
            continue;
        }

        let Some((interface, values)) = line.split_once(':') else {
            return Err(ParseError::new(format!("malformed net/dev line: {}", line)));
        };
        let interface = interface.trim();

        let values = values
            .split_whitespace()
            .map(|v| {
                v.parse::<u64>()
                    .map_err(|_| ParseError::new(format!("invalid counter for {}: {}", interface, v)))
            })
            .collect::<Result<Vec<_>, _>>()?;
        if values.len() < NET_DEV_COLUMNS {
            return Err(ParseError::new(format!(
                "not enough fields for {}: expected {}, got {}",
                interface,
                NET_DEV_COLUMNS,
                values.len()
            )));
        }

        devices.push(NetDevStats {
            interface: interface.to_string(),
            rx_bytes: values[0],
            tx_bytes: values[8],
        });
    }

    Ok(devices)
}
