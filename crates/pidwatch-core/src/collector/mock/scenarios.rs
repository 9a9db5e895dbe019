//! Pre-built mock filesystem scenarios for testing.
//!
//! These scenarios provide realistic `/proc` states, plus helpers for
//! moving counters forward between two samples.

use super::filesystem::MockFs;
use crate::collector::traits::FileSystem;
use std::path::PathBuf;

/// Boot time used by every scenario (`btime` in `/proc/stat`).
pub const MOCK_BOOT_TIME: u64 = 1_700_000_000;

impl MockFs {
    /// Creates a typical system with a few fully readable processes.
    ///
    /// Includes: init (PID 1), bash shell (PID 1000) and nginx (PID 1001),
    /// on a 4-CPU host.
    pub fn typical_system() -> Self {
        let mut fs = Self::new();

        fs.add_file(
            "/proc/stat",
            "\
cpu  10000 500 3000 80000 1000 200 100 50 20 7
cpu0 2500 125 750 20000 250 50 25 12 5 2
cpu1 2500 125 750 20000 250 50 25 12 5 2
cpu2 2500 125 750 20000 250 50 25 13 5 2
cpu3 2500 125 750 20000 250 50 25 13 5 1
intr 1000000 50 0 0 0 0 0 0 0 1 0 0 0 100 0 0 1000
ctxt 500000
btime 1700000000
processes 10000
procs_running 2
procs_blocked 0
",
        );
        fs.add_file("/proc/cpuinfo", cpuinfo(4));

        // PID 1 - init/systemd
        fs.add_process(
            1,
            "1 (systemd) S 0 1 1 0 -1 4194560 50000 1000000 100 500 1000 500 2000 1000 20 0 1 0 1 170000000 3000 18446744073709551615 0 0 0 0 0 0 0 0 1073745152 0 0 0 17 0 0 0 0 0 0 0 0 0 0 0 0 0 0",
            "\
Name:\tsystemd
State:\tS (sleeping)
Pid:\t1
PPid:\t0
Threads:\t1
VmSize:\t  170000 kB
VmRSS:\t    12000 kB
VmSwap:\t        0 kB
voluntary_ctxt_switches:\t1000
nonvoluntary_ctxt_switches:\t100
",
            "rchar: 100000000\nwchar: 50000000\nsyscr: 50000\nsyscw: 25000\nread_bytes: 10000000\nwrite_bytes: 5000000\ncancelled_write_bytes: 0\n",
            "/sbin/init\0splash\0",
        );
        fs.add_limits(1, "524288", "524288");
        fs.add_net_dev(1, &[("lo", 12345678, 12345678), ("eth0", 987654321, 123456789)]);
        fs.add_fds(1, 64);

        // PID 1000 - bash shell
        fs.add_process(
            1000,
            "1000 (bash) S 999 1000 1000 34816 1001 4194304 5000 50000 10 0 100 50 200 100 20 0 1 0 100000 25000000 2000 18446744073709551615 0 0 0 0 0 0 65536 3670020 1266777851 0 0 0 17 2 0 0 0 0 0 0 0 0 0 0 0 0 0",
            "\
Name:\tbash
State:\tS (sleeping)
Pid:\t1000
PPid:\t999
Threads:\t1
VmSize:\t   25000 kB
VmRSS:\t    8000 kB
VmSwap:\t      128 kB
voluntary_ctxt_switches:\t500
nonvoluntary_ctxt_switches:\t50
",
            "rchar: 1000000\nwchar: 500000\nsyscr: 5000\nsyscw: 2500\nread_bytes: 100000\nwrite_bytes: 50000\ncancelled_write_bytes: 0\n",
            "/bin/bash\0--login\0",
        );
        fs.add_limits(1000, "1024", "4096");
        fs.add_net_dev(1000, &[("lo", 1000, 1000), ("eth0", 5000, 3000)]);
        fs.add_fds(1000, 4);

        // PID 1001 - nginx worker
        fs.add_process(
            1001,
            "1001 (nginx) S 1 1001 1001 0 -1 4194560 20000 0 5 0 3000 1500 0 0 20 0 4 0 200000 150000000 10000 18446744073709551615 0 0 0 0 0 0 0 0 0 0 0 0 17 1 0 0 0 0 0 0 0 0 0 0 0 0 0",
            "\
Name:\tnginx
State:\tS (sleeping)
Pid:\t1001
PPid:\t1
Threads:\t4
VmSize:\t  150000 kB
VmRSS:\t   40000 kB
VmSwap:\t        0 kB
voluntary_ctxt_switches:\t20000
nonvoluntary_ctxt_switches:\t300
",
            "rchar: 50000000\nwchar: 70000000\nsyscr: 40000\nsyscw: 60000\nread_bytes: 4096000\nwrite_bytes: 8192000\ncancelled_write_bytes: 0\n",
            "nginx: worker process\0",
        );
        fs.add_limits(1001, "unlimited", "unlimited");
        fs.add_net_dev(1001, &[("lo", 100, 100), ("eth0", 700000, 900000)]);
        fs.add_fds(1001, 32);

        fs
    }

    /// Typical system where PID 1001 belongs to another user: its `io` file
    /// and `fd/` directory are unreadable.
    pub fn with_unreadable_io() -> Self {
        let mut fs = Self::typical_system();
        fs.deny("/proc/1001/io");
        fs.deny("/proc/1001/fd");
        fs
    }

    /// Typical system where `/proc/1000/stat` vanished between directory
    /// lookup and read.
    pub fn with_missing_stat() -> Self {
        let mut fs = Self::typical_system();
        fs.remove_file("/proc/1000/stat");
        fs
    }

    /// Typical system where PID 1000 lives in a network namespace without
    /// interfaces.
    pub fn with_empty_net_namespace() -> Self {
        let mut fs = Self::typical_system();
        fs.add_net_dev(1000, &[]);
        fs
    }

    /// Typical system plus a zombie (PID 4000) with only `stat`, `status`
    /// and an empty `cmdline` left.
    pub fn with_zombie_process() -> Self {
        let mut fs = Self::typical_system();
        fs.add_process(
            4000,
            "4000 (defunct) Z 1000 4000 1000 0 -1 4194308 0 0 0 0 0 0 0 0 20 0 1 0 400000 0 0 18446744073709551615 0 0 0 0 0 0 0 0 0 0 0 0 -1 0 0 0 0 0 0 0 0 0 0 0 0 0 0",
            "Name:\tdefunct\nState:\tZ (zombie)\nPid:\t4000\nPPid:\t1000\nThreads:\t1\n",
            "",
            "",
        );
        fs
    }

    /// Typical system where `/proc/stat` cannot be read at all.
    pub fn with_unreadable_system_stat() -> Self {
        let mut fs = Self::typical_system();
        fs.deny("/proc/stat");
        fs
    }

    /// Rewrites the CPU tick fields (utime, stime, cutime, cstime) of
    /// `/proc/[pid]/stat`, keeping every other field.
    pub fn set_cpu_ticks(&mut self, pid: u32, utime: u64, stime: u64, cutime: u64, cstime: u64) {
        self.replace_stat_fields(
            pid,
            &[(11, utime), (12, stime), (13, cutime), (14, cstime)],
        );
    }

    /// Rewrites the start-time tick offset of `/proc/[pid]/stat`.
    pub fn set_start_ticks(&mut self, pid: u32, starttime: u64) {
        self.replace_stat_fields(pid, &[(19, starttime)]);
    }

    /// Replaces fields of `/proc/[pid]/stat` by index (0 = state, counted
    /// after the closing parenthesis of comm).
    ///
    /// Does nothing if the stat file is absent.
    pub fn replace_stat_fields(&mut self, pid: u32, values: &[(usize, u64)]) {
        let path = PathBuf::from(format!("/proc/{}/stat", pid));
        let Ok(content) = self.read_to_string(&path) else {
            return;
        };
        let Some(close) = content.rfind(')') else {
            return;
        };
        let (head, tail) = content.split_at(close + 1);
        let mut fields: Vec<String> = tail.split_whitespace().map(str::to_string).collect();
        for &(idx, value) in values {
            if let Some(field) = fields.get_mut(idx) {
                *field = value.to_string();
            }
        }
        self.add_file(path, format!("{} {}", head, fields.join(" ")));
    }

    /// Rewrites `/proc/stat` with the given aggregate tick counters spread
    /// over 4 CPUs. All other time-in-state columns are zero.
    pub fn set_system_ticks(&mut self, user: u64, system: u64, idle: u64) {
        let mut content = format!("cpu  {} 0 {} {} 0 0 0 0 0 0\n", user, system, idle);
        for cpu in 0..4 {
            content.push_str(&format!(
                "cpu{} {} 0 {} {} 0 0 0 0 0 0\n",
                cpu,
                user / 4,
                system / 4,
                idle / 4
            ));
        }
        content.push_str(&format!("ctxt 500000\nbtime {}\nprocesses 10000\n", MOCK_BOOT_TIME));
        self.add_file("/proc/stat", content);
    }
}

fn cpuinfo(processors: usize) -> String {
    let mut content = String::new();
    for id in 0..processors {
        content.push_str(&format!(
            "processor\t: {}\nvendor_id\t: GenuineIntel\nmodel name\t: Mock CPU @ 2.40GHz\ncpu MHz\t\t: 2400.000\n\n",
            id
        ));
    }
    content
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::path::Path;

    #[test]
    fn test_typical_system_layout() {
        let fs = MockFs::typical_system();
        for pid in [1, 1000, 1001] {
            for file in ["stat", "status", "io", "cmdline", "limits", "net/dev"] {
                let path = format!("/proc/{}/{}", pid, file);
                assert!(fs.exists(Path::new(&path)), "missing {}", path);
            }
        }
        assert_eq!(fs.read_dir(Path::new("/proc/1000/fd")).unwrap().len(), 4);
    }

    #[test]
    fn test_set_cpu_ticks_keeps_other_fields() {
        let mut fs = MockFs::typical_system();
        fs.set_cpu_ticks(1000, 600, 400, 0, 0);

        let content = fs.read_to_string(Path::new("/proc/1000/stat")).unwrap();
        assert!(content.starts_with("1000 (bash) S 999"));
        let fields: Vec<&str> = content.rsplit_once(')').unwrap().1.split_whitespace().collect();
        assert_eq!(&fields[11..15], &["600", "400", "0", "0"]);
        assert_eq!(fields[19], "100000");
    }

    #[test]
    fn test_set_system_ticks() {
        let mut fs = MockFs::typical_system();
        fs.set_system_ticks(60000, 20000, 20000);

        let content = fs.read_to_string(Path::new("/proc/stat")).unwrap();
        assert!(content.starts_with("cpu  60000 0 20000 20000"));
        assert!(content.contains("btime 1700000000"));
    }
}
