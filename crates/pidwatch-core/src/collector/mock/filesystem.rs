//! In-memory `/proc` for tests.
//!
//! Tests describe any proc state with it, including half-exited processes
//! and files the monitor is not allowed to read.

use std::collections::{BTreeMap, HashSet};
use std::io;
use std::ops::Bound;
use std::path::{Path, PathBuf};

use crate::collector::traits::FileSystem;

#[derive(Debug, Clone)]
enum Node {
    File(String),
    Dir,
}

/// In-memory filesystem.
///
/// Paths passed to [`deny`](MockFs::deny) stay visible to `exists` but fail
/// every read with `PermissionDenied`, like `/proc/[pid]/io` of another
/// user's process.
#[derive(Debug, Clone, Default)]
pub struct MockFs {
    /// Ordered so a directory's descendants are contiguous.
    nodes: BTreeMap<PathBuf, Node>,
    denied: HashSet<PathBuf>,
}

impl MockFs {
    pub fn new() -> Self {
        Self::default()
    }

    /// Adds or replaces a file, creating missing parent directories.
    pub fn add_file(&mut self, path: impl AsRef<Path>, content: impl Into<String>) {
        let path = path.as_ref();
        self.add_parents(path);
        self.nodes
            .insert(path.to_path_buf(), Node::File(content.into()));
    }

    /// Adds an empty directory, creating missing parents.
    pub fn add_dir(&mut self, path: impl AsRef<Path>) {
        let path = path.as_ref();
        self.add_parents(path);
        self.nodes.insert(path.to_path_buf(), Node::Dir);
    }

    fn add_parents(&mut self, path: &Path) {
        for ancestor in path.ancestors().skip(1) {
            if ancestor.as_os_str().is_empty() {
                continue;
            }
            self.nodes
                .entry(ancestor.to_path_buf())
                .or_insert(Node::Dir);
        }
    }

    /// Removes a single file, leaving its directory in place.
    pub fn remove_file(&mut self, path: impl AsRef<Path>) {
        if let Some(Node::File(_)) = self.nodes.get(path.as_ref()) {
            self.nodes.remove(path.as_ref());
        }
    }

    /// Removes a directory and everything below it, as when a process exits.
    pub fn remove_tree(&mut self, path: impl AsRef<Path>) {
        let root = path.as_ref();
        self.nodes.retain(|p, _| !p.starts_with(root));
        self.denied.retain(|p| !p.starts_with(root));
    }

    /// Makes reads of `path` fail with `PermissionDenied`.
    ///
    /// Works for both files and directories.
    pub fn deny(&mut self, path: impl AsRef<Path>) {
        self.denied.insert(path.as_ref().to_path_buf());
    }

    /// Adds a process with its core `/proc/[pid]/` files.
    ///
    /// `io` may be empty to leave `/proc/[pid]/io` out; `cmdline` is NUL
    /// separated.
    pub fn add_process(&mut self, pid: u32, stat: &str, status: &str, io: &str, cmdline: &str) {
        let dir = PathBuf::from(format!("/proc/{}", pid));
        self.add_dir(&dir);
        for (name, content) in [("stat", stat), ("status", status), ("cmdline", cmdline)] {
            self.add_file(dir.join(name), content);
        }
        if !io.is_empty() {
            self.add_file(dir.join("io"), io);
        }
    }

    /// Writes `/proc/[pid]/limits` with the given open-files soft and hard limits.
    pub fn add_limits(&mut self, pid: u32, soft: &str, hard: &str) {
        let rows = [
            ("Max cpu time", "unlimited", "unlimited", "seconds"),
            ("Max file size", "unlimited", "unlimited", "bytes"),
            ("Max processes", "63354", "63354", "processes"),
            ("Max open files", soft, hard, "files"),
            ("Max locked memory", "8388608", "8388608", "bytes"),
        ];
        let mut content = format!(
            "{:<26}{:<21}{:<21}{}\n",
            "Limit", "Soft Limit", "Hard Limit", "Units"
        );
        for (name, soft, hard, units) in rows {
            content.push_str(&format!("{:<26}{:<21}{:<21}{}\n", name, soft, hard, units));
        }
        self.add_file(format!("/proc/{}/limits", pid), content);
    }

    /// Writes `/proc/[pid]/net/dev` with one line per `(interface, rx_bytes, tx_bytes)`.
    pub fn add_net_dev(&mut self, pid: u32, interfaces: &[(&str, u64, u64)]) {
        let mut content = String::from(
            "Inter-|   Receive                                                |  Transmit\n \
             face |bytes    packets errs drop fifo frame compressed multicast|bytes    packets errs drop fifo colls carrier compressed\n",
        );
        for (name, rx, tx) in interfaces {
            content.push_str(&format!(
                "{:>6}: {} 100 0 0 0 0 0 0 {} 50 0 0 0 0 0 0\n",
                name, rx, tx
            ));
        }
        self.add_file(format!("/proc/{}/net/dev", pid), content);
    }

    /// Replaces `/proc/[pid]/fd/` with `count` descriptor entries.
    pub fn add_fds(&mut self, pid: u32, count: usize) {
        let dir = PathBuf::from(format!("/proc/{}/fd", pid));
        self.remove_tree(&dir);
        self.add_dir(&dir);
        for fd in 0..count {
            self.add_file(dir.join(fd.to_string()), "");
        }
    }

    /// Loads a captured proc tree from disk, mounted at `/proc`.
    ///
    /// Files that are not valid UTF-8 are skipped.
    pub fn from_snapshot(dir: &Path) -> io::Result<Self> {
        let mut fs = Self::new();
        fs.load_tree(dir, Path::new("/proc"))?;
        Ok(fs)
    }

    fn load_tree(&mut self, on_disk: &Path, mounted: &Path) -> io::Result<()> {
        self.add_dir(mounted);
        for entry in std::fs::read_dir(on_disk)? {
            let entry = entry?;
            let target = mounted.join(entry.file_name());
            let kind = entry.file_type()?;
            if kind.is_dir() {
                self.load_tree(&entry.path(), &target)?;
            } else if kind.is_file()
                && let Ok(content) = std::fs::read_to_string(entry.path())
            {
                self.add_file(target, content);
            }
        }
        Ok(())
    }

    fn check_denied(&self, path: &Path) -> io::Result<()> {
        if self.denied.contains(path) {
            return Err(io::Error::new(
                io::ErrorKind::PermissionDenied,
                format!("permission denied: {}", path.display()),
            ));
        }
        Ok(())
    }
}

fn not_found(path: &Path) -> io::Error {
    io::Error::new(
        io::ErrorKind::NotFound,
        format!("no such file or directory: {}", path.display()),
    )
}

impl FileSystem for MockFs {
    fn read_to_string(&self, path: &Path) -> io::Result<String> {
        self.check_denied(path)?;
        match self.nodes.get(path) {
            Some(Node::File(content)) => Ok(content.clone()),
            Some(Node::Dir) => Err(io::Error::new(
                io::ErrorKind::InvalidInput,
                format!("is a directory: {}", path.display()),
            )),
            None => Err(not_found(path)),
        }
    }

    fn exists(&self, path: &Path) -> bool {
        self.nodes.contains_key(path)
    }

    fn read_dir(&self, path: &Path) -> io::Result<Vec<PathBuf>> {
        self.check_denied(path)?;
        match self.nodes.get(path) {
            Some(Node::Dir) => {}
            Some(Node::File(_)) => {
                return Err(io::Error::new(
                    io::ErrorKind::InvalidInput,
                    format!("not a directory: {}", path.display()),
                ));
            }
            None => return Err(not_found(path)),
        }

        Ok(self
            .nodes
            .range::<Path, _>((Bound::Excluded(path), Bound::Unbounded))
            .take_while(|(p, _)| p.starts_with(path))
            .filter(|(p, _)| p.parent() == Some(path))
            .map(|(p, _)| p.clone())
            .collect())
    }
}
