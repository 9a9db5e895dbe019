//! Metrics collection from the Linux `/proc` filesystem.
//!
//! # Architecture
//!
//! ```text
//! ┌──────────────────────────────────────────────────────────┐
//! │                    ProcessCollector                      │
//! │  - /proc/[pid]/{stat,cmdline,status,io,limits}           │
//! │  - /proc/[pid]/net/dev, /proc/[pid]/fd/                  │
//! │             ┌──────────────────────────────┐             │
//! │             │       SystemCollector        │             │
//! │             │  - /proc/stat, /proc/cpuinfo │             │
//! │             └──────────────┬───────────────┘             │
//! │                     ┌──────▼──────┐                      │
//! │                     │  FileSystem │ (trait)              │
//! │                     └──────┬──────┘                      │
//! └────────────────────────────┼─────────────────────────────┘
//!                ┌─────────────┼─────────────┐
//!         ┌──────▼──────┐ ┌────▼────┐ ┌──────▼──────┐
//!         │   RealFs    │ │ MockFs  │ │  Scenarios  │
//!         └─────────────┘ └─────────┘ └─────────────┘
//! ```
//!
//! # Usage
//!
//! ```
//! use pidwatch_core::collector::{MockFs, ProcessCollector};
//!
//! let fs = MockFs::typical_system();
//! let collector = ProcessCollector::new(fs, "/proc");
//! let snapshot = collector.collect_process(1000).unwrap();
//! assert_eq!(snapshot.name, "bash");
//! assert!(snapshot.assembly_error.is_none());
//! ```

pub mod mock;
pub mod procfs;
pub mod traits;

pub use mock::MockFs;
pub use procfs::{ProcessCollector, SystemCollector};
pub use traits::{FileSystem, RealFs};
