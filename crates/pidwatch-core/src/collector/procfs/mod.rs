//! Collectors for the Linux `/proc` filesystem.
//!
//! This module provides parsers and collectors for reading process and
//! system information from the `/proc` virtual filesystem.

pub mod parser;
pub mod process;
pub mod system;

pub use process::{DEFAULT_PAGE_SIZE, Fact, ProcessCollector};
pub use system::{DEFAULT_TICK_RATE, SystemCollector};
