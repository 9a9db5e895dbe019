//! Mock filesystem implementations for testing.
//!
//! This module provides `MockFs` and pre-built scenarios for exercising
//! the collectors without access to a real `/proc`.

mod filesystem;
mod scenarios;

pub use filesystem::MockFs;
