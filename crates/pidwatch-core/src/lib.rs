//! pidwatch-core - snapshot-and-delta engine for per-process resource usage.
//!
//! Provides:
//! - `collector` - `/proc` access (real or mocked), per-process snapshot
//!   assembly and the system-wide CPU sampler
//! - `error` - error types, including the composite error used to report
//!   partial snapshot failures
//! - `model` - snapshot value types
//! - `usage` - delta computation between two snapshots of the same process
//! - `monitor` - the periodic sampling loop over a fixed pid set
//! - `config` - monitor configuration (TOML)

pub mod collector;
pub mod config;
pub mod error;
pub mod model;
pub mod monitor;
pub mod usage;
