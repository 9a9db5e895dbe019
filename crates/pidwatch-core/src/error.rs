//! Error types for collection and configuration.
//!
//! Snapshot assembly reads several independent `/proc` files per process.
//! One failed read must not hide the others, so failures are gathered in an
//! [`ErrorAggregator`] and surfaced together as a [`CompositeError`].

use std::fmt;

use serde::Serialize;
use thiserror::Error;

/// Separator between entries of a rendered [`CompositeError`].
pub const COMPOSITE_SEPARATOR: &str = "; ";

/// Errors that abort a whole collection call.
#[derive(Error, Debug)]
pub enum CollectError {
    /// The process directory does not exist (never existed or already exited).
    #[error("process {0} not found")]
    ProcessNotFound(u32),

    /// System-wide statistics could not be read.
    #[error("system stat unavailable: {0}")]
    SystemStat(String),

    /// I/O error reading a `/proc` file.
    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),

    /// Malformed `/proc` content.
    #[error("parse error: {0}")]
    Parse(String),
}

/// Errors raised while loading or validating monitor configuration.
#[derive(Error, Debug)]
pub enum ConfigError {
    #[error("failed to read config {path}: {source}")]
    Read {
        path: String,
        source: std::io::Error,
    },

    #[error("invalid config {path}: {source}")]
    Parse {
        path: String,
        source: toml::de::Error,
    },

    #[error("no pids configured")]
    NoPids,

    #[error("{0} must be greater than zero")]
    Zero(&'static str),
}

/// One failed sub-read: which fact failed and why.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct SourceFailure {
    pub label: String,
    pub message: String,
}

impl fmt::Display for SourceFailure {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}: {}", self.label, self.message)
    }
}

/// Several labeled failures reported as one error, in recording order.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct CompositeError {
    failures: Vec<SourceFailure>,
}

impl CompositeError {
    pub fn failures(&self) -> &[SourceFailure] {
        &self.failures
    }

    /// Labels of all failures, in recording order.
    pub fn labels(&self) -> impl Iterator<Item = &str> {
        self.failures.iter().map(|f| f.label.as_str())
    }

    /// Whether a failure with the given label was recorded.
    pub fn mentions(&self, label: &str) -> bool {
        self.failures.iter().any(|f| f.label == label)
    }

    pub fn len(&self) -> usize {
        self.failures.len()
    }

    pub fn is_empty(&self) -> bool {
        self.failures.is_empty()
    }
}

impl fmt::Display for CompositeError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        for (i, failure) in self.failures.iter().enumerate() {
            if i > 0 {
                f.write_str(COMPOSITE_SEPARATOR)?;
            }
            write!(f, "{}", failure)?;
        }
        Ok(())
    }
}

impl std::error::Error for CompositeError {}

/// Accumulates labeled failures from independent sub-operations.
///
/// Never deduplicates and never drops entries.
#[derive(Debug, Default)]
pub struct ErrorAggregator {
    failures: Vec<SourceFailure>,
}

impl ErrorAggregator {
    pub fn new() -> Self {
        Self::default()
    }

    /// Appends a failure under `label`.
    pub fn record(&mut self, label: impl Into<String>, err: impl fmt::Display) {
        self.failures.push(SourceFailure {
            label: label.into(),
            message: err.to_string(),
        });
    }

    pub fn is_empty(&self) -> bool {
        self.failures.is_empty()
    }

    pub fn len(&self) -> usize {
        self.failures.len()
    }

    /// Returns `None` if nothing was recorded, otherwise every failure as one error.
    pub fn result(self) -> Option<CompositeError> {
        if self.failures.is_empty() {
            None
        } else {
            Some(CompositeError {
                failures: self.failures,
            })
        }
    }
}
