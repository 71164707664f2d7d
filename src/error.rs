//! Error types for the exporter.

use std::time::Duration;
use thiserror::Error;

/// A specialized Result type for exporter operations.
pub type Result<T> = std::result::Result<T, Error>;

/// The error type for exporter operations.
///
/// Connection and configuration failures surface as liveness or fatal
/// signals; everything else is recovered locally by the scrape engine and
/// only visible through the per-context error counters and logs.
#[derive(Debug, Error)]
pub enum Error {
    /// Opening or probing the database connection failed.
    #[error("database connection failed: {0}")]
    Connection(String),
    /// A query did not return before its deadline.
    #[error("query timed out after {0:?}")]
    QueryTimeout(Duration),
    /// A query failed for a reason other than the deadline.
    #[error("query failed: {0}")]
    Query(String),
    /// A definition with `ignorezeroresult = false` produced no samples.
    #[error("no metrics found while parsing")]
    ZeroResult,
    /// A malformed definition source or service configuration.
    #[error("invalid configuration: {0}")]
    Config(String),
    /// I/O errors
    #[error(transparent)]
    Io(#[from] std::io::Error),
}

impl From<config::ConfigError> for Error {
    fn from(err: config::ConfigError) -> Self {
        Error::Config(err.to_string())
    }
}

impl From<prometheus::Error> for Error {
    fn from(err: prometheus::Error) -> Self {
        Error::Config(err.to_string())
    }
}
