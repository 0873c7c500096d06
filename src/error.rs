//! Error types for the host-activity monitor.

use std::path::PathBuf;

use thiserror::Error;

/// Errors raised by the monitors and their platform sources.
///
/// None of these terminate the process. Each monitor either absorbs the error
/// as degraded data or stops its own loop.
#[derive(Error, Debug)]
pub enum MonitorError {
    /// The watch root could not be opened for change notifications.
    #[error("cannot open directory {}: {source}", path.display())]
    WatchOpen {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    /// A blocking change-notification read failed.
    #[error("directory change read failed: {0}")]
    WatchRead(#[source] std::io::Error),

    /// The blocking read was cancelled by a shutdown request.
    #[error("directory watch interrupted")]
    WatchInterrupted,

    /// The process list could not be captured.
    #[error("process enumeration failed: {0}")]
    Enumeration(String),

    /// The host has no implementation for this source.
    #[error("{0} is not supported on this platform")]
    Unsupported(&'static str),

    #[error("configuration error: {0}")]
    Config(#[from] ConfigError),

    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),
}

/// Configuration errors.
#[derive(Error, Debug)]
pub enum ConfigError {
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    #[error("parse error: {0}")]
    Parse(#[source] serde_json::Error),

    #[error("serialize error: {0}")]
    Serialize(#[source] serde_json::Error),

    /// A config file named on the command line is missing.
    #[error("config file {} does not exist", .0.display())]
    NotFound(PathBuf),

    /// A value is out of range.
    #[error("invalid {field}: {reason}")]
    Invalid { field: &'static str, reason: String },
}
