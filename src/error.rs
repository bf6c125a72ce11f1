//! Error types for lease log parsing and vendor lookups.
//!
//! All fallible operations in this crate return [`Result<T>`], which uses
//! the [`Error`] enum for error variants. Every variant is fatal for a run:
//! the report is either produced in full or not at all.

use std::path::PathBuf;

/// Errors that can occur while building the vendor store or producing a report.
#[derive(Debug, thiserror::Error)]
pub enum Error {
    /// Read error on the lease log or the OUI registry.
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    /// An input file could not be opened.
    #[error("Failed to open {path}: {source}")]
    OpenFile {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    /// JSON serialization/deserialization error (config file or JSON report).
    #[error("JSON error: {0}")]
    Json(#[from] serde_json::Error),

    /// Vendor store open, query or transaction failure.
    #[error("Database error: {0}")]
    Database(#[from] rusqlite::Error),

    /// Invalid configuration.
    ///
    /// Returned by [`Config::validate`](crate::Config::validate).
    #[error("Invalid configuration: {0}")]
    InvalidConfig(String),

    /// The address in a `lease <ip> {` header could not be parsed.
    #[error("Line {line}: invalid lease address '{value}'")]
    InvalidAddress { line: usize, value: String },

    /// A `starts`, `ends` or `cltt` directive carried an unparseable timestamp.
    #[error("Line {line}: invalid {field} timestamp '{value}'")]
    InvalidTimestamp {
        line: usize,
        field: &'static str,
        value: String,
    },

    /// A `hardware ethernet` directive carried an unparseable address.
    #[error("Line {line}: invalid hardware address '{value}'")]
    InvalidHardwareAddress { line: usize, value: String },

    /// A background ingestion task panicked or was cancelled.
    #[error("Task failed: {0}")]
    Task(String),
}

/// A specialized Result type for lease scanning operations.
pub type Result<T> = std::result::Result<T, Error>;
