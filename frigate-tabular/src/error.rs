//! Error types for table persistence.

use thiserror::Error;

/// Errors from saving or loading tables.
#[derive(Debug, Error)]
pub enum TabularError {
    /// Filesystem failure (write, read, rename, delete)
    #[error("I/O error: {0}")]
    Io(String),

    /// Row serialization failure
    #[error("JSON error: {0}")]
    Json(#[from] serde_json::Error),

    /// A stored row could not be decoded
    #[error("Corrupt table {path} at line {line}: {message}")]
    Corrupt {
        path: String,
        line: usize,
        message: String,
    },

    /// No table is stored under the requested name
    #[error("Table not found: {0}")]
    NotFound(String),

    /// Unknown format name or extension
    #[error("Unsupported table format: {0}")]
    UnsupportedFormat(String),

    /// Table name would escape the store directory
    #[error("Invalid table name '{0}': must be a relative path without '..'")]
    InvalidName(String),
}

impl TabularError {
    pub fn io(msg: impl Into<String>) -> Self {
        TabularError::Io(msg.into())
    }
}

/// Result type for tabular operations.
pub type Result<T> = std::result::Result<T, TabularError>;
