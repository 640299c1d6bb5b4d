//! Error types for frigate-core

use thiserror::Error;

/// Result type alias using our Error
pub type Result<T> = std::result::Result<T, Error>;

/// Core error type
#[derive(Error, Debug)]
pub enum Error {
    /// Window bounds or program ids are unusable
    #[error("Invalid query window: {0}")]
    InvalidWindow(String),

    /// A catalog row is missing a required field or has the wrong type
    #[error("Schema error: {0}")]
    Schema(String),

    /// A time value could not be parsed or represented
    #[error("Invalid time: {0}")]
    InvalidTime(String),
}

impl Error {
    /// Create a schema error
    pub fn schema(msg: impl Into<String>) -> Self {
        Error::Schema(msg.into())
    }

    /// Create an invalid window error
    pub fn invalid_window(msg: impl Into<String>) -> Self {
        Error::InvalidWindow(msg.into())
    }
}

/// Longest remote error message kept in an error value.
pub const MAX_ERROR_MESSAGE_CHARS: usize = 1000;

/// Truncate a remote error message to [`MAX_ERROR_MESSAGE_CHARS`] characters.
pub fn truncate_message(msg: &str) -> String {
    match msg.char_indices().nth(MAX_ERROR_MESSAGE_CHARS) {
        Some((idx, _)) => msg[..idx].to_string(),
        None => msg.to_string(),
    }
}
