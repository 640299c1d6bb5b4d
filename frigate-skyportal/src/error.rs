//! Error types for secondary service operations

use frigate_core::truncate_message;
use thiserror::Error;

/// Errors from filter-match pagination and object metadata lookups
#[derive(Debug, Error)]
pub enum SkyPortalError {
    /// Could not reach the service
    #[error("SkyPortal connection failed: {0}")]
    Connection(String),

    /// The service answered with a non-success status
    #[error("SkyPortal query failed: {message}")]
    Query {
        status: Option<u16>,
        /// Remote message, truncated to 1000 characters
        message: String,
    },

    /// Neither group ids nor filter ids were given
    #[error("No group ids or filter ids provided")]
    NoSelectorProvided,

    /// Response body missing an expected field or of the wrong shape
    #[error("SkyPortal schema error: {0}")]
    Schema(String),

    #[error("Configuration error: {0}")]
    Config(String),

    /// `total_matches` shrank between pages
    #[error("Total matches regressed from {previous} to {reported}")]
    TotalMatchesRegressed { previous: u64, reported: u64 },

    /// An empty page arrived before all matches were seen
    #[error("Pagination stalled at page {page}: {seen} of {total} matches seen")]
    PaginationStalled { page: usize, seen: u64, total: u64 },

    #[error("Pagination exceeded {limit} pages")]
    PageLimitExceeded { limit: usize },
}

impl SkyPortalError {
    /// Build a query failure, truncating the remote message.
    pub fn query(status: Option<u16>, message: &str) -> Self {
        SkyPortalError::Query {
            status,
            message: truncate_message(message),
        }
    }

    /// Whether a retry could plausibly succeed.
    pub fn is_transient(&self) -> bool {
        match self {
            SkyPortalError::Connection(_) => true,
            SkyPortalError::Query {
                status: Some(status),
                ..
            } => frigate_core::is_transient_status(*status),
            _ => false,
        }
    }
}

impl From<frigate_core::Error> for SkyPortalError {
    fn from(e: frigate_core::Error) -> Self {
        match e {
            frigate_core::Error::Schema(msg) => SkyPortalError::Schema(msg),
            other => SkyPortalError::Config(other.to_string()),
        }
    }
}

pub type Result<T> = std::result::Result<T, SkyPortalError>;
