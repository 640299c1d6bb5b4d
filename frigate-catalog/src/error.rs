//! Error types for primary catalog operations

use frigate_core::truncate_message;
use frigate_tabular::TabularError;
use thiserror::Error;

/// Errors from counting or fetching catalog pages
#[derive(Debug, Error)]
pub enum CatalogError {
    /// Could not reach the catalog service
    #[error("Catalog connection failed: {0}")]
    Connection(String),

    /// The catalog answered with a non-success status
    #[error("Catalog query failed: {message}")]
    Query {
        /// HTTP status when the failure came from the transport layer
        status: Option<u16>,
        /// Remote message, truncated to 1000 characters
        message: String,
    },

    /// The count query succeeded but carried no numeric value
    #[error("Catalog returned no count for the window")]
    NoCountReturned,

    /// Response body missing an expected field or of the wrong shape
    #[error("Catalog schema error: {0}")]
    Schema(String),

    /// Invalid fetch or client configuration
    #[error("Configuration error: {0}")]
    Config(String),

    /// Writing, reloading or deleting a spill file failed
    #[error("Spill I/O failure: {0}")]
    Spill(#[from] TabularError),

    /// Reading or writing a completed run in the output store failed
    #[error("Output store failure: {0}")]
    Output(#[source] TabularError),

    /// A fetch worker panicked before reporting its page
    #[error("Fetch worker failed: {0}")]
    WorkerPanicked(String),
}

impl CatalogError {
    /// Build a query failure, truncating the remote message.
    pub fn query(status: Option<u16>, message: &str) -> Self {
        CatalogError::Query {
            status,
            message: truncate_message(message),
        }
    }

    /// Whether a retry could plausibly succeed.
    pub fn is_transient(&self) -> bool {
        match self {
            CatalogError::Connection(_) => true,
            CatalogError::Query {
                status: Some(status),
                ..
            } => frigate_core::is_transient_status(*status),
            _ => false,
        }
    }
}

impl From<frigate_core::Error> for CatalogError {
    fn from(e: frigate_core::Error) -> Self {
        match e {
            frigate_core::Error::Schema(msg) => CatalogError::Schema(msg),
            other => CatalogError::Config(other.to_string()),
        }
    }
}

pub type Result<T> = std::result::Result<T, CatalogError>;
