//! # Frigate Core
//!
//! Data model shared by every stage of the candidate acquisition pipeline.
//!
//! This crate provides:
//! - [`QueryWindow`]: the immutable scope of one run (time range, program ids,
//!   optional object ids)
//! - [`PageRequest`] and [`Projection`]: one stateless page of the primary catalog
//! - [`CandidateRecord`] / [`CandidateTable`]: flattened catalog rows plus the
//!   annotations added during assembly
//! - [`FilterMatchIndex`] and [`ObjectMetadata`]: results from the secondary service
//! - Julian-date helpers in [`time`]
//! - [`RetryPolicy`] shared by the remote clients
//!
//! No I/O happens here; the catalog, secondary-service and persistence crates
//! build on these types.

pub mod error;
pub mod matches;
pub mod metadata;
pub mod record;
pub mod request;
pub mod retry;
pub mod table;
pub mod time;
pub mod window;

pub use error::{truncate_message, Error, Result, MAX_ERROR_MESSAGE_CHARS};
pub use matches::FilterMatchIndex;
pub use metadata::{ObjectAnnotations, ObjectMetadata};
pub use record::{flatten_document, CandidateRecord, FlatRow, CANDID_KEY, JD_KEY, OBJECT_ID_KEY};
pub use request::{PageRequest, Projection, DEFAULT_PAGE_SIZE};
pub use retry::{is_transient_status, RetryPolicy};
pub use table::CandidateTable;
pub use window::{short_digest, QueryWindow};
