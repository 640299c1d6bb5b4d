//! Table persistence for frigate.
//!
//! The pipeline treats "save/load a table" as an opaque capability; this crate
//! provides it. Both the run-level output and the low-memory spill files go
//! through the same [`TableStore`] trait.
//!
//! # Design
//!
//! - **Row layout preserved**: rows are stored exactly as their flattened
//!   serde form, so a reloaded table compares equal to the saved one
//! - **Format by extension**: [`TableFormat`] owns the file extension and codec
//! - **Atomic writes**: files are written to a temporary sibling then renamed,
//!   so a crashed run never leaves a truncated output behind

pub mod error;
pub mod format;
pub mod manifest;
pub mod store;

pub use error::{Result, TabularError};
pub use format::TableFormat;
pub use manifest::TableManifest;
pub use store::{FileTableStore, MemoryTableStore, TableStore};
