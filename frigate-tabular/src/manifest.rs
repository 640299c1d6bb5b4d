//! Sidecar describing how a stored table was produced.

use serde::{Deserialize, Serialize};

/// Written next to a completed run's table.
///
/// `source_count` is the catalog count the run was fetched against; it can
/// differ from `rows` once duplicate alerts are dropped.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct TableManifest {
    pub rows: usize,
    pub source_count: u64,
}

impl TableManifest {
    pub fn new(rows: usize, source_count: u64) -> Self {
        Self { rows, source_count }
    }
}
