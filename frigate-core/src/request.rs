//! Page requests against the primary catalog.

use crate::window::QueryWindow;
use std::sync::Arc;

/// Rows per catalog page.
pub const DEFAULT_PAGE_SIZE: usize = 10_000;

/// Which top-level fields a `find` returns.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Projection {
    pub include: Vec<String>,
    pub exclude: Vec<String>,
}

impl Projection {
    /// The projection used for candidate retrieval: drop the storage id, keep
    /// the alert id, object id, candidate payload and classifications.
    pub fn candidates() -> Self {
        Self {
            include: ["candid", "objectId", "candidate", "classifications"]
                .into_iter()
                .map(String::from)
                .collect(),
            exclude: vec!["_id".to_string()],
        }
    }
}

impl Default for Projection {
    fn default() -> Self {
        Self::candidates()
    }
}

/// One stateless, independently executable page of a `find`.
#[derive(Debug, Clone)]
pub struct PageRequest {
    /// Position of this page in the plan.
    pub index: usize,
    pub window: Arc<QueryWindow>,
    pub projection: Arc<Projection>,
    pub limit: usize,
    pub skip: usize,
}

impl PageRequest {
    /// Half-open offset range `[skip, skip + limit)` this page covers.
    pub fn offset_range(&self) -> std::ops::Range<usize> {
        self.skip..self.skip + self.limit
    }
}
