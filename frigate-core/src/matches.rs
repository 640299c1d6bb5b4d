//! Reverse index from filter id to the candids that passed it.

use serde::{Deserialize, Serialize};
use std::collections::{BTreeMap, BTreeSet};

/// `filter_id -> {candid}` built incrementally from secondary-service pages.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(transparent)]
pub struct FilterMatchIndex {
    matches: BTreeMap<i64, BTreeSet<i64>>,
}

impl FilterMatchIndex {
    pub fn new() -> Self {
        Self::default()
    }

    /// Record that `candid` passed `filter_id`. Returns `false` for a repeat.
    pub fn insert(&mut self, filter_id: i64, candid: i64) -> bool {
        self.matches.entry(filter_id).or_default().insert(candid)
    }

    /// Whether `candid` passed `filter_id`.
    pub fn contains(&self, filter_id: i64, candid: i64) -> bool {
        self.matches
            .get(&filter_id)
            .is_some_and(|set| set.contains(&candid))
    }

    /// Iterate `(filter_id, candids)` in ascending filter id order.
    pub fn iter(&self) -> impl Iterator<Item = (i64, &BTreeSet<i64>)> {
        self.matches.iter().map(|(f, s)| (*f, s))
    }

    pub fn is_empty(&self) -> bool {
        self.matches.is_empty()
    }

    /// Total `(filter, candid)` pairs.
    pub fn total_matches(&self) -> usize {
        self.matches.values().map(BTreeSet::len).sum()
    }

    /// Every candid matched by any filter.
    pub fn all_candids(&self) -> BTreeSet<i64> {
        self.matches.values().flatten().copied().collect()
    }

    /// `(filter_id, match_count)` sorted by count descending, then filter id.
    ///
    /// Reporting order only; membership is unaffected.
    pub fn by_match_count(&self) -> Vec<(i64, usize)> {
        let mut counts: Vec<(i64, usize)> =
            self.matches.iter().map(|(f, s)| (*f, s.len())).collect();
        counts.sort_by(|a, b| b.1.cmp(&a.1).then(a.0.cmp(&b.0)));
        counts
    }
}
