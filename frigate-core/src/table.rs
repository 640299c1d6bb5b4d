//! The in-memory candidate table.

use crate::record::CandidateRecord;
use serde::{Deserialize, Serialize};
use std::collections::{BTreeSet, HashMap, HashSet};

/// Ordered collection of candidate records.
///
/// Rows are appended in page-completion order by the fetcher; the global
/// ascending-`jd` order is only established by [`CandidateTable::sort_by_jd`].
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(transparent)]
pub struct CandidateTable {
    records: Vec<CandidateRecord>,
}

impl CandidateTable {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_capacity(capacity: usize) -> Self {
        Self {
            records: Vec::with_capacity(capacity),
        }
    }

    pub fn from_records(records: Vec<CandidateRecord>) -> Self {
        Self { records }
    }

    #[inline]
    pub fn len(&self) -> usize {
        self.records.len()
    }

    #[inline]
    pub fn is_empty(&self) -> bool {
        self.records.is_empty()
    }

    pub fn records(&self) -> &[CandidateRecord] {
        &self.records
    }

    pub fn records_mut(&mut self) -> &mut [CandidateRecord] {
        &mut self.records
    }

    pub fn into_records(self) -> Vec<CandidateRecord> {
        self.records
    }

    pub fn iter(&self) -> std::slice::Iter<'_, CandidateRecord> {
        self.records.iter()
    }

    pub fn push(&mut self, record: CandidateRecord) {
        self.records.push(record);
    }

    /// Append every row of `other`.
    pub fn append(&mut self, other: CandidateTable) {
        self.records.extend(other.records);
    }

    /// Stable sort, ascending by `jd`. Ties keep their current relative order.
    pub fn sort_by_jd(&mut self) {
        self.records.sort_by(|a, b| a.jd.total_cmp(&b.jd));
    }

    /// Whether `jd` is non-decreasing across consecutive rows.
    pub fn is_sorted_by_jd(&self) -> bool {
        self.records.windows(2).all(|w| w[0].jd <= w[1].jd)
    }

    /// Drop rows whose `candid` already appeared earlier; returns the number removed.
    pub fn dedup_by_candid(&mut self) -> usize {
        let before = self.records.len();
        let mut seen = HashSet::with_capacity(before);
        self.records.retain(|r| seen.insert(r.candid));
        before - self.records.len()
    }

    /// Map from `candid` to row position.
    pub fn candid_positions(&self) -> HashMap<i64, usize> {
        self.records
            .iter()
            .enumerate()
            .map(|(i, r)| (r.candid, i))
            .collect()
    }

    /// Distinct object ids of rows with at least one passed filter.
    pub fn objects_with_passed_filters(&self) -> BTreeSet<String> {
        self.records
            .iter()
            .filter(|r| r.has_passed_filters())
            .map(|r| r.object_id.clone())
            .collect()
    }
}

impl IntoIterator for CandidateTable {
    type Item = CandidateRecord;
    type IntoIter = std::vec::IntoIter<CandidateRecord>;

    fn into_iter(self) -> Self::IntoIter {
        self.records.into_iter()
    }
}

impl FromIterator<CandidateRecord> for CandidateTable {
    fn from_iter<T: IntoIterator<Item = CandidateRecord>>(iter: T) -> Self {
        Self {
            records: iter.into_iter().collect(),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::record::FlatRow;

    fn rec(candid: i64, object_id: &str, jd: f64) -> CandidateRecord {
        let mut row = FlatRow::new();
        row.insert("candid".into(), candid.into());
        row.insert("objectId".into(), object_id.into());
        row.insert("candidate.jd".into(), jd.into());
        CandidateRecord::from_flat_row(row).unwrap()
    }

    #[test]
    fn test_sort_is_stable_and_ascending() {
        let mut t: CandidateTable = vec![
            rec(1, "a", 3.0),
            rec(2, "b", 1.0),
            rec(3, "c", 3.0),
            rec(4, "d", 2.0),
        ]
        .into_iter()
        .collect();
        assert!(!t.is_sorted_by_jd());
        t.sort_by_jd();
        assert!(t.is_sorted_by_jd());
        let order: Vec<i64> = t.iter().map(|r| r.candid).collect();
        assert_eq!(order, vec![2, 4, 1, 3]);
    }

    #[test]
    fn test_dedup_keeps_first() {
        let mut t = CandidateTable::from_records(vec![
            rec(1, "a", 1.0),
            rec(2, "b", 2.0),
            rec(1, "a", 9.0),
        ]);
        assert_eq!(t.dedup_by_candid(), 1);
        assert_eq!(t.len(), 2);
        assert_eq!(t.records()[0].jd, 1.0);
    }

    #[test]
    fn test_objects_with_passed_filters() {
        let mut t = CandidateTable::from_records(vec![
            rec(1, "a", 1.0),
            rec(2, "b", 2.0),
            rec(3, "a", 3.0),
        ]);
        t.records_mut()[2].passed_filters.push(10);
        let objs = t.objects_with_passed_filters();
        assert_eq!(objs.into_iter().collect::<Vec<_>>(), vec!["a".to_string()]);
    }
}
