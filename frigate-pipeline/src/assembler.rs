//! Joins fetched candidates with filter matches and object metadata.

use frigate_core::{CandidateTable, FilterMatchIndex, ObjectMetadata};
use std::collections::{BTreeSet, HashSet};
use tracing::{info, warn};

/// Assembled table plus the cross-references that could not be joined.
#[derive(Debug, Clone, Default)]
pub struct Assembled {
    /// Annotated rows, ascending by `jd`
    pub table: CandidateTable,
    /// Records with at least one passed filter
    pub matched_records: usize,
    /// Distinct objects that received metadata
    pub annotated_objects: usize,
    /// Candids matched by a filter but absent from the table
    pub unknown_candids: BTreeSet<i64>,
    /// Objects with metadata but absent from the table
    pub unknown_objects: BTreeSet<String>,
    /// Matched objects the metadata map has no entry for
    pub objects_without_metadata: BTreeSet<String>,
}

/// Best-effort join: missing cross-references are logged and skipped.
#[derive(Debug, Clone, Copy, Default)]
pub struct ResultAssembler;

impl ResultAssembler {
    pub fn new() -> Self {
        Self
    }

    /// Distinct objects owning at least one candid in `index`, i.e. the
    /// objects whose metadata the assembled table will need.
    pub fn objects_to_annotate(&self, table: &CandidateTable, index: &FilterMatchIndex) -> BTreeSet<String> {
        let matched = index.all_candids();
        table
            .iter()
            .filter(|r| matched.contains(&r.candid))
            .map(|r| r.object_id.clone())
            .collect()
    }

    pub fn assemble(
        &self,
        mut table: CandidateTable,
        index: &FilterMatchIndex,
        metadata: &ObjectMetadata,
    ) -> Assembled {
        for record in table.records_mut() {
            record.clear_annotations();
        }

        // Filters are visited in ascending id order, so `passed_filters` is sorted.
        let positions = table.candid_positions();
        let mut unknown_candids = BTreeSet::new();
        for (filter_id, candids) in index.iter() {
            for candid in candids {
                match positions.get(candid) {
                    Some(&i) => table.records_mut()[i].passed_filters.push(filter_id),
                    None => {
                        unknown_candids.insert(*candid);
                    }
                }
            }
        }

        let matched_objects = table.objects_with_passed_filters();
        let mut matched_records = 0usize;
        for record in table.records_mut() {
            if !record.has_passed_filters() {
                continue;
            }
            matched_records += 1;
            if let Some(annotations) = metadata.get(&record.object_id) {
                record.groups = annotations.group_ids.clone();
                record.classifications = annotations.classifications.clone();
                record.external_name = annotations.external_name.clone();
            }
        }

        let table_objects: HashSet<&str> = table.iter().map(|r| r.object_id.as_str()).collect();
        let unknown_objects: BTreeSet<String> = metadata
            .iter()
            .filter(|(object_id, _)| !table_objects.contains(object_id))
            .map(|(object_id, _)| object_id.to_string())
            .collect();
        let objects_without_metadata: BTreeSet<String> = matched_objects
            .iter()
            .filter(|object_id| metadata.get(object_id).is_none())
            .cloned()
            .collect();
        let annotated_objects = matched_objects.len() - objects_without_metadata.len();

        if !unknown_candids.is_empty() {
            warn!(
                count = unknown_candids.len(),
                sample = ?unknown_candids.iter().take(5).collect::<Vec<_>>(),
                "filter matches reference candids missing from the catalog table"
            );
        }
        if !unknown_objects.is_empty() {
            warn!(
                count = unknown_objects.len(),
                sample = ?unknown_objects.iter().take(5).collect::<Vec<_>>(),
                "metadata references objects missing from the catalog table"
            );
        }
        if !objects_without_metadata.is_empty() {
            warn!(
                count = objects_without_metadata.len(),
                sample = ?objects_without_metadata.iter().take(5).collect::<Vec<_>>(),
                "matched objects have no metadata"
            );
        }

        table.sort_by_jd();
        info!(
            rows = table.len(),
            matched_records,
            annotated_objects,
            "table assembled"
        );

        Assembled {
            table,
            matched_records,
            annotated_objects,
            unknown_candids,
            unknown_objects,
            objects_without_metadata,
        }
    }
}
