//! Candidate records and flattening of nested catalog documents.
//!
//! The catalog returns nested documents (`{"candid": .., "candidate": {"jd": ..}}`).
//! Rows are flattened so that nested fields become dotted keys
//! (`candidate.jd`), then the three join keys are promoted to typed fields.

use crate::error::{Error, Result};
use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};
use std::collections::{BTreeMap, BTreeSet};

/// Flattened key holding the unique alert id.
pub const CANDID_KEY: &str = "candid";
/// Flattened key holding the object id.
pub const OBJECT_ID_KEY: &str = "objectId";
/// Flattened key holding the Julian date of the detection.
pub const JD_KEY: &str = "candidate.jd";

/// Keys written by the assembler. A catalog leaf with one of these names is
/// kept under `catalog.<name>` so it cannot shadow an annotation.
const ANNOTATION_KEYS: [&str; 4] = ["passed_filters", "groups", "classifications", "external_name"];

/// One flattened catalog row: dotted key -> leaf value.
pub type FlatRow = BTreeMap<String, Value>;

/// Flatten a nested document into dotted keys.
///
/// Objects are recursed into; arrays and scalars are leaves. Empty nested
/// objects contribute no keys.
pub fn flatten_document(doc: Map<String, Value>) -> FlatRow {
    let mut row = FlatRow::new();
    flatten_into(&mut row, None, doc);
    row
}

fn flatten_into(row: &mut FlatRow, prefix: Option<&str>, obj: Map<String, Value>) {
    for (key, value) in obj {
        let path = match prefix {
            Some(p) => format!("{p}.{key}"),
            None => key,
        };
        match value {
            Value::Object(nested) => flatten_into(row, Some(&path), nested),
            leaf => {
                row.insert(path, leaf);
            }
        }
    }
}

/// The canonical unit of the pipeline.
///
/// `candid` joins against filter matches; `object_id` joins against object
/// metadata. The annotation fields start empty and are only written by the
/// assembler. Serialized rows keep the flattened layout, so a stored table
/// reloads into identical records.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct CandidateRecord {
    pub candid: i64,
    #[serde(rename = "objectId")]
    pub object_id: String,
    #[serde(rename = "candidate.jd")]
    pub jd: f64,
    #[serde(default)]
    pub passed_filters: Vec<i64>,
    #[serde(default)]
    pub groups: Vec<i64>,
    #[serde(default)]
    pub classifications: BTreeSet<String>,
    #[serde(default)]
    pub external_name: Option<String>,
    /// Every other flattened field, by dotted key.
    #[serde(flatten)]
    pub fields: FlatRow,
}

impl CandidateRecord {
    /// Promote the join keys out of a flattened row.
    pub fn from_flat_row(mut row: FlatRow) -> Result<Self> {
        let candid = match row.remove(CANDID_KEY) {
            Some(v) => v
                .as_i64()
                .ok_or_else(|| Error::schema(format!("'{CANDID_KEY}' is not an integer: {v}")))?,
            None => return Err(Error::schema(format!("row is missing '{CANDID_KEY}'"))),
        };
        let object_id = match row.remove(OBJECT_ID_KEY) {
            Some(Value::String(s)) => s,
            Some(v) => {
                return Err(Error::schema(format!(
                    "'{OBJECT_ID_KEY}' of candid {candid} is not a string: {v}"
                )))
            }
            None => {
                return Err(Error::schema(format!(
                    "candid {candid} is missing '{OBJECT_ID_KEY}'"
                )))
            }
        };
        let jd = match row.remove(JD_KEY) {
            Some(v) => v.as_f64().ok_or_else(|| {
                Error::schema(format!("'{JD_KEY}' of candid {candid} is not numeric: {v}"))
            })?,
            None => return Err(Error::schema(format!("candid {candid} is missing '{JD_KEY}'"))),
        };

        for key in ANNOTATION_KEYS {
            if let Some(v) = row.remove(key) {
                row.insert(format!("catalog.{key}"), v);
            }
        }

        Ok(Self {
            candid,
            object_id,
            jd,
            passed_filters: Vec::new(),
            groups: Vec::new(),
            classifications: BTreeSet::new(),
            external_name: None,
            fields: row,
        })
    }

    /// Flatten a raw catalog document and build a record from it.
    pub fn from_document(doc: Map<String, Value>) -> Result<Self> {
        Self::from_flat_row(flatten_document(doc))
    }

    /// Whether any filter matched this record.
    pub fn has_passed_filters(&self) -> bool {
        !self.passed_filters.is_empty()
    }

    /// Whether any object-level annotation has been set.
    pub fn is_annotated(&self) -> bool {
        !self.groups.is_empty() || !self.classifications.is_empty() || self.external_name.is_some()
    }

    /// Reset all annotations to their initial, empty state.
    pub fn clear_annotations(&mut self) {
        self.passed_filters.clear();
        self.groups.clear();
        self.classifications.clear();
        self.external_name = None;
    }
}
