//! Per-object annotations fetched from the secondary service.

use serde::{Deserialize, Serialize};
use std::collections::{BTreeMap, BTreeSet};

/// Group memberships, vetted classifications and canonical name of one object.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct ObjectAnnotations {
    pub group_ids: Vec<i64>,
    pub classifications: BTreeSet<String>,
    pub external_name: Option<String>,
}

/// `object_id -> ObjectAnnotations`.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(transparent)]
pub struct ObjectMetadata {
    objects: BTreeMap<String, ObjectAnnotations>,
}

impl ObjectMetadata {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn insert(&mut self, object_id: impl Into<String>, annotations: ObjectAnnotations) {
        self.objects.insert(object_id.into(), annotations);
    }

    pub fn get(&self, object_id: &str) -> Option<&ObjectAnnotations> {
        self.objects.get(object_id)
    }

    pub fn len(&self) -> usize {
        self.objects.len()
    }

    pub fn is_empty(&self) -> bool {
        self.objects.is_empty()
    }

    pub fn iter(&self) -> impl Iterator<Item = (&str, &ObjectAnnotations)> {
        self.objects.iter().map(|(k, v)| (k.as_str(), v))
    }
}

impl FromIterator<(String, ObjectAnnotations)> for ObjectMetadata {
    fn from_iter<T: IntoIterator<Item = (String, ObjectAnnotations)>>(iter: T) -> Self {
        Self {
            objects: iter.into_iter().collect(),
        }
    }
}
