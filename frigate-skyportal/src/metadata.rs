//! Per-object metadata collection and classification vetting.

use crate::client::{Classification, SkyPortalClient};
use crate::error::Result;
use frigate_core::{ObjectAnnotations, ObjectMetadata};
use std::collections::BTreeSet;
use std::sync::Arc;
use tracing::{debug, info};

/// Classifications at or below this probability are dropped.
pub const MIN_CLASSIFICATION_PROBABILITY: f64 = 0.5;

/// Keep human-vetted, sufficiently confident classifications.
///
/// An entry survives when its label is non-empty, it is not machine
/// generated, and it either has no probability or one above
/// [`MIN_CLASSIFICATION_PROBABILITY`].
pub fn vet_classifications(classifications: &[Classification]) -> BTreeSet<String> {
    classifications
        .iter()
        .filter(|c| !c.ml)
        .filter(|c| c.probability.map_or(true, |p| p > MIN_CLASSIFICATION_PROBABILITY))
        .filter_map(|c| c.classification.as_deref())
        .filter(|label| !label.trim().is_empty())
        .map(str::to_string)
        .collect()
}

/// Looks up every object that passed a filter, one request at a time.
#[derive(Debug, Clone)]
pub struct ObjectMetadataCollector {
    client: Arc<dyn SkyPortalClient>,
}

impl ObjectMetadataCollector {
    pub fn new(client: Arc<dyn SkyPortalClient>) -> Self {
        Self { client }
    }

    /// Fail-fast: the first failed lookup aborts the whole batch.
    pub async fn collect<'a, I>(&self, object_ids: I) -> Result<ObjectMetadata>
    where
        I: IntoIterator<Item = &'a str>,
        I::IntoIter: Send,
    {
        let mut metadata = ObjectMetadata::new();
        for object_id in object_ids {
            let source = self.client.object_metadata(object_id).await?;
            let annotations = ObjectAnnotations {
                group_ids: source.group_ids,
                classifications: vet_classifications(&source.classifications),
                external_name: source.canonical_name,
            };
            debug!(
                object_id,
                groups = annotations.group_ids.len(),
                classifications = ?annotations.classifications,
                "object metadata"
            );
            metadata.insert(object_id, annotations);
        }
        info!(objects = metadata.len(), "object metadata collected");
        Ok(metadata)
    }
}
