//! Exact record count for a query window.

use crate::client::CatalogClient;
use crate::error::Result;
use frigate_core::QueryWindow;
use std::sync::Arc;
use tracing::info;

/// Asks the catalog how many records a window holds.
///
/// One remote query per call. Whether a transient failure is retried is
/// decided by the client's [`RetryPolicy`](frigate_core::RetryPolicy).
#[derive(Debug, Clone)]
pub struct WindowCountEstimator {
    client: Arc<dyn CatalogClient>,
}

impl WindowCountEstimator {
    pub fn new(client: Arc<dyn CatalogClient>) -> Self {
        Self { client }
    }

    pub async fn estimate(&self, window: &QueryWindow) -> Result<u64> {
        let total = self.client.count_documents(window).await?;
        info!(
            t_start = window.t_start(),
            t_end = window.t_end(),
            programids = ?window.program_ids(),
            total,
            "expected candidate count"
        );
        Ok(total)
    }
}
