//! Run-level memoization and low-memory page spilling.
//!
//! Two independent jobs share this type:
//!
//! - **memoization**: a completed run's table is kept in an output store under
//!   the run's key, with a manifest recording the catalog count it was fetched
//!   against. A later run whose fresh count matches that manifest, and whose
//!   table still holds the recorded rows, reuses it instead of fetching.
//! - **spilling**: in low-memory mode every fetched page is written to its own
//!   uniquely named file in the spill directory, then reloaded and deleted
//!   once all pages have arrived.

use crate::config::SpillMode;
use crate::error::{CatalogError, Result};
use frigate_core::CandidateTable;
use frigate_tabular::{FileTableStore, TableFormat, TableManifest, TableStore, TabularError};
use std::sync::Arc;
use tracing::{debug, info, warn};

/// Handle to one spilled page. Only lives for the duration of a fetch.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SpillPointer {
    name: String,
    rows: usize,
}

impl SpillPointer {
    /// Store name of the temporary table.
    pub fn name(&self) -> &str {
        &self.name
    }

    pub fn rows(&self) -> usize {
        self.rows
    }
}

#[derive(Debug, Clone, Default)]
pub struct SpillCache {
    output: Option<Arc<dyn TableStore>>,
    spill: Option<Arc<dyn TableStore>>,
}

impl SpillCache {
    /// No memoization, no spilling.
    pub fn new() -> Self {
        Self::default()
    }

    /// Build the spill side from a fetch's [`SpillMode`].
    ///
    /// Low-memory mode without a spill directory is a configuration error.
    pub fn from_mode(mode: &SpillMode) -> Result<Self> {
        match mode {
            SpillMode::InMemory => Ok(Self::new()),
            SpillMode::LowMemory {
                spill_dir: Some(dir),
            } => Ok(Self::new().with_spill_store(Arc::new(FileTableStore::new(
                dir.clone(),
                TableFormat::JsonLines,
            )))),
            SpillMode::LowMemory { spill_dir: None } => Err(CatalogError::Config(
                "low-memory mode requires a spill directory".into(),
            )),
        }
    }

    /// Enable run-level memoization against `store`.
    pub fn with_output_store(mut self, store: Arc<dyn TableStore>) -> Self {
        self.output = Some(store);
        self
    }

    /// Enable per-page spilling into `store`.
    pub fn with_spill_store(mut self, store: Arc<dyn TableStore>) -> Self {
        self.spill = Some(store);
        self
    }

    pub fn is_spilling(&self) -> bool {
        self.spill.is_some()
    }

    pub fn output_store(&self) -> Option<&Arc<dyn TableStore>> {
        self.output.as_ref()
    }

    // ------------------------------------------------------------------
    // Memoization
    // ------------------------------------------------------------------

    /// Return the stored table for `key` if it was fetched against a catalog
    /// count of `expected` and still holds the rows its manifest records.
    pub async fn lookup_completed(&self, key: &str, expected: u64) -> Result<Option<CandidateTable>> {
        let Some(store) = &self.output else {
            return Ok(None);
        };
        let Some(manifest) = store.load_manifest(key).await.map_err(CatalogError::Output)? else {
            return Ok(None);
        };
        if manifest.source_count != expected {
            info!(
                key,
                stored = manifest.source_count,
                expected,
                "catalog count changed since the stored run, fetching again"
            );
            return Ok(None);
        }
        match store.row_count(key).await.map_err(CatalogError::Output)? {
            Some(rows) if rows == manifest.rows => {
                let table = store.load(key).await.map_err(CatalogError::Output)?;
                info!(key, rows, "reusing completed run");
                Ok(Some(table))
            }
            rows => {
                warn!(key, ?rows, recorded = manifest.rows, "stored run is incomplete, fetching again");
                Ok(None)
            }
        }
    }

    /// Persist a completed table under `key`, recording the catalog count
    /// `source_count` it was fetched against. Returns the location written, or
    /// `None` when no output store is configured.
    pub async fn store_completed(
        &self,
        key: &str,
        table: &CandidateTable,
        source_count: u64,
    ) -> Result<Option<String>> {
        let Some(store) = &self.output else {
            return Ok(None);
        };
        let location = store.save(key, table).await.map_err(CatalogError::Output)?;
        store
            .save_manifest(key, &TableManifest::new(table.len(), source_count))
            .await
            .map_err(CatalogError::Output)?;
        Ok(Some(location))
    }

    // ------------------------------------------------------------------
    // Spilling
    // ------------------------------------------------------------------

    /// Write one page to a fresh temporary table.
    pub async fn spill(&self, page: &CandidateTable) -> Result<SpillPointer> {
        let store = self.spill_store()?;
        let name = format!("spill_{}", uuid::Uuid::new_v4().simple());
        let location = store.save(&name, page).await?;
        debug!(location = %location, rows = page.len(), "page spilled");
        Ok(SpillPointer {
            name,
            rows: page.len(),
        })
    }

    /// Load a spilled page and delete its file.
    pub async fn reload(&self, pointer: &SpillPointer) -> Result<CandidateTable> {
        let store = self.spill_store()?;
        let table = store.load(&pointer.name).await?;
        if table.len() != pointer.rows {
            return Err(CatalogError::Spill(TabularError::Corrupt {
                path: pointer.name.clone(),
                line: 0,
                message: format!("holds {} rows, {} were written", table.len(), pointer.rows),
            }));
        }
        store.remove(&pointer.name).await?;
        Ok(table)
    }

    /// Reload every pointer in turn and concatenate the pages.
    ///
    /// On failure the remaining spill files are discarded before returning.
    pub async fn reload_all(&self, pointers: Vec<SpillPointer>) -> Result<CandidateTable> {
        let total: usize = pointers.iter().map(|p| p.rows).sum();
        let mut out = CandidateTable::with_capacity(total);
        for (i, pointer) in pointers.iter().enumerate() {
            match self.reload(pointer).await {
                Ok(page) => out.append(page),
                Err(e) => {
                    self.discard(&pointers[i..]).await;
                    return Err(e);
                }
            }
        }
        Ok(out)
    }

    /// Best-effort removal of spill files after a failed fetch.
    pub async fn discard(&self, pointers: &[SpillPointer]) {
        let Some(store) = &self.spill else {
            return;
        };
        for pointer in pointers {
            if let Err(e) = store.remove(&pointer.name).await {
                warn!(name = %pointer.name, error = %e, "failed to remove spill file");
            }
        }
    }

    fn spill_store(&self) -> Result<&Arc<dyn TableStore>> {
        self.spill
            .as_ref()
            .ok_or_else(|| CatalogError::Config("spilling is not enabled".into()))
    }
}
