//! Pipeline orchestration.

use crate::assembler::ResultAssembler;
use crate::config::PipelineConfig;
use crate::error::{PipelineError, Result};
use frigate_catalog::{
    BatchPlanner, CatalogClient, FetchProgress, ParallelFetcher, SpillCache, WindowCountEstimator,
};
use frigate_core::{CandidateTable, FilterMatchIndex, ObjectMetadata, QueryWindow};
use frigate_skyportal::{
    FilterMatchCollector, FilterMatchQuery, FilterSelection, ObjectMetadataCollector,
    SkyPortalClient,
};
use frigate_tabular::{FileTableStore, TableStore};
use std::fmt;
use std::sync::Arc;
use tracing::{info, warn};

/// What one run produced.
#[derive(Debug, Clone)]
pub struct PipelineReport {
    /// Storage key of the run
    pub key: String,
    /// Window count reported by the catalog
    pub expected: u64,
    /// Final table, ascending by `jd`
    pub table: CandidateTable,
    /// Whether a stored run was reused instead of fetching
    pub reused: bool,
    pub pages: usize,
    pub duplicates_dropped: usize,
    pub spilled_pages: usize,
    /// `(filter_id, match_count)`, largest first
    pub filter_summary: Vec<(i64, usize)>,
    pub matched_records: usize,
    pub annotated_objects: usize,
    /// Cross-references skipped by the join
    pub skipped_references: usize,
    /// Where the table was saved
    pub output: Option<String>,
}

type ProgressFn = dyn Fn(FetchProgress) + Send + Sync;

/// Storage key of a run: the window key, plus `_x{digest}` of the filter
/// selection when the run cross-matches. Plain and cross-matched tables of the
/// same window never share an entry.
pub fn run_key(window: &QueryWindow, filters: Option<&FilterSelection>) -> String {
    match filters {
        Some(selection) => format!("{}_x{}", window.storage_key(), selection.fingerprint()),
        None => window.storage_key(),
    }
}

/// Runs windows end to end against a catalog and, optionally, SkyPortal.
pub struct Pipeline {
    catalog: Arc<dyn CatalogClient>,
    skyportal: Option<Arc<dyn SkyPortalClient>>,
    output: Option<Arc<dyn TableStore>>,
    config: PipelineConfig,
    on_progress: Option<Arc<ProgressFn>>,
}

impl fmt::Debug for Pipeline {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Pipeline")
            .field("catalog", &self.catalog)
            .field("skyportal", &self.skyportal)
            .field("output", &self.output)
            .field("config", &self.config)
            .finish_non_exhaustive()
    }
}

impl Pipeline {
    /// Validate `config` and open the output store if a directory is set.
    pub fn new(catalog: Arc<dyn CatalogClient>, config: PipelineConfig) -> Result<Self> {
        config.validate()?;
        let output = config.output_dir.as_ref().map(|dir| {
            Arc::new(FileTableStore::new(dir.clone(), config.output_format)) as Arc<dyn TableStore>
        });
        Ok(Self {
            catalog,
            skyportal: None,
            output,
            config,
            on_progress: None,
        })
    }

    pub fn with_skyportal(mut self, client: Arc<dyn SkyPortalClient>) -> Self {
        self.skyportal = Some(client);
        self
    }

    /// Use `store` for completed runs instead of `config.output_dir`.
    pub fn with_output_store(mut self, store: Arc<dyn TableStore>) -> Self {
        self.output = Some(store);
        self
    }

    pub fn on_progress(mut self, f: impl Fn(FetchProgress) + Send + Sync + 'static) -> Self {
        self.on_progress = Some(Arc::new(f));
        self
    }

    pub fn config(&self) -> &PipelineConfig {
        &self.config
    }

    /// Run one window. Nothing is persisted unless every stage succeeds.
    pub async fn run(&self, window: QueryWindow) -> Result<PipelineReport> {
        if self.config.filters.is_some() && self.skyportal.is_none() {
            return Err(PipelineError::Config(
                "filter selection given but no SkyPortal client configured".into(),
            ));
        }

        let window = Arc::new(window);
        let key = run_key(&window, self.config.filters.as_ref());
        info!(key = %key, "pipeline run started");

        let expected = WindowCountEstimator::new(Arc::clone(&self.catalog))
            .estimate(&window)
            .await?;

        let mut cache = SpillCache::from_mode(&self.config.fetch.spill)?;
        if let Some(store) = &self.output {
            cache = cache.with_output_store(Arc::clone(store));
        }
        if let Some(table) = cache.lookup_completed(&key, expected).await? {
            return Ok(PipelineReport {
                key,
                expected,
                table,
                reused: true,
                pages: 0,
                duplicates_dropped: 0,
                spilled_pages: 0,
                filter_summary: Vec::new(),
                matched_records: 0,
                annotated_objects: 0,
                skipped_references: 0,
                output: None,
            });
        }

        let requests = BatchPlanner::new(self.config.fetch.page_size).plan(Arc::clone(&window), expected);
        let mut fetcher = ParallelFetcher::new(Arc::clone(&self.catalog), self.config.fetch.clone())?
            .with_spill_cache(cache.clone());
        if let Some(cb) = &self.on_progress {
            let cb = Arc::clone(cb);
            fetcher = fetcher.on_progress(move |p| cb(p));
        }
        let fetched = fetcher.fetch(requests, expected).await?;

        let assembler = ResultAssembler::new();
        let (index, metadata) = match (&self.config.filters, &self.skyportal) {
            (Some(selection), Some(client)) => {
                let query = FilterMatchQuery::new((*window).clone(), selection.clone())
                    .with_max_pages(self.config.filter_page_cap());
                let index = FilterMatchCollector::new(Arc::clone(client))
                    .collect(&query)
                    .await?;
                let objects = assembler.objects_to_annotate(&fetched.table, &index);
                let metadata = ObjectMetadataCollector::new(Arc::clone(client))
                    .collect(objects.iter().map(String::as_str))
                    .await?;
                (index, metadata)
            }
            _ => (FilterMatchIndex::new(), ObjectMetadata::new()),
        };

        let filter_summary = index.by_match_count();
        let assembled = assembler.assemble(fetched.table, &index, &metadata);
        let skipped_references = assembled.unknown_candids.len()
            + assembled.unknown_objects.len()
            + assembled.objects_without_metadata.len();

        let output = cache
            .store_completed(&key, &assembled.table, expected)
            .await?;
        if let Some(location) = &output {
            info!(location = %location, rows = assembled.table.len(), "table saved");
        }
        if skipped_references > 0 {
            warn!(skipped_references, "some cross-references could not be joined");
        }

        Ok(PipelineReport {
            key,
            expected,
            table: assembled.table,
            reused: false,
            pages: fetched.pages,
            duplicates_dropped: fetched.duplicates_dropped,
            spilled_pages: fetched.spilled_pages,
            filter_summary,
            matched_records: assembled.matched_records,
            annotated_objects: assembled.annotated_objects,
            skipped_references,
            output,
        })
    }
}
