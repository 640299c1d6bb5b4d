//! Bounded parallel execution of catalog page requests.
//!
//! # Architecture
//!
//! ```text
//!  ┌──────────────┐  pop   ┌────────────┐  (index, page)  ┌─────────────┐
//!  │ PageRequest  │ ─────▶ │ worker × N │ ──────────────▶ │ coordinator │
//!  │ queue        │        │ find +     │   mpsc channel  │ merge/spill │
//!  └──────────────┘        │ flatten    │                 └─────────────┘
//!                          └────────────┘
//! ```
//!
//! Workers share nothing mutable except the request queue. Only the
//! coordinator touches the accumulator (or the spill cache), so pages can
//! complete in any order. The first failed page sets the cancel flag, aborts
//! the remaining workers and discards any spill files: the fetch is
//! all-or-nothing.

use crate::client::CatalogClient;
use crate::config::FetchConfig;
use crate::error::{CatalogError, Result};
use crate::spill::{SpillCache, SpillPointer};
use frigate_core::{CandidateRecord, CandidateTable, PageRequest};
use parking_lot::Mutex;
use std::collections::VecDeque;
use std::fmt;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use tokio::sync::mpsc;
use tokio::task::JoinSet;
use tracing::{debug, info, warn};

/// Snapshot reported after each completed page.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct FetchProgress {
    pub pages_done: usize,
    pub pages_total: usize,
    /// Rows received so far
    pub received: u64,
    /// Rows the estimator reported for the window
    pub expected: u64,
}

/// Result of a completed fetch.
#[derive(Debug, Clone)]
pub struct FetchOutcome {
    /// Every fetched row, deduplicated by `candid`, in no particular order.
    pub table: CandidateTable,
    pub pages: usize,
    pub duplicates_dropped: usize,
    /// Pages that went through a spill file (low-memory mode).
    pub spilled_pages: usize,
}

type ProgressFn = dyn Fn(FetchProgress) + Send + Sync;

/// Executes page requests through a fixed-size worker pool.
pub struct ParallelFetcher {
    client: Arc<dyn CatalogClient>,
    config: FetchConfig,
    spill: SpillCache,
    on_progress: Option<Arc<ProgressFn>>,
}

impl fmt::Debug for ParallelFetcher {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("ParallelFetcher")
            .field("client", &self.client)
            .field("config", &self.config)
            .field("spill", &self.spill)
            .field("on_progress", &self.on_progress.is_some())
            .finish()
    }
}

impl ParallelFetcher {
    /// Build a fetcher; the spill side of the cache follows `config.spill`.
    pub fn new(client: Arc<dyn CatalogClient>, config: FetchConfig) -> Result<Self> {
        config.validate()?;
        let spill = SpillCache::from_mode(&config.spill)?;
        Ok(Self {
            client,
            config,
            spill,
            on_progress: None,
        })
    }

    /// Replace the spill cache (e.g. to spill into a custom store).
    pub fn with_spill_cache(mut self, spill: SpillCache) -> Self {
        self.spill = spill;
        self
    }

    /// Register a callback invoked by the coordinator after every page.
    pub fn on_progress(mut self, f: impl Fn(FetchProgress) + Send + Sync + 'static) -> Self {
        self.on_progress = Some(Arc::new(f));
        self
    }

    pub fn config(&self) -> &FetchConfig {
        &self.config
    }

    /// Run every request and return the merged table.
    ///
    /// `expected` is the estimator's count; a mismatch with the rows actually
    /// received is logged, not treated as an error.
    pub async fn fetch(&self, requests: Vec<PageRequest>, expected: u64) -> Result<FetchOutcome> {
        let pages_total = requests.len();
        if pages_total == 0 {
            debug!("no pages to fetch");
            return Ok(FetchOutcome {
                table: CandidateTable::new(),
                pages: 0,
                duplicates_dropped: 0,
                spilled_pages: 0,
            });
        }

        let workers = self.config.effective_workers(pages_total);
        info!(pages = pages_total, workers, expected, "fetching catalog pages");

        let queue = Arc::new(Mutex::new(VecDeque::from(requests)));
        let cancel = Arc::new(AtomicBool::new(false));
        let (tx, mut rx) = mpsc::channel::<(usize, Result<CandidateTable>)>(workers);

        let mut pool = JoinSet::new();
        for _ in 0..workers {
            let client = Arc::clone(&self.client);
            let queue = Arc::clone(&queue);
            let cancel = Arc::clone(&cancel);
            let tx = tx.clone();
            pool.spawn(async move {
                loop {
                    if cancel.load(Ordering::Acquire) {
                        break;
                    }
                    let next = queue.lock().pop_front();
                    let Some(request) = next else {
                        break;
                    };
                    let result = fetch_page(client.as_ref(), &request).await;
                    if tx.send((request.index, result)).await.is_err() {
                        break;
                    }
                }
            });
        }
        drop(tx);

        let mut table = CandidateTable::new();
        let mut pointers: Vec<SpillPointer> = Vec::new();
        let mut pages_done = 0usize;
        let mut received = 0u64;
        let mut failure: Option<CatalogError> = None;

        while let Some((index, result)) = rx.recv().await {
            let page = match result {
                Ok(page) => page,
                Err(e) => {
                    warn!(page = index, error = %e, "catalog page failed, aborting fetch");
                    failure = Some(e);
                    break;
                }
            };

            received += page.len() as u64;
            if self.spill.is_spilling() {
                match self.spill.spill(&page).await {
                    Ok(pointer) => pointers.push(pointer),
                    Err(e) => {
                        failure = Some(e);
                        break;
                    }
                }
            } else {
                table.append(page);
            }

            pages_done += 1;
            info!(page = index, received, expected, "catalog page received");
            if let Some(cb) = &self.on_progress {
                cb(FetchProgress {
                    pages_done,
                    pages_total,
                    received,
                    expected,
                });
            }
        }

        if let Some(e) = failure {
            cancel.store(true, Ordering::Release);
            pool.abort_all();
            drop(rx);
            while pool.join_next().await.is_some() {}
            self.spill.discard(&pointers).await;
            return Err(e);
        }

        // Channel closed: every worker has exited. Missing pages mean one died.
        let mut panic_message = None;
        while let Some(joined) = pool.join_next().await {
            if let Err(e) = joined {
                panic_message.get_or_insert_with(|| e.to_string());
            }
        }
        if pages_done < pages_total {
            self.spill.discard(&pointers).await;
            return Err(CatalogError::WorkerPanicked(panic_message.unwrap_or_else(|| {
                format!("{} of {} pages never reported", pages_total - pages_done, pages_total)
            })));
        }

        let spilled_pages = pointers.len();
        if spilled_pages > 0 {
            table = self.spill.reload_all(pointers).await?;
            debug!(spilled_pages, rows = table.len(), "spill files reloaded");
        }

        let duplicates_dropped = table.dedup_by_candid();
        if duplicates_dropped > 0 {
            warn!(duplicates_dropped, "dropped rows with repeated candid");
        }
        if table.len() as u64 != expected {
            warn!(
                received = table.len(),
                expected,
                "fetched row count differs from the window count"
            );
        }

        Ok(FetchOutcome {
            table,
            pages: pages_total,
            duplicates_dropped,
            spilled_pages,
        })
    }
}

/// One page: query, then flatten each document into a record.
async fn fetch_page(client: &dyn CatalogClient, request: &PageRequest) -> Result<CandidateTable> {
    let docs = client.find(request).await?;
    debug!(page = request.index, skip = request.skip, rows = docs.len(), "page fetched");
    docs.into_iter()
        .map(|doc| CandidateRecord::from_document(doc).map_err(CatalogError::from))
        .collect()
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::SpillMode;
    use crate::planner::BatchPlanner;
    use async_trait::async_trait;
    use frigate_core::QueryWindow;
    use serde_json::{json, Map, Value};
    use std::sync::atomic::AtomicUsize;

    #[derive(Debug, Default)]
    struct FakeCatalog {
        docs: Vec<Map<String, Value>>,
        fail_at_skip: Option<usize>,
        calls: AtomicUsize,
    }

    impl FakeCatalog {
        fn with_rows(n: i64) -> Self {
            let docs = (0..n)
                .map(|i| match json!({
                    "_id": i,
                    "candid": 1_000 + i,
                    "objectId": format!("ZTF{}", i % 7),
                    "candidate": {"jd": 2_460_000.5 + (n - i) as f64 / 1000.0, "fid": 1 + i % 2}
                }) {
                    Value::Object(map) => map,
                    _ => unreachable!(),
                })
                .collect();
            Self {
                docs,
                ..Default::default()
            }
        }
    }

    #[async_trait]
    impl CatalogClient for FakeCatalog {
        async fn count_documents(&self, _window: &QueryWindow) -> Result<u64> {
            Ok(self.docs.len() as u64)
        }

        async fn find(&self, request: &PageRequest) -> Result<Vec<Map<String, Value>>> {
            self.calls.fetch_add(1, Ordering::SeqCst);
            if self.fail_at_skip == Some(request.skip) {
                return Err(CatalogError::query(None, "boom"));
            }
            Ok(self
                .docs
                .iter()
                .skip(request.skip)
                .take(request.limit)
                .cloned()
                .collect())
        }
    }

    /// Fails the first page at once; every other page waits for a release
    /// that never comes, so it only ends if the fetch aborts it.
    #[derive(Debug, Default)]
    struct StallingCatalog {
        started: AtomicUsize,
        finished: AtomicUsize,
        release: tokio::sync::Notify,
    }

    #[async_trait]
    impl CatalogClient for StallingCatalog {
        async fn count_documents(&self, _window: &QueryWindow) -> Result<u64> {
            Ok(60)
        }

        async fn find(&self, request: &PageRequest) -> Result<Vec<Map<String, Value>>> {
            self.started.fetch_add(1, Ordering::SeqCst);
            if request.skip == 0 {
                self.finished.fetch_add(1, Ordering::SeqCst);
                return Err(CatalogError::query(Some(500), "boom"));
            }
            self.release.notified().await;
            self.finished.fetch_add(1, Ordering::SeqCst);
            Ok(Vec::new())
        }
    }

    fn plan(total: u64, page_size: usize) -> Vec<PageRequest> {
        let window = Arc::new(QueryWindow::new(2_460_000.5, 2_460_001.5, [1, 2]).unwrap());
        BatchPlanner::new(page_size).plan(window, total)
    }

    fn config(workers: usize, spill: SpillMode) -> FetchConfig {
        FetchConfig {
            page_size: 10,
            workers,
            spill,
        }
    }

    fn sorted_candids(table: &CandidateTable) -> Vec<i64> {
        let mut c: Vec<i64> = table.iter().map(|r| r.candid).collect();
        c.sort_unstable();
        c
    }

    #[tokio::test]
    async fn test_fetch_all_pages() {
        let client = Arc::new(FakeCatalog::with_rows(25));
        let fetcher = ParallelFetcher::new(client.clone(), config(4, SpillMode::InMemory)).unwrap();

        let outcome = fetcher.fetch(plan(25, 10), 25).await.unwrap();
        assert_eq!(outcome.pages, 3);
        assert_eq!(outcome.table.len(), 25);
        assert_eq!(outcome.duplicates_dropped, 0);
        assert_eq!(outcome.spilled_pages, 0);
        assert_eq!(client.calls.load(Ordering::SeqCst), 3);
        assert_eq!(sorted_candids(&outcome.table), (1_000..1_025).collect::<Vec<_>>());

        // flattened in the worker
        let record = &outcome.table.records()[0];
        assert!(record.fields.contains_key("candidate.fid"));
        assert!(record.passed_filters.is_empty());
    }

    #[tokio::test]
    async fn test_zero_pages_issue_no_requests() {
        let client = Arc::new(FakeCatalog::default());
        let fetcher = ParallelFetcher::new(client.clone(), config(4, SpillMode::InMemory)).unwrap();

        let outcome = fetcher.fetch(plan(0, 10), 0).await.unwrap();
        assert!(outcome.table.is_empty());
        assert_eq!(outcome.pages, 0);
        assert_eq!(client.calls.load(Ordering::SeqCst), 0);
    }

    #[tokio::test]
    async fn test_spilled_fetch_matches_in_memory() {
        let dir = tempfile::tempdir().unwrap();
        let client = Arc::new(FakeCatalog::with_rows(47));

        let in_memory = ParallelFetcher::new(client.clone(), config(3, SpillMode::InMemory))
            .unwrap()
            .fetch(plan(47, 10), 47)
            .await
            .unwrap();

        let spilled = ParallelFetcher::new(
            client.clone(),
            config(
                3,
                SpillMode::LowMemory {
                    spill_dir: Some(dir.path().to_path_buf()),
                },
            ),
        )
        .unwrap()
        .fetch(plan(47, 10), 47)
        .await
        .unwrap();

        assert_eq!(spilled.spilled_pages, 5);
        let mut a = in_memory.table.into_records();
        let mut b = spilled.table.into_records();
        a.sort_by_key(|r| r.candid);
        b.sort_by_key(|r| r.candid);
        assert_eq!(a, b);
        assert_eq!(std::fs::read_dir(dir.path()).unwrap().count(), 0);
    }

    #[tokio::test]
    async fn test_page_failure_discards_spill_files() {
        let dir = tempfile::tempdir().unwrap();
        let client = Arc::new(FakeCatalog {
            fail_at_skip: Some(20),
            ..FakeCatalog::with_rows(60)
        });
        let fetcher = ParallelFetcher::new(
            client.clone(),
            config(
                2,
                SpillMode::LowMemory {
                    spill_dir: Some(dir.path().to_path_buf()),
                },
            ),
        )
        .unwrap();

        let err = fetcher.fetch(plan(60, 10), 60).await.unwrap_err();
        assert!(matches!(err, CatalogError::Query { .. }));
        let leftovers = std::fs::read_dir(dir.path())
            .map(|d| d.count())
            .unwrap_or(0);
        assert_eq!(leftovers, 0);
    }

    #[tokio::test]
    async fn test_page_failure_cancels_in_flight_pages() {
        let client = Arc::new(StallingCatalog::default());
        let fetcher = ParallelFetcher::new(client.clone(), config(2, SpillMode::InMemory)).unwrap();

        let result = tokio::time::timeout(
            std::time::Duration::from_secs(10),
            fetcher.fetch(plan(60, 10), 60),
        )
        .await
        .expect("fetch hung on stalled pages after a failure");

        assert!(matches!(result, Err(CatalogError::Query { status: Some(500), .. })));
        // at most one page per worker plus the failed one ever started
        let started = client.started.load(Ordering::SeqCst);
        assert!(started < 6, "{started} of 6 pages were requested");
        // only the failed page ran to completion; stalled ones were aborted
        assert_eq!(client.finished.load(Ordering::SeqCst), 1);
    }

    #[tokio::test]
    async fn test_malformed_document_is_schema_error() {
        let mut client = FakeCatalog::with_rows(5);
        client.docs[3].remove("objectId");
        let fetcher =
            ParallelFetcher::new(Arc::new(client), config(2, SpillMode::InMemory)).unwrap();

        let err = fetcher.fetch(plan(5, 10), 5).await.unwrap_err();
        assert!(matches!(err, CatalogError::Schema(_)));
    }

    #[tokio::test]
    async fn test_duplicate_candids_dropped() {
        let mut client = FakeCatalog::with_rows(20);
        let dup = client.docs[2].clone();
        client.docs[15] = dup;
        let fetcher =
            ParallelFetcher::new(Arc::new(client), config(2, SpillMode::InMemory)).unwrap();

        let outcome = fetcher.fetch(plan(20, 10), 20).await.unwrap();
        assert_eq!(outcome.duplicates_dropped, 1);
        assert_eq!(outcome.table.len(), 19);
    }

    #[tokio::test]
    async fn test_progress_reported_per_page() {
        let seen = Arc::new(Mutex::new(Vec::new()));
        let sink = Arc::clone(&seen);
        let fetcher = ParallelFetcher::new(
            Arc::new(FakeCatalog::with_rows(25)),
            config(2, SpillMode::InMemory),
        )
        .unwrap()
        .on_progress(move |p| sink.lock().push(p));

        fetcher.fetch(plan(25, 10), 25).await.unwrap();

        let seen = seen.lock();
        assert_eq!(seen.len(), 3);
        let last = seen[2];
        assert_eq!(last.pages_done, 3);
        assert_eq!(last.pages_total, 3);
        assert_eq!(last.received, 25);
        assert_eq!(last.expected, 25);
    }

    #[test]
    fn test_invalid_config_rejected() {
        let err = ParallelFetcher::new(
            Arc::new(FakeCatalog::default()),
            config(1, SpillMode::LowMemory { spill_dir: None }),
        )
        .unwrap_err();
        assert!(matches!(err, CatalogError::Config(_)));
    }
}
