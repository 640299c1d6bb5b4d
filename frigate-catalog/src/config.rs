//! Catalog client and fetch configuration.

use crate::error::{CatalogError, Result};
use frigate_core::{RetryPolicy, DEFAULT_PAGE_SIZE};
use serde::{Deserialize, Serialize};
use std::path::PathBuf;
use std::time::Duration;

/// Alert catalog queried when none is configured.
pub const DEFAULT_CATALOG: &str = "ZTF_alerts";

/// Default per-request timeout (long: a single page can take minutes).
pub const DEFAULT_TIMEOUT_SECS: u64 = 6000;

/// How to reach the primary catalog.
#[derive(Clone, Debug, Serialize, Deserialize)]
pub struct CatalogConfig {
    /// Service root, e.g. `https://kowalski.caltech.edu`
    pub base_url: String,
    /// Bearer token
    #[serde(default)]
    pub token: Option<String>,
    /// Catalog (collection) name
    #[serde(default = "default_catalog")]
    pub catalog: String,
    #[serde(default = "default_timeout_secs")]
    pub timeout_secs: u64,
    #[serde(default)]
    pub retry: RetryPolicy,
}

fn default_catalog() -> String {
    DEFAULT_CATALOG.to_string()
}

fn default_timeout_secs() -> u64 {
    DEFAULT_TIMEOUT_SECS
}

impl CatalogConfig {
    pub fn new(base_url: impl Into<String>, token: Option<String>) -> Self {
        Self {
            base_url: base_url.into(),
            token,
            catalog: default_catalog(),
            timeout_secs: DEFAULT_TIMEOUT_SECS,
            retry: RetryPolicy::default(),
        }
    }

    pub fn timeout(&self) -> Duration {
        Duration::from_secs(self.timeout_secs)
    }
}

/// Where fetched pages live until the fetch completes.
#[derive(Clone, Debug, Default, PartialEq, Eq)]
pub enum SpillMode {
    /// Accumulate every page in memory.
    #[default]
    InMemory,
    /// Write each page to a temporary file in `spill_dir`; reload at the end.
    LowMemory { spill_dir: Option<PathBuf> },
}

/// Parameters for one parallel fetch.
#[derive(Clone, Debug)]
pub struct FetchConfig {
    pub page_size: usize,
    /// Requested worker count; clamped to `1..=available_parallelism`.
    pub workers: usize,
    pub spill: SpillMode,
}

impl Default for FetchConfig {
    fn default() -> Self {
        Self {
            page_size: DEFAULT_PAGE_SIZE,
            workers: available_parallelism(),
            spill: SpillMode::InMemory,
        }
    }
}

impl FetchConfig {
    /// Reject unusable settings before any remote call is made.
    pub fn validate(&self) -> Result<()> {
        if self.page_size == 0 {
            return Err(CatalogError::Config("page_size must be positive".into()));
        }
        if let SpillMode::LowMemory { spill_dir: None } = self.spill {
            return Err(CatalogError::Config(
                "low-memory mode requires a spill directory".into(),
            ));
        }
        Ok(())
    }

    /// Worker count actually used for `pages` page requests.
    pub fn effective_workers(&self, pages: usize) -> usize {
        self.workers
            .clamp(1, available_parallelism())
            .min(pages.max(1))
    }
}

fn available_parallelism() -> usize {
    std::thread::available_parallelism()
        .map(|p| p.get())
        .unwrap_or(4)
}
