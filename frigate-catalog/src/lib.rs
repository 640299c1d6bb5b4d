//! Primary catalog access for frigate.
//!
//! Retrieves every candidate of a [`QueryWindow`](frigate_core::QueryWindow)
//! from the alert catalog using a count-then-paginate strategy.
//!
//! # Architecture
//!
//! - [`client`]: the two catalog request shapes (`count_documents`, `find`)
//!   behind the [`CatalogClient`] trait, with an HTTP implementation
//! - [`query`]: typed builders for the request bodies
//! - [`estimator`]: exact window count ([`WindowCountEstimator`])
//! - [`planner`]: splits the count into page requests ([`BatchPlanner`])
//! - [`fetcher`]: bounded worker pool executing the pages ([`ParallelFetcher`])
//! - [`spill`]: run-level memoization and low-memory page spilling ([`SpillCache`])
//! - [`config`] / [`error`]

pub mod client;
pub mod config;
pub mod error;
pub mod estimator;
pub mod fetcher;
pub mod planner;
pub mod query;
pub mod spill;

pub use client::{CatalogClient, HttpCatalogClient};
pub use config::{CatalogConfig, FetchConfig, SpillMode, DEFAULT_CATALOG};
pub use error::{CatalogError, Result};
pub use estimator::WindowCountEstimator;
pub use fetcher::{FetchOutcome, FetchProgress, ParallelFetcher};
pub use planner::BatchPlanner;
pub use spill::{SpillCache, SpillPointer};
