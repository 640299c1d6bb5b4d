//! End-to-end frigate pipeline.
//!
//! ```text
//! WindowCountEstimator → SpillCache lookup → BatchPlanner → ParallelFetcher
//!     → FilterMatchCollector → ObjectMetadataCollector → ResultAssembler → save
//! ```
//!
//! A run either produces a fully annotated, `jd`-sorted table (and persists
//! it when an output store is configured) or returns an error without
//! writing anything.

pub mod assembler;
pub mod config;
pub mod error;
pub mod pipeline;

pub use assembler::{Assembled, ResultAssembler};
pub use config::PipelineConfig;
pub use error::{PipelineError, Result};
pub use pipeline::{run_key, Pipeline, PipelineReport};
