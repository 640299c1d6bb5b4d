//! Pipeline error type

use frigate_catalog::CatalogError;
use frigate_skyportal::SkyPortalError;
use frigate_tabular::TabularError;
use thiserror::Error;

/// Any failure that aborts a pipeline run
#[derive(Debug, Error)]
pub enum PipelineError {
    #[error(transparent)]
    Catalog(#[from] CatalogError),

    #[error(transparent)]
    SkyPortal(#[from] SkyPortalError),

    #[error("Output error: {0}")]
    Tabular(#[from] TabularError),

    #[error("Configuration error: {0}")]
    Config(String),
}

impl From<frigate_core::Error> for PipelineError {
    fn from(e: frigate_core::Error) -> Self {
        PipelineError::Config(e.to_string())
    }
}

pub type Result<T> = std::result::Result<T, PipelineError>;
