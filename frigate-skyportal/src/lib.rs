//! Secondary service (SkyPortal) access for frigate.
//!
//! - [`FilterMatchCollector`] pages through the candidates-filter endpoint and
//!   builds a [`FilterMatchIndex`](frigate_core::FilterMatchIndex)
//! - [`ObjectMetadataCollector`] looks up groups, vetted classifications and
//!   the canonical name of each object that passed a filter
//!
//! Both talk to the service through the [`SkyPortalClient`] trait; the HTTP
//! implementation is [`HttpSkyPortalClient`].

pub mod client;
pub mod collector;
pub mod config;
pub mod error;
pub mod metadata;

pub use client::{
    Classification, FilterMatch, FilterMatchPage, FilterMatchPageParams, HttpSkyPortalClient,
    SkyPortalClient, SourceRecord,
};
pub use collector::{FilterMatchCollector, Pagination, PaginationState};
pub use config::{
    parse_id_list, FilterMatchQuery, FilterSelection, GroupSelection, SkyPortalConfig,
    DEFAULT_MAX_PAGES, FILTER_MATCH_PAGE_SIZE,
};
pub use error::{Result, SkyPortalError};
pub use metadata::{vet_classifications, ObjectMetadataCollector, MIN_CLASSIFICATION_PROBABILITY};
