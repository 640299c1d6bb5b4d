//! Client configuration and filter-match query parameters.

use crate::error::{Result, SkyPortalError};
use frigate_core::{short_digest, QueryWindow, RetryPolicy};
use serde::{Deserialize, Serialize};
use std::fmt;
use std::str::FromStr;
use std::time::Duration;

/// Maximum page size accepted by the candidates-filter endpoint.
pub const FILTER_MATCH_PAGE_SIZE: usize = 500;

/// Iteration cap for one filter-match pagination.
pub const DEFAULT_MAX_PAGES: usize = 20_000;

const DEFAULT_BASE_URL: &str = "https://fritz.science";
const DEFAULT_TIMEOUT_SECS: u64 = 300;

/// How to reach the secondary service.
#[derive(Clone, Debug, Serialize, Deserialize)]
pub struct SkyPortalConfig {
    #[serde(default = "default_base_url")]
    pub base_url: String,
    /// API token, sent as `Authorization: token <token>`
    #[serde(default)]
    pub token: Option<String>,
    #[serde(default = "default_timeout_secs")]
    pub timeout_secs: u64,
    #[serde(default)]
    pub retry: RetryPolicy,
}

fn default_base_url() -> String {
    DEFAULT_BASE_URL.to_string()
}

fn default_timeout_secs() -> u64 {
    DEFAULT_TIMEOUT_SECS
}

impl Default for SkyPortalConfig {
    fn default() -> Self {
        Self {
            base_url: default_base_url(),
            token: None,
            timeout_secs: DEFAULT_TIMEOUT_SECS,
            retry: RetryPolicy::default(),
        }
    }
}

impl SkyPortalConfig {
    pub fn new(base_url: impl Into<String>, token: Option<String>) -> Self {
        Self {
            base_url: base_url.into(),
            token,
            ..Self::default()
        }
    }

    pub fn timeout(&self) -> Duration {
        Duration::from_secs(self.timeout_secs)
    }
}

/// Which groups' filters to search.
#[derive(Clone, Debug, PartialEq, Eq)]
pub enum GroupSelection {
    /// Every group the token can see; no `groupIDs` parameter is sent.
    All,
    Ids(Vec<i64>),
}

impl Default for GroupSelection {
    fn default() -> Self {
        GroupSelection::Ids(Vec::new())
    }
}

impl GroupSelection {
    /// Whether this selection alone is enough to query.
    pub fn is_selector(&self) -> bool {
        match self {
            GroupSelection::All => true,
            GroupSelection::Ids(ids) => !ids.is_empty(),
        }
    }

    /// Ids to send, or `None` when the parameter is omitted.
    pub fn ids(&self) -> Option<&[i64]> {
        match self {
            GroupSelection::All => None,
            GroupSelection::Ids(ids) if ids.is_empty() => None,
            GroupSelection::Ids(ids) => Some(ids),
        }
    }
}

impl FromStr for GroupSelection {
    type Err = SkyPortalError;

    /// `*` or `all` selects every group; otherwise a comma-separated id list.
    fn from_str(s: &str) -> Result<Self> {
        let s = s.trim();
        if s == "*" || s.eq_ignore_ascii_case("all") {
            return Ok(GroupSelection::All);
        }
        parse_id_list(s).map(GroupSelection::Ids)
    }
}

impl fmt::Display for GroupSelection {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            GroupSelection::All => f.write_str("*"),
            GroupSelection::Ids(ids) => f.write_str(&join_ids(ids)),
        }
    }
}

/// Parse `"1, 2,3"` into ids. An empty string is an empty list.
pub fn parse_id_list(s: &str) -> Result<Vec<i64>> {
    s.split(',')
        .map(str::trim)
        .filter(|part| !part.is_empty())
        .map(|part| {
            part.parse::<i64>()
                .map_err(|_| SkyPortalError::Config(format!("invalid id '{part}'")))
        })
        .collect()
}

pub(crate) fn join_ids(ids: &[i64]) -> String {
    ids.iter()
        .map(i64::to_string)
        .collect::<Vec<_>>()
        .join(",")
}

/// Group/filter selectors for one run.
#[derive(Clone, Debug, Default, PartialEq, Eq)]
pub struct FilterSelection {
    pub groups: GroupSelection,
    pub filter_ids: Vec<i64>,
    /// Only candidates saved to every selected group
    pub saved_only: bool,
}

impl FilterSelection {
    /// At least one of groups or filter ids must select something.
    pub fn has_selector(&self) -> bool {
        self.groups.is_selector() || !self.filter_ids.is_empty()
    }

    /// Short digest identifying what this selection matches. Ordering and
    /// repeats of ids do not change it.
    pub fn fingerprint(&self) -> String {
        let groups = match &self.groups {
            GroupSelection::All => "*".to_string(),
            GroupSelection::Ids(ids) => join_ids(&canonical_ids(ids)),
        };
        let filters = join_ids(&canonical_ids(&self.filter_ids));
        let saved = if self.saved_only { "saved" } else { "all" };
        short_digest([groups.as_str(), filters.as_str(), saved])
    }
}

fn canonical_ids(ids: &[i64]) -> Vec<i64> {
    let mut ids = ids.to_vec();
    ids.sort_unstable();
    ids.dedup();
    ids
}

/// One filter-match collection: a window plus selectors and paging limits.
#[derive(Clone, Debug)]
pub struct FilterMatchQuery {
    pub window: QueryWindow,
    pub selection: FilterSelection,
    pub page_size: usize,
    pub max_pages: usize,
}

impl FilterMatchQuery {
    pub fn new(window: QueryWindow, selection: FilterSelection) -> Self {
        Self {
            window,
            selection,
            page_size: FILTER_MATCH_PAGE_SIZE,
            max_pages: DEFAULT_MAX_PAGES,
        }
    }

    pub fn with_max_pages(mut self, max_pages: usize) -> Self {
        self.max_pages = max_pages;
        self
    }

    /// Page size is capped at the endpoint maximum.
    pub fn with_page_size(mut self, page_size: usize) -> Self {
        self.page_size = page_size.clamp(1, FILTER_MATCH_PAGE_SIZE);
        self
    }
}
