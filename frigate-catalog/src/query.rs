//! Typed builders for the two catalog request shapes.
//!
//! The catalog accepts exactly two queries from this pipeline: a
//! `count_documents` over the window filter and a paged `find` with the
//! candidate projection. Both serialize to
//! `{"query_type", "query": {"catalog", "filter", "projection"?}, "kwargs"?}`.

use frigate_core::{PageRequest, Projection, QueryWindow};
use serde::Serialize;
use std::collections::{BTreeMap, BTreeSet};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum QueryType {
    CountDocuments,
    Find,
}

/// A complete catalog request body.
#[derive(Debug, Serialize)]
pub struct CatalogQuery<'a> {
    pub query_type: QueryType,
    pub query: QueryBody<'a>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub kwargs: Option<FindKwargs>,
}

#[derive(Debug, Serialize)]
pub struct QueryBody<'a> {
    pub catalog: &'a str,
    pub filter: WindowFilter<'a>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub projection: Option<BTreeMap<&'a str, u8>>,
}

/// `candidate.jd ∈ [t_start, t_end)`, `candidate.programid ∈ program_ids`,
/// and optionally `objectId ∈ object_ids`.
#[derive(Debug, Serialize)]
pub struct WindowFilter<'a> {
    #[serde(rename = "candidate.jd")]
    pub jd: JdRange,
    #[serde(rename = "candidate.programid")]
    pub program_id: InSet<'a, i64>,
    #[serde(rename = "objectId", skip_serializing_if = "Option::is_none")]
    pub object_id: Option<InSet<'a, String>>,
}

#[derive(Debug, Serialize)]
pub struct JdRange {
    #[serde(rename = "$gte")]
    pub gte: f64,
    #[serde(rename = "$lt")]
    pub lt: f64,
}

#[derive(Debug, Serialize)]
pub struct InSet<'a, T> {
    #[serde(rename = "$in")]
    pub values: &'a BTreeSet<T>,
}

#[derive(Debug, Clone, Copy, Serialize)]
pub struct FindKwargs {
    pub limit: usize,
    pub skip: usize,
}

impl<'a> WindowFilter<'a> {
    pub fn for_window(window: &'a QueryWindow) -> Self {
        Self {
            jd: JdRange {
                gte: window.t_start(),
                lt: window.t_end(),
            },
            program_id: InSet {
                values: window.program_ids(),
            },
            object_id: window.object_ids().map(|values| InSet { values }),
        }
    }
}

fn projection_map(projection: &Projection) -> BTreeMap<&str, u8> {
    projection
        .exclude
        .iter()
        .map(|f| (f.as_str(), 0))
        .chain(projection.include.iter().map(|f| (f.as_str(), 1)))
        .collect()
}

/// Count of records in the window.
pub fn count_query<'a>(catalog: &'a str, window: &'a QueryWindow) -> CatalogQuery<'a> {
    CatalogQuery {
        query_type: QueryType::CountDocuments,
        query: QueryBody {
            catalog,
            filter: WindowFilter::for_window(window),
            projection: None,
        },
        kwargs: None,
    }
}

/// One page of the window.
pub fn find_query<'a>(catalog: &'a str, request: &'a PageRequest) -> CatalogQuery<'a> {
    CatalogQuery {
        query_type: QueryType::Find,
        query: QueryBody {
            catalog,
            filter: WindowFilter::for_window(&request.window),
            projection: Some(projection_map(&request.projection)),
        },
        kwargs: Some(FindKwargs {
            limit: request.limit,
            skip: request.skip,
        }),
    }
}
