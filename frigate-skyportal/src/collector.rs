//! Filter-match collection.
//!
//! The candidates-filter endpoint is paged by page number, with the first
//! page reporting `totalMatches`. Later requests pass that total back. The
//! loop is modelled as an explicit state machine so that a total that
//! shrinks, an empty page before the total is reached, or a runaway page
//! count all end the loop with an error instead of spinning.

use crate::client::{FilterMatchPageParams, SkyPortalClient};
use crate::config::FilterMatchQuery;
use crate::error::{Result, SkyPortalError};
use frigate_core::FilterMatchIndex;
use std::sync::Arc;
use tracing::{debug, info};

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum PaginationState {
    AwaitingFirstPage,
    Paginating { total: u64, seen: u64 },
    Done { total: u64, seen: u64 },
    Failed,
}

/// Cursor over the candidates-filter pages.
#[derive(Debug, Clone)]
pub struct Pagination {
    state: PaginationState,
    /// Next page number to request (1-based)
    page: usize,
    max_pages: usize,
}

impl Pagination {
    pub fn new(max_pages: usize) -> Self {
        Self {
            state: PaginationState::AwaitingFirstPage,
            page: 1,
            max_pages,
        }
    }

    pub fn state(&self) -> PaginationState {
        self.state
    }

    pub fn is_finished(&self) -> bool {
        matches!(
            self.state,
            PaginationState::Done { .. } | PaginationState::Failed
        )
    }

    /// Next page number and the total to pass back, or an error once the
    /// page cap is reached.
    pub fn next_request(&mut self) -> Result<(usize, Option<u64>)> {
        if self.page > self.max_pages {
            self.state = PaginationState::Failed;
            return Err(SkyPortalError::PageLimitExceeded {
                limit: self.max_pages,
            });
        }
        let total = match self.state {
            PaginationState::Paginating { total, .. } => Some(total),
            _ => None,
        };
        Ok((self.page, total))
    }

    /// Apply one received page.
    pub fn advance(&mut self, reported_total: Option<u64>, received: usize) -> Result<PaginationState> {
        let page = self.page;
        let received = received as u64;
        let next = match self.state {
            PaginationState::AwaitingFirstPage => match reported_total {
                Some(total) => settle(total, received),
                None => Err(SkyPortalError::Schema(
                    "first page did not report totalMatches".into(),
                )),
            },
            PaginationState::Paginating { total, seen } => {
                let reported = reported_total.unwrap_or(total);
                if reported < total {
                    Err(SkyPortalError::TotalMatchesRegressed {
                        previous: total,
                        reported,
                    })
                } else if received == 0 {
                    Err(SkyPortalError::PaginationStalled {
                        page,
                        seen,
                        total: reported,
                    })
                } else {
                    settle(reported, seen + received)
                }
            }
            PaginationState::Done { .. } | PaginationState::Failed => Err(SkyPortalError::Config(
                "pagination already finished".into(),
            )),
        };

        match next {
            Ok(state) => {
                self.state = state;
                self.page += 1;
                Ok(state)
            }
            Err(e) => {
                self.state = PaginationState::Failed;
                Err(e)
            }
        }
    }
}

fn settle(total: u64, seen: u64) -> Result<PaginationState> {
    Ok(if seen >= total {
        PaginationState::Done { total, seen }
    } else {
        PaginationState::Paginating { total, seen }
    })
}

/// Builds a [`FilterMatchIndex`] for a window from the secondary service.
#[derive(Debug, Clone)]
pub struct FilterMatchCollector {
    client: Arc<dyn SkyPortalClient>,
}

impl FilterMatchCollector {
    pub fn new(client: Arc<dyn SkyPortalClient>) -> Self {
        Self { client }
    }

    /// Page through every match in the window.
    ///
    /// Fails with [`SkyPortalError::NoSelectorProvided`] before any request
    /// when neither groups nor filter ids are selected.
    pub async fn collect(&self, query: &FilterMatchQuery) -> Result<FilterMatchIndex> {
        let selection = &query.selection;
        if !selection.has_selector() {
            return Err(SkyPortalError::NoSelectorProvided);
        }

        let start_date = query.window.start_iso()?;
        let end_date = query.window.end_iso()?;
        info!(
            start = %start_date,
            end = %end_date,
            groups = %selection.groups,
            filter_ids = ?selection.filter_ids,
            saved_only = selection.saved_only,
            "collecting filter matches"
        );

        let mut index = FilterMatchIndex::new();
        let mut pagination = Pagination::new(query.max_pages);
        while !pagination.is_finished() {
            let (page_number, total_matches) = pagination.next_request()?;
            let params = FilterMatchPageParams {
                start_date: start_date.clone(),
                end_date: end_date.clone(),
                page_number,
                per_page: query.page_size,
                group_ids: selection.groups.ids().map(<[i64]>::to_vec),
                filter_ids: selection.filter_ids.clone(),
                saved_only: selection.saved_only,
                total_matches,
            };

            let page = self.client.filter_matches_page(&params).await?;
            let received = page.candidates.len();
            for m in &page.candidates {
                index.insert(m.filter_id, m.match_id);
            }

            let state = pagination.advance(page.total_matches, received)?;
            debug!(page = page_number, received, ?state, "filter match page");
        }

        let summary = index.by_match_count();
        info!(
            filters = summary.len(),
            matches = index.total_matches(),
            "filter matches collected"
        );
        for (filter_id, count) in &summary {
            debug!(filter_id, count, "filter match count");
        }
        Ok(index)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::client::{FilterMatch, FilterMatchPage, SourceRecord};
    use crate::config::{FilterSelection, GroupSelection};
    use async_trait::async_trait;
    use frigate_core::QueryWindow;
    use parking_lot::Mutex;

    /// Serves scripted pages in order and records every request.
    #[derive(Debug, Default)]
    struct ScriptedService {
        pages: Mutex<Vec<FilterMatchPage>>,
        requests: Mutex<Vec<FilterMatchPageParams>>,
    }

    impl ScriptedService {
        fn new(mut pages: Vec<FilterMatchPage>) -> Self {
            pages.reverse();
            Self {
                pages: Mutex::new(pages),
                requests: Mutex::default(),
            }
        }
    }

    #[async_trait]
    impl SkyPortalClient for ScriptedService {
        async fn filter_matches_page(&self, params: &FilterMatchPageParams) -> Result<FilterMatchPage> {
            self.requests.lock().push(params.clone());
            Ok(self.pages.lock().pop().unwrap_or_default())
        }

        async fn object_metadata(&self, _object_id: &str) -> Result<SourceRecord> {
            unreachable!("not used by the filter collector")
        }
    }

    fn page(matches: &[(i64, i64)], total: Option<u64>) -> FilterMatchPage {
        FilterMatchPage {
            candidates: matches
                .iter()
                .map(|&(filter_id, match_id)| FilterMatch { filter_id, match_id })
                .collect(),
            total_matches: total,
        }
    }

    fn query(selection: FilterSelection) -> FilterMatchQuery {
        let window = QueryWindow::new(2_460_000.5, 2_460_001.5, [1]).unwrap();
        FilterMatchQuery::new(window, selection).with_page_size(2)
    }

    fn by_filters(ids: &[i64]) -> FilterSelection {
        FilterSelection {
            filter_ids: ids.to_vec(),
            ..Default::default()
        }
    }

    #[tokio::test]
    async fn test_no_selector_makes_no_request() {
        let service = Arc::new(ScriptedService::default());
        let collector = FilterMatchCollector::new(service.clone());

        let err = collector
            .collect(&query(FilterSelection::default()))
            .await
            .unwrap_err();
        assert!(matches!(err, SkyPortalError::NoSelectorProvided));
        assert!(service.requests.lock().is_empty());
    }

    #[tokio::test]
    async fn test_collects_all_pages() {
        let service = Arc::new(ScriptedService::new(vec![
            page(&[(1, 10), (2, 10)], Some(5)),
            page(&[(1, 11), (1, 12)], Some(5)),
            page(&[(3, 13)], Some(5)),
        ]));
        let collector = FilterMatchCollector::new(service.clone());

        let index = collector.collect(&query(by_filters(&[1, 2, 3]))).await.unwrap();
        assert_eq!(index.total_matches(), 5);
        assert_eq!(index.by_match_count()[0], (1, 3));
        assert!(index.contains(2, 10));

        let requests = service.requests.lock();
        assert_eq!(requests.len(), 3);
        assert_eq!(requests[0].page_number, 1);
        assert_eq!(requests[0].total_matches, None);
        assert_eq!(requests[2].page_number, 3);
        assert_eq!(requests[2].total_matches, Some(5));
        assert_eq!(requests[0].per_page, 2);
    }

    #[tokio::test]
    async fn test_empty_window_single_request() {
        let service = Arc::new(ScriptedService::new(vec![page(&[], Some(0))]));
        let collector = FilterMatchCollector::new(service.clone());
        let selection = FilterSelection {
            groups: GroupSelection::All,
            ..Default::default()
        };

        let index = collector.collect(&query(selection)).await.unwrap();
        assert!(index.is_empty());
        let requests = service.requests.lock();
        assert_eq!(requests.len(), 1);
        assert_eq!(requests[0].group_ids, None);
    }

    #[tokio::test]
    async fn test_regressing_total_fails() {
        let service = Arc::new(ScriptedService::new(vec![
            page(&[(1, 10), (1, 11)], Some(6)),
            page(&[(1, 12), (1, 13)], Some(4)),
        ]));
        let err = FilterMatchCollector::new(service)
            .collect(&query(by_filters(&[1])))
            .await
            .unwrap_err();
        assert!(matches!(
            err,
            SkyPortalError::TotalMatchesRegressed {
                previous: 6,
                reported: 4
            }
        ));
    }

    #[tokio::test]
    async fn test_stalled_pagination_fails() {
        let service = Arc::new(ScriptedService::new(vec![
            page(&[(1, 10), (1, 11)], Some(6)),
            page(&[], Some(6)),
        ]));
        let err = FilterMatchCollector::new(service)
            .collect(&query(by_filters(&[1])))
            .await
            .unwrap_err();
        assert!(matches!(
            err,
            SkyPortalError::PaginationStalled {
                page: 2,
                seen: 2,
                total: 6
            }
        ));
    }

    #[tokio::test]
    async fn test_page_cap() {
        let service = Arc::new(ScriptedService::new(vec![
            page(&[(1, 10), (1, 11)], Some(100)),
            page(&[(1, 12), (1, 13)], Some(100)),
            page(&[(1, 14), (1, 15)], Some(100)),
        ]));
        let err = FilterMatchCollector::new(service.clone())
            .collect(&query(by_filters(&[1])).with_max_pages(2))
            .await
            .unwrap_err();
        assert!(matches!(err, SkyPortalError::PageLimitExceeded { limit: 2 }));
        assert_eq!(service.requests.lock().len(), 2);
    }

    #[test]
    fn test_state_transitions() {
        let mut p = Pagination::new(10);
        assert_eq!(p.next_request().unwrap(), (1, None));
        assert_eq!(
            p.advance(Some(3), 2).unwrap(),
            PaginationState::Paginating { total: 3, seen: 2 }
        );
        assert_eq!(p.next_request().unwrap(), (2, Some(3)));
        // a growing total is accepted
        assert_eq!(
            p.advance(Some(4), 1).unwrap(),
            PaginationState::Paginating { total: 4, seen: 3 }
        );
        assert_eq!(
            p.advance(None, 1).unwrap(),
            PaginationState::Done { total: 4, seen: 4 }
        );
        assert!(p.is_finished());
        assert!(p.advance(Some(4), 1).is_err());
    }

    #[test]
    fn test_first_page_without_total() {
        let mut p = Pagination::new(10);
        assert!(matches!(p.advance(None, 3), Err(SkyPortalError::Schema(_))));
        assert_eq!(p.state(), PaginationState::Failed);
    }
}
