//! Splits an expected count into page requests.

use frigate_core::{PageRequest, Projection, QueryWindow, DEFAULT_PAGE_SIZE};
use std::sync::Arc;

/// Divides `[0, total)` into fixed-size, non-overlapping page requests.
#[derive(Debug, Clone)]
pub struct BatchPlanner {
    page_size: usize,
    projection: Arc<Projection>,
}

impl Default for BatchPlanner {
    fn default() -> Self {
        Self::new(DEFAULT_PAGE_SIZE)
    }
}

impl BatchPlanner {
    /// `page_size` of zero is treated as one.
    pub fn new(page_size: usize) -> Self {
        Self {
            page_size: page_size.max(1),
            projection: Arc::new(Projection::candidates()),
        }
    }

    pub fn with_projection(mut self, projection: Projection) -> Self {
        self.projection = Arc::new(projection);
        self
    }

    pub fn page_size(&self) -> usize {
        self.page_size
    }

    /// Number of pages for a window with `total` records.
    ///
    /// Object-scoped windows page over the object id list instead of the
    /// record count.
    pub fn batch_count(&self, window: &QueryWindow, total: u64) -> usize {
        let units = match window.object_ids() {
            Some(ids) => ids.len(),
            None => total as usize,
        };
        units.div_ceil(self.page_size)
    }

    /// One request per batch with `skip = i * page_size`.
    ///
    /// For unscoped windows the last page is bounded to `total - skip`, so the
    /// requested ranges cover `[0, total)` exactly.
    pub fn plan(&self, window: Arc<QueryWindow>, total: u64) -> Vec<PageRequest> {
        let batches = self.batch_count(&window, total);
        let scoped = window.is_object_scoped();
        let total = total as usize;

        (0..batches)
            .map(|index| {
                let skip = index * self.page_size;
                let limit = if scoped {
                    self.page_size
                } else {
                    self.page_size.min(total - skip)
                };
                PageRequest {
                    index,
                    window: Arc::clone(&window),
                    projection: Arc::clone(&self.projection),
                    limit,
                    skip,
                }
            })
            .collect()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn window() -> Arc<QueryWindow> {
        Arc::new(QueryWindow::new(2_460_000.5, 2_460_001.5, [1]).unwrap())
    }

    #[test]
    fn test_plan_covers_range_exactly() {
        let planner = BatchPlanner::new(10_000);
        let pages = planner.plan(window(), 25_000);

        assert_eq!(pages.len(), 3);
        let skips: Vec<usize> = pages.iter().map(|p| p.skip).collect();
        assert_eq!(skips, vec![0, 10_000, 20_000]);
        assert_eq!(pages[2].limit, 5_000);

        let covered: usize = pages.iter().map(|p| p.offset_range().len()).sum();
        assert_eq!(covered, 25_000);
        for pair in pages.windows(2) {
            assert_eq!(pair[0].offset_range().end, pair[1].offset_range().start);
        }
    }

    #[test]
    fn test_plan_exact_multiple() {
        let pages = BatchPlanner::new(100).plan(window(), 300);
        assert_eq!(pages.len(), 3);
        assert!(pages.iter().all(|p| p.limit == 100));
    }

    #[test]
    fn test_plan_empty_window() {
        let pages = BatchPlanner::default().plan(window(), 0);
        assert!(pages.is_empty());
    }

    #[test]
    fn test_plan_object_scoped_uses_id_count() {
        let scoped = Arc::new(
            QueryWindow::new(2_460_000.5, 2_460_001.5, [1])
                .unwrap()
                .with_object_ids(["ZTF1", "ZTF2", "ZTF3", "ZTF4", "ZTF5"]),
        );
        let planner = BatchPlanner::new(2);

        assert_eq!(planner.batch_count(&scoped, 1_000), 3);
        let pages = planner.plan(scoped, 1_000);
        assert_eq!(pages.len(), 3);
        assert!(pages.iter().all(|p| p.limit == 2));
        assert_eq!(pages[2].skip, 4);
    }

    #[test]
    fn test_zero_page_size_is_clamped() {
        let planner = BatchPlanner::new(0);
        assert_eq!(planner.page_size(), 1);
        assert_eq!(planner.plan(window(), 3).len(), 3);
    }
}
