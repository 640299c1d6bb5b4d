//! Pipeline configuration.

use crate::error::{PipelineError, Result};
use frigate_catalog::FetchConfig;
use frigate_skyportal::{FilterSelection, DEFAULT_MAX_PAGES};
use frigate_tabular::TableFormat;
use std::path::PathBuf;

#[derive(Clone, Debug, Default)]
pub struct PipelineConfig {
    pub fetch: FetchConfig,
    /// Where completed runs are saved and looked up; `None` disables both.
    pub output_dir: Option<PathBuf>,
    pub output_format: TableFormat,
    /// Group/filter selectors. `None` skips cross-matching entirely.
    pub filters: Option<FilterSelection>,
    /// Iteration cap for filter-match pagination; `0` means the default cap.
    pub max_filter_pages: usize,
}

impl PipelineConfig {
    pub fn validate(&self) -> Result<()> {
        self.fetch.validate()?;
        if let Some(selection) = &self.filters {
            if !selection.has_selector() {
                return Err(PipelineError::Config(
                    "filter cross-matching needs group ids or filter ids".into(),
                ));
            }
        }
        Ok(())
    }

    pub fn filter_page_cap(&self) -> usize {
        if self.max_filter_pages == 0 {
            DEFAULT_MAX_PAGES
        } else {
            self.max_filter_pages
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use frigate_catalog::SpillMode;
    use frigate_skyportal::GroupSelection;

    #[test]
    fn test_validate() {
        assert!(PipelineConfig::default().validate().is_ok());

        let config = PipelineConfig {
            filters: Some(FilterSelection::default()),
            ..Default::default()
        };
        assert!(matches!(config.validate(), Err(PipelineError::Config(_))));

        let config = PipelineConfig {
            filters: Some(FilterSelection {
                groups: GroupSelection::All,
                ..Default::default()
            }),
            ..Default::default()
        };
        assert!(config.validate().is_ok());

        let mut config = PipelineConfig::default();
        config.fetch.spill = SpillMode::LowMemory { spill_dir: None };
        assert!(matches!(config.validate(), Err(PipelineError::Catalog(_))));
    }

    #[test]
    fn test_filter_page_cap() {
        assert_eq!(PipelineConfig::default().filter_page_cap(), DEFAULT_MAX_PAGES);
        let config = PipelineConfig {
            max_filter_pages: 3,
            ..Default::default()
        };
        assert_eq!(config.filter_page_cap(), 3);
    }
}
