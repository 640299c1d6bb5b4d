//! Optional `frigate.toml` with endpoint and output defaults.
//!
//! ```toml
//! [catalog]
//! base_url = "https://kowalski.caltech.edu"
//! catalog = "ZTF_alerts"
//! timeout_secs = 6000
//!
//! [skyportal]
//! base_url = "https://fritz.science"
//!
//! [output]
//! dir = "./data"
//! format = "jsonl.zst"
//! ```
//!
//! Command-line flags take precedence over the file. Tokens are only read
//! from flags or the environment.

use crate::error::{CliError, CliResult};
use serde::Deserialize;
use std::fs;
use std::path::{Path, PathBuf};

pub const DEFAULT_CATALOG_URL: &str = "https://kowalski.caltech.edu";
pub const DEFAULT_OUTPUT_DIR: &str = "./data";

#[derive(Debug, Default, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct FileConfig {
    #[serde(default)]
    pub catalog: CatalogSection,
    #[serde(default)]
    pub skyportal: SkyPortalSection,
    #[serde(default)]
    pub output: OutputSection,
}

#[derive(Debug, Default, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct CatalogSection {
    pub base_url: Option<String>,
    pub catalog: Option<String>,
    pub timeout_secs: Option<u64>,
}

#[derive(Debug, Default, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct SkyPortalSection {
    pub base_url: Option<String>,
    pub timeout_secs: Option<u64>,
}

#[derive(Debug, Default, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct OutputSection {
    pub dir: Option<PathBuf>,
    pub format: Option<String>,
}

impl FileConfig {
    pub fn load(path: &Path) -> CliResult<Self> {
        let text = fs::read_to_string(path)
            .map_err(|e| CliError::Input(format!("cannot read {}: {e}", path.display())))?;
        Self::parse(&text)
            .map_err(|msg| CliError::Config(format!("invalid config {}: {msg}", path.display())))
    }

    pub fn parse(text: &str) -> Result<Self, String> {
        toml::from_str(text).map_err(|e| e.to_string())
    }
}
