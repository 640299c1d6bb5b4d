use colored::Colorize;
use frigate_catalog::CatalogError;
use frigate_pipeline::PipelineError;
use frigate_skyportal::SkyPortalError;
use std::fmt;
use std::process;

/// Exit codes for the CLI.
pub const EXIT_ERROR: i32 = 1;
pub const EXIT_USAGE: i32 = 2;

/// Unified error type for CLI operations.
pub enum CliError {
    /// A pipeline stage failed.
    Pipeline(PipelineError),
    /// Invalid settings (config file, spill mode, selectors).
    Config(String),
    /// Argument / usage errors.
    Usage(String),
    /// Unreadable config file.
    Input(String),
    /// Some windows of a multi-window run failed.
    WindowsFailed { failed: Vec<String>, total: usize },
}

impl fmt::Display for CliError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            CliError::Pipeline(e) => write!(f, "{} {e}", "error:".red().bold()),
            CliError::Config(msg) => write!(f, "{} {msg}", "error:".red().bold()),
            CliError::Usage(msg) => write!(
                f,
                "{} {msg}\n  {} run 'frigate --help' for usage",
                "error:".red().bold(),
                "help:".cyan().bold(),
            ),
            CliError::Input(msg) => write!(f, "{} {msg}", "error:".red().bold()),
            CliError::WindowsFailed { failed, total } => write!(
                f,
                "{} {} of {} windows failed: {}",
                "error:".red().bold(),
                failed.len(),
                total,
                failed.join(", ")
            ),
        }
    }
}

impl fmt::Debug for CliError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        fmt::Display::fmt(self, f)
    }
}

impl From<PipelineError> for CliError {
    fn from(e: PipelineError) -> Self {
        match e {
            PipelineError::Config(msg) => CliError::Config(msg),
            PipelineError::Catalog(CatalogError::Config(msg)) => CliError::Config(msg),
            PipelineError::SkyPortal(SkyPortalError::Config(msg)) => CliError::Config(msg),
            other => CliError::Pipeline(other),
        }
    }
}

impl From<CatalogError> for CliError {
    fn from(e: CatalogError) -> Self {
        PipelineError::from(e).into()
    }
}

impl From<SkyPortalError> for CliError {
    fn from(e: SkyPortalError) -> Self {
        PipelineError::from(e).into()
    }
}

impl From<frigate_core::Error> for CliError {
    fn from(e: frigate_core::Error) -> Self {
        CliError::Usage(e.to_string())
    }
}

impl From<std::io::Error> for CliError {
    fn from(e: std::io::Error) -> Self {
        CliError::Input(e.to_string())
    }
}

impl CliError {
    pub fn exit_code(&self) -> i32 {
        match self {
            CliError::Usage(_) | CliError::Config(_) => EXIT_USAGE,
            _ => EXIT_ERROR,
        }
    }
}

/// Print error and exit with the appropriate code.
pub fn exit_with_error(err: CliError) -> ! {
    eprintln!("{err}");
    process::exit(err.exit_code())
}

pub type CliResult<T> = std::result::Result<T, CliError>;
