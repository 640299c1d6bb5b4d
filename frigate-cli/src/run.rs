//! One `frigate` invocation: resolve settings, then run each window.

use crate::cli::Cli;
use crate::config::{FileConfig, DEFAULT_CATALOG_URL, DEFAULT_OUTPUT_DIR};
use crate::error::{CliError, CliResult};
use colored::Colorize;
use frigate_catalog::{CatalogClient, CatalogConfig, FetchConfig, HttpCatalogClient, SpillMode};
use frigate_core::time::{datetime_to_jd, parse_jd};
use frigate_core::{QueryWindow, RetryPolicy};
use frigate_pipeline::{Pipeline, PipelineConfig, PipelineReport};
use frigate_skyportal::{
    parse_id_list, FilterSelection, GroupSelection, HttpSkyPortalClient, SkyPortalClient,
    SkyPortalConfig,
};
use frigate_tabular::TableFormat;
use indicatif::{ProgressBar, ProgressDrawTarget, ProgressStyle};
use std::path::PathBuf;
use std::sync::Arc;

/// Everything needed to build clients and pipelines.
#[derive(Debug)]
pub struct Settings {
    pub catalog: CatalogConfig,
    /// `None` when cross-matching is skipped
    pub skyportal: Option<SkyPortalConfig>,
    pub pipeline: PipelineConfig,
}

impl Settings {
    pub fn resolve(cli: &Cli, file: &FileConfig) -> CliResult<Self> {
        let retry = RetryPolicy::with_retries(cli.retries);

        let catalog_token = cli.catalog_token.clone().ok_or_else(|| {
            CliError::Usage("missing catalog token: pass --catalog-token or set KOWALSKI_TOKEN".into())
        })?;
        let mut catalog = CatalogConfig::new(
            cli.catalog_url
                .clone()
                .or_else(|| file.catalog.base_url.clone())
                .unwrap_or_else(|| DEFAULT_CATALOG_URL.to_string()),
            Some(catalog_token),
        );
        if let Some(name) = &file.catalog.catalog {
            catalog.catalog = name.clone();
        }
        if let Some(secs) = file.catalog.timeout_secs {
            catalog.timeout_secs = secs;
        }
        catalog.retry = retry;

        let (skyportal, filters) = if cli.no_crossmatch {
            (None, None)
        } else {
            let selection = FilterSelection {
                groups: cli
                    .groupids
                    .parse::<GroupSelection>()
                    .map_err(|e| CliError::Usage(format!("--groupids: {e}")))?,
                filter_ids: parse_ids("--filterids", &cli.filterids)?,
                saved_only: cli.saved,
            };
            if !selection.has_selector() {
                return Err(CliError::Usage(
                    "no group ids or filter ids given; pass --no-crossmatch to skip SkyPortal".into(),
                ));
            }
            let token = cli.skyportal_token.clone().ok_or_else(|| {
                CliError::Usage(
                    "missing SkyPortal token: pass --skyportal-token or set SKYPORTAL_TOKEN".into(),
                )
            })?;
            let mut config = SkyPortalConfig::new(
                cli.skyportal_url
                    .clone()
                    .or_else(|| file.skyportal.base_url.clone())
                    .unwrap_or_else(|| SkyPortalConfig::default().base_url),
                Some(token),
            );
            if let Some(secs) = file.skyportal.timeout_secs {
                config.timeout_secs = secs;
            }
            config.retry = retry;
            (Some(config), Some(selection))
        };

        let output_format = match cli.format.as_ref().or(file.output.format.as_ref()) {
            Some(s) => s
                .parse::<TableFormat>()
                .map_err(|e| CliError::Usage(format!("--format: {e}")))?,
            None => TableFormat::default(),
        };
        let output_dir = cli
            .output_dir
            .clone()
            .or_else(|| file.output.dir.clone())
            .unwrap_or_else(|| PathBuf::from(DEFAULT_OUTPUT_DIR));

        let mut fetch = FetchConfig::default();
        if let Some(workers) = cli.workers {
            fetch.workers = workers;
        }
        if cli.low_memory {
            fetch.spill = SpillMode::LowMemory {
                spill_dir: cli.spill_dir.clone(),
            };
        }

        Ok(Self {
            catalog,
            skyportal,
            pipeline: PipelineConfig {
                fetch,
                output_dir: Some(output_dir),
                output_format,
                filters,
                max_filter_pages: 0,
            },
        })
    }
}

fn parse_ids(flag: &str, s: &str) -> CliResult<Vec<i64>> {
    parse_id_list(s).map_err(|e| CliError::Usage(format!("{flag}: {e}")))
}

/// Start of the previous day, as a Julian date at midnight UTC.
fn default_start(now_jd: f64) -> f64 {
    (now_jd - 1.0).floor() + 0.5
}

/// One window per `--start`.
pub fn windows_from_args(cli: &Cli, now_jd: f64) -> CliResult<Vec<QueryWindow>> {
    let program_ids = parse_ids("--programids", &cli.programids)?;

    let starts = if cli.start.is_empty() {
        vec![default_start(now_jd)]
    } else {
        cli.start
            .iter()
            .map(|s| parse_jd(s).map_err(|e| CliError::Usage(format!("--start '{s}': {e}"))))
            .collect::<CliResult<Vec<_>>>()?
    };

    let end = match &cli.end {
        Some(_) if starts.len() > 1 => {
            return Err(CliError::Usage(
                "--end can only be used with a single --start".into(),
            ))
        }
        Some(s) => Some(parse_jd(s).map_err(|e| CliError::Usage(format!("--end '{s}': {e}")))?),
        None => None,
    };

    starts
        .into_iter()
        .map(|t_start| {
            let t_end = end.unwrap_or(t_start + cli.nb_days);
            QueryWindow::new(t_start, t_end, program_ids.iter().copied()).map_err(CliError::from)
        })
        .collect()
}

fn progress_bar(quiet: bool) -> ProgressBar {
    let bar = ProgressBar::new(0);
    if quiet {
        bar.set_draw_target(ProgressDrawTarget::hidden());
        return bar;
    }
    let style = ProgressStyle::with_template(
        "{prefix:10} {spinner:.dim} [{bar:25}] {pos}/{len} rows  {msg}",
    )
    .unwrap_or_else(|_| ProgressStyle::default_bar())
    .progress_chars("=>-");
    bar.set_style(style);
    bar.set_prefix(format!("{}", "Fetching".green().bold()));
    bar
}

fn print_report(report: &PipelineReport) {
    if report.reused {
        println!(
            "{} {}: reused {} rows from a previous run",
            "✓".green(),
            report.key,
            report.table.len()
        );
        return;
    }
    println!(
        "{} {}: {} candidates, {} passed filters, {} objects annotated",
        "✓".green(),
        report.key,
        report.table.len(),
        report.matched_records,
        report.annotated_objects
    );
    if let Some(location) = &report.output {
        println!("  {} {location}", "saved:".cyan().bold());
    }
}

pub async fn run(cli: Cli) -> CliResult<()> {
    let file = match &cli.config {
        Some(path) => FileConfig::load(path)?,
        None => FileConfig::default(),
    };
    let windows = windows_from_args(&cli, datetime_to_jd(chrono::Utc::now()))?;
    let settings = Settings::resolve(&cli, &file)?;

    let catalog: Arc<dyn CatalogClient> = Arc::new(HttpCatalogClient::new(settings.catalog)?);
    let skyportal: Option<Arc<dyn SkyPortalClient>> = match settings.skyportal {
        Some(config) => Some(Arc::new(HttpSkyPortalClient::new(config)?) as Arc<dyn SkyPortalClient>),
        None => None,
    };

    let total = windows.len();
    let mut failed = Vec::new();
    for window in windows {
        let label = window.storage_key();
        let mut pipeline = Pipeline::new(Arc::clone(&catalog), settings.pipeline.clone())?;
        if let Some(client) = &skyportal {
            pipeline = pipeline.with_skyportal(Arc::clone(client));
        }

        let bar = progress_bar(cli.quiet);
        let pb = bar.clone();
        let pipeline = pipeline.on_progress(move |p| {
            pb.set_length(p.expected);
            pb.set_position(p.received);
            pb.set_message(format!("page {}/{}", p.pages_done, p.pages_total));
        });

        let result = pipeline.run(window).await;
        bar.finish_and_clear();
        match result {
            Ok(report) => print_report(&report),
            Err(e) if total == 1 => return Err(e.into()),
            Err(e) => {
                eprintln!("{}", CliError::from(e));
                failed.push(label);
            }
        }
    }

    if failed.is_empty() {
        Ok(())
    } else {
        Err(CliError::WindowsFailed { failed, total })
    }
}
