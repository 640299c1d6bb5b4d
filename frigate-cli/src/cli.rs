use clap::Parser;
use std::path::PathBuf;

#[derive(Parser, Debug)]
#[command(
    name = "frigate",
    about = "Fetch alert candidates, cross-match them with SkyPortal filters and save the annotated table",
    version
)]
pub struct Cli {
    /// Window start(s): Julian date or ISO timestamp. Repeat to run several
    /// windows; defaults to the start of yesterday
    #[arg(long, num_args = 1.., value_name = "JD|ISO")]
    pub start: Vec<String>,

    /// Window end (single window only)
    #[arg(long, value_name = "JD|ISO")]
    pub end: Option<String>,

    /// Window length in days, used when --end is not given
    #[arg(long, default_value_t = 1.0)]
    pub nb_days: f64,

    /// Comma-separated program ids
    #[arg(long, default_value = "1,2,3")]
    pub programids: String,

    /// SkyPortal group ids: comma-separated, or `*` for all groups
    #[arg(long, default_value = "*")]
    pub groupids: String,

    /// Comma-separated SkyPortal filter ids
    #[arg(long, default_value = "")]
    pub filterids: String,

    /// Only candidates saved to every selected group
    #[arg(long)]
    pub saved: bool,

    /// Skip SkyPortal cross-matching entirely
    #[arg(long)]
    pub no_crossmatch: bool,

    /// Parallel catalog workers (capped at available cores)
    #[arg(long, short = 'j')]
    pub workers: Option<usize>,

    /// Spill each fetched page to disk instead of holding it in memory
    #[arg(long)]
    pub low_memory: bool,

    /// Directory for low-memory spill files
    #[arg(long)]
    pub spill_dir: Option<PathBuf>,

    /// Directory for output tables
    #[arg(long)]
    pub output_dir: Option<PathBuf>,

    /// Output format: jsonl or jsonl.zst
    #[arg(long)]
    pub format: Option<String>,

    /// Retries for transient remote failures (0 = single attempt)
    #[arg(long, default_value_t = 0)]
    pub retries: u32,

    /// Catalog (Kowalski) API token
    #[arg(long, env = "KOWALSKI_TOKEN", hide_env_values = true)]
    pub catalog_token: Option<String>,

    /// SkyPortal API token
    #[arg(long, env = "SKYPORTAL_TOKEN", hide_env_values = true)]
    pub skyportal_token: Option<String>,

    /// Catalog base URL (overrides the config file)
    #[arg(long)]
    pub catalog_url: Option<String>,

    /// SkyPortal base URL (overrides the config file)
    #[arg(long)]
    pub skyportal_url: Option<String>,

    /// Path to a TOML config file
    #[arg(long)]
    pub config: Option<PathBuf>,

    /// Enable verbose output
    #[arg(long, short = 'v', conflicts_with = "quiet")]
    pub verbose: bool,

    /// Suppress non-essential output
    #[arg(long, short = 'q', conflicts_with = "verbose")]
    pub quiet: bool,

    /// Disable colored output (also respects NO_COLOR env var)
    #[arg(long)]
    pub no_color: bool,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_defaults() {
        let cli = Cli::try_parse_from(["frigate"]).unwrap();
        assert!(cli.start.is_empty());
        assert_eq!(cli.nb_days, 1.0);
        assert_eq!(cli.programids, "1,2,3");
        assert_eq!(cli.groupids, "*");
        assert_eq!(cli.retries, 0);
        assert!(!cli.low_memory);
    }

    #[test]
    fn test_multiple_starts() {
        let cli = Cli::try_parse_from([
            "frigate",
            "--start",
            "2460000.5",
            "2023-03-01",
            "--low-memory",
            "--spill-dir",
            "/tmp/spill",
            "-j",
            "4",
        ])
        .unwrap();
        assert_eq!(cli.start, vec!["2460000.5", "2023-03-01"]);
        assert_eq!(cli.workers, Some(4));
        assert_eq!(cli.spill_dir, Some(PathBuf::from("/tmp/spill")));
    }

    #[test]
    fn test_verbose_conflicts_with_quiet() {
        assert!(Cli::try_parse_from(["frigate", "-v", "-q"]).is_err());
    }
}
