mod cli;
mod config;
mod error;
mod run;

use clap::Parser;
use cli::Cli;
use error::exit_with_error;

fn init_tracing(cli: &Cli) {
    // --quiet: no logs at all
    // --verbose: RUST_LOG if set, otherwise info
    // default: warnings only (skipped joins, count mismatches, retries)
    let filter = if cli.quiet {
        tracing_subscriber::EnvFilter::new("off")
    } else if cli.verbose {
        tracing_subscriber::EnvFilter::try_from_default_env().unwrap_or_else(|_| "info".into())
    } else {
        tracing_subscriber::EnvFilter::new("warn")
    };

    let ansi = !(cli.no_color || std::env::var_os("NO_COLOR").is_some());

    tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_ansi(ansi)
        .with_target(true)
        .with_writer(std::io::stderr)
        .init();
}

#[tokio::main]
async fn main() {
    let cli = Cli::parse();

    if cli.no_color || std::env::var_os("NO_COLOR").is_some() {
        colored::control::set_override(false);
    }

    init_tracing(&cli);

    if let Err(e) = run::run(cli).await {
        exit_with_error(e);
    }
}
