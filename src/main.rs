//! Orderhist main entry point
//!
//! Command-line interface for the purchase-history harvester.

use anyhow::Context;
use clap::Parser;
use orderhist::config::load_config_with_hash;
use orderhist::output::{generate_report, load_statistics, print_statistics};
use orderhist::storage::open_store;
use std::path::{Path, PathBuf};
use tracing_subscriber::EnvFilter;

/// Orderhist: an incremental purchase-history harvester
///
/// Walks the year-paginated order history of a store account, caches every
/// purchased item in a resumable local database, and renders a markdown
/// report. Interrupted runs pick up where they left off.
#[derive(Parser, Debug)]
#[command(name = "orderhist")]
#[command(version)]
#[command(about = "Incremental purchase-history harvester", long_about = None)]
struct Cli {
    /// Path to TOML configuration file
    #[arg(value_name = "CONFIG")]
    config: PathBuf,

    /// Increase logging verbosity (-v, -vv, -vvv)
    #[arg(short, long, action = clap::ArgAction::Count)]
    verbose: u8,

    /// Suppress non-error output
    #[arg(short, long, conflicts_with = "verbose")]
    quiet: bool,

    /// Skip data collection and only render the report from the cache
    #[arg(long, conflicts_with = "stats")]
    export_only: bool,

    /// Skip thumbnail capture during collection
    #[arg(long)]
    no_thumbnails: bool,

    /// Show statistics from the cache and exit
    #[arg(long)]
    stats: bool,
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    let cli = Cli::parse();

    setup_logging(cli.verbose, cli.quiet);

    tracing::info!("Loading configuration from: {}", cli.config.display());
    let (config, config_hash) = load_config_with_hash(&cli.config)
        .with_context(|| format!("failed to load {}", cli.config.display()))?;
    tracing::info!("Configuration loaded (hash: {})", config_hash);

    if cli.stats {
        handle_stats(&config)?;
    } else if cli.export_only {
        handle_export(&config)?;
    } else {
        handle_harvest(&config, !cli.no_thumbnails).await?;
        handle_export(&config)?;
    }

    Ok(())
}

/// Sets up the logging/tracing subscriber based on verbosity level
fn setup_logging(verbose: u8, quiet: bool) {
    let filter = if quiet {
        // Only show errors
        EnvFilter::new("error")
    } else {
        match verbose {
            0 => EnvFilter::new("orderhist=info,warn"),
            1 => EnvFilter::new("orderhist=debug,info"),
            2 => EnvFilter::new("orderhist=trace,debug"),
            _ => EnvFilter::new("trace"),
        }
    };

    tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_target(false)
        .with_thread_ids(false)
        .with_file(false)
        .init();
}

/// Handles the --stats mode: shows statistics from the cache
fn handle_stats(config: &orderhist::Config) -> anyhow::Result<()> {
    let store = open_store(Path::new(&config.output.database_path))?;
    let stats = load_statistics(&store)?;
    print_statistics(&stats);
    Ok(())
}

/// Renders the markdown report from the cache
fn handle_export(config: &orderhist::Config) -> anyhow::Result<()> {
    let store = open_store(Path::new(&config.output.database_path))?;
    generate_report(&store, Path::new(&config.output.report_path))?;
    println!("Report written to: {}", config.output.report_path);
    Ok(())
}

/// Runs the harvest against the live resource
async fn handle_harvest(config: &orderhist::Config, thumbnails: bool) -> anyhow::Result<()> {
    match orderhist::crawler::harvest(config, thumbnails).await {
        Ok(()) => {
            tracing::info!("Harvest completed");
            Ok(())
        }
        Err(e) => {
            // Checkpointed progress survives; re-running resumes from the
            // last unchecked page.
            tracing::error!("Harvest failed: {}", e);
            Err(e.into())
        }
    }
}
