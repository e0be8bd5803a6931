//! Crate-Digger main entry point
//!
//! This is the command-line interface for the Crate-Digger inventory scraper.

use anyhow::{bail, Context};
use clap::Parser;
use crate_digger::auth::{FileCredentialStore, StdinPrompt};
use crate_digger::config::{load_config_with_hash, Config};
use crate_digger::ledger::open_ledger;
use crate_digger::output::{print_scrape_result, print_statistics, write_results};
use crate_digger::storage::open_listing_store;
use crate_digger::{Coordinator, ScrapeResult};
use std::path::{Path, PathBuf};
use std::process::ExitCode;
use std::sync::Arc;
use tokio_util::sync::CancellationToken;
use tracing_subscriber::EnvFilter;

/// Listings printed per seller after a scrape
const SAMPLE_SIZE: usize = 5;

/// Crate-Digger: an incremental marketplace inventory scraper
///
/// Crate-Digger pulls seller inventories from the Discogs marketplace,
/// stops at listings it has already seen, and keeps only good-condition
/// LPs that more collectors want than have.
#[derive(Parser, Debug)]
#[command(name = "crate-digger")]
#[command(version)]
#[command(about = "An incremental marketplace inventory scraper", long_about = None)]
struct Cli {
    /// Path to TOML configuration file
    #[arg(value_name = "CONFIG")]
    config: PathBuf,

    /// Seller whose inventory is scraped (repeatable)
    #[arg(short, long = "user", value_name = "NAME")]
    users: Vec<String>,

    /// Check credentials and connectivity with a single request
    #[arg(long)]
    test: bool,

    /// Show statistics from the listing database
    #[arg(long)]
    stats: bool,

    /// Run the interactive OAuth setup and store the access token
    #[arg(long)]
    authorize: bool,

    /// Write scrape results to FILE (markdown for .md, JSON otherwise)
    #[arg(short, long, value_name = "FILE")]
    output: Option<PathBuf>,

    /// Increase logging verbosity (-v, -vv, -vvv)
    #[arg(short, long, action = clap::ArgAction::Count)]
    verbose: u8,

    /// Suppress non-error output
    #[arg(short, long, conflicts_with = "verbose")]
    quiet: bool,
}

#[tokio::main]
async fn main() -> anyhow::Result<ExitCode> {
    let cli = Cli::parse();

    dotenvy::dotenv().ok();

    setup_logging(cli.verbose, cli.quiet);

    if cli.users.is_empty() && !cli.test && !cli.stats && !cli.authorize {
        bail!("nothing to do: pass --user NAME, --test, --stats or --authorize");
    }

    tracing::info!("Loading configuration from: {}", cli.config.display());
    let (config, config_hash) = load_config_with_hash(&cli.config)
        .with_context(|| format!("failed to load {}", cli.config.display()))?;
    tracing::info!("Configuration loaded successfully (hash: {})", config_hash);

    let coordinator = build_coordinator(config)?;

    if cli.authorize {
        coordinator
            .authorize_interactive(&StdinPrompt)
            .await
            .context("authorization failed")?;
        println!("Access token stored");
    }

    if cli.test {
        coordinator
            .test_connection()
            .await
            .context("connection test failed")?;
        println!("Connection OK");
    }

    let mut exit = ExitCode::SUCCESS;

    if !cli.users.is_empty() {
        let results = handle_scrape(&coordinator, &cli.users).await?;

        if results.iter().any(|result| !result.success) {
            exit = ExitCode::FAILURE;
        }

        if let Some(path) = &cli.output {
            write_results(&results, path)
                .with_context(|| format!("failed to write {}", path.display()))?;
            println!("Results written to: {}", path.display());
        }
    }

    if cli.stats {
        let stats = coordinator.stats().context("failed to read statistics")?;
        print_statistics(&stats);
    }

    Ok(exit)
}

/// Sets up the logging/tracing subscriber based on verbosity level
fn setup_logging(verbose: u8, quiet: bool) {
    let filter = if quiet {
        EnvFilter::new("error")
    } else {
        match verbose {
            0 => EnvFilter::new("crate_digger=info,warn"),
            1 => EnvFilter::new("crate_digger=debug,info"),
            2 => EnvFilter::new("crate_digger=trace,debug"),
            _ => EnvFilter::new("trace"),
        }
    };

    tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_target(false)
        .with_thread_ids(false)
        .with_file(false)
        .with_writer(std::io::stderr)
        .init();
}

/// Wires the file-backed stores into a coordinator
fn build_coordinator(config: Config) -> anyhow::Result<Coordinator> {
    let credentials = Arc::new(FileCredentialStore::new(&config.storage.credential_path));
    let ledger = open_ledger(&config.storage).context("failed to open inventory ledger")?;
    let listings = open_listing_store(Path::new(&config.storage.database_path))
        .with_context(|| format!("failed to open {}", config.storage.database_path))?;

    Ok(Coordinator::new(config, credentials, ledger)?.with_listing_store(Arc::new(listings)))
}

/// Scrapes each seller in turn until done or interrupted
async fn handle_scrape(
    coordinator: &Coordinator,
    users: &[String],
) -> anyhow::Result<Vec<ScrapeResult>> {
    let cancel = CancellationToken::new();
    let on_signal = cancel.clone();
    tokio::spawn(async move {
        if tokio::signal::ctrl_c().await.is_ok() {
            tracing::warn!("Interrupted, stopping after the current page");
            on_signal.cancel();
        }
    });

    let mut results = Vec::with_capacity(users.len());
    for username in users {
        if cancel.is_cancelled() {
            break;
        }

        let result = coordinator
            .trigger_scrape_with_cancellation(username, &cancel)
            .await
            .with_context(|| format!("could not scrape {}", username))?;

        print_scrape_result(&result, SAMPLE_SIZE);
        results.push(result);
    }

    Ok(results)
}
