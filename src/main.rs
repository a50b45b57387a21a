//! Ripple main entry point
//!
//! This is the command-line interface for the Ripple distributed crawler.
//! Each invocation runs one worker process or one ingress/status command
//! against the shared store named in the configuration file.

use anyhow::{bail, Context};
use clap::{Parser, Subcommand};
use ripple_crawl::config::{load_config_with_hash, Config};
use ripple_crawl::crawler::{build_http_client, run, seed, shutdown_signal, Scanner, Spider};
use ripple_crawl::output::{find_jobs, load_statistics, print_statistics, render_jobs};
use ripple_crawl::storage::{connect_with_retry, BlobStore, FsBlobStore, SqliteStore};
use std::path::{Path, PathBuf};
use std::sync::Arc;
use tracing_subscriber::EnvFilter;

/// Ripple: a polite, depth-bounded distributed web crawler
///
/// Start any number of `spider` and `scanner` workers against the same
/// store, then `seed` a URL. Workers cooperate through the store's queues
/// and per-domain locks.
#[derive(Parser, Debug)]
#[command(name = "ripple")]
#[command(version = "1.0.0")]
#[command(about = "A polite distributed web crawler", long_about = None)]
struct Cli {
    /// Path to TOML configuration file
    #[arg(short, long, value_name = "FILE")]
    config: PathBuf,

    /// Increase logging verbosity (-v, -vv, -vvv)
    #[arg(short, long, action = clap::ArgAction::Count, global = true)]
    verbose: u8,

    /// Suppress non-error output
    #[arg(short, long, conflicts_with = "verbose", global = true)]
    quiet: bool,

    #[command(subcommand)]
    command: Command,
}

#[derive(Subcommand, Debug)]
enum Command {
    /// Run a fetch worker
    Spider,

    /// Run a frontier expansion worker
    Scanner,

    /// Start a crawl session from a seed URL
    Seed {
        /// Absolute http(s) URL
        url: String,
    },

    /// Print Job State for a task or crawl session
    Status {
        /// Task identifier or correlation id
        id: String,
    },

    /// Show job counts and queue depths
    Stats,
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    let cli = Cli::parse();

    // Setup logging based on verbosity
    setup_logging(cli.verbose, cli.quiet);

    // Load and validate configuration
    tracing::info!("Loading configuration from: {}", cli.config.display());
    let (config, hash) = load_config_with_hash(&cli.config)
        .with_context(|| format!("Failed to load configuration {}", cli.config.display()))?;
    tracing::info!("Configuration loaded successfully (hash: {})", hash);

    // The store is required for every command; refuse to start without it
    let store = connect_with_retry(
        Path::new(&config.store.database_path),
        config.store.connect_attempts,
    )
    .await
    .context("Shared store unreachable")?;

    match cli.command {
        Command::Spider => handle_spider(config, store).await,
        Command::Scanner => handle_scanner(config, store).await,
        Command::Seed { url } => handle_seed(&config, &store, &url),
        Command::Status { id } => handle_status(&store, &id),
        Command::Stats => handle_stats(&config, &store),
    }
}

/// Sets up the logging/tracing subscriber based on verbosity level
fn setup_logging(verbose: u8, quiet: bool) {
    let filter = if quiet {
        // Only show errors
        EnvFilter::new("error")
    } else {
        match verbose {
            0 => EnvFilter::new("ripple_crawl=info,ripple=info,warn"),
            1 => EnvFilter::new("ripple_crawl=debug,ripple=debug,info"),
            2 => EnvFilter::new("ripple_crawl=trace,ripple=trace,debug"),
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

fn blob_store(config: &Config) -> Arc<dyn BlobStore> {
    Arc::new(FsBlobStore::new(&config.store.blob_root))
}

/// Runs a spider worker until Ctrl-C
async fn handle_spider(config: Config, store: SqliteStore) -> anyhow::Result<()> {
    let client = build_http_client(&config).context("Failed to build HTTP client")?;
    tracing::info!(
        "Spider as '{}', max depth {}, lock mode {:?}",
        config.user_agent.header(),
        config.crawler.max_depth,
        config.lock.mode
    );

    let store = Arc::new(store);
    let spider = Spider::new(Arc::clone(&store), blob_store(&config), client, &config);
    run(&spider, store.as_ref(), &config.queue, shutdown_signal()).await;
    Ok(())
}

/// Runs a scanner worker until Ctrl-C
async fn handle_scanner(config: Config, store: SqliteStore) -> anyhow::Result<()> {
    tracing::info!(
        "Scanner with fan-out {} per page",
        config.crawler.max_links_per_page
    );

    let store = Arc::new(store);
    let scanner = Scanner::new(Arc::clone(&store), blob_store(&config), &config);
    run(&scanner, store.as_ref(), &config.queue, shutdown_signal()).await;
    Ok(())
}

/// Seeds a crawl session and prints its ids
fn handle_seed(config: &Config, store: &SqliteStore, url: &str) -> anyhow::Result<()> {
    let task = seed(store, url, &config.crawler).with_context(|| format!("Cannot seed {}", url))?;

    println!("identifier:  {}", task.identifier);
    println!("correlation: {}", task.correlation);
    Ok(())
}

/// Prints Job State for a task identifier or a whole session
fn handle_status(store: &SqliteStore, id: &str) -> anyhow::Result<()> {
    let jobs = find_jobs(store, id)?;
    if jobs.is_empty() {
        bail!("No job state for {}", id);
    }

    println!("{}", render_jobs(&jobs)?);
    Ok(())
}

/// Shows statistics from the shared store
fn handle_stats(config: &Config, store: &SqliteStore) -> anyhow::Result<()> {
    println!("Database: {}\n", config.store.database_path);

    let stats = load_statistics(store)?;
    print_statistics(&stats);

    Ok(())
}
