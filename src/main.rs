//! BAFA harvest main entry point
//!
//! This is the command-line interface for the BAFA energy advisor harvester.

use anyhow::Context;
use bafa_harvest::config::{load_config_with_hash, validate as validate_config, Config};
use bafa_harvest::crawler::{crawl, listing_url};
use chrono::Local;
use clap::Parser;
use std::fs::{self, File};
use std::path::{Path, PathBuf};
use std::sync::Mutex;
use tracing_subscriber::prelude::*;
use tracing_subscriber::{fmt, EnvFilter};

/// BAFA harvest: collects the public energy advisor directory
///
/// Walks the advisor listing page by page, follows every entry to its
/// detail page and writes the validated records to a timestamped CSV table
/// and xlsx workbook.
#[derive(Parser, Debug)]
#[command(name = "bafa-harvest")]
#[command(version = "1.0.0")]
#[command(about = "Harvests the BAFA energy advisor directory", long_about = None)]
struct Cli {
    /// Path to an optional TOML configuration file
    #[arg(short, long, value_name = "CONFIG")]
    config: Option<PathBuf>,

    /// Test run: stop after the configured number of accepted records
    #[arg(long)]
    test: bool,

    /// Enable debug logging
    #[arg(long)]
    debug: bool,

    /// Increase logging verbosity (-v, -vv)
    #[arg(short, long, action = clap::ArgAction::Count)]
    verbose: u8,

    /// Suppress non-error output
    #[arg(short, long, conflicts_with_all = ["verbose", "debug"])]
    quiet: bool,

    /// Results requested per listing page
    #[arg(long)]
    page_size: Option<u32>,

    /// Listing page index to start from
    #[arg(long)]
    start_page: Option<u32>,

    /// Maximum number of detail pages fetched at once
    #[arg(long)]
    concurrency: Option<u32>,

    /// Total attempts per request, the first one included
    #[arg(long)]
    retries: Option<u32>,

    /// Per-request timeout in seconds
    #[arg(long)]
    timeout: Option<u64>,

    /// Directory receiving the exported table
    #[arg(long)]
    output_dir: Option<PathBuf>,

    /// Validate the configuration and show it without harvesting
    #[arg(long)]
    dry_run: bool,
}

impl Cli {
    /// Applies command-line overrides on top of the file configuration
    fn apply(&self, config: &mut Config) {
        if self.test {
            config.crawler.test_mode = true;
        }
        if self.debug {
            config.crawler.verbosity = config.crawler.verbosity.max(1);
        }
        config.crawler.verbosity = config.crawler.verbosity.max(self.verbose);
        if let Some(page_size) = self.page_size {
            config.crawler.page_size = page_size;
        }
        if let Some(start_page) = self.start_page {
            config.crawler.start_page = start_page;
        }
        if let Some(concurrency) = self.concurrency {
            config.crawler.max_concurrent_requests = concurrency;
        }
        if let Some(retries) = self.retries {
            config.retry.max_attempts = retries;
        }
        if let Some(timeout) = self.timeout {
            config.crawler.request_timeout_secs = timeout;
        }
        if let Some(output_dir) = &self.output_dir {
            config.output.output_dir = output_dir.clone();
        }
    }
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    let cli = Cli::parse();

    let (mut config, config_hash) = match &cli.config {
        Some(path) => {
            let (config, hash) = load_config_with_hash(path)
                .with_context(|| format!("Failed to load configuration from {}", path.display()))?;
            (config, Some(hash))
        }
        None => (Config::default(), None),
    };
    cli.apply(&mut config);
    validate_config(&config).context("Invalid configuration")?;

    let log_file = setup_logging(config.crawler.verbosity, cli.quiet, &config.output.log_dir);

    match (&cli.config, &config_hash) {
        (Some(path), Some(hash)) => tracing::info!(
            "Configuration loaded from {} (hash: {})",
            path.display(),
            hash
        ),
        _ => tracing::info!("No configuration file given, using defaults"),
    }
    if let Some(path) = &log_file {
        tracing::info!("Logging to {}", path.display());
    }

    if cli.dry_run {
        return handle_dry_run(&config);
    }

    handle_harvest(config).await
}

/// Sets up the logging/tracing subscriber
///
/// Logs go to stderr and, when the log directory is writable, to a
/// timestamped run log without ANSI colors. Returns the run log path.
fn setup_logging(verbosity: u8, quiet: bool, log_dir: &Path) -> Option<PathBuf> {
    let filter = if quiet {
        EnvFilter::new("error")
    } else {
        match verbosity {
            0 => EnvFilter::new("bafa_harvest=info,warn"),
            1 => EnvFilter::new("bafa_harvest=debug,info"),
            _ => EnvFilter::new("bafa_harvest=trace,debug"),
        }
    };

    let log_path = log_dir.join(format!(
        "harvest_{}.log",
        Local::now().format("%Y%m%d_%H%M%S")
    ));
    let file = fs::create_dir_all(log_dir)
        .and_then(|_| File::create(&log_path))
        .map_err(|e| eprintln!("Cannot write run log {}: {}", log_path.display(), e))
        .ok();
    let log_path = file.as_ref().map(|_| log_path);

    let file_layer = file.map(|file| {
        fmt::layer()
            .with_writer(Mutex::new(file))
            .with_ansi(false)
            .with_target(false)
    });

    tracing_subscriber::registry()
        .with(filter)
        .with(
            fmt::layer()
                .with_writer(std::io::stderr)
                .with_target(false)
                .with_thread_ids(false)
                .with_file(false),
        )
        .with(file_layer)
        .init();

    log_path
}

/// Handles the --dry-run mode: shows the effective configuration
fn handle_dry_run(config: &Config) -> anyhow::Result<()> {
    println!("=== BAFA Harvest Dry Run ===\n");

    println!("Run:");
    println!("  Mode: {}", config.mode());
    if let Some(limit) = config.entry_limit() {
        println!("  Entry limit: {}", limit);
    }
    println!("  Start page: {}", config.crawler.start_page);
    println!("  Max pages: {}", config.crawler.max_pages);
    println!("  Page size: {}", config.effective_page_size());
    println!(
        "  Max concurrent requests: {}",
        config.crawler.max_concurrent_requests
    );
    println!("  Request timeout: {}s", config.crawler.request_timeout_secs);
    println!("  Request delay: {}ms", config.crawler.request_delay_ms);

    println!("\nRetry:");
    println!("  Max attempts: {}", config.retry.max_attempts);
    println!(
        "  Backoff: {}ms to {}ms",
        config.retry.backoff_floor_ms, config.retry.backoff_ceiling_ms
    );

    println!("\nSource:");
    println!(
        "  First listing page: {}",
        listing_url(config, config.crawler.start_page)?
    );
    println!("  User agent: {}", config.source.user_agent);

    println!("\nOutput:");
    println!("  Export directory: {}", config.output.output_dir.display());
    println!("  Log directory: {}", config.output.log_dir.display());

    println!("\n✓ Configuration is valid");

    Ok(())
}

/// Handles the main harvest operation
async fn handle_harvest(config: Config) -> anyhow::Result<()> {
    match crawl(config).await {
        Ok(outcome) => {
            println!("{}", outcome.report);
            println!("\nExport: {}", outcome.export_path.display());
            println!("Workbook: {}", outcome.workbook_path.display());
            if let Some(path) = &outcome.error_log {
                println!("Error log: {}", path.display());
            }
            tracing::info!("Harvest completed with {} records", outcome.records.len());
            Ok(())
        }
        Err(e) => {
            tracing::error!("Harvest failed: {}", e);
            Err(e.into())
        }
    }
}
