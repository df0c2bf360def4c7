//! Sumi-Mirror main entry point
//!
//! This is the command-line interface for the Sumi-Mirror website mirroring engine.

use anyhow::Context;
use clap::Parser;
use std::path::PathBuf;
use sumi_mirror::config::{load_config_with_hash, Config};
use sumi_mirror::crawler::{Controller, Job};
use sumi_mirror::output::{load_statistics, print_statistics, Event, EventStream, JobSummary};
use sumi_mirror::storage::open_storage;
use tracing_subscriber::EnvFilter;

/// Sumi-Mirror: A polite website mirroring engine
///
/// Sumi-Mirror downloads pages and the resources they reference up to a
/// bounded depth, respecting robots.txt and rate limits, and rewrites links so
/// the copy can be browsed offline. Interrupted jobs resume from the cache.
#[derive(Parser, Debug)]
#[command(name = "sumi-mirror")]
#[command(version)]
#[command(about = "A polite website mirroring engine", long_about = None)]
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

    /// Clear the cache store first, re-downloading everything
    #[arg(long)]
    fresh: bool,

    /// Validate config and show what would be mirrored without fetching anything
    #[arg(long, conflicts_with = "stats")]
    dry_run: bool,

    /// Show statistics from the cache store and exit
    #[arg(long, conflicts_with = "dry_run")]
    stats: bool,
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    let cli = Cli::parse();

    setup_logging(cli.verbose, cli.quiet);

    tracing::info!("Loading configuration from: {}", cli.config.display());
    let (config, config_hash) = load_config_with_hash(&cli.config)
        .with_context(|| format!("failed to load {}", cli.config.display()))?;
    tracing::info!("Configuration loaded successfully (hash: {})", config_hash);

    if cli.dry_run {
        handle_dry_run(&config);
    } else if cli.stats {
        handle_stats(&config)?;
    } else {
        handle_mirror(config, config_hash, cli.fresh).await?;
    }

    Ok(())
}

/// Sets up the logging/tracing subscriber based on verbosity level
///
/// `RUST_LOG` takes precedence over the flags when set.
fn setup_logging(verbose: u8, quiet: bool) {
    let fallback = if quiet {
        "error"
    } else {
        match verbose {
            0 => "sumi_mirror=info,warn",
            1 => "sumi_mirror=debug,info",
            2 => "sumi_mirror=trace,debug",
            _ => "trace",
        }
    };
    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(fallback));

    tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_target(false)
        .with_thread_ids(false)
        .with_file(false)
        .init();
}

/// Handles the --dry-run mode: validates config and shows what would be mirrored
fn handle_dry_run(config: &Config) {
    let job = &config.job;
    println!("=== Sumi-Mirror Dry Run ===\n");

    println!("Job Configuration:");
    println!("  Output root: {}", job.output_root.display());
    println!("  Cache store: {}", job.cache_db_path().display());
    println!("  Structure: {:?}", job.structure);
    println!("  Max depth: {}", job.max_depth);
    println!("  Concurrency: {}", job.concurrency);
    println!(
        "  Rate limit: {}ms{}",
        job.rate_limit,
        if job.per_host_rate_limit { " per host" } else { "" }
    );
    println!("  Timeout: {}s, retries: {}", job.timeout, job.retries);
    println!("  Respect robots.txt: {}", job.respect_robots);
    println!("  Follow external links: {}", job.follow_external_links);
    if job.max_file_size > 0 {
        println!("  Max file size: {} bytes", job.max_file_size);
    }
    if let Some(start) = job.scheduled_start {
        println!("  Scheduled start: {}", start.to_rfc3339());
    }

    println!("\nUser Agent:");
    println!("  {}", config.user_agent.resolve());

    println!("\nResource Types ({}):", job.resource_types.len());
    for kind in &job.resource_types {
        println!("  - {}", kind);
    }

    println!("\nExclusions ({}):", job.exclusions.len());
    for pattern in &job.exclusions {
        println!("  - {}", pattern);
    }

    println!("\nSeeds ({}):", job.seeds.len());
    for seed in &job.seeds {
        println!("  * {}", seed);
    }

    println!("\n✓ Configuration is valid");
}

/// Handles the --stats mode: shows statistics from the cache store
fn handle_stats(config: &Config) -> anyhow::Result<()> {
    let path = config.job.cache_db_path();
    println!("Cache store: {}\n", path.display());

    if !path.exists() {
        println!("No cache store yet; run a job first.");
        return Ok(());
    }

    let storage = open_storage(&path)?;
    let stats = load_statistics(&storage)?;
    print_statistics(&stats);

    Ok(())
}

/// Handles the main mirroring operation
async fn handle_mirror(config: Config, config_hash: String, fresh: bool) -> anyhow::Result<()> {
    if fresh {
        tracing::info!("Starting fresh job (cache store will be cleared)");
    } else {
        tracing::info!("Starting job (reusing cached resources where possible)");
    }
    tracing::info!("Total seed URLs: {}", config.job.seeds.len());

    let job = Job::new(config, fresh)?.with_config_hash(config_hash);
    let controller = job.controller();
    let events = job.events();

    tokio::spawn(stop_on_ctrl_c(controller));
    let logger = tokio::spawn(log_events(events));

    let result = job.run().await;
    // The event stream ends once the job and its reporters are dropped
    let _ = logger.await;

    let summary = result.context("mirroring job failed")?;
    print_summary(&summary);
    Ok(())
}

/// First Ctrl-C stops the job; in-flight work is abandoned and recorded
async fn stop_on_ctrl_c(controller: Controller) {
    if tokio::signal::ctrl_c().await.is_ok() {
        tracing::warn!("Interrupt received, stopping job");
        controller.stop();
    }
}

async fn log_events(mut events: EventStream) {
    while let Some(event) = events.recv().await {
        match &event {
            Event::TaskSucceeded { url, resource } => {
                tracing::debug!(
                    url = %url,
                    path = %resource.local_path,
                    bytes = resource.byte_size,
                    cached = resource.from_cache,
                    "saved"
                );
            }
            Event::TaskFailed {
                url,
                reason,
                attempts,
            } => {
                tracing::warn!(url = %url, reason = %reason, attempts, "failed");
            }
            Event::TaskSkipped { url, reason } => {
                tracing::info!(url = %url, reason = %reason, "skipped");
            }
            Event::TaskStarted { .. } | Event::JobStarted { .. } | Event::JobCompleted(_) => {
                tracing::trace!(event = event.name(), url = ?event.url(), "event");
            }
        }
    }
    if events.dropped() > 0 {
        tracing::debug!(dropped = events.dropped(), "event logger fell behind");
    }
}

fn print_summary(summary: &JobSummary) {
    println!("\n=== Job {} ({}) ===", summary.job_id, summary.status.to_db_string());
    println!("  Saved: {} ({} from cache)", summary.succeeded, summary.from_cache);
    println!("  Failed: {}", summary.failed);
    println!("  Skipped: {}", summary.skipped);
    println!("  Rejected: {}", summary.rejected);
    println!("  Bytes transferred: {}", summary.bytes_transferred);
    println!("  Elapsed: {:.1}s", summary.elapsed().as_secs_f64());
    println!("  Output: {}", summary.output_root.display());
}
