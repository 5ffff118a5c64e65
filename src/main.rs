//! Sumi-Frontier main entry point
//!
//! This is the command-line interface for the Sumi-Frontier crawl scheduler.

use anyhow::{bail, Context};
use clap::Parser;
use std::path::{Path, PathBuf};
use std::sync::Arc;
use std::time::Duration;
use sumi_frontier::config::{load_config_with_hash, Config};
use sumi_frontier::output::{print_checkpoint, print_queue_summaries, print_report};
use sumi_frontier::storage::SqliteCheckpointStore;
use sumi_frontier::worker::{HttpProcessor, WorkerPool};
use sumi_frontier::Frontier;
use tracing_subscriber::EnvFilter;

/// Per-request timeout for the built-in HTTP processor
const FETCH_TIMEOUT: Duration = Duration::from_secs(30);

/// Sumi-Frontier: a polite, host-isolating crawl frontier
///
/// Schedules seed URIs into per-host queues and fetches them with a pool of
/// workers, never hitting one host from two workers at once and waiting a
/// multiple of each host's response time between fetches.
#[derive(Parser, Debug)]
#[command(name = "sumi-frontier")]
#[command(version)]
#[command(about = "A polite, host-isolating crawl frontier", long_about = None)]
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

    /// Start from the seeds, ignoring any saved checkpoint
    #[arg(long)]
    fresh: bool,

    /// Validate config and show what would be crawled without crawling
    #[arg(long, conflicts_with_all = ["stats", "fresh"])]
    dry_run: bool,

    /// Show the latest checkpoint and exit
    #[arg(long, conflicts_with_all = ["dry_run", "fresh"])]
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
        handle_crawl(config, &config_hash, cli.fresh).await?;
    }

    Ok(())
}

/// Sets up the logging/tracing subscriber based on verbosity level
fn setup_logging(verbose: u8, quiet: bool) {
    let filter = if quiet {
        EnvFilter::new("error")
    } else {
        match verbose {
            0 => EnvFilter::new("sumi_frontier=info,warn"),
            1 => EnvFilter::new("sumi_frontier=debug,info"),
            2 => EnvFilter::new("sumi_frontier=trace,debug"),
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

/// Handles the --dry-run mode: shows the effective configuration
fn handle_dry_run(config: &Config) {
    println!("=== Sumi-Frontier Dry Run ===\n");

    println!("Frontier:");
    println!("  Max attempts: {}", config.frontier.max_attempts);
    println!("  Retry delay: {}ms", config.frontier.retry_delay_ms);
    println!("  Worker poll timeout: {}ms", config.frontier.next_timeout_ms);
    println!("  Workers: {}", config.workers.count);

    println!("\nPoliteness:");
    println!("  Delay factor: {}", config.politeness.delay_factor);
    println!(
        "  Delay bounds: {}ms .. {}ms",
        config.politeness.min_delay_ms, config.politeness.max_delay_ms
    );
    if config.politeness.max_per_host_bandwidth_kb_sec > 0 {
        println!(
            "  Bandwidth cap: {} KB/s per host",
            config.politeness.max_per_host_bandwidth_kb_sec
        );
    }
    for o in &config.politeness.overrides {
        println!(
            "  Override {}: factor={:?} min={:?} max={:?}",
            o.host, o.delay_factor, o.min_delay_ms, o.max_delay_ms
        );
    }

    println!("\nQueues:");
    println!("  Assignment: {:?}", config.queues.assignment);
    println!("  In-memory limit: {}", config.queues.in_memory_limit);
    println!(
        "  Spill file: {}",
        config.queues.spill_path.as_deref().unwrap_or("(in memory)")
    );
    println!("  Precedence: {:?}", config.precedence.policy);

    println!("\nUser Agent:");
    println!("  {}", config.user_agent.header_value());

    println!("\nSeeds ({}):", config.seeds.urls.len());
    for seed in &config.seeds.urls {
        println!("  - {}", seed);
    }

    println!("\n✓ Configuration is valid");
}

fn open_checkpoint_store(config: &Config) -> anyhow::Result<Option<SqliteCheckpointStore>> {
    match &config.checkpoint.path {
        Some(path) => Ok(Some(
            SqliteCheckpointStore::open(Path::new(path))
                .with_context(|| format!("failed to open checkpoint database {}", path))?,
        )),
        None => Ok(None),
    }
}

/// Handles the --stats mode: prints the latest checkpoint
fn handle_stats(config: &Config) -> anyhow::Result<()> {
    let Some(store) = open_checkpoint_store(config)? else {
        bail!("no [checkpoint] path configured");
    };

    match store.load_latest()? {
        Some((record, snapshot)) => print_checkpoint(&record, &snapshot),
        None => println!("No checkpoints saved yet"),
    }
    Ok(())
}

/// Handles the main crawl operation
async fn handle_crawl(config: Config, config_hash: &str, fresh: bool) -> anyhow::Result<()> {
    let frontier = Arc::new(Frontier::new(&config)?);
    let mut checkpoints = open_checkpoint_store(&config)?;

    if let Some(store) = checkpoints.as_ref().filter(|_| !fresh) {
        if let Some((record, snapshot)) = store.load_latest()? {
            if record.config_hash != config_hash {
                tracing::warn!(
                    "Checkpoint {} was written with a different configuration",
                    record.id
                );
            }
            tracing::info!("Resuming from checkpoint {} ({})", record.id, record.created_at);
            frontier.restore(snapshot);
        }
    } else if fresh {
        tracing::info!("Starting fresh crawl (ignoring saved checkpoints)");
    }

    // Seeds already seen in a restored checkpoint are ignored
    for seed in &config.seeds.urls {
        frontier.schedule_seed(seed);
    }
    tracing::info!(
        "Frontier holds {} URIs in {} queues",
        frontier.pending_uri_count(),
        frontier.queue_count()
    );

    let processor = Arc::new(HttpProcessor::from_config(&config.user_agent, FETCH_TIMEOUT)?);
    let pool = WorkerPool::start(
        frontier.clone(),
        processor,
        config.workers.count,
        Duration::from_millis(config.frontier.next_timeout_ms),
    );
    let mut workers = tokio::spawn(pool.join());

    let snapshot = tokio::select! {
        joined = &mut workers => {
            let processed = joined.context("worker pool panicked")?;
            tracing::info!("Crawl finished after {} URIs", processed);
            frontier.snapshot()
        }
        signal = tokio::signal::ctrl_c() => {
            signal.context("failed to listen for Ctrl-C")?;
            tracing::info!("Interrupted; waiting for in-flight URIs");
            let snapshot = frontier.drain().await;
            frontier.shutdown();
            if let Err(e) = workers.await {
                tracing::error!("Worker pool panicked: {}", e);
            }
            snapshot
        }
    };

    if let Some(store) = checkpoints.as_mut() {
        match store.save(&snapshot, config_hash) {
            Ok(id) => tracing::info!("Saved checkpoint {}", id),
            Err(e) => tracing::error!("Failed to save checkpoint: {}", e),
        }
    }

    println!();
    print_report(&frontier.report());
    println!();
    print_queue_summaries(&frontier.queue_summaries(), 10);

    Ok(())
}
