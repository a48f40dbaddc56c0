//! Listing-Relay main entry point
//!
//! This is the command-line interface for the Listing-Relay pipeline.

use anyhow::{bail, Context};
use clap::Parser;
use listing_relay::config::{load_config_with_hash, Config};
use listing_relay::crawler::HttpExtractionService;
use listing_relay::output::{print_job_history, print_job_report};
use listing_relay::storage::open_storage;
use listing_relay::{JobReport, JobRequest, Orchestrator};
use std::path::{Path, PathBuf};
use std::sync::Arc;
use tokio::task::JoinSet;
use tracing_subscriber::EnvFilter;

/// Listing-Relay: crawl listing sites into a property report
///
/// Listing-Relay crawls each seed within depth and page bounds, extracts
/// listings from every page through the configured extraction service,
/// cleans them into a canonical schema and writes a Markdown report.
#[derive(Parser, Debug)]
#[command(name = "listing-relay")]
#[command(version)]
#[command(about = "A queue-driven real-estate listing pipeline", long_about = None)]
struct Cli {
    /// Path to TOML configuration file
    #[arg(value_name = "CONFIG")]
    config: PathBuf,

    /// Seed URL for a single job; replaces the configured targets (repeatable)
    #[arg(long = "seed", value_name = "URL")]
    seeds: Vec<String>,

    /// Maximum link depth from the seeds
    #[arg(long, value_name = "N")]
    depth: Option<u32>,

    /// Maximum number of pages fetched per job
    #[arg(long, value_name = "N")]
    pages: Option<u32>,

    /// Increase logging verbosity (-v, -vv, -vvv)
    #[arg(short, long, action = clap::ArgAction::Count)]
    verbose: u8,

    /// Suppress non-error output
    #[arg(short, long, conflicts_with = "verbose")]
    quiet: bool,

    /// Validate config and show the jobs that would run without running them
    #[arg(long, conflicts_with = "jobs")]
    dry_run: bool,

    /// Show the recorded job history and exit
    #[arg(long, conflicts_with = "dry_run")]
    jobs: bool,
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    let cli = Cli::parse();

    setup_logging(cli.verbose, cli.quiet);

    tracing::info!("Loading configuration from: {}", cli.config.display());
    let (config, config_hash) = load_config_with_hash(&cli.config)
        .with_context(|| format!("failed to load {}", cli.config.display()))?;
    tracing::info!("Configuration loaded successfully (hash: {})", config_hash);

    if cli.jobs {
        return handle_jobs(&config);
    }

    let requests = build_requests(&cli, &config)?;

    if cli.dry_run {
        handle_dry_run(&config, &requests);
        return Ok(());
    }

    handle_run(&config, &config_hash, requests).await
}

/// Sets up the logging/tracing subscriber based on verbosity level
fn setup_logging(verbose: u8, quiet: bool) {
    let filter = if quiet {
        EnvFilter::new("error")
    } else {
        match verbose {
            0 => EnvFilter::new("listing_relay=info,warn"),
            1 => EnvFilter::new("listing_relay=debug,info"),
            2 => EnvFilter::new("listing_relay=trace,debug"),
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

/// One job for the `--seed` set, otherwise one job per configured target
fn build_requests(cli: &Cli, config: &Config) -> anyhow::Result<Vec<JobRequest>> {
    let depth = |fallback: Option<u32>| {
        cli.depth
            .or(fallback)
            .unwrap_or(config.crawler.max_depth)
    };
    let pages = |fallback: Option<u32>| {
        cli.pages
            .or(fallback)
            .unwrap_or(config.crawler.max_pages)
    };

    if !cli.seeds.is_empty() {
        return Ok(vec![
            JobRequest::new(cli.seeds.clone()).with_bounds(depth(None), pages(None))
        ]);
    }

    if config.targets.is_empty() {
        bail!("no seeds: pass --seed URL or add [[target]] entries to the configuration");
    }

    Ok(config
        .targets
        .iter()
        .map(|target| {
            JobRequest::new(target.seeds.clone())
                .with_bounds(depth(target.max_depth), pages(target.max_pages))
        })
        .collect())
}

/// Handles the --dry-run mode: validates config and shows the jobs that would run
fn handle_dry_run(config: &Config, requests: &[JobRequest]) {
    println!("=== Listing-Relay Dry Run ===\n");

    println!("Pipeline:");
    println!(
        "  Workers: {} crawl, {} clean, {} format",
        config.pipeline.crawl_workers, config.pipeline.clean_workers, config.pipeline.format_workers
    );
    println!("  Fetch workers per job: {}", config.pipeline.fetch_workers);
    println!("  Queue max attempts: {}", config.pipeline.queue_max_attempts);

    println!("\nCrawler:");
    println!("  Fetch timeout: {}ms", config.crawler.fetch_timeout_ms);
    println!("  Same host only: {}", config.crawler.same_host_only);

    println!("\nUser Agent:");
    println!("  Name: {}", config.user_agent.crawler_name);
    println!("  Version: {}", config.user_agent.crawler_version);

    println!("\nExtraction endpoint: {}", config.extraction.endpoint);

    println!("\nOutput:");
    println!("  Directory: {}", config.output.directory);
    if let Some(path) = &config.output.database_path {
        println!("  Job history: {}", path);
    }
    println!("  Sorted by: {}", config.output.sort);

    println!("\nJobs ({}):", requests.len());
    for request in requests {
        println!(
            "  - depth {}, pages {}: {}",
            request.max_depth,
            request.max_pages,
            request.seeds.join(", ")
        );
    }

    println!("\n✓ Configuration is valid");
}

/// Handles the --jobs mode: prints the recorded job history
fn handle_jobs(config: &Config) -> anyhow::Result<()> {
    let Some(path) = &config.output.database_path else {
        bail!("no job history: output.database-path is not set");
    };

    println!("Database: {}\n", path);
    let storage = open_storage(Path::new(path))?;
    print_job_history(&storage)?;

    Ok(())
}

/// Runs every job to a terminal state; fails unless all of them are done
async fn handle_run(
    config: &Config,
    config_hash: &str,
    requests: Vec<JobRequest>,
) -> anyhow::Result<()> {
    let extractor = Arc::new(HttpExtractionService::from_config(&config.extraction)?);
    let orchestrator = Orchestrator::start(config, extractor, config_hash)?;

    let mut job_ids = Vec::new();
    let mut waits = JoinSet::new();
    for request in requests {
        let handle = orchestrator.submit(request).await?;
        job_ids.push(handle.job_id());
        waits.spawn(handle.wait());
    }

    let mut reports: Vec<JobReport> = Vec::new();
    let mut interrupted = false;
    loop {
        tokio::select! {
            joined = waits.join_next() => match joined {
                Some(Ok(report)) => reports.push(report),
                Some(Err(e)) => tracing::error!("Waiting on a job failed: {}", e),
                None => break,
            },
            _ = tokio::signal::ctrl_c(), if !interrupted => {
                interrupted = true;
                tracing::warn!("Interrupted, cancelling {} job(s)", job_ids.len());
                for job_id in &job_ids {
                    if let Err(e) = orchestrator.cancel(*job_id) {
                        tracing::warn!("Could not cancel job {}: {}", job_id, e);
                    }
                }
            }
        }
    }

    orchestrator.shutdown().await;

    for report in &reports {
        print_job_report(report);
    }

    let unfinished = reports.iter().filter(|r| !r.is_done()).count() + (job_ids.len() - reports.len());
    if unfinished > 0 {
        bail!("{} of {} job(s) did not complete", unfinished, job_ids.len());
    }

    Ok(())
}
