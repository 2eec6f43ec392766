//! Sitesift main entry point
//!
//! This is the command-line interface for the Sitesift crawler.

use anyhow::Context;
use clap::Parser;
use sitesift::config::{
    hash_with_overrides, load_config_with_hash, validate, Config, StrategyMode,
};
use sitesift::crawler::run_crawl;
use sitesift::output::print_statistics;
use std::path::PathBuf;
use tokio_util::sync::CancellationToken;
use tracing_subscriber::EnvFilter;

/// Sitesift: a site crawler and content extractor
///
/// Sitesift crawls a site from its seed URLs, fetching each page statically
/// or through a headless browser, downloads embedded resources and classifies
/// the content into structured records.
#[derive(Parser, Debug)]
#[command(name = "sitesift")]
#[command(version = "1.0.0")]
#[command(about = "A site crawler and content extractor", long_about = None)]
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

    /// Validate config and show what would be crawled without actually crawling
    #[arg(long)]
    dry_run: bool,

    /// Seed URL replacing the configured seeds (repeatable)
    #[arg(long = "seed", value_name = "URL")]
    seeds: Vec<String>,

    /// Fetch strategy: static, rendered or auto
    #[arg(long, value_parser = parse_strategy)]
    strategy: Option<StrategyMode>,

    /// Output root directory; the session writes into a subdirectory
    #[arg(long, value_name = "DIR")]
    output_dir: Option<PathBuf>,
}

fn parse_strategy(value: &str) -> Result<StrategyMode, String> {
    match value.to_ascii_lowercase().as_str() {
        "static" => Ok(StrategyMode::Static),
        "rendered" => Ok(StrategyMode::Rendered),
        "auto" => Ok(StrategyMode::Auto),
        other => Err(format!(
            "unknown strategy '{}', expected static, rendered or auto",
            other
        )),
    }
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    let cli = Cli::parse();

    // Setup logging based on verbosity
    setup_logging(cli.verbose, cli.quiet);

    tracing::info!("Loading configuration from: {}", cli.config.display());
    let (mut config, file_hash) = load_config_with_hash(&cli.config)
        .with_context(|| format!("failed to load {}", cli.config.display()))?;
    tracing::info!(hash = %file_hash, "Configuration loaded");

    let overrides = apply_overrides(&mut config, &cli);
    validate(&config).context("invalid configuration after command-line overrides")?;
    let config_hash = hash_with_overrides(&file_hash, &overrides);
    if !overrides.is_empty() {
        tracing::info!(hash = %config_hash, overrides = overrides.len(), "Effective configuration hash");
    }

    if cli.dry_run {
        handle_dry_run(&config, &config_hash);
        return Ok(());
    }

    handle_crawl(config, config_hash).await
}

/// Sets up the logging/tracing subscriber based on verbosity level
fn setup_logging(verbose: u8, quiet: bool) {
    let filter = if quiet {
        // Only show errors
        EnvFilter::new("error")
    } else {
        match verbose {
            0 => EnvFilter::new("sitesift=info,warn"),
            1 => EnvFilter::new("sitesift=debug,info"),
            2 => EnvFilter::new("sitesift=trace,debug"),
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

/// Applies command-line overrides and returns the ones that took effect
fn apply_overrides(config: &mut Config, cli: &Cli) -> Vec<(&'static str, String)> {
    let mut applied = Vec::new();
    if !cli.seeds.is_empty() {
        config.crawler.seeds = cli.seeds.clone();
        applied.push(("seeds", cli.seeds.join(" ")));
    }
    if let Some(strategy) = cli.strategy {
        config.crawler.strategy = strategy;
        applied.push(("strategy", format!("{:?}", strategy)));
    }
    if let Some(dir) = &cli.output_dir {
        config.output.dir = dir.clone();
        applied.push(("output_dir", dir.display().to_string()));
    }
    applied
}

/// Handles the --dry-run mode: shows the effective configuration and the seeds
fn handle_dry_run(config: &Config, config_hash: &str) {
    println!("=== Sitesift Dry Run ===\n");

    println!("Crawler Configuration:");
    println!("  Strategy: {:?}", config.crawler.strategy);
    println!("  Max pages: {}", config.crawler.max_pages);
    println!("  Max depth: {}", config.crawler.max_depth);
    println!("  Concurrency: {}", config.crawler.concurrency);
    println!("  Delay: {}ms", config.crawler.delay_ms);
    println!("  Timeout: {}ms", config.crawler.timeout_ms);
    println!("  Retry attempts: {}", config.crawler.retry_attempts);
    println!("  Follow links: {}", config.crawler.follow_links);
    println!(
        "  Follow external links: {}",
        config.crawler.follow_external_links
    );
    println!("  Respect robots.txt: {}", config.crawler.respect_robots_txt);
    if let Some(budget) = config.crawler.session_budget_secs {
        println!("  Session budget: {}s", budget);
    }

    println!("\nScope:");
    println!("  Include patterns: {:?}", config.scope.include_patterns);
    println!("  Exclude patterns: {:?}", config.scope.exclude_patterns);

    println!("\nUser Agent: {}", config.user_agent.header_value());

    println!("\nResources:");
    println!("  Download: {}", config.resources.download);
    println!("  Kinds: {:?}", config.resources.kinds);
    println!("  Max size: {} bytes", config.resources.max_size_bytes);

    println!("\nClassifier:");
    println!("  Enabled: {}", config.classifier.enabled);
    println!(
        "  Similarity threshold: {}",
        config.classifier.similarity_threshold
    );

    println!("\nOutput:");
    println!("  Directory: {}", config.output.dir.display());
    println!("  Config hash: {}", config_hash);

    println!("\nSeeds ({}):", config.crawler.seeds.len());
    for seed in &config.crawler.seeds {
        println!("  - {}", seed);
    }

    println!("\n✓ Configuration is valid");
}

/// Handles the main crawl operation
async fn handle_crawl(config: Config, config_hash: String) -> anyhow::Result<()> {
    let cancel = CancellationToken::new();

    let signal_token = cancel.clone();
    tokio::spawn(async move {
        if tokio::signal::ctrl_c().await.is_ok() {
            tracing::warn!("Interrupt received, finishing in-flight work");
            signal_token.cancel();
        }
    });

    let outcome = run_crawl(config, config_hash, cancel)
        .await
        .context("crawl failed")?;

    print_statistics(&outcome.report);
    println!("\nSession written to {}", outcome.session_dir.display());

    Ok(())
}
