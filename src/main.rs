//! cc-enrich main entry point
//!
//! This is the command-line interface for the cc-enrich harvester.

use cc_enrich::config::{load_config_with_hash, Config, WriteMode};
use cc_enrich::crawler::Pipeline;
use cc_enrich::storage::open_storage;
use clap::Parser;
use std::path::PathBuf;
use std::sync::atomic::Ordering;
use tracing_subscriber::EnvFilter;

/// cc-enrich: Common Crawl harvester for Australian business websites
///
/// cc-enrich walks a Common Crawl index, keeps URLs in the configured
/// domain space, fetches each page, infers a company name and industry,
/// and appends the results to a SQLite table in bounded chunks.
#[derive(Parser, Debug)]
#[command(name = "cc-enrich")]
#[command(version = "1.0.0")]
#[command(about = "Common Crawl page metadata harvester", long_about = None)]
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

    /// Validate config and show what would be processed without fetching anything
    #[arg(long, conflicts_with = "stats")]
    dry_run: bool,

    /// Show statistics from the database and exit
    #[arg(long, conflicts_with = "dry_run")]
    stats: bool,
}

#[tokio::main]
async fn main() -> Result<(), Box<dyn std::error::Error>> {
    let cli = Cli::parse();

    // Setup logging based on verbosity
    setup_logging(cli.verbose, cli.quiet);

    // Load and validate configuration
    tracing::info!("Loading configuration from: {}", cli.config.display());
    let (config, config_hash) = match load_config_with_hash(&cli.config) {
        Ok((cfg, hash)) => {
            tracing::info!("Configuration loaded successfully (hash: {})", hash);
            (cfg, hash)
        }
        Err(e) => {
            tracing::error!("Failed to load configuration: {}", e);
            return Err(e.into());
        }
    };

    if cli.dry_run {
        handle_dry_run(&config);
    } else if cli.stats {
        handle_stats(&config)?;
    } else {
        handle_run(&config, &config_hash).await?;
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
            0 => EnvFilter::new("cc_enrich=info,warn"),
            1 => EnvFilter::new("cc_enrich=debug,info"),
            2 => EnvFilter::new("cc_enrich=trace,debug"),
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

/// Handles the --dry-run mode: shows the validated configuration
fn handle_dry_run(config: &Config) {
    println!("=== cc-enrich Dry Run ===\n");

    println!("Index:");
    println!("  Manifest: {}", config.index.manifest_url());
    println!("  First shard: {}", config.index.first_shard);
    match config.index.max_shards {
        Some(max) => println!("  Max shards: {}", max),
        None => println!("  Max shards: all"),
    }

    println!("\nFetcher:");
    println!("  Timeout: {}s", config.fetcher.timeout_secs);
    println!(
        "  Max concurrent fetches: {}",
        config.fetcher.max_concurrent_fetches
    );
    println!("  User agent: {}", config.fetcher.user_agent);

    println!("\nPipeline:");
    println!("  Chunk size: {}", config.pipeline.chunk_size);

    println!("\nDomain Suffixes ({}):", config.domain.suffixes.len());
    for suffix in &config.domain.suffixes {
        println!("  - {}", suffix);
    }

    println!("\nOutput:");
    println!("  Database: {}", config.output.database_path);
    println!("  Table: {}", config.output.table);
    println!(
        "  Write mode: {}",
        match config.output.write_mode {
            WriteMode::Append => "append",
            WriteMode::Upsert => "upsert",
        }
    );

    println!("\n✓ Configuration is valid");
}

/// Handles the --stats mode: shows statistics from the database
fn handle_stats(config: &Config) -> Result<(), Box<dyn std::error::Error>> {
    use cc_enrich::output::{load_statistics, print_statistics};

    println!("Database: {}\n", config.output.database_path);

    let storage = open_storage(&config.output)?;
    let stats = load_statistics(&storage)?;
    print_statistics(&stats);

    Ok(())
}

/// Handles the main pipeline run
async fn handle_run(config: &Config, config_hash: &str) -> Result<(), Box<dyn std::error::Error>> {
    tracing::info!(
        "Harvesting {} into {} ({})",
        config.index.crawl_id,
        config.output.database_path,
        config.output.table
    );

    let pipeline = Pipeline::new(config)?;

    let cancel = pipeline.cancel_flag();
    tokio::spawn(async move {
        if tokio::signal::ctrl_c().await.is_ok() {
            tracing::warn!("Interrupt received, finishing current chunk");
            cancel.store(true, Ordering::SeqCst);
        }
    });

    let mut storage = open_storage(&config.output)?;

    match pipeline.run(&mut storage, config_hash).await {
        Ok(summary) => {
            println!("{}", summary);
            Ok(())
        }
        Err(e) => {
            tracing::error!("Run failed: {}", e);
            Err(e.into())
        }
    }
}
