//! BAP Indexer - attestation ingestion from a transaction feed
//!
//! This binary provides:
//! - Subscription to a feed of confirmed and mempool transactions
//! - AIP signature checks on BAP outputs
//! - Attestation and error storage with a resumable block cursor

use anyhow::{Context, Result};
use bap_core::{AttestationParser, BitcoinMessageVerifier};
use bap_indexer::config::{Config, LoggingConfig};
use bap_indexer::listener::{
    CursorTracker, EventProcessor, FeedSource, JsonLinesFeed, SubscriptionDriver,
};
use bap_indexer::storage::Storage;
use clap::{Parser, Subcommand};
use std::path::PathBuf;
use tokio::sync::watch;
use tracing::{info, warn};

/// Config file picked up when `--config` is not given.
const DEFAULT_CONFIG_FILE: &str = "indexer.toml";

#[derive(Parser)]
#[command(name = "bap-indexer")]
#[command(version, about = "Indexer for BAP attestations signed with AIP", long_about = None)]
struct Cli {
    /// Path to configuration file
    #[arg(short, long)]
    config: Option<PathBuf>,

    /// Enable debug logging
    #[arg(short, long)]
    debug: bool,

    #[command(subcommand)]
    command: Option<Commands>,
}

#[derive(Subcommand)]
enum Commands {
    /// Subscribe to the feed and index attestations
    Run {
        /// Feed subscription id (overrides config and BAP_SUBSCRIPTION_ID)
        #[arg(short, long)]
        subscription: Option<String>,

        /// Start from this block instead of the stored cursor
        #[arg(long)]
        from_block: Option<u64>,
    },

    /// Show indexer status and cursor
    Status,

    /// Initialize the database
    InitDb,
}

#[tokio::main]
async fn main() -> Result<()> {
    let cli = Cli::parse();

    let config_path = cli.config.clone().or_else(|| {
        let default = PathBuf::from(DEFAULT_CONFIG_FILE);
        default.exists().then_some(default)
    });
    let config = Config::load(config_path.as_deref()).context("Failed to load configuration")?;

    init_logging(&config.logging, cli.debug);

    info!("BAP Indexer starting...");
    info!("Version: {}", env!("CARGO_PKG_VERSION"));
    if let Some(path) = &config_path {
        info!("Using config file: {}", path.display());
    }

    match cli.command.unwrap_or(Commands::Run {
        subscription: None,
        from_block: None,
    }) {
        Commands::Run {
            subscription,
            from_block,
        } => run_indexer(&config, subscription, from_block).await?,
        Commands::Status => show_status(&config).await?,
        Commands::InitDb => init_database(&config).await?,
    }

    Ok(())
}

/// Initialize tracing subscriber for logging
fn init_logging(logging: &LoggingConfig, debug: bool) {
    use tracing_subscriber::{fmt, prelude::*, EnvFilter};

    let env_filter = if debug || logging.level == "debug" {
        EnvFilter::new("bap_indexer=debug,bap_core=debug")
    } else {
        EnvFilter::try_from_default_env().unwrap_or_else(|_| {
            EnvFilter::new(format!(
                "bap_indexer={level},bap_core={level}",
                level = logging.level
            ))
        })
    };

    let registry = tracing_subscriber::registry().with(env_filter);

    if logging.format == "json" {
        registry.with(fmt::layer().json().with_target(true)).init();
    } else {
        registry
            .with(fmt::layer().with_target(true).with_line_number(true))
            .init();
    }
}

async fn connect(config: &Config) -> Result<Storage> {
    let storage = Storage::new(
        &config.database.url,
        Some(config.database.max_connections),
        Some(config.database.min_connections),
    )
    .await
    .context("Failed to connect to database")?;

    storage
        .run_migrations()
        .await
        .context("Failed to run migrations")?;

    Ok(storage)
}

/// Main indexer service - consumes the feed until it ends or Ctrl+C
async fn run_indexer(
    config: &Config,
    subscription: Option<String>,
    from_block: Option<u64>,
) -> Result<()> {
    let subscription_id = subscription.unwrap_or_else(|| config.subscription_id().to_string());
    let start_block = from_block.or(config.subscription.start_block);

    info!("Configuration loaded successfully");
    info!("  Database: {}", config.database.url);
    info!("  Subscription: {}", subscription_id);
    info!("  Feed source: {}", config.feed.source);
    info!("  Genesis block: {}", config.protocol.genesis_block);
    if let Some(block) = start_block {
        info!("  Start block override: {}", block);
    }

    let storage = connect(config).await?;
    info!("Database initialized");

    let parser = AttestationParser::new(config.protocol.markers(), BitcoinMessageVerifier::new());
    let processor = EventProcessor::new(storage.clone(), parser);
    let cursor = CursorTracker::new(storage.clone(), config.protocol.genesis_block);
    let feed = JsonLinesFeed::new(FeedSource::parse(&config.feed.source))
        .with_capacity(config.feed.channel_capacity);

    let driver = SubscriptionDriver::new(feed, processor, cursor, subscription_id)
        .with_start_block(start_block);

    let (shutdown_tx, shutdown_rx) = watch::channel(false);
    let mut driver_handle = tokio::spawn(async move { driver.run(shutdown_rx).await });

    info!("Indexer is running. Press Ctrl+C to stop.");

    let result = tokio::select! {
        result = &mut driver_handle => result,
        signal = tokio::signal::ctrl_c() => {
            signal.context("Failed to listen for Ctrl+C")?;
            info!("Received shutdown signal, finishing current event...");
            if shutdown_tx.send(true).is_err() {
                warn!("Subscription already stopped");
            }
            driver_handle.await
        }
    };

    storage.close().await;

    match result {
        Ok(Ok(stats)) => {
            info!(
                "Indexer stopped: {} transactions, {} attestations, {} errors, {} undecodable",
                stats.transactions, stats.accepted, stats.rejected, stats.undecodable
            );
            Ok(())
        }
        Ok(Err(e)) => Err(e).context("Subscription driver failed"),
        Err(e) => Err(anyhow::anyhow!("Subscription task panicked: {}", e)),
    }
}

/// Show indexer status and cursor
async fn show_status(config: &Config) -> Result<()> {
    info!("Checking indexer status");

    let storage = connect(config).await?;
    let stats = storage.stats().await?;
    let cursor = CursorTracker::new(storage.clone(), config.protocol.genesis_block);
    let resume_from = cursor.get_last_block().await?;

    println!("\n=== BAP Indexer Status ===\n");
    println!("Subscription:");
    println!("  Id: {}", config.subscription_id());
    match stats.last_block {
        Some(block) => println!("  Last Block: {}", block),
        None => println!("  Last Block: none"),
    }
    println!("  Resume From: {}", resume_from);

    println!("\nDatabase Statistics:");
    println!("  Attestations: {}", stats.attestation_count);
    println!("  Mempool Attestations: {}", stats.mempool_count);
    println!("  Error Records: {}", stats.error_count);
    println!();

    storage.close().await;

    Ok(())
}

/// Initialize the database
async fn init_database(config: &Config) -> Result<()> {
    info!("Initializing database: {}", config.database.url);

    let storage = connect(config).await?;

    storage
        .health_check()
        .await
        .context("Database health check failed")?;

    let stats = storage.stats().await?;
    info!("Database initialized successfully!");
    info!("  Attestations: {}", stats.attestation_count);
    info!("  Error records: {}", stats.error_count);
    info!(
        "  Last block: {}",
        stats
            .last_block
            .map(|b| b.to_string())
            .unwrap_or_else(|| "none".to_string())
    );

    storage.close().await;

    Ok(())
}
