//! wiki-sync: mirrors a markdown tree onto a Confluence space.
//!
//! Loads the config, restores the path ↔ page mapping, queues untracked files,
//! then follows filesystem changes until Ctrl+C.

use anyhow::{Context, Result};
use clap::Parser;
use std::path::PathBuf;
use std::sync::Arc;
use std::time::Duration;
use tracing::{info, warn};
use tracing_subscriber::EnvFilter;

use wiki_sync_core::{SyncEngine, SyncState};
use wiki_sync_daemon::{Config, ConfluenceClient, FileWatcher};

#[derive(Parser, Debug)]
#[command(name = "wiki-sync")]
#[command(about = "Mirror a markdown directory onto a Confluence space")]
struct Args {
    /// Path to the JSON config file
    #[arg(short, long, default_value = "wiki-sync.json")]
    config: PathBuf,

    /// Skip queueing untracked files on startup
    #[arg(long)]
    no_initial_scan: bool,

    /// Report local titles that already exist remotely, then exit
    #[arg(long)]
    check_conflicts: bool,

    /// Enable verbose logging
    #[arg(long)]
    verbose: bool,
}

/// How often the number of tracked pages is logged.
const STATUS_INTERVAL: Duration = Duration::from_secs(300);

#[tokio::main]
async fn main() -> Result<()> {
    let args = Args::parse();

    // Set up logging - respects RUST_LOG env var, defaults to info (or debug with --verbose)
    let default_filter = if args.verbose {
        "debug,wiki_sync_core=debug,wiki_sync_daemon=debug"
    } else {
        "info,wiki_sync_core=info,wiki_sync_daemon=info"
    };
    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(default_filter));
    tracing_subscriber::fmt().with_env_filter(filter).init();

    info!("Starting wiki-sync");

    let config = Config::load(&args.config)
        .with_context(|| format!("Failed to load config from {}", args.config.display()))?;
    let token = config.token()?;
    info!("Docs directory: {}", config.sync.docs_dir.display());
    info!("State file: {}", config.sync.state_file.display());

    let client = Arc::new(ConfluenceClient::new(
        &config.confluence.base_url,
        &config.confluence.space_key,
        &token,
        config.retry_policy(),
    )?);

    let state = SyncState::load(&config.sync.state_file)
        .with_context(|| format!("Failed to load state from {}", config.sync.state_file.display()))?;
    info!("Loaded {} tracked paths", state.len());

    let engine = SyncEngine::start(config.engine_config(), state, client);

    if args.check_conflicts {
        let conflicts = engine.scan_for_conflicts().await?;
        if conflicts.is_empty() {
            info!("No title conflicts found");
        }
        let mut titles: Vec<_> = conflicts.into_iter().collect();
        titles.sort();
        for (title, page_id) in titles {
            warn!("'{}' already exists remotely (ID: {})", title, page_id);
        }
        engine.stop().await;
        return Ok(());
    }

    if config.sync.initial_scan && !args.no_initial_scan {
        engine.initial_scan().await?;
    }

    let watcher = FileWatcher::start(&config.sync.docs_dir, config.debounce(), engine.sender())?;

    info!("Running. Press Ctrl+C to stop.");

    let mut status = tokio::time::interval(STATUS_INTERVAL);
    status.tick().await;
    loop {
        tokio::select! {
            _ = status.tick() => {
                let tracked = engine.tracked_paths().await.len();
                info!("Tracking {} paths", tracked);
                for (kind, count) in engine.conflict_summary() {
                    info!("{}: {}", kind, count);
                }
            }

            _ = tokio::signal::ctrl_c() => {
                info!("Received Ctrl+C, shutting down");
                break;
            }
        }
    }

    watcher.stop();
    engine.stop().await;

    info!("wiki-sync stopped");
    Ok(())
}
