// src/main.rs

//! libris CLI
//!
//! Local execution entry point for the book scrape pipeline.

use std::path::PathBuf;
use std::sync::Arc;
use std::time::Duration;

use clap::{Parser, Subcommand};
use libris::{
    error::Result,
    models::Config,
    pipeline::{CheckpointStore, HttpFetcher, ResultSink, RunContext, run_scrape},
};

/// libris - Resilient SensCritique book scraper
#[derive(Parser, Debug)]
#[command(name = "libris", version, about = "Resilient SensCritique book scraper")]
struct Cli {
    /// Path to the TOML configuration file
    #[arg(short, long, default_value = "libris.toml")]
    config: PathBuf,

    /// Enable verbose logging
    #[arg(short, long)]
    verbose: bool,

    #[command(subcommand)]
    command: Command,
}

#[derive(Subcommand, Debug)]
enum Command {
    /// Fetch book data for every URL in the input list
    Scrape {
        /// Only dispatch the first N pending items (smoke runs)
        #[arg(long)]
        limit: Option<usize>,
    },

    /// Re-shard the latest checkpoint without fetching anything
    Export,

    /// Validate the configuration file
    Validate,

    /// Show latest checkpoint info
    Info,
}

/// Initialize logging based on verbosity flag.
fn init_logging(verbose: bool) {
    let level = if verbose { "debug" } else { "info" };
    env_logger::Builder::from_env(env_logger::Env::default().default_filter_or(level))
        .format_timestamp_secs()
        .init();
}

/// Main entry point for the CLI application.
#[tokio::main]
async fn main() -> Result<()> {
    let cli = Cli::parse();
    init_logging(cli.verbose);

    let config = Config::load_or_default(&cli.config);

    match cli.command {
        Command::Scrape { limit } => {
            config.validate()?;

            let ctx = RunContext::new();
            let signal_ctx = ctx.clone();
            tokio::spawn(async move {
                if tokio::signal::ctrl_c().await.is_ok() {
                    log::warn!("Interrupt received; finishing in-flight attempts...");
                    signal_ctx.cancel();
                }
            });

            let fetcher = Arc::new(HttpFetcher::new(
                config.api.clone(),
                Duration::from_secs(config.scraper.timeout_secs),
                Duration::from_secs(config.scraper.request_delay_secs),
            ));
            run_scrape(&config, &ctx, fetcher, limit).await?;
        }

        Command::Export => {
            config.validate()?;

            let store = CheckpointStore::new(&config.paths.checkpoint_dir);
            let state = store.load_latest().await;
            if state.records.is_empty() {
                log::warn!("No checkpointed records to export");
                return Ok(());
            }

            let sink = ResultSink::new(
                &config.paths.output_dir,
                &config.output.base_name,
                config.output.shard_size,
            );
            let manifest = sink.finalize(&state.records).await?;
            log::info!(
                "Exported {} records into {} shards",
                manifest.total_books,
                manifest.files_count
            );
        }

        Command::Validate => {
            log::info!("Validating configuration...");
            if let Err(e) = config.validate() {
                log::error!("Config validation failed: {}", e);
                return Err(e);
            }
            log::info!("Config OK");
        }

        Command::Info => {
            log::info!("Checkpoint directory: {:?}", config.paths.checkpoint_dir);
            let store = CheckpointStore::new(&config.paths.checkpoint_dir);
            match store.latest_entry().await {
                Some((seq, timestamp, path)) => {
                    log::info!("Latest checkpoint: {:?}", path);
                    log::info!("Sequence {}, written {}", seq, timestamp);
                    let state = store.load_latest().await;
                    log::info!("{} records accumulated", state.records.len());
                }
                None => log::info!("No checkpoint found yet."),
            }
        }
    }

    Ok(())
}
