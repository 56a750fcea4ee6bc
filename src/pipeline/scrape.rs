//! Scrape pipeline orchestration.
//!
//! Wires the work-item source, checkpoint store, proxy pool, dispatcher,
//! and result sink into one resumable run:
//!
//! 1. Parse the URL list into work items
//! 2. Load the newest checkpoint and drop already-completed ids
//! 3. Dispatch the remainder with bounded concurrency and retries
//! 4. Snapshot the accumulated set every `checkpoint_interval` successes
//! 5. On completion, partition everything into shards plus a manifest

use std::collections::HashSet;
use std::sync::Arc;

use crate::error::{AppError, Result};
use crate::models::{Config, read_work_items};
use crate::pipeline::checkpoint::CheckpointStore;
use crate::pipeline::context::RunContext;
use crate::pipeline::dispatch::{ItemOutcome, RetryDispatcher};
use crate::pipeline::fetch::Fetcher;
use crate::pipeline::shard::ResultSink;
use crate::proxy::ProxyPool;

/// Final tallies of one scrape run.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct RunSummary {
    /// Items dispatched this run (after the processed-id filter).
    pub attempted: usize,
    /// Items skipped because a checkpoint already contained them.
    pub resumed: usize,
    pub fetched: usize,
    pub not_found: usize,
    pub failed: usize,
    pub skipped: usize,
    /// Size of the accumulated result set, prior checkpoint included.
    pub records_total: usize,
}

/// Run the scrape pipeline to completion or cancellation.
pub async fn run_scrape(
    config: &Config,
    ctx: &RunContext,
    fetcher: Arc<dyn Fetcher>,
    limit: Option<usize>,
) -> Result<RunSummary> {
    let mut items = read_work_items(&config.paths.urls_file)?;
    log::info!(
        "Loaded {} work items from {:?}",
        items.len(),
        config.paths.urls_file
    );

    // One emission per id per run: collapse duplicate input lines.
    let mut seen = HashSet::new();
    items.retain(|item| seen.insert(item.id.clone()));

    let store = CheckpointStore::new(&config.paths.checkpoint_dir);
    let state = store.load_latest().await;
    let before_filter = items.len();
    items.retain(|item| !state.processed_ids.contains(&item.id));
    let resumed = before_filter - items.len();
    if resumed > 0 {
        log::info!("Skipping {} already-checkpointed items", resumed);
    }

    if let Some(limit) = limit {
        items.truncate(limit);
    }

    let pool = Arc::new(ProxyPool::from_file(&config.paths.proxy_file)?);
    if pool.is_empty() && config.scraper.require_proxies {
        return Err(AppError::config(format!(
            "proxy list {:?} yielded no endpoints",
            config.paths.proxy_file
        )));
    }

    let attempted = items.len();
    let mut records = state.records;
    let mut next_seq = state.next_seq.max(1);
    let mut unsaved_successes = 0usize;

    let dispatcher = Arc::new(RetryDispatcher::new(
        fetcher,
        pool,
        ctx.clone(),
        &config.scraper,
    ));
    let mut completions = dispatcher.run(items);
    let mut completed = 0usize;

    while let Some(result) = completions.recv().await {
        completed += 1;
        if completed % 100 == 0 {
            log::info!(
                "Progress: {}/{} items completed ({} fetched, {} failed)",
                completed,
                attempted,
                ctx.counters.fetched(),
                ctx.counters.failed()
            );
        }
        match result.outcome {
            ItemOutcome::Fetched(record) => {
                records.push(record);
                unsaved_successes += 1;
                if unsaved_successes >= config.scraper.checkpoint_interval {
                    save_checkpoint(&store, &records, &mut next_seq).await;
                    unsaved_successes = 0;
                }
            }
            ItemOutcome::NotFound | ItemOutcome::Failed(_) | ItemOutcome::Skipped => {}
        }
    }

    // Snapshot whatever this run added, cancelled or not.
    if unsaved_successes > 0 {
        save_checkpoint(&store, &records, &mut next_seq).await;
    }

    if ctx.is_cancelled() {
        log::warn!("Run cancelled; checkpointed {} records, skipping shard output", records.len());
    } else {
        let sink = ResultSink::new(
            &config.paths.output_dir,
            &config.output.base_name,
            config.output.shard_size,
        );
        match sink.finalize(&records).await {
            Ok(manifest) => log::info!(
                "Finalized {} records into {} shards",
                manifest.total_books,
                manifest.files_count
            ),
            // Shard output is reproducible from the checkpoint, so a
            // write failure downgrades to a logged data-loss warning.
            Err(e) => log::error!("Failed to write shard output: {}", e),
        }
    }

    let summary = RunSummary {
        attempted,
        resumed,
        fetched: ctx.counters.fetched(),
        not_found: ctx.counters.not_found(),
        failed: ctx.counters.failed(),
        skipped: ctx.counters.skipped(),
        records_total: records.len(),
    };
    log::info!(
        "Scrape summary: {}/{} fetched, {} not found, {} failed, {} skipped ({} records total)",
        summary.fetched,
        summary.attempted,
        summary.not_found,
        summary.failed,
        summary.skipped,
        summary.records_total
    );
    Ok(summary)
}

/// Best-effort durability: a failed snapshot is logged, never fatal.
async fn save_checkpoint(store: &CheckpointStore, records: &[crate::models::BookRecord], next_seq: &mut u64) {
    match store.save(records, *next_seq).await {
        Ok(_) => *next_seq += 1,
        Err(e) => log::error!(
            "Checkpoint {} failed ({} records at risk): {}",
            next_seq,
            records.len(),
            e
        ),
    }
}
