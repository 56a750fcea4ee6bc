// src/pipeline/mod.rs

//! Resilient fetch pipeline.
//!
//! - `fetch`: one proxied attempt per work item, classified
//! - `dispatch`: bounded concurrency, per-item retry, proxy rotation
//! - `checkpoint`: cumulative crash-resumable snapshots
//! - `shard`: final fixed-size output partition
//! - `scrape`: the orchestrated run

pub mod checkpoint;
pub mod context;
pub mod dispatch;
pub mod fetch;
pub mod scrape;
pub mod shard;

pub use checkpoint::{CheckpointStore, LoadedState};
pub use context::{RunContext, RunCounters};
pub use dispatch::{FailureKind, ItemOutcome, ItemResult, RetryDispatcher};
pub use fetch::{FetchOutcome, Fetcher, HttpFetcher};
pub use scrape::{RunSummary, run_scrape};
pub use shard::{Manifest, ResultSink};
