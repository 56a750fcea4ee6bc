//! Bounded-concurrency dispatch with per-item retry.
//!
//! Runs the fetch worker over the whole work queue through a fixed-size
//! `buffer_unordered` window, the same shape as a bounded crawl. Each
//! item owns its retry chain: proxy rotation, linear backoff, and a
//! bounded attempt count, none of which blocks other items. Results are
//! emitted as they resolve so the caller can checkpoint incrementally.

use std::sync::Arc;
use std::time::Duration;

use futures::stream::{self, StreamExt};
use tokio::sync::mpsc;

use crate::models::{BookRecord, ScraperConfig, WorkItem};
use crate::pipeline::context::RunContext;
use crate::pipeline::fetch::{FetchOutcome, Fetcher};
use crate::proxy::ProxyPool;

/// Final fate of one work item after its retry chain resolved.
#[derive(Debug, Clone, PartialEq)]
pub enum ItemOutcome {
    /// Record fetched and cleaned.
    Fetched(BookRecord),
    /// The origin has no record for this id.
    NotFound,
    /// All attempts exhausted or no proxy available.
    Failed(FailureKind),
    /// Cancellation landed before the first attempt was issued.
    Skipped,
}

#[derive(Debug, Clone, PartialEq)]
pub enum FailureKind {
    /// The pool yielded no endpoint. Not transient, so no retries.
    ProxyExhausted,
    AttemptsExhausted { attempts: usize, last_error: String },
}

/// One emitted completion.
#[derive(Debug, Clone)]
pub struct ItemResult {
    pub item: WorkItem,
    pub outcome: ItemOutcome,
}

/// Orchestrates bounded-concurrency execution of the fetch worker.
pub struct RetryDispatcher {
    fetcher: Arc<dyn Fetcher>,
    pool: Arc<ProxyPool>,
    ctx: RunContext,
    concurrency: usize,
    max_attempts: usize,
    backoff_unit: Duration,
}

impl RetryDispatcher {
    pub fn new(
        fetcher: Arc<dyn Fetcher>,
        pool: Arc<ProxyPool>,
        ctx: RunContext,
        config: &ScraperConfig,
    ) -> Self {
        Self {
            fetcher,
            pool,
            ctx,
            concurrency: config.concurrency.max(1),
            max_attempts: config.max_attempts.max(1),
            backoff_unit: Duration::from_secs(config.request_delay_secs),
        }
    }

    /// Drive all items to completion, emitting each result as its retry
    /// chain resolves. Completion order is unrelated to submission order.
    pub fn run(self: Arc<Self>, items: Vec<WorkItem>) -> mpsc::Receiver<ItemResult> {
        let (tx, rx) = mpsc::channel(self.concurrency);
        let dispatcher = Arc::clone(&self);

        tokio::spawn(async move {
            let mut completions = stream::iter(items)
                .map(|item| {
                    let dispatcher = Arc::clone(&dispatcher);
                    async move {
                        let outcome = dispatcher.process_item(&item).await;
                        ItemResult { item, outcome }
                    }
                })
                .buffer_unordered(dispatcher.concurrency);

            while let Some(result) = completions.next().await {
                dispatcher.tally(&result.outcome);
                if tx.send(result).await.is_err() {
                    // Receiver dropped; stop driving the stream.
                    break;
                }
            }
        });

        rx
    }

    /// Run one item's retry chain to a terminal outcome.
    async fn process_item(&self, item: &WorkItem) -> ItemOutcome {
        let mut last_error = String::new();

        for attempt in 1..=self.max_attempts {
            if self.ctx.is_cancelled() {
                if attempt == 1 {
                    return ItemOutcome::Skipped;
                }
                return ItemOutcome::Failed(FailureKind::AttemptsExhausted {
                    attempts: attempt - 1,
                    last_error,
                });
            }

            let Some(proxy) = self.pool.next() else {
                log::error!("No proxy available for book {}; giving up", item.id);
                return ItemOutcome::Failed(FailureKind::ProxyExhausted);
            };

            match self.fetcher.attempt(item, &proxy).await {
                FetchOutcome::Success(record) => return ItemOutcome::Fetched(record),
                FetchOutcome::NotFound => {
                    log::warn!("No product data found for book {}", item.id);
                    return ItemOutcome::NotFound;
                }
                FetchOutcome::Retryable(reason) => {
                    self.pool.report_failure(&proxy);
                    log::warn!(
                        "Attempt {}/{} for book {} failed via {}: {}",
                        attempt,
                        self.max_attempts,
                        item.id,
                        proxy,
                        reason
                    );
                    last_error = reason;
                    if attempt < self.max_attempts {
                        // Linear backoff; occupies only this item's slot.
                        tokio::time::sleep(self.backoff_unit * attempt as u32).await;
                    }
                }
            }
        }

        ItemOutcome::Failed(FailureKind::AttemptsExhausted {
            attempts: self.max_attempts,
            last_error,
        })
    }

    fn tally(&self, outcome: &ItemOutcome) {
        match outcome {
            ItemOutcome::Fetched(_) => self.ctx.counters.record_fetched(),
            ItemOutcome::NotFound => self.ctx.counters.record_not_found(),
            ItemOutcome::Failed(_) => self.ctx.counters.record_failed(),
            ItemOutcome::Skipped => self.ctx.counters.record_skipped(),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use async_trait::async_trait;
    use std::collections::HashMap;
    use std::sync::Mutex;
    use std::sync::atomic::{AtomicUsize, Ordering};

    /// Scripted fetcher: one outcome per item id, attempt counting,
    /// optional per-item latency to exercise completion ordering.
    struct MockFetcher {
        outcomes: HashMap<String, FetchOutcome>,
        delays: HashMap<String, Duration>,
        attempts: Mutex<HashMap<String, usize>>,
        total_attempts: AtomicUsize,
    }

    impl MockFetcher {
        fn new(outcomes: Vec<(&str, FetchOutcome)>) -> Self {
            Self {
                outcomes: outcomes
                    .into_iter()
                    .map(|(id, o)| (id.to_string(), o))
                    .collect(),
                delays: HashMap::new(),
                attempts: Mutex::new(HashMap::new()),
                total_attempts: AtomicUsize::new(0),
            }
        }

        fn with_delay(mut self, id: &str, delay: Duration) -> Self {
            self.delays.insert(id.to_string(), delay);
            self
        }

        fn attempts_for(&self, id: &str) -> usize {
            self.attempts.lock().unwrap().get(id).copied().unwrap_or(0)
        }
    }

    #[async_trait]
    impl Fetcher for MockFetcher {
        async fn attempt(&self, item: &WorkItem, _proxy: &str) -> FetchOutcome {
            self.total_attempts.fetch_add(1, Ordering::SeqCst);
            *self
                .attempts
                .lock()
                .unwrap()
                .entry(item.id.clone())
                .or_insert(0) += 1;
            if let Some(delay) = self.delays.get(&item.id) {
                tokio::time::sleep(*delay).await;
            }
            self.outcomes
                .get(&item.id)
                .cloned()
                .unwrap_or(FetchOutcome::NotFound)
        }
    }

    fn item(id: &str) -> WorkItem {
        WorkItem {
            id: id.to_string(),
            name: format!("book_{id}"),
        }
    }

    fn record(id: &str) -> BookRecord {
        BookRecord {
            id: id.to_string(),
            title: Some("T".to_string()),
            ..BookRecord::default()
        }
    }

    fn config(max_attempts: usize) -> ScraperConfig {
        ScraperConfig {
            concurrency: 4,
            request_delay_secs: 0,
            max_attempts,
            ..ScraperConfig::default()
        }
    }

    fn pool(endpoints: &[&str]) -> Arc<ProxyPool> {
        Arc::new(ProxyPool::new(
            endpoints.iter().map(|s| s.to_string()).collect(),
        ))
    }

    async fn collect(mut rx: mpsc::Receiver<ItemResult>) -> Vec<ItemResult> {
        let mut results = Vec::new();
        while let Some(result) = rx.recv().await {
            results.push(result);
        }
        results
    }

    #[tokio::test]
    async fn success_emits_record_on_first_attempt() {
        let fetcher = Arc::new(MockFetcher::new(vec![(
            "42",
            FetchOutcome::Success(record("42")),
        )]));
        let ctx = RunContext::new();
        let dispatcher = Arc::new(RetryDispatcher::new(
            Arc::clone(&fetcher) as Arc<dyn Fetcher>,
            pool(&["p:1"]),
            ctx.clone(),
            &config(3),
        ));

        let results = collect(dispatcher.run(vec![item("42")])).await;
        assert_eq!(results.len(), 1);
        assert_eq!(results[0].outcome, ItemOutcome::Fetched(record("42")));
        assert_eq!(fetcher.attempts_for("42"), 1);
        assert_eq!(ctx.counters.fetched(), 1);
    }

    #[tokio::test]
    async fn retryable_item_fails_after_exactly_max_attempts() {
        let fetcher = Arc::new(MockFetcher::new(vec![(
            "1",
            FetchOutcome::Retryable("HTTP 503".to_string()),
        )]));
        let proxies = pool(&["a:1", "b:2", "c:3", "d:4", "e:5"]);
        let dispatcher = Arc::new(RetryDispatcher::new(
            Arc::clone(&fetcher) as Arc<dyn Fetcher>,
            Arc::clone(&proxies),
            RunContext::new(),
            &config(3),
        ));

        let results = collect(dispatcher.run(vec![item("1")])).await;
        assert_eq!(
            results[0].outcome,
            ItemOutcome::Failed(FailureKind::AttemptsExhausted {
                attempts: 3,
                last_error: "HTTP 503".to_string(),
            })
        );
        assert_eq!(fetcher.attempts_for("1"), 3);
        // One proxy-failure report per attempt.
        assert_eq!(proxies.working_count(), 2);
    }

    #[tokio::test]
    async fn not_found_is_terminal_without_retry() {
        let fetcher = Arc::new(MockFetcher::new(vec![("9", FetchOutcome::NotFound)]));
        let proxies = pool(&["p:1"]);
        let ctx = RunContext::new();
        let dispatcher = Arc::new(RetryDispatcher::new(
            Arc::clone(&fetcher) as Arc<dyn Fetcher>,
            Arc::clone(&proxies),
            ctx.clone(),
            &config(3),
        ));

        let results = collect(dispatcher.run(vec![item("9")])).await;
        assert_eq!(results[0].outcome, ItemOutcome::NotFound);
        assert_eq!(fetcher.attempts_for("9"), 1);
        // NotFound is not a proxy fault.
        assert_eq!(proxies.working_count(), 1);
        assert_eq!(ctx.counters.not_found(), 1);
    }

    #[tokio::test]
    async fn empty_pool_fails_item_without_attempts() {
        let fetcher = Arc::new(MockFetcher::new(vec![(
            "5",
            FetchOutcome::Success(record("5")),
        )]));
        let dispatcher = Arc::new(RetryDispatcher::new(
            Arc::clone(&fetcher) as Arc<dyn Fetcher>,
            pool(&[]),
            RunContext::new(),
            &config(3),
        ));

        let results = collect(dispatcher.run(vec![item("5")])).await;
        assert_eq!(
            results[0].outcome,
            ItemOutcome::Failed(FailureKind::ProxyExhausted)
        );
        assert_eq!(fetcher.attempts_for("5"), 0);
    }

    #[tokio::test]
    async fn single_bad_proxy_fails_all_items_and_pool_recovers() {
        let fetcher = Arc::new(MockFetcher::new(vec![
            ("1", FetchOutcome::Retryable("timeout".to_string())),
            ("2", FetchOutcome::Retryable("timeout".to_string())),
            ("3", FetchOutcome::Retryable("timeout".to_string())),
        ]));
        let proxies = pool(&["only:1"]);
        let ctx = RunContext::new();
        let dispatcher = Arc::new(RetryDispatcher::new(
            Arc::clone(&fetcher) as Arc<dyn Fetcher>,
            Arc::clone(&proxies),
            ctx.clone(),
            &config(3),
        ));

        let results = collect(dispatcher.run(vec![item("1"), item("2"), item("3")])).await;
        assert_eq!(results.len(), 3);
        for result in &results {
            assert!(matches!(
                result.outcome,
                ItemOutcome::Failed(FailureKind::AttemptsExhausted { attempts: 3, .. })
            ));
        }
        assert_eq!(fetcher.total_attempts.load(Ordering::SeqCst), 9);
        assert_eq!(ctx.counters.failed(), 3);
        // The pool never deadlocks: the reset path keeps handing out
        // the endpoint even after every attempt failed it.
        assert!(proxies.next().is_some());
    }

    #[tokio::test]
    async fn results_are_emitted_as_items_complete() {
        let fetcher = Arc::new(
            MockFetcher::new(vec![
                ("slow", FetchOutcome::Success(record("slow"))),
                ("fast", FetchOutcome::Success(record("fast"))),
            ])
            .with_delay("slow", Duration::from_millis(100)),
        );
        let dispatcher = Arc::new(RetryDispatcher::new(
            fetcher as Arc<dyn Fetcher>,
            pool(&["p:1"]),
            RunContext::new(),
            &config(1),
        ));

        let results = collect(dispatcher.run(vec![item("slow"), item("fast")])).await;
        assert_eq!(results[0].item.id, "fast");
        assert_eq!(results[1].item.id, "slow");
    }

    #[tokio::test]
    async fn cancellation_skips_unstarted_items() {
        let fetcher = Arc::new(MockFetcher::new(vec![(
            "1",
            FetchOutcome::Success(record("1")),
        )]));
        let ctx = RunContext::new();
        ctx.cancel();
        let dispatcher = Arc::new(RetryDispatcher::new(
            Arc::clone(&fetcher) as Arc<dyn Fetcher>,
            pool(&["p:1"]),
            ctx.clone(),
            &config(3),
        ));

        let results = collect(dispatcher.run(vec![item("1"), item("2")])).await;
        assert_eq!(results.len(), 2);
        for result in &results {
            assert_eq!(result.outcome, ItemOutcome::Skipped);
        }
        assert_eq!(fetcher.attempts_for("1"), 0);
        assert_eq!(ctx.counters.skipped(), 2);
    }
}
