// src/proxy.rs

//! Rotating proxy pool with failure tracking.
//!
//! Every configured endpoint is always in exactly one of two sets,
//! working or failed; a proxy is never dropped, only reclassified.
//! Rotation is an explicit cursor over the fixed endpoint order rather
//! than an unbounded cycle iterator: one pass skips failed endpoints,
//! and a pass that finds nothing rehabilitates the whole pool so a run
//! can always make forward progress.

use std::collections::HashSet;
use std::fs;
use std::path::Path;
use std::sync::Mutex;

use crate::error::Result;

/// Shared pool of proxy endpoints, rotated across all in-flight attempts.
pub struct ProxyPool {
    state: Mutex<PoolState>,
}

struct PoolState {
    /// Fixed endpoint order; rotation index is modulo this list.
    endpoints: Vec<String>,
    cursor: usize,
    /// Indices currently classified as failed.
    failed: HashSet<usize>,
}

impl ProxyPool {
    /// Create a pool from a fixed endpoint list.
    pub fn new(endpoints: Vec<String>) -> Self {
        log::info!("Loaded {} proxies", endpoints.len());
        Self {
            state: Mutex::new(PoolState {
                endpoints,
                cursor: 0,
                failed: HashSet::new(),
            }),
        }
    }

    /// Load endpoints from a newline-delimited `host:port` file.
    ///
    /// Blank lines are ignored; a missing file yields an empty pool.
    pub fn from_file(path: impl AsRef<Path>) -> Result<Self> {
        let endpoints = match fs::read_to_string(&path) {
            Ok(content) => content
                .lines()
                .map(str::trim)
                .filter(|line| !line.is_empty())
                .map(str::to_string)
                .collect(),
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => {
                log::error!("Proxy file {:?} not found", path.as_ref());
                Vec::new()
            }
            Err(e) => return Err(e.into()),
        };
        Ok(Self::new(endpoints))
    }

    /// Number of configured endpoints.
    pub fn len(&self) -> usize {
        self.state.lock().unwrap().endpoints.len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    /// Number of endpoints currently classified as working.
    pub fn working_count(&self) -> usize {
        let state = self.state.lock().unwrap();
        state.endpoints.len() - state.failed.len()
    }

    /// Hand out the next working endpoint.
    ///
    /// Advances the cursor through the full endpoint order, skipping
    /// failed ones. When a full cycle finds no working endpoint the
    /// failed set is cleared and the next endpoint is returned anyway.
    /// `None` only when the configured list is empty.
    pub fn next(&self) -> Option<String> {
        let mut state = self.state.lock().unwrap();
        let len = state.endpoints.len();
        if len == 0 {
            return None;
        }

        for _ in 0..len {
            let index = state.cursor % len;
            state.cursor = state.cursor.wrapping_add(1);
            if !state.failed.contains(&index) {
                return Some(state.endpoints[index].clone());
            }
        }

        log::info!("All proxies failed; resetting pool to working state");
        state.failed.clear();
        let index = state.cursor % len;
        state.cursor = state.cursor.wrapping_add(1);
        Some(state.endpoints[index].clone())
    }

    /// Move an endpoint from working to failed. Idempotent.
    pub fn report_failure(&self, endpoint: &str) {
        let mut state = self.state.lock().unwrap();
        let Some(index) = state.endpoints.iter().position(|e| e == endpoint) else {
            return;
        };
        if state.failed.insert(index) {
            log::warn!("Marked proxy as failed: {}", endpoint);
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::io::Write;

    fn pool(endpoints: &[&str]) -> ProxyPool {
        ProxyPool::new(endpoints.iter().map(|s| s.to_string()).collect())
    }

    #[test]
    fn rotates_in_configured_order() {
        let pool = pool(&["a:1", "b:2", "c:3"]);
        assert_eq!(pool.next().as_deref(), Some("a:1"));
        assert_eq!(pool.next().as_deref(), Some("b:2"));
        assert_eq!(pool.next().as_deref(), Some("c:3"));
        assert_eq!(pool.next().as_deref(), Some("a:1"));
    }

    #[test]
    fn skips_failed_endpoints() {
        let pool = pool(&["a:1", "b:2", "c:3"]);
        pool.report_failure("b:2");
        assert_eq!(pool.next().as_deref(), Some("a:1"));
        assert_eq!(pool.next().as_deref(), Some("c:3"));
        assert_eq!(pool.next().as_deref(), Some("a:1"));
        assert_eq!(pool.working_count(), 2);
    }

    #[test]
    fn resets_when_every_endpoint_has_failed() {
        let pool = pool(&["a:1", "b:2"]);
        pool.report_failure("a:1");
        pool.report_failure("b:2");
        assert_eq!(pool.working_count(), 0);

        // The reset rehabilitates the pool instead of deadlocking.
        assert!(pool.next().is_some());
        assert_eq!(pool.working_count(), 2);
    }

    #[test]
    fn failure_report_is_idempotent() {
        let pool = pool(&["a:1", "b:2"]);
        pool.report_failure("a:1");
        pool.report_failure("a:1");
        pool.report_failure("unknown:9");
        assert_eq!(pool.working_count(), 1);
    }

    #[test]
    fn empty_pool_yields_nothing() {
        let pool = pool(&[]);
        assert!(pool.next().is_none());
        assert!(pool.is_empty());
    }

    #[test]
    fn loads_endpoints_from_file() {
        let mut file = tempfile::NamedTempFile::new().unwrap();
        writeln!(file, "10.0.0.1:8080").unwrap();
        writeln!(file).unwrap();
        writeln!(file, "  10.0.0.2:8080  ").unwrap();

        let pool = ProxyPool::from_file(file.path()).unwrap();
        assert_eq!(pool.len(), 2);
        assert_eq!(pool.next().as_deref(), Some("10.0.0.1:8080"));
    }

    #[test]
    fn missing_file_yields_empty_pool() {
        let pool = ProxyPool::from_file("/nonexistent/proxies.txt").unwrap();
        assert!(pool.is_empty());
    }
}
