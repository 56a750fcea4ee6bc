//! Single-attempt fetch worker.
//!
//! One attempt is one proxied GET against the Next.js data endpoint,
//! classified into an outcome. Retry policy lives in the dispatcher; a
//! worker never retries internally.

use std::collections::HashMap;
use std::sync::Mutex;
use std::time::Duration;

use async_trait::async_trait;
use reqwest::Client;
use reqwest::header::{HeaderMap, HeaderValue};
use serde_json::Value;

use crate::models::{ApiConfig, BookRecord, WorkItem};

/// Classified result of one fetch attempt.
#[derive(Debug, Clone, PartialEq)]
pub enum FetchOutcome {
    /// Valid response with a product record, already cleaned.
    Success(BookRecord),
    /// Valid response but no record for this id. Terminal, not retried.
    NotFound,
    /// HTTP error, transport error, timeout, or undecodable body.
    Retryable(String),
}

/// Performs one fetch attempt for a work item through a given proxy.
#[async_trait]
pub trait Fetcher: Send + Sync {
    async fn attempt(&self, item: &WorkItem, proxy: &str) -> FetchOutcome;
}

/// Real HTTP fetcher against the Next.js data API.
///
/// reqwest routes proxies per client, so one client is built and cached
/// per endpoint. A fixed politeness delay runs before every attempt,
/// bounding the request rate of each concurrency slot.
pub struct HttpFetcher {
    api: ApiConfig,
    timeout: Duration,
    delay: Duration,
    clients: Mutex<HashMap<String, Client>>,
}

impl HttpFetcher {
    pub fn new(api: ApiConfig, timeout: Duration, delay: Duration) -> Self {
        Self {
            api,
            timeout,
            delay,
            clients: Mutex::new(HashMap::new()),
        }
    }

    /// Request URL for an item: `{base}{name}/{id}/details.json` plus the
    /// universe/slug/id query expected by the endpoint.
    pub fn build_url(&self, item: &WorkItem) -> String {
        format!(
            "{base}{name}/{id}/details.json?universe={universe}&slug={name}&id={id}",
            base = self.api.base_url,
            name = item.name,
            id = item.id,
            universe = self.api.universe,
        )
    }

    fn client_for(&self, proxy: &str) -> reqwest::Result<Client> {
        let mut clients = self.clients.lock().unwrap();
        if let Some(client) = clients.get(proxy) {
            return Ok(client.clone());
        }
        let client = Client::builder()
            .default_headers(default_headers())
            .timeout(self.timeout)
            .proxy(reqwest::Proxy::all(format!("http://{proxy}"))?)
            .build()?;
        clients.insert(proxy.to_string(), client.clone());
        Ok(client)
    }
}

#[async_trait]
impl Fetcher for HttpFetcher {
    async fn attempt(&self, item: &WorkItem, proxy: &str) -> FetchOutcome {
        if !self.delay.is_zero() {
            tokio::time::sleep(self.delay).await;
        }

        let client = match self.client_for(proxy) {
            Ok(client) => client,
            Err(e) => return FetchOutcome::Retryable(format!("client build failed: {e}")),
        };

        let response = match client.get(self.build_url(item)).send().await {
            Ok(response) => response,
            Err(e) => return FetchOutcome::Retryable(format!("transport error: {e}")),
        };

        let status = response.status();
        if !status.is_success() {
            return FetchOutcome::Retryable(format!("HTTP {status}"));
        }

        let body: Value = match response.json().await {
            Ok(body) => body,
            Err(e) => return FetchOutcome::Retryable(format!("JSON decode error: {e}")),
        };

        match extract_product(&body, &item.id) {
            Some(raw) => FetchOutcome::Success(BookRecord::from_raw(&item.id, raw)),
            None => FetchOutcome::NotFound,
        }
    }
}

/// Locate the product object inside the Apollo cache payload:
/// `pageProps.__APOLLO_STATE__["Product:<id>"]`.
pub fn extract_product<'a>(body: &'a Value, id: &str) -> Option<&'a Value> {
    body.get("pageProps")?
        .get("__APOLLO_STATE__")?
        .get(format!("Product:{id}"))
        .filter(|v| !v.is_null())
}

/// Browser-like header set expected by the endpoint, plus the
/// `x-nextjs-data` marker that selects the JSON data route.
fn default_headers() -> HeaderMap {
    let mut headers = HeaderMap::new();
    headers.insert("accept", HeaderValue::from_static("*/*"));
    headers.insert(
        "accept-language",
        HeaderValue::from_static("en-US,en;q=0.9"),
    );
    headers.insert("dnt", HeaderValue::from_static("1"));
    headers.insert(
        "referer",
        HeaderValue::from_static("https://www.senscritique.com"),
    );
    headers.insert(
        "sec-ch-ua",
        HeaderValue::from_static("\"Chromium\";v=\"131\", \"Not_A Brand\";v=\"24\""),
    );
    headers.insert("sec-ch-ua-mobile", HeaderValue::from_static("?0"));
    headers.insert("sec-ch-ua-platform", HeaderValue::from_static("\"macOS\""));
    headers.insert("sec-fetch-dest", HeaderValue::from_static("empty"));
    headers.insert("sec-fetch-mode", HeaderValue::from_static("cors"));
    headers.insert("sec-fetch-site", HeaderValue::from_static("same-origin"));
    headers.insert(
        "user-agent",
        HeaderValue::from_static(
            "Mozilla/5.0 (Macintosh; Intel Mac OS X 10_15_7) AppleWebKit/537.36 \
             (KHTML, like Gecko) Chrome/131.0.0.0 Safari/537.36",
        ),
    );
    headers.insert("x-nextjs-data", HeaderValue::from_static("1"));
    headers
}
