//! Application configuration structures.

use std::fs;
use std::path::{Path, PathBuf};

use serde::{Deserialize, Serialize};

use crate::error::{AppError, Result};

/// Root application configuration.
#[derive(Debug, Clone, Serialize, Deserialize, Default)]
pub struct Config {
    /// Fetch and retry behavior settings
    #[serde(default)]
    pub scraper: ScraperConfig,

    /// Remote API settings
    #[serde(default)]
    pub api: ApiConfig,

    /// Shard output settings
    #[serde(default)]
    pub output: OutputConfig,

    /// File and directory locations
    #[serde(default)]
    pub paths: PathsConfig,
}

impl Config {
    /// Load configuration from a TOML file.
    pub fn load(path: impl AsRef<Path>) -> Result<Self> {
        let content = fs::read_to_string(path)?;
        Ok(toml::from_str(&content)?)
    }

    /// Load configuration or return default if loading fails.
    pub fn load_or_default(path: impl AsRef<Path>) -> Self {
        Self::load(&path).unwrap_or_else(|e| {
            log::warn!(
                "Config load failed from {:?}: {}. Using defaults.",
                path.as_ref(),
                e
            );
            Self::default()
        })
    }

    /// Validate configuration values for basic sanity.
    pub fn validate(&self) -> Result<()> {
        if self.scraper.concurrency == 0 {
            return Err(AppError::validation("scraper.concurrency must be > 0"));
        }
        if self.scraper.max_attempts == 0 {
            return Err(AppError::validation("scraper.max_attempts must be > 0"));
        }
        if self.scraper.timeout_secs == 0 {
            return Err(AppError::validation("scraper.timeout_secs must be > 0"));
        }
        if self.scraper.checkpoint_interval == 0 {
            return Err(AppError::validation(
                "scraper.checkpoint_interval must be > 0",
            ));
        }
        if self.output.shard_size == 0 {
            return Err(AppError::validation("output.shard_size must be > 0"));
        }
        if self.output.base_name.trim().is_empty() {
            return Err(AppError::validation("output.base_name is empty"));
        }
        if !self.api.base_url.starts_with("http") {
            return Err(AppError::validation(
                "api.base_url must be an HTTP/HTTPS URL",
            ));
        }
        Ok(())
    }
}

/// Fetch dispatch and retry behavior settings.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ScraperConfig {
    /// Maximum concurrent in-flight items
    #[serde(default = "defaults::concurrency")]
    pub concurrency: usize,

    /// Politeness delay before each attempt, in seconds.
    /// Also the unit of the linear retry backoff.
    #[serde(default = "defaults::request_delay")]
    pub request_delay_secs: u64,

    /// Per-request timeout in seconds
    #[serde(default = "defaults::timeout")]
    pub timeout_secs: u64,

    /// Attempts per item before it is emitted as failed
    #[serde(default = "defaults::max_attempts")]
    pub max_attempts: usize,

    /// Completed items between cumulative checkpoint snapshots
    #[serde(default = "defaults::checkpoint_interval")]
    pub checkpoint_interval: usize,

    /// Fail at startup when the proxy file yields zero endpoints
    #[serde(default = "defaults::require_proxies")]
    pub require_proxies: bool,
}

impl Default for ScraperConfig {
    fn default() -> Self {
        Self {
            concurrency: defaults::concurrency(),
            request_delay_secs: defaults::request_delay(),
            timeout_secs: defaults::timeout(),
            max_attempts: defaults::max_attempts(),
            checkpoint_interval: defaults::checkpoint_interval(),
            require_proxies: defaults::require_proxies(),
        }
    }
}

/// Remote Next.js data API settings.
///
/// The base URL embeds the site's current build id and changes when the
/// site redeploys, so it must stay configurable.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ApiConfig {
    /// Base URL template up to and including the universe path segment
    #[serde(default = "defaults::base_url")]
    pub base_url: String,

    /// Universe query parameter value
    #[serde(default = "defaults::universe")]
    pub universe: String,
}

impl Default for ApiConfig {
    fn default() -> Self {
        Self {
            base_url: defaults::base_url(),
            universe: defaults::universe(),
        }
    }
}

/// Final shard output settings.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct OutputConfig {
    /// Records per shard file
    #[serde(default = "defaults::shard_size")]
    pub shard_size: usize,

    /// Base name for shard and manifest files
    #[serde(default = "defaults::base_name")]
    pub base_name: String,
}

impl Default for OutputConfig {
    fn default() -> Self {
        Self {
            shard_size: defaults::shard_size(),
            base_name: defaults::base_name(),
        }
    }
}

/// File and directory locations.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct PathsConfig {
    /// Newline-delimited book URL list
    #[serde(default = "defaults::urls_file")]
    pub urls_file: PathBuf,

    /// Newline-delimited `host:port` proxy list
    #[serde(default = "defaults::proxy_file")]
    pub proxy_file: PathBuf,

    /// Directory for checkpoint snapshots
    #[serde(default = "defaults::checkpoint_dir")]
    pub checkpoint_dir: PathBuf,

    /// Directory for final shards and manifest
    #[serde(default = "defaults::output_dir")]
    pub output_dir: PathBuf,
}

impl Default for PathsConfig {
    fn default() -> Self {
        Self {
            urls_file: defaults::urls_file(),
            proxy_file: defaults::proxy_file(),
            checkpoint_dir: defaults::checkpoint_dir(),
            output_dir: defaults::output_dir(),
        }
    }
}

mod defaults {
    use std::path::PathBuf;

    // Scraper defaults
    pub fn concurrency() -> usize {
        10
    }
    pub fn request_delay() -> u64 {
        1
    }
    pub fn timeout() -> u64 {
        60
    }
    pub fn max_attempts() -> usize {
        3
    }
    pub fn checkpoint_interval() -> usize {
        1000
    }
    pub fn require_proxies() -> bool {
        true
    }

    // API defaults
    pub fn base_url() -> String {
        "https://www.senscritique.com/_next/data/NZC4gJK0x7_I2hUZze_-h/fr/universe/".into()
    }
    pub fn universe() -> String {
        "book".into()
    }

    // Output defaults
    pub fn shard_size() -> usize {
        10_000
    }
    pub fn base_name() -> String {
        "books".into()
    }

    // Path defaults
    pub fn urls_file() -> PathBuf {
        "output/book_urls.txt".into()
    }
    pub fn proxy_file() -> PathBuf {
        "proxies.txt".into()
    }
    pub fn checkpoint_dir() -> PathBuf {
        "checkpoints".into()
    }
    pub fn output_dir() -> PathBuf {
        "output".into()
    }
}
