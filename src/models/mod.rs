// src/models/mod.rs

//! Domain models for the scraper application.

mod book;
mod config;
mod work_item;

// Re-export all public types
pub use book::{BookRecord, BookStats, Contributor};
pub use config::{ApiConfig, Config, OutputConfig, PathsConfig, ScraperConfig};
pub use work_item::{WorkItem, read_work_items};
