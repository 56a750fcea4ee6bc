// src/lib.rs

//! libris: resilient SensCritique book-data scraper library

pub mod error;
pub mod models;
pub mod pipeline;
pub mod proxy;
