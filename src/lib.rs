//! Feed synchronization core for a static "planet" aggregator.
//!
//! - [`storage`] - SQLite store with a transaction-scoped API
//! - [`feed`] - HTTP fetcher and `feed-rs` extractor behind traits
//! - [`sync`] - post reconciliation, batch orchestration, feed registration
//! - [`export`] - JSON snapshot consumed by the site generator
//! - [`config`] - TOML configuration

pub mod config;
pub mod export;
pub mod feed;
pub mod storage;
pub mod sync;
pub mod util;
