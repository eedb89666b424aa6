//! SQLite-backed store for feeds and their posts.
//!
//! All reads and writes happen inside [`Database::with_transaction`]; the
//! [`Transaction`] handle it lends out is the only type exposing feed and post
//! operations.

mod feeds;
mod posts;
mod schema;
mod transaction;
mod types;

pub use schema::{Database, IN_MEMORY};
pub use transaction::Transaction;
pub use types::{Feed, FeedMetadata, NewFeed, Post, RawPost, StorageError};
