use serde::Serialize;
use thiserror::Error;

// ============================================================================
// Error Types
// ============================================================================

/// Storage errors surfaced by [`Database`](super::Database) and
/// [`Transaction`](super::Transaction).
#[derive(Debug, Error)]
pub enum StorageError {
    /// Another process holds the database locked at open time
    #[error("Database is locked by another process. Please close it and try again.")]
    Locked,

    /// Migration failed
    #[error("Database migration failed: {0}")]
    Migration(String),

    /// Uniqueness constraint violated (duplicate feed URL or post key)
    #[error("Conflict: {0}")]
    Conflict(String),

    /// The addressed row does not exist
    #[error("{entity} {id} not found")]
    NotFound { entity: &'static str, id: i64 },

    /// Generic database or connectivity error
    #[error("Database error: {0}")]
    Database(#[from] sqlx::Error),
}

impl StorageError {
    /// Classify a sqlx error, separating constraint violations from
    /// connectivity/transaction failures.
    pub(crate) fn from_sqlx(err: sqlx::Error) -> Self {
        if let sqlx::Error::Database(db_err) = &err {
            if db_err.is_unique_violation() {
                return StorageError::Conflict(db_err.message().to_string());
            }
        }
        StorageError::Database(err)
    }

    /// Classify an error raised while opening the pool.
    ///
    /// SQLITE_BUSY (5), SQLITE_LOCKED (6) and SQLITE_CANTOPEN (14) all mean
    /// some other process is holding the file.
    pub(crate) fn from_open(err: sqlx::Error) -> Self {
        let error_string = err.to_string().to_lowercase();
        if error_string.contains("database is locked")
            || error_string.contains("database table is locked")
            || error_string.contains("sqlite_busy")
            || error_string.contains("sqlite_locked")
            || error_string.contains("unable to open database file")
        {
            return StorageError::Locked;
        }
        StorageError::Database(err)
    }

    pub fn is_conflict(&self) -> bool {
        matches!(self, StorageError::Conflict(_))
    }
}

// ============================================================================
// Input Types
// ============================================================================

/// Canonical feed-level metadata extracted from a feed document
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct FeedMetadata {
    pub title: String,
    pub author: String,
    pub website_url: String,
}

/// One post as extracted from a feed document, before reconciliation
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RawPost {
    /// External identity key (entry id/guid or link)
    pub key: String,
    pub title: String,
    pub content: Option<String>,
    pub url: Option<String>,
    pub published: Option<i64>,
}

/// A feed about to be registered
#[derive(Debug, Clone)]
pub struct NewFeed {
    pub url: String,
    pub metadata: FeedMetadata,
    pub enabled: bool,
}

// ============================================================================
// Row Types
// ============================================================================

/// Subscribed feed as stored
#[derive(Debug, Clone, PartialEq, Eq, Serialize, sqlx::FromRow)]
pub struct Feed {
    pub id: i64,
    pub url: String,
    pub title: String,
    pub author: String,
    pub website_url: String,
    pub enabled: bool,
    pub created_at: i64,
    pub refreshed_at: Option<i64>,
}

/// Post belonging to a feed.
///
/// `id` is `None` for posts produced by a merge that were not stored yet; the
/// database assigns one on insertion.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, sqlx::FromRow)]
pub struct Post {
    pub id: Option<i64>,
    pub feed_id: i64,
    pub key: String,
    pub title: String,
    pub content: Option<String>,
    pub url: Option<String>,
    pub published: Option<i64>,
    /// Unix timestamp of the first sync that saw this key
    pub first_seen: i64,
}
