use sqlx::{
    sqlite::{SqliteConnectOptions, SqliteJournalMode, SqlitePoolOptions},
    SqlitePool,
};
use std::str::FromStr;
use std::time::Duration;

use super::types::StorageError;

/// In-memory database path accepted by [`Database::open`]
pub const IN_MEMORY: &str = ":memory:";

// ============================================================================
// Database
// ============================================================================

/// Handle to the feed/post store.
///
/// Cloning is cheap; all clones share the same connection pool. Reads and
/// writes go through [`Database::with_transaction`].
#[derive(Clone)]
pub struct Database {
    pub(crate) pool: SqlitePool,
}

impl Database {
    /// Open a database connection and run migrations
    ///
    /// # Errors
    ///
    /// Returns `StorageError::Locked` if another process has the database
    /// locked, `StorageError::Migration` if the schema cannot be created.
    pub async fn open(path: &str) -> Result<Self, StorageError> {
        let url = format!("sqlite:{}?mode=rwc", path);

        // busy_timeout=5000: concurrent workers wait up to 5 seconds for the
        // write lock instead of failing with SQLITE_BUSY.
        let mut options = SqliteConnectOptions::from_str(&url)
            .map_err(StorageError::from_open)?
            .foreign_keys(true)
            .pragma("busy_timeout", "5000");

        let mut pool_options = SqlitePoolOptions::new()
            .max_connections(5)
            .acquire_timeout(Duration::from_secs(10));

        if path == IN_MEMORY {
            // Each connection would see its own empty database
            pool_options = pool_options
                .max_connections(1)
                .idle_timeout(None)
                .max_lifetime(None);
        } else {
            // WAL lets readers proceed while another feed's replacement commits
            options = options.journal_mode(SqliteJournalMode::Wal);
        }

        let pool = pool_options
            .connect_with(options)
            .await
            .map_err(StorageError::from_open)?;

        let db = Self { pool };
        db.migrate().await.map_err(|e| match StorageError::from_open(e) {
            StorageError::Locked => StorageError::Locked,
            other => StorageError::Migration(other.to_string()),
        })?;

        tracing::debug!(path = %path, "Database opened");
        Ok(db)
    }

    /// Close the pool, waiting for checked-out connections to be returned
    pub async fn close(&self) {
        self.pool.close().await;
    }

    /// Run database migrations atomically within a transaction.
    ///
    /// All statements use `IF NOT EXISTS`, so re-running on an existing
    /// database is a no-op.
    async fn migrate(&self) -> Result<(), sqlx::Error> {
        let mut tx = self.pool.begin().await?;

        sqlx::query(
            r#"
            CREATE TABLE IF NOT EXISTS feeds (
                id INTEGER PRIMARY KEY,
                url TEXT UNIQUE NOT NULL,
                title TEXT NOT NULL,
                author TEXT NOT NULL,
                website_url TEXT NOT NULL,
                enabled INTEGER NOT NULL DEFAULT 1,
                created_at INTEGER NOT NULL,
                refreshed_at INTEGER
            )
        "#,
        )
        .execute(&mut *tx)
        .await?;

        sqlx::query(
            r#"
            CREATE TABLE IF NOT EXISTS posts (
                id INTEGER PRIMARY KEY AUTOINCREMENT,
                feed_id INTEGER NOT NULL REFERENCES feeds(id) ON DELETE CASCADE,
                key TEXT NOT NULL,
                title TEXT NOT NULL,
                content TEXT,
                url TEXT,
                published INTEGER,
                first_seen INTEGER NOT NULL,
                position INTEGER NOT NULL,
                UNIQUE(feed_id, key)
            )
        "#,
        )
        .execute(&mut *tx)
        .await?;

        // Posts are always read per feed in stored order
        sqlx::query(
            "CREATE INDEX IF NOT EXISTS idx_posts_feed_position ON posts(feed_id, position)",
        )
        .execute(&mut *tx)
        .await?;

        sqlx::query("CREATE INDEX IF NOT EXISTS idx_feeds_enabled ON feeds(enabled)")
            .execute(&mut *tx)
            .await?;

        tx.commit().await?;

        Ok(())
    }
}
