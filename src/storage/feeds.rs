use super::transaction::Transaction;
use super::types::{Feed, FeedMetadata, NewFeed, StorageError};

const FEED_COLUMNS: &str =
    "id, url, title, author, website_url, enabled, created_at, refreshed_at";

impl Transaction {
    // ========================================================================
    // Feed Queries
    // ========================================================================

    /// Feeds eligible for synchronization, in insertion order
    pub async fn load_enabled_feeds(&mut self) -> Result<Vec<Feed>, StorageError> {
        let feeds = sqlx::query_as::<_, Feed>(&format!(
            "SELECT {FEED_COLUMNS} FROM feeds WHERE enabled = 1 ORDER BY id"
        ))
        .fetch_all(&mut *self.inner)
        .await
        .map_err(StorageError::from_sqlx)?;
        Ok(feeds)
    }

    /// All feeds, enabled or not, in insertion order
    pub async fn load_feeds(&mut self) -> Result<Vec<Feed>, StorageError> {
        let feeds = sqlx::query_as::<_, Feed>(&format!(
            "SELECT {FEED_COLUMNS} FROM feeds ORDER BY id"
        ))
        .fetch_all(&mut *self.inner)
        .await
        .map_err(StorageError::from_sqlx)?;
        Ok(feeds)
    }

    pub async fn load_feed(&mut self, feed_id: i64) -> Result<Feed, StorageError> {
        sqlx::query_as::<_, Feed>(&format!("SELECT {FEED_COLUMNS} FROM feeds WHERE id = ?"))
            .bind(feed_id)
            .fetch_optional(&mut *self.inner)
            .await
            .map_err(StorageError::from_sqlx)?
            .ok_or(StorageError::NotFound {
                entity: "feed",
                id: feed_id,
            })
    }

    // ========================================================================
    // Feed Mutations
    // ========================================================================

    /// Insert a new feed, returning the stored row.
    ///
    /// A URL that is already registered yields `StorageError::Conflict`.
    pub async fn insert_feed(&mut self, feed: &NewFeed) -> Result<Feed, StorageError> {
        let now = chrono::Utc::now().timestamp();
        let stored = sqlx::query_as::<_, Feed>(&format!(
            r#"
            INSERT INTO feeds (url, title, author, website_url, enabled, created_at)
            VALUES (?, ?, ?, ?, ?, ?)
            RETURNING {FEED_COLUMNS}
        "#
        ))
        .bind(&feed.url)
        .bind(&feed.metadata.title)
        .bind(&feed.metadata.author)
        .bind(&feed.metadata.website_url)
        .bind(feed.enabled)
        .bind(now)
        .fetch_one(&mut *self.inner)
        .await
        .map_err(StorageError::from_sqlx)?;

        tracing::debug!(feed_id = stored.id, url = %stored.url, "Feed inserted");
        Ok(stored)
    }

    /// Refresh a feed's metadata from a new extraction.
    ///
    /// Non-empty extracted fields replace the stored ones; an empty field
    /// keeps the stored value, so a feed that drops its `<author>` element does
    /// not lose the author given at registration. Always bumps `refreshed_at`.
    pub async fn update_feed_metadata(
        &mut self,
        feed_id: i64,
        metadata: &FeedMetadata,
    ) -> Result<(), StorageError> {
        let now = chrono::Utc::now().timestamp();
        let result = sqlx::query(
            r#"
            UPDATE feeds SET
                title = COALESCE(NULLIF(?, ''), title),
                author = COALESCE(NULLIF(?, ''), author),
                website_url = COALESCE(NULLIF(?, ''), website_url),
                refreshed_at = ?
            WHERE id = ?
        "#,
        )
        .bind(&metadata.title)
        .bind(&metadata.author)
        .bind(&metadata.website_url)
        .bind(now)
        .bind(feed_id)
        .execute(&mut *self.inner)
        .await
        .map_err(StorageError::from_sqlx)?;

        if result.rows_affected() == 0 {
            return Err(StorageError::NotFound {
                entity: "feed",
                id: feed_id,
            });
        }
        Ok(())
    }

    pub async fn set_feed_enabled(
        &mut self,
        feed_id: i64,
        enabled: bool,
    ) -> Result<(), StorageError> {
        let result = sqlx::query("UPDATE feeds SET enabled = ? WHERE id = ?")
            .bind(enabled)
            .bind(feed_id)
            .execute(&mut *self.inner)
            .await
            .map_err(StorageError::from_sqlx)?;

        if result.rows_affected() == 0 {
            return Err(StorageError::NotFound {
                entity: "feed",
                id: feed_id,
            });
        }
        Ok(())
    }
}
