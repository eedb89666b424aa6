use super::transaction::Transaction;
use super::types::{Post, StorageError};

impl Transaction {
    // ========================================================================
    // Post Queries
    // ========================================================================

    /// Posts of one feed in the order they were last stored
    pub async fn load_posts_by_feed(&mut self, feed_id: i64) -> Result<Vec<Post>, StorageError> {
        let posts = sqlx::query_as::<_, Post>(
            r#"
            SELECT id, feed_id, key, title, content, url, published, first_seen
            FROM posts
            WHERE feed_id = ?
            ORDER BY position
        "#,
        )
        .bind(feed_id)
        .fetch_all(&mut *self.inner)
        .await
        .map_err(StorageError::from_sqlx)?;

        Ok(posts)
    }

    // ========================================================================
    // Post Mutations
    // ========================================================================

    /// Remove every stored post of a feed, returning how many were removed
    pub async fn delete_posts_by_feed(&mut self, feed_id: i64) -> Result<u64, StorageError> {
        let result = sqlx::query("DELETE FROM posts WHERE feed_id = ?")
            .bind(feed_id)
            .execute(&mut *self.inner)
            .await
            .map_err(StorageError::from_sqlx)?;
        Ok(result.rows_affected())
    }

    /// Insert one post at `position` within its feed, returning the post id.
    ///
    /// A post carrying an id keeps it; a post without one gets a fresh id.
    /// A key already stored for the same feed yields `StorageError::Conflict`.
    pub async fn insert_post(&mut self, post: &Post, position: i64) -> Result<i64, StorageError> {
        let row: (i64,) = sqlx::query_as(
            r#"
            INSERT INTO posts (id, feed_id, key, title, content, url, published, first_seen, position)
            VALUES (?, ?, ?, ?, ?, ?, ?, ?, ?)
            RETURNING id
        "#,
        )
        .bind(post.id)
        .bind(post.feed_id)
        .bind(&post.key)
        .bind(&post.title)
        .bind(&post.content)
        .bind(&post.url)
        .bind(post.published)
        .bind(post.first_seen)
        .bind(position)
        .fetch_one(&mut *self.inner)
        .await
        .map_err(StorageError::from_sqlx)?;

        Ok(row.0)
    }

    /// Replace the whole stored post set of a feed with `posts`.
    ///
    /// Runs as delete-all then insert-all inside the caller's transaction, so
    /// readers see either the old set or the new one. Every post must belong to
    /// `feed_id`. Returns the number of posts stored.
    ///
    /// Posts that carry a stored id are inserted before new ones, so a fresh id
    /// can never take one that a kept post still needs. `position` keeps the
    /// given order either way.
    pub async fn replace_posts_for_feed(
        &mut self,
        feed_id: i64,
        posts: &[Post],
    ) -> Result<usize, StorageError> {
        if let Some(post) = posts.iter().find(|p| p.feed_id != feed_id) {
            return Err(StorageError::Conflict(format!(
                "post {} belongs to feed {}, not {}",
                post.key, post.feed_id, feed_id
            )));
        }

        let removed = self.delete_posts_by_feed(feed_id).await?;

        let (kept, new): (Vec<_>, Vec<_>) =
            posts.iter().enumerate().partition(|(_, p)| p.id.is_some());
        for (position, post) in kept.into_iter().chain(new) {
            self.insert_post(post, position as i64).await?;
        }

        tracing::debug!(
            feed_id = feed_id,
            removed = removed,
            stored = posts.len(),
            "Post set replaced"
        );
        Ok(posts.len())
    }
}
