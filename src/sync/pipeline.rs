use chrono::Utc;
use std::sync::Arc;

use crate::feed::{ExtractionError, Extractor, Fetcher};
use crate::storage::Feed;

use super::orchestrator::Synchronizer;
use super::outcome::SyncError;
use super::reconcile::{self, Merge};

impl<F: Fetcher, E: Extractor> Synchronizer<F, E> {
    /// Synchronize a single feed and return how many posts were new.
    ///
    /// Steps, each aborting the feed on error:
    /// 1. fetch the document
    /// 2. extract metadata and posts (on the blocking pool)
    /// 3. load the stored posts
    /// 4. merge stored and incoming posts
    /// 5. update feed metadata
    /// 6. replace the stored post set with the merged one
    ///
    /// Nothing is written before extraction succeeds. Steps 5 and 6 commit in
    /// separate transactions, so a crash between them leaves refreshed
    /// metadata over the previous post set until the next run.
    pub async fn synchronize_feed(&self, feed: &Feed) -> Result<usize, SyncError> {
        let feed_id = feed.id;

        let bytes = self.fetcher.fetch(&feed.url).await?;
        tracing::debug!(feed_id, bytes = bytes.len(), "Fetched feed");

        let extractor = Arc::clone(&self.extractor);
        let (metadata, incoming) = tokio::task::spawn_blocking(move || extractor.extract(&bytes))
            .await
            .map_err(|e| ExtractionError::Parse(format!("Extraction task failed: {}", e)))??;

        let existing = self
            .db
            .with_transaction(move |tx| Box::pin(async move { tx.load_posts_by_feed(feed_id).await }))
            .await?;

        let Merge { posts, new_count } =
            reconcile::merge(feed_id, &existing, incoming, Utc::now().timestamp());

        self.db
            .with_transaction(move |tx| {
                Box::pin(async move { tx.update_feed_metadata(feed_id, &metadata).await })
            })
            .await?;

        let stored = self
            .db
            .with_transaction(move |tx| {
                Box::pin(async move { tx.replace_posts_for_feed(feed_id, &posts).await })
            })
            .await?;

        tracing::debug!(feed_id, stored, new = new_count, "Replaced posts");
        Ok(new_count)
    }
}
