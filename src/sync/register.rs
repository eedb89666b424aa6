use std::sync::Arc;
use thiserror::Error;

use crate::feed::{ExtractionError, Extractor, FetchError, Fetcher};
use crate::storage::{Feed, NewFeed, StorageError};
use crate::util::{validate_feed_url, UrlValidationError};

use super::orchestrator::Synchronizer;

/// Registration input that can never be stored.
#[derive(Debug, Error)]
pub enum ValidationError {
    #[error(transparent)]
    Url(#[from] UrlValidationError),

    /// A required feed field is empty after extraction and overrides
    #[error("Feed has no {0}")]
    MissingField(&'static str),
}

#[derive(Debug, Error)]
pub enum RegisterError {
    #[error(transparent)]
    Validation(#[from] ValidationError),

    #[error(transparent)]
    Fetch(#[from] FetchError),

    #[error(transparent)]
    Extraction(#[from] ExtractionError),

    #[error(transparent)]
    Storage(#[from] StorageError),
}

impl RegisterError {
    /// The feed URL is already registered
    pub fn is_conflict(&self) -> bool {
        matches!(self, RegisterError::Storage(e) if e.is_conflict())
    }
}

impl<F: Fetcher, E: Extractor> Synchronizer<F, E> {
    /// Register a new feed.
    ///
    /// The URL is validated and fetched once so the feed's metadata can be
    /// read. A non-empty `author` replaces the extracted one. Title, author and
    /// website URL must all be present. The feed is stored enabled and without
    /// posts; the next synchronization populates them.
    pub async fn register_feed(
        &self,
        url: &str,
        author: Option<&str>,
    ) -> Result<Feed, RegisterError> {
        let url = validate_feed_url(url, self.options.allow_private_hosts)
            .map_err(ValidationError::from)?;

        let bytes = self.fetcher.fetch(url.as_str()).await?;

        let extractor = Arc::clone(&self.extractor);
        let mut metadata = tokio::task::spawn_blocking(move || extractor.extract_metadata(&bytes))
            .await
            .map_err(|e| ExtractionError::Parse(format!("Extraction task failed: {}", e)))??;

        if let Some(author) = author.map(str::trim).filter(|a| !a.is_empty()) {
            metadata.author = author.to_string();
        }

        let required = [
            ("title", &metadata.title),
            ("author", &metadata.author),
            ("website URL", &metadata.website_url),
        ];
        if let Some((field, _)) = required.iter().find(|(_, value)| value.trim().is_empty()) {
            return Err(ValidationError::MissingField(*field).into());
        }

        let new_feed = NewFeed {
            url: url.to_string(),
            metadata,
            enabled: true,
        };
        let feed = self
            .db
            .with_transaction(move |tx| Box::pin(async move { tx.insert_feed(&new_feed).await }))
            .await?;

        tracing::info!(feed_id = feed.id, url = %feed.url, title = %feed.title, "Feed registered");
        Ok(feed)
    }
}
