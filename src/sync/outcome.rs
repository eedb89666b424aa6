use std::fmt;

use thiserror::Error;

use crate::feed::{ExtractionError, FetchError};
use crate::storage::StorageError;

// ============================================================================
// Per-feed errors
// ============================================================================

/// Why one feed failed to synchronize.
///
/// A failure is scoped to its feed; the rest of the batch carries on.
#[derive(Debug, Error)]
pub enum SyncError {
    #[error(transparent)]
    Fetch(#[from] FetchError),

    #[error(transparent)]
    Extraction(#[from] ExtractionError),

    #[error(transparent)]
    Storage(#[from] StorageError),

    /// The batch was cancelled or hit its deadline before this feed started
    #[error("Cancelled before synchronization started")]
    Cancelled,

    /// The worker running this feed died without reporting
    #[error("Worker aborted: {0}")]
    Aborted(String),
}

/// Coarse classification of a [`SyncError`] for reporting.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ErrorKind {
    Fetch,
    Extraction,
    Storage,
    Conflict,
    Cancelled,
    /// The pipeline panicked or its worker died
    Aborted,
}

impl ErrorKind {
    pub fn as_str(&self) -> &'static str {
        match self {
            ErrorKind::Fetch => "fetch",
            ErrorKind::Extraction => "extraction",
            ErrorKind::Storage => "storage",
            ErrorKind::Conflict => "conflict",
            ErrorKind::Cancelled => "cancelled",
            ErrorKind::Aborted => "aborted",
        }
    }
}

impl fmt::Display for ErrorKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl SyncError {
    pub fn kind(&self) -> ErrorKind {
        match self {
            SyncError::Fetch(_) => ErrorKind::Fetch,
            SyncError::Extraction(_) => ErrorKind::Extraction,
            SyncError::Storage(e) if e.is_conflict() => ErrorKind::Conflict,
            SyncError::Storage(_) => ErrorKind::Storage,
            SyncError::Cancelled => ErrorKind::Cancelled,
            SyncError::Aborted(_) => ErrorKind::Aborted,
        }
    }
}

// ============================================================================
// Report
// ============================================================================

/// Result of synchronizing one feed: the number of new posts, or the error.
#[derive(Debug)]
pub struct FeedOutcome {
    pub feed_id: i64,
    pub url: String,
    pub result: Result<usize, SyncError>,
}

impl FeedOutcome {
    pub fn is_ok(&self) -> bool {
        self.result.is_ok()
    }
}

impl fmt::Display for FeedOutcome {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match &self.result {
            Ok(1) => write!(f, "ok   {}: 1 new post", self.url),
            Ok(n) => write!(f, "ok   {}: {} new posts", self.url, n),
            Err(e) => write!(f, "FAIL {}: [{}] {}", self.url, e.kind(), e),
        }
    }
}

/// Outcome of a batch, one entry per scheduled feed in input order.
#[derive(Debug, Default)]
pub struct SyncReport {
    pub outcomes: Vec<FeedOutcome>,
}

impl SyncReport {
    pub fn succeeded(&self) -> usize {
        self.outcomes.iter().filter(|o| o.is_ok()).count()
    }

    pub fn failed(&self) -> usize {
        self.outcomes.len() - self.succeeded()
    }

    /// Sum of new posts over all successful feeds
    pub fn new_posts(&self) -> usize {
        self.outcomes
            .iter()
            .filter_map(|o| o.result.as_ref().ok())
            .sum()
    }
}

impl fmt::Display for SyncReport {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        for outcome in &self.outcomes {
            writeln!(f, "{}", outcome)?;
        }
        write!(
            f,
            "{} feeds: {} ok, {} failed, {} new posts",
            self.outcomes.len(),
            self.succeeded(),
            self.failed(),
            self.new_posts()
        )
    }
}
