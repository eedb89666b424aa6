use futures::FutureExt;
use std::collections::{HashSet, VecDeque};
use std::panic::AssertUnwindSafe;
use std::sync::{Arc, Mutex, PoisonError};
use std::time::Duration;
use tokio::sync::mpsc;
use tokio::time::Instant;

use crate::feed::{Extractor, Fetcher};
use crate::storage::{Database, Feed};

use super::outcome::{FeedOutcome, SyncError, SyncReport};
use super::shutdown::Shutdown;

/// Batch-level settings
#[derive(Debug, Clone)]
pub struct SyncOptions {
    /// Maximum feeds synchronized concurrently; 0 is treated as 1
    pub workers: usize,
    /// Stop starting new feeds once this much time has passed
    pub deadline: Option<Duration>,
    /// Accept loopback and private addresses when registering feeds
    pub allow_private_hosts: bool,
}

impl Default for SyncOptions {
    fn default() -> Self {
        Self {
            workers: 4,
            deadline: None,
            allow_private_hosts: false,
        }
    }
}

/// Feeds waiting for a worker, tagged with their position in the batch
type FeedQueue = Arc<Mutex<VecDeque<(usize, Feed)>>>;

/// Drives fetch, extraction, reconciliation and storage for a set of feeds.
///
/// Cloning is cheap: clones share the database pool, fetcher and extractor.
pub struct Synchronizer<F, E> {
    pub(crate) db: Database,
    pub(crate) fetcher: Arc<F>,
    pub(crate) extractor: Arc<E>,
    pub(crate) options: SyncOptions,
}

impl<F, E> Clone for Synchronizer<F, E> {
    fn clone(&self) -> Self {
        Self {
            db: self.db.clone(),
            fetcher: Arc::clone(&self.fetcher),
            extractor: Arc::clone(&self.extractor),
            options: self.options.clone(),
        }
    }
}

impl<F: Fetcher, E: Extractor> Synchronizer<F, E> {
    pub fn new(db: Database, fetcher: F, extractor: E, options: SyncOptions) -> Self {
        Self {
            db,
            fetcher: Arc::new(fetcher),
            extractor: Arc::new(extractor),
            options,
        }
    }

    pub fn database(&self) -> &Database {
        &self.db
    }

    /// Synchronize every enabled feed in `feeds` on a pool of `workers` tasks.
    ///
    /// Disabled feeds are skipped and repeated ids are scheduled once. Workers
    /// pull feeds from a shared queue and send outcomes to a single collector,
    /// which orders the report by input position. A failing feed never
    /// affects another.
    ///
    /// Once `shutdown` fires or the deadline passes, feeds that have not
    /// started are reported as [`SyncError::Cancelled`]; feeds already under
    /// way run to completion.
    pub async fn synchronize_all(&self, feeds: Vec<Feed>, shutdown: Shutdown) -> SyncReport {
        let deadline = self.options.deadline.map(|d| Instant::now() + d);

        let mut seen = HashSet::new();
        let scheduled: Vec<Feed> = feeds
            .into_iter()
            .filter(|feed| {
                if !feed.enabled {
                    tracing::debug!(feed_id = feed.id, "Skipping disabled feed");
                    return false;
                }
                if !seen.insert(feed.id) {
                    tracing::warn!(feed_id = feed.id, "Feed listed twice, synchronizing once");
                    return false;
                }
                true
            })
            .collect();

        if scheduled.is_empty() {
            tracing::info!("No enabled feeds to synchronize");
            return SyncReport::default();
        }

        let total = scheduled.len();
        let workers = self.options.workers.clamp(1, total);
        tracing::info!(feeds = total, workers, "Starting synchronization");

        // Kept to report a feed whose worker died mid-pipeline
        let idents: Vec<(i64, String)> = scheduled.iter().map(|f| (f.id, f.url.clone())).collect();

        let queue: FeedQueue = Arc::new(Mutex::new(scheduled.into_iter().enumerate().collect()));
        let (tx, mut rx) = mpsc::channel::<(usize, FeedOutcome)>(workers);

        let handles: Vec<_> = (0..workers)
            .map(|worker| {
                let this = self.clone();
                let queue = Arc::clone(&queue);
                let tx = tx.clone();
                let shutdown = shutdown.clone();
                tokio::spawn(async move { this.run_worker(worker, queue, tx, shutdown, deadline).await })
            })
            .collect();
        drop(tx);

        let mut slots: Vec<Option<FeedOutcome>> = (0..total).map(|_| None).collect();
        while let Some((index, outcome)) = rx.recv().await {
            slots[index] = Some(outcome);
        }

        for handle in handles {
            if let Err(e) = handle.await {
                tracing::error!(error = %e, "Sync worker panicked");
            }
        }

        let outcomes = slots
            .into_iter()
            .zip(idents)
            .map(|(slot, (feed_id, url))| {
                slot.unwrap_or_else(|| FeedOutcome {
                    feed_id,
                    url,
                    result: Err(SyncError::Aborted("worker exited without reporting".to_string())),
                })
            })
            .collect();
        let report = SyncReport { outcomes };

        tracing::info!(
            ok = report.succeeded(),
            failed = report.failed(),
            new_posts = report.new_posts(),
            "Synchronization finished"
        );
        report
    }

    /// Take feeds from `queue` until it is empty.
    ///
    /// After cancellation the remaining feeds are still drained, each
    /// reported as cancelled without running.
    async fn run_worker(
        &self,
        worker: usize,
        queue: FeedQueue,
        tx: mpsc::Sender<(usize, FeedOutcome)>,
        shutdown: Shutdown,
        deadline: Option<Instant>,
    ) {
        loop {
            let next = queue.lock().unwrap_or_else(PoisonError::into_inner).pop_front();
            let Some((index, feed)) = next else {
                break;
            };

            let expired = deadline.is_some_and(|d| Instant::now() >= d);
            let result = if shutdown.is_triggered() || expired {
                Err(SyncError::Cancelled)
            } else {
                match catch_task_panic(self.synchronize_feed(&feed)).await {
                    Ok(result) => result,
                    Err(panic_msg) => {
                        tracing::error!(feed_id = feed.id, error = %panic_msg, "Feed pipeline panicked");
                        Err(SyncError::Aborted(panic_msg))
                    }
                }
            };

            match &result {
                Ok(new_posts) => {
                    tracing::info!(worker, feed_id = feed.id, url = %feed.url, new_posts, "Feed synchronized")
                }
                Err(SyncError::Cancelled) => {
                    tracing::debug!(worker, feed_id = feed.id, "Feed not started, batch cancelled")
                }
                Err(e) => {
                    tracing::warn!(worker, feed_id = feed.id, url = %feed.url, kind = %e.kind(), error = %e, "Feed failed")
                }
            }

            let outcome = FeedOutcome {
                feed_id: feed.id,
                url: feed.url,
                result,
            };
            if tx.send((index, outcome)).await.is_err() {
                tracing::warn!(worker, "Report collector dropped, stopping worker");
                break;
            }
        }
    }
}

/// Run `future`, turning a panic into `Err` with the panic message.
async fn catch_task_panic<Fut, T>(future: Fut) -> Result<T, String>
where
    Fut: std::future::Future<Output = T>,
{
    AssertUnwindSafe(future).catch_unwind().await.map_err(|panic| {
        if let Some(s) = panic.downcast_ref::<&'static str>() {
            s.to_string()
        } else if let Some(s) = panic.downcast_ref::<String>() {
            s.clone()
        } else {
            "Unknown panic".to_string()
        }
    })
}
