//! Snapshot of the stored feeds and posts for the site generator.
//!
//! The generator only reads `planet.json`; layout and theming live there.

use serde::Serialize;
use std::io::Write;
use std::path::{Path, PathBuf};
use thiserror::Error;

use crate::storage::{Database, Feed, Post, StorageError};

/// File written inside the output directory
pub const SNAPSHOT_FILE: &str = "planet.json";

#[derive(Debug, Error)]
pub enum ExportError {
    #[error(transparent)]
    Storage(#[from] StorageError),

    #[error("Failed to write snapshot to {path}: {source}")]
    Io {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    #[error("Failed to encode snapshot: {0}")]
    Encode(#[from] serde_json::Error),
}

#[derive(Debug, Serialize)]
pub struct Snapshot {
    pub generated_at: i64,
    pub feeds: Vec<FeedSnapshot>,
}

/// A feed with its posts in stored order
#[derive(Debug, Serialize)]
pub struct FeedSnapshot {
    #[serde(flatten)]
    pub feed: Feed,
    pub posts: Vec<Post>,
}

/// Read every feed and its posts in a single transaction, so the snapshot
/// never mixes two synchronization runs of the same feed.
pub async fn load_snapshot(db: &Database) -> Result<Snapshot, StorageError> {
    let feeds = db
        .with_transaction(|tx| {
            Box::pin(async move {
                let feeds = tx.load_feeds().await?;
                let mut out = Vec::with_capacity(feeds.len());
                for feed in feeds {
                    let posts = tx.load_posts_by_feed(feed.id).await?;
                    out.push(FeedSnapshot { feed, posts });
                }
                Ok::<_, StorageError>(out)
            })
        })
        .await?;

    Ok(Snapshot {
        generated_at: chrono::Utc::now().timestamp(),
        feeds,
    })
}

/// Write `<out_dir>/planet.json`, creating `out_dir` if needed.
///
/// The file is written to a temporary sibling and renamed into place, so a
/// reader never sees a partial snapshot. File I/O runs on the blocking pool.
pub async fn write_snapshot(db: &Database, out_dir: &Path) -> Result<PathBuf, ExportError> {
    let snapshot = load_snapshot(db).await?;
    let json = serde_json::to_vec_pretty(&snapshot)?;

    let target = out_dir.join(SNAPSHOT_FILE);
    let (dir, dst) = (out_dir.to_path_buf(), target.clone());
    tokio::task::spawn_blocking(move || {
        std::fs::create_dir_all(&dir).map_err(io_error(&dir))?;
        atomic_write(&dst, &json).map_err(io_error(&dst))
    })
    .await
    .map_err(|e| ExportError::Io {
        path: target.clone(),
        source: std::io::Error::other(e),
    })??;

    tracing::info!(
        path = %target.display(),
        feeds = snapshot.feeds.len(),
        "Snapshot written"
    );
    Ok(target)
}

fn io_error(path: &Path) -> impl FnOnce(std::io::Error) -> ExportError {
    let path = path.to_path_buf();
    move |source| ExportError::Io { path, source }
}

/// Write-to-temp-then-rename; the temp file is removed on failure.
fn atomic_write(dst: &Path, content: &[u8]) -> std::io::Result<()> {
    use std::time::{SystemTime, UNIX_EPOCH};
    let suffix = SystemTime::now()
        .duration_since(UNIX_EPOCH)
        .map(|d| d.as_nanos())
        .unwrap_or(0);
    let temp_path = dst.with_extension(format!("tmp.{:016x}", suffix));

    let result = (|| {
        let mut file = std::fs::OpenOptions::new()
            .write(true)
            .create_new(true)
            .open(&temp_path)?;
        file.write_all(content)?;
        file.sync_all()?;
        drop(file);

        // On Windows, rename fails if destination exists
        #[cfg(windows)]
        if dst.exists() {
            std::fs::remove_file(dst)?;
        }
        std::fs::rename(&temp_path, dst)
    })();

    if result.is_err() {
        let _ = std::fs::remove_file(&temp_path);
    }
    result
}
