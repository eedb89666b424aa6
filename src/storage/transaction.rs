use futures::future::BoxFuture;
use sqlx::Sqlite;

use super::schema::Database;
use super::types::StorageError;

/// An open database transaction.
///
/// Every feed and post operation is a method on this type, so storage can
/// only be touched from inside [`Database::with_transaction`]. The handle is
/// lent to the work closure and never escapes it.
pub struct Transaction {
    pub(crate) inner: sqlx::Transaction<'static, Sqlite>,
}

impl Database {
    /// Run `work` inside a single transaction.
    ///
    /// Commits when `work` resolves to `Ok`, rolls back when it resolves to
    /// `Err`. If the future is dropped before resolving, sqlx rolls the
    /// transaction back when the connection returns to the pool.
    ///
    /// ```ignore
    /// let posts = db
    ///     .with_transaction(|tx| Box::pin(async move { tx.load_posts_by_feed(feed_id).await }))
    ///     .await?;
    /// ```
    pub async fn with_transaction<T, E, F>(&self, work: F) -> Result<T, E>
    where
        F: for<'t> FnOnce(&'t mut Transaction) -> BoxFuture<'t, Result<T, E>> + Send,
        E: From<StorageError> + Send,
        T: Send,
    {
        let inner = self.pool.begin().await.map_err(StorageError::from_sqlx)?;
        let mut tx = Transaction { inner };

        match work(&mut tx).await {
            Ok(value) => {
                tx.inner.commit().await.map_err(StorageError::from_sqlx)?;
                Ok(value)
            }
            Err(e) => {
                if let Err(rollback_err) = tx.inner.rollback().await {
                    tracing::warn!(error = %rollback_err, "Transaction rollback failed");
                }
                Err(e)
            }
        }
    }
}
