//! Feed synchronization: reconciling posts, running feeds concurrently and
//! registering new feeds.
//!
//! [`Synchronizer::synchronize_all`] runs one pipeline per feed (fetch,
//! extract, merge, store) on a bounded pool and returns a [`SyncReport`]
//! in input order. [`merge`] is the pure reconciliation step.

mod orchestrator;
mod outcome;
mod pipeline;
mod reconcile;
mod register;
mod shutdown;

pub use orchestrator::{SyncOptions, Synchronizer};
pub use outcome::{ErrorKind, FeedOutcome, SyncError, SyncReport};
pub use reconcile::{merge, Merge};
pub use register::{RegisterError, ValidationError};
pub use shutdown::{shutdown_channel, Shutdown, ShutdownHandle};
