use tokio::sync::watch;

/// Requests cancellation of a running batch.
///
/// Dropping the handle does not cancel anything.
#[derive(Debug)]
pub struct ShutdownHandle {
    tx: watch::Sender<bool>,
}

impl ShutdownHandle {
    pub fn trigger(&self) {
        // send_replace stores the flag even when no receiver is alive yet
        self.tx.send_replace(true);
    }
}

/// Cancellation signal observed by the batch workers.
///
/// Workers check it before taking the next feed; a pipeline already under way
/// runs to completion.
#[derive(Debug, Clone)]
pub struct Shutdown {
    rx: watch::Receiver<bool>,
}

impl Shutdown {
    /// A signal that is never triggered
    pub fn never() -> Self {
        let (_tx, rx) = watch::channel(false);
        Self { rx }
    }

    pub fn is_triggered(&self) -> bool {
        *self.rx.borrow()
    }
}

/// Create a linked cancellation handle and signal.
pub fn shutdown_channel() -> (ShutdownHandle, Shutdown) {
    let (tx, rx) = watch::channel(false);
    (ShutdownHandle { tx }, Shutdown { rx })
}
