//! Cancellation of in-flight lease operations.

use std::sync::Arc;
use tokio::sync::watch;

/// Cancels the operations observing the paired [`CancellationSignal`].
#[derive(Debug, Clone)]
pub struct CancellationHandle {
    tx: Arc<watch::Sender<Option<String>>>,
}

impl CancellationHandle {
    /// Cancels with `reason`. Only the first cancellation is kept.
    pub fn cancel(&self, reason: impl Into<String>) {
        let reason = reason.into();
        self.tx.send_if_modified(|current| {
            if current.is_some() {
                return false;
            }
            *current = Some(reason);
            true
        });
    }

    pub fn is_cancelled(&self) -> bool {
        self.tx.borrow().is_some()
    }
}

/// Observed by an operation that may be cancelled while it waits.
///
/// # Examples
///
/// ```rust
/// use rangelease_engine::cancel::cancellation_pair;
///
/// # tokio_test::block_on(async {
/// let (handle, mut signal) = cancellation_pair();
/// handle.cancel("client went away");
/// assert_eq!(signal.cancelled().await, "client went away");
/// # });
/// ```
#[derive(Debug, Clone)]
pub struct CancellationSignal {
    rx: watch::Receiver<Option<String>>,
}

impl CancellationSignal {
    /// A signal that is never cancelled.
    pub fn never() -> Self {
        let (_tx, rx) = watch::channel(None);
        Self { rx }
    }

    pub fn is_cancelled(&self) -> bool {
        self.rx.borrow().is_some()
    }

    pub fn reason(&self) -> Option<String> {
        self.rx.borrow().clone()
    }

    /// Resolves with the cancellation reason once cancelled. Never resolves
    /// if every handle is dropped without cancelling.
    pub async fn cancelled(&mut self) -> String {
        loop {
            if let Some(reason) = self.rx.borrow_and_update().clone() {
                return reason;
            }
            if self.rx.changed().await.is_err() {
                return std::future::pending().await;
            }
        }
    }
}

pub fn cancellation_pair() -> (CancellationHandle, CancellationSignal) {
    let (tx, rx) = watch::channel(None);
    (
        CancellationHandle { tx: Arc::new(tx) },
        CancellationSignal { rx },
    )
}
