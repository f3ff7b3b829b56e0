//! Request cancellation.
//!
//! A [`CancellationHandle`] is held by whoever may abandon a request (an HTTP
//! handler whose client went away, a CLI on Ctrl-C). The matching
//! [`CancellationSignal`] travels with the request into the gateway, which
//! races it against every evaluator and backend call.

use tokio::sync::watch;

/// Owner side: trips the signal.
#[derive(Debug)]
pub struct CancellationHandle {
    sender: watch::Sender<bool>,
}

impl CancellationHandle {
    /// Create a handle and its signal.
    pub fn new() -> (Self, CancellationSignal) {
        let (sender, receiver) = watch::channel(false);
        (Self { sender }, CancellationSignal { receiver })
    }

    /// Another signal observing this handle.
    pub fn signal(&self) -> CancellationSignal {
        CancellationSignal {
            receiver: self.sender.subscribe(),
        }
    }

    /// Cancel every request holding a signal from this handle. Idempotent.
    pub fn cancel(&self) {
        self.sender.send_replace(true);
    }
}

/// Request side: observed by the gateway.
#[derive(Debug, Clone)]
pub struct CancellationSignal {
    receiver: watch::Receiver<bool>,
}

impl CancellationSignal {
    pub fn is_cancelled(&self) -> bool {
        *self.receiver.borrow()
    }

    /// Resolves once cancelled.
    ///
    /// If the handle is dropped without cancelling, this never resolves.
    pub async fn cancelled(&self) {
        let mut receiver = self.receiver.clone();
        if receiver.wait_for(|cancelled| *cancelled).await.is_err() {
            futures::future::pending::<()>().await;
        }
    }
}
