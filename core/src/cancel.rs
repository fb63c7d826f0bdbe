//! Cancellation token propagated through policy layers.
//!
//! Every policy forwards the caller's token down to the wrapped operation,
//! and every suspension point in the engine (retry delay, bulkhead queue
//! wait, timeout race) races against it so that cancellation unblocks
//! waiters instead of leaving them parked.

use tokio::sync::watch;

/// Level-triggered cancellation signal.
///
/// Cloning is cheap; all clones observe the same flag. Once cancelled, a
/// token stays cancelled.
///
/// # Example
///
/// ```
/// use failgate_core::cancel::CancelToken;
///
/// # #[tokio::main(flavor = "current_thread")]
/// # async fn main() {
/// let token = CancelToken::new();
/// assert!(!token.is_cancelled());
///
/// token.cancel();
/// assert!(token.is_cancelled());
/// token.cancelled().await; // resolves immediately
/// # }
/// ```
#[derive(Debug, Clone)]
pub struct CancelToken {
    tx: std::sync::Arc<watch::Sender<bool>>,
    rx: watch::Receiver<bool>,
}

impl CancelToken {
    /// Create a new, un-cancelled token.
    #[must_use]
    pub fn new() -> Self {
        let (tx, rx) = watch::channel(false);
        Self {
            tx: std::sync::Arc::new(tx),
            rx,
        }
    }

    /// Fire the signal. Idempotent.
    pub fn cancel(&self) {
        // Receivers held by clones of this token, so send cannot fail while
        // any clone is alive; ignore the result for the degenerate case.
        let _ = self.tx.send(true);
    }

    /// Whether the signal has fired.
    #[must_use]
    pub fn is_cancelled(&self) -> bool {
        *self.rx.borrow()
    }

    /// Resolve once the signal fires. Resolves immediately if it already has.
    pub async fn cancelled(&self) {
        let mut rx = self.rx.clone();
        // The sender lives in self, so wait_for cannot observe a closed
        // channel while we hold &self.
        let _ = rx.wait_for(|cancelled| *cancelled).await;
    }
}

impl Default for CancelToken {
    fn default() -> Self {
        Self::new()
    }
}
