//! Instrumented and scripted operations for policy tests.
//!
//! All helpers use `String` as the domain error type and share their
//! invocation counter with the test through an `Arc<AtomicUsize>`.

use failgate_core::operation::Operation;
use failgate_core::outcome::PolicyError;
use std::sync::Arc;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::time::Duration;
use tokio::sync::watch;

/// Operation that always succeeds with a clone of `value`, counting
/// invocations.
pub fn counting_ok<T>(value: T) -> (Operation<T, String>, Arc<AtomicUsize>)
where
    T: Clone + Send + Sync + 'static,
{
    let counter = Arc::new(AtomicUsize::new(0));
    let c = Arc::clone(&counter);
    let op = Operation::from_result_fn(move |_cancel| {
        let c = Arc::clone(&c);
        let value = value.clone();
        async move {
            c.fetch_add(1, Ordering::SeqCst);
            Ok(value)
        }
    });
    (op, counter)
}

/// Operation that always fails with `message`, counting invocations.
pub fn counting_err<T>(message: &str) -> (Operation<T, String>, Arc<AtomicUsize>)
where
    T: Send + 'static,
{
    let counter = Arc::new(AtomicUsize::new(0));
    let c = Arc::clone(&counter);
    let message = message.to_string();
    let op = Operation::from_result_fn(move |_cancel| {
        let c = Arc::clone(&c);
        let message = message.clone();
        async move {
            c.fetch_add(1, Ordering::SeqCst);
            Err(message)
        }
    });
    (op, counter)
}

/// Operation that fails its first `fail_first` invocations and then
/// succeeds with `value`.
pub fn flaky<T>(fail_first: usize, value: T) -> (Operation<T, String>, Arc<AtomicUsize>)
where
    T: Clone + Send + Sync + 'static,
{
    let counter = Arc::new(AtomicUsize::new(0));
    let c = Arc::clone(&counter);
    let op = Operation::from_result_fn(move |_cancel| {
        let c = Arc::clone(&c);
        let value = value.clone();
        async move {
            let attempt = c.fetch_add(1, Ordering::SeqCst);
            if attempt < fail_first {
                Err(format!("transient failure on attempt {attempt}"))
            } else {
                Ok(value)
            }
        }
    });
    (op, counter)
}

/// Operation that sleeps for `duration` without observing the cancellation
/// token, then succeeds with `value`.
///
/// Models an uncooperative operation for pessimistic-timeout tests.
pub fn sleeping<T>(duration: Duration, value: T) -> Operation<T, String>
where
    T: Clone + Send + Sync + 'static,
{
    Operation::from_result_fn(move |_cancel| {
        let value = value.clone();
        async move {
            tokio::time::sleep(duration).await;
            Ok(value)
        }
    })
}

/// Operation that sleeps for `duration` but returns `Cancelled` promptly
/// when the token fires.
pub fn cooperative<T>(duration: Duration, value: T) -> Operation<T, String>
where
    T: Clone + Send + Sync + 'static,
{
    Operation::new(move |cancel| {
        let value = value.clone();
        async move {
            tokio::select! {
                () = cancel.cancelled() => Err(PolicyError::Cancelled),
                () = tokio::time::sleep(duration) => Ok(value),
            }
        }
    })
}

/// Handle that releases every invocation of a [`gated`] operation.
#[derive(Debug, Clone)]
pub struct Gate {
    tx: Arc<watch::Sender<bool>>,
}

impl Gate {
    /// Release all current and future invocations.
    pub fn open(&self) {
        let _ = self.tx.send(true);
    }
}

/// Operation that blocks until its [`Gate`] opens, then succeeds with
/// `value`.
///
/// Useful for holding bulkhead slots at a deterministic point.
pub fn gated<T>(value: T) -> (Operation<T, String>, Gate)
where
    T: Clone + Send + Sync + 'static,
{
    let (tx, rx) = watch::channel(false);
    let op = Operation::from_result_fn(move |_cancel| {
        let mut rx = rx.clone();
        let value = value.clone();
        async move {
            // The gate lives as long as the test; a dropped sender just
            // releases the wait.
            let _ = rx.wait_for(|open| *open).await;
            Ok(value)
        }
    });
    (op, Gate { tx: Arc::new(tx) })
}
