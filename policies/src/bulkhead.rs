//! Concurrency limiting with a bounded queue.
//!
//! A bulkhead caps in-flight executions at `max_concurrency`. When all slots
//! are busy, up to `max_queue_length` callers wait for a slot; any caller
//! beyond that is rejected immediately with `BulkheadRejected` — never
//! unbounded blocking. Queued waiters are admitted as slots free (FIFO via
//! the semaphore's fairness, which is a courtesy, not a contract) and
//! unblock with `Cancelled` when the caller's token fires.

use async_trait::async_trait;
use failgate_core::cancel::CancelToken;
use failgate_core::operation::Operation;
use failgate_core::outcome::{Outcome, PolicyError};
use failgate_core::policy::Policy;
use std::sync::atomic::{AtomicUsize, Ordering};
use tokio::sync::Semaphore;

/// Bulkhead configuration.
#[derive(Debug, Clone, Copy)]
pub struct BulkheadConfig {
    /// Maximum concurrent executions
    pub max_concurrency: usize,
    /// Maximum callers waiting for a slot
    pub max_queue_length: usize,
}

impl Default for BulkheadConfig {
    fn default() -> Self {
        Self {
            max_concurrency: 10,
            max_queue_length: 10,
        }
    }
}

/// Policy that caps concurrent executions and queued waiters.
///
/// Both counters are updated atomically; no lock is held around the
/// operation's execution.
pub struct Bulkhead {
    config: BulkheadConfig,
    slots: Semaphore,
    queued: AtomicUsize,
}

impl Bulkhead {
    /// Create a bulkhead from its configuration.
    #[must_use]
    pub fn new(config: BulkheadConfig) -> Self {
        Self {
            slots: Semaphore::new(config.max_concurrency),
            queued: AtomicUsize::new(0),
            config,
        }
    }

    /// Execution slots currently free.
    #[must_use]
    pub fn available_permits(&self) -> usize {
        self.slots.available_permits()
    }

    /// Callers currently waiting for a slot.
    #[must_use]
    pub fn queued(&self) -> usize {
        self.queued.load(Ordering::SeqCst)
    }

    /// Configured maximum concurrency.
    #[must_use]
    pub const fn max_concurrency(&self) -> usize {
        self.config.max_concurrency
    }
}

#[async_trait]
impl<T, E> Policy<T, E> for Bulkhead
where
    T: Send + 'static,
    E: Send + 'static,
{
    async fn execute(&self, op: Operation<T, E>, cancel: CancelToken) -> Outcome<T, E> {
        // Fast path: a free slot, no queueing.
        let permit = match self.slots.try_acquire() {
            Ok(permit) => permit,
            Err(_) => {
                // Saturated; join the queue only if it has room. The bound
                // is enforced by the atomic update itself, so concurrent
                // callers cannot overshoot it.
                let max_queue = self.config.max_queue_length;
                if self
                    .queued
                    .fetch_update(Ordering::SeqCst, Ordering::SeqCst, |queued| {
                        (queued < max_queue).then_some(queued + 1)
                    })
                    .is_err()
                {
                    tracing::warn!(
                        max_concurrency = self.config.max_concurrency,
                        max_queue,
                        "bulkhead saturated, rejecting call"
                    );
                    return Err(PolicyError::BulkheadRejected);
                }

                let acquired = tokio::select! {
                    () = cancel.cancelled() => None,
                    permit = self.slots.acquire() => Some(permit),
                };
                self.queued.fetch_sub(1, Ordering::SeqCst);

                match acquired {
                    Some(Ok(permit)) => permit,
                    // The semaphore is owned by this bulkhead and never
                    // closed.
                    Some(Err(_)) => return Err(PolicyError::BulkheadRejected),
                    None => return Err(PolicyError::Cancelled),
                }
            }
        };

        let outcome = op.invoke(cancel).await;
        drop(permit);
        outcome
    }
}

#[cfg(test)]
#[allow(clippy::unwrap_used, clippy::expect_used)]
mod tests {
    use super::*;
    use failgate_testing::operations::{counting_ok, gated};
    use std::sync::Arc;
    use std::time::Duration;

    fn bulkhead(max_concurrency: usize, max_queue_length: usize) -> Arc<Bulkhead> {
        Arc::new(Bulkhead::new(BulkheadConfig {
            max_concurrency,
            max_queue_length,
        }))
    }

    #[tokio::test]
    async fn executes_within_capacity() {
        let bulkhead = bulkhead(3, 0);
        let (op, _) = counting_ok(7u32);

        let outcome = bulkhead.execute(op, CancelToken::new()).await;
        assert_eq!(outcome, Ok(7));
        assert_eq!(bulkhead.available_permits(), 3);
    }

    #[tokio::test]
    async fn tenth_caller_is_rejected_immediately() {
        let bulkhead = bulkhead(3, 6);
        let (op, gate) = gated(1u32);

        // 3 executing + 6 queued.
        let mut handles = Vec::new();
        for _ in 0..9 {
            let bulkhead = Arc::clone(&bulkhead);
            let op = op.clone();
            handles.push(tokio::spawn(async move {
                bulkhead.execute(op, CancelToken::new()).await
            }));
        }

        // Let the tasks occupy the slots and the queue.
        tokio::time::timeout(Duration::from_secs(5), async {
            while bulkhead.available_permits() > 0 || bulkhead.queued() < 6 {
                tokio::time::sleep(Duration::from_millis(5)).await;
            }
        })
        .await
        .expect("nine callers should saturate slots and queue");

        // The 10th caller fails fast, without waiting.
        let (extra, invocations) = counting_ok(2u32);
        let started = std::time::Instant::now();
        let outcome = bulkhead.execute(extra, CancelToken::new()).await;

        assert_eq!(outcome, Err(PolicyError::BulkheadRejected));
        assert!(started.elapsed() < Duration::from_secs(1));
        assert_eq!(invocations.load(Ordering::SeqCst), 0);

        // Release the gate; everyone queued eventually runs.
        gate.open();
        for handle in handles {
            assert_eq!(handle.await.unwrap(), Ok(1));
        }
        assert_eq!(bulkhead.queued(), 0);
        assert_eq!(bulkhead.available_permits(), 3);
    }

    #[tokio::test]
    async fn concurrency_never_exceeds_limit() {
        let bulkhead = bulkhead(2, 10);
        let in_flight = Arc::new(AtomicUsize::new(0));
        let peak = Arc::new(AtomicUsize::new(0));

        let mut handles = Vec::new();
        for _ in 0..8 {
            let bulkhead = Arc::clone(&bulkhead);
            let in_flight = Arc::clone(&in_flight);
            let peak = Arc::clone(&peak);

            handles.push(tokio::spawn(async move {
                let op = Operation::from_result_fn(move |_cancel| {
                    let in_flight = Arc::clone(&in_flight);
                    let peak = Arc::clone(&peak);
                    async move {
                        let current = in_flight.fetch_add(1, Ordering::SeqCst) + 1;
                        peak.fetch_max(current, Ordering::SeqCst);
                        tokio::time::sleep(Duration::from_millis(30)).await;
                        in_flight.fetch_sub(1, Ordering::SeqCst);
                        Ok::<_, String>(())
                    }
                });
                bulkhead.execute(op, CancelToken::new()).await
            }));
        }

        for handle in handles {
            handle.await.unwrap().unwrap();
        }

        assert!(peak.load(Ordering::SeqCst) <= 2);
    }

    #[tokio::test]
    async fn queued_waiter_unblocks_on_cancellation() {
        let bulkhead = bulkhead(1, 5);
        let (op, gate) = gated(1u32);

        // Occupy the only slot.
        let holder = {
            let bulkhead = Arc::clone(&bulkhead);
            let op = op.clone();
            tokio::spawn(async move { bulkhead.execute(op, CancelToken::new()).await })
        };
        tokio::time::timeout(Duration::from_secs(5), async {
            while bulkhead.available_permits() > 0 {
                tokio::time::sleep(Duration::from_millis(5)).await;
            }
        })
        .await
        .expect("holder should occupy the slot");

        let token = CancelToken::new();
        let canceller = token.clone();
        tokio::spawn(async move {
            tokio::time::sleep(Duration::from_millis(30)).await;
            canceller.cancel();
        });

        let (queued_op, invocations) = counting_ok(2u32);
        let outcome = bulkhead.execute(queued_op, token).await;

        assert_eq!(outcome, Err(PolicyError::Cancelled));
        assert_eq!(invocations.load(Ordering::SeqCst), 0);
        assert_eq!(bulkhead.queued(), 0);

        gate.open();
        assert_eq!(holder.await.unwrap(), Ok(1));
    }

    #[tokio::test]
    async fn zero_queue_rejects_when_saturated() {
        let bulkhead = bulkhead(1, 0);
        let (op, gate) = gated(1u32);

        let holder = {
            let bulkhead = Arc::clone(&bulkhead);
            let op = op.clone();
            tokio::spawn(async move { bulkhead.execute(op, CancelToken::new()).await })
        };
        tokio::time::timeout(Duration::from_secs(5), async {
            while bulkhead.available_permits() > 0 {
                tokio::time::sleep(Duration::from_millis(5)).await;
            }
        })
        .await
        .expect("holder should occupy the slot");

        let (extra, _) = counting_ok(2u32);
        let outcome = bulkhead.execute(extra, CancelToken::new()).await;
        assert_eq!(outcome, Err(PolicyError::BulkheadRejected));

        gate.open();
        assert_eq!(holder.await.unwrap(), Ok(1));
    }
}
