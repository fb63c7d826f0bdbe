//! Execution deadlines, optimistic and pessimistic.
//!
//! A timeout failure is a distinct outcome (`PolicyError::Timeout`), never
//! conflated with the operation's own failures, so an enclosing retry can
//! decide whether timeouts are retryable.
//!
//! # Modes
//!
//! - **Optimistic**: the operation runs on the caller's task with a child
//!   cancellation token that fires at the deadline. This relies on the
//!   operation yielding to the scheduler (or observing the token): an
//!   operation that blocks the thread without awaiting can overrun the
//!   deadline. Documented limitation, not a bug.
//! - **Pessimistic**: the operation is spawned onto its own task and raced
//!   against an independent timer. The caller gets `Timeout` at the deadline
//!   regardless of the operation's cooperation; the task is abandoned (its
//!   token is cancelled, but it is not forcibly killed).

use async_trait::async_trait;
use failgate_core::cancel::CancelToken;
use failgate_core::operation::Operation;
use failgate_core::outcome::{Outcome, PolicyError};
use failgate_core::policy::Policy;
use std::time::Duration;
use tokio::time::sleep;

/// How the deadline is enforced.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum TimeoutMode {
    /// Cooperative: deadline delivered through the cancellation token
    Optimistic,
    /// Enforced: operation raced on a separate task and abandoned on expiry
    Pessimistic,
}

/// Timeout configuration.
#[derive(Debug, Clone, Copy)]
pub struct TimeoutConfig {
    /// Maximum time the operation may run
    pub duration: Duration,
    /// Enforcement mode
    pub mode: TimeoutMode,
}

impl Default for TimeoutConfig {
    fn default() -> Self {
        Self {
            duration: Duration::from_secs(30),
            mode: TimeoutMode::Optimistic,
        }
    }
}

impl TimeoutConfig {
    /// Optimistic timeout with the given deadline.
    #[must_use]
    pub const fn optimistic(duration: Duration) -> Self {
        Self {
            duration,
            mode: TimeoutMode::Optimistic,
        }
    }

    /// Pessimistic timeout with the given deadline.
    #[must_use]
    pub const fn pessimistic(duration: Duration) -> Self {
        Self {
            duration,
            mode: TimeoutMode::Pessimistic,
        }
    }
}

/// Policy that bounds an operation's execution time.
#[derive(Debug, Clone, Copy)]
pub struct TimeoutPolicy {
    config: TimeoutConfig,
}

impl TimeoutPolicy {
    /// Create a timeout policy from its configuration.
    #[must_use]
    pub const fn new(config: TimeoutConfig) -> Self {
        Self { config }
    }
}

#[async_trait]
impl<T, E> Policy<T, E> for TimeoutPolicy
where
    T: Send + 'static,
    E: Send + 'static,
{
    async fn execute(&self, op: Operation<T, E>, cancel: CancelToken) -> Outcome<T, E> {
        if cancel.is_cancelled() {
            return Err(PolicyError::Cancelled);
        }

        let duration = self.config.duration;
        // Child token: fired at the deadline (or on caller cancellation)
        // without cancelling the caller's own token.
        let child = CancelToken::new();

        match self.config.mode {
            TimeoutMode::Optimistic => {
                tokio::select! {
                    () = cancel.cancelled() => {
                        child.cancel();
                        Err(PolicyError::Cancelled)
                    }
                    outcome = op.invoke(child.clone()) => outcome,
                    () = sleep(duration) => {
                        tracing::warn!(?duration, "operation exceeded deadline");
                        child.cancel();
                        Err(PolicyError::Timeout(duration))
                    }
                }
            }
            TimeoutMode::Pessimistic => {
                let task_token = child.clone();
                let mut handle = tokio::spawn(async move { op.invoke(task_token).await });

                tokio::select! {
                    () = cancel.cancelled() => {
                        // Signal the abandoned task; it keeps running until
                        // it observes the token.
                        child.cancel();
                        Err(PolicyError::Cancelled)
                    }
                    joined = &mut handle => match joined {
                        Ok(outcome) => outcome,
                        Err(e) if e.is_panic() => std::panic::resume_unwind(e.into_panic()),
                        Err(_) => Err(PolicyError::Cancelled),
                    },
                    () = sleep(duration) => {
                        tracing::warn!(?duration, "operation exceeded deadline, abandoning task");
                        child.cancel();
                        Err(PolicyError::Timeout(duration))
                    }
                }
            }
        }
    }
}
