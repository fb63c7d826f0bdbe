//! Outcome type and the classified failure taxonomy.
//!
//! Every policy layer resolves to exactly one [`Outcome`]: a success value or
//! one [`PolicyError`] variant. Layers never reclassify one failure kind as
//! another, so an outer policy can always tell a timeout from a domain
//! failure from a short-circuited call.

use std::sync::Arc;
use std::time::Duration;
use thiserror::Error;

/// Result of executing an operation under policy control.
///
/// `T` is the operation's success value, `E` its domain error type.
pub type Outcome<T, E> = Result<T, PolicyError<E>>;

/// Classified failure causes.
///
/// `Operation` carries the wrapped call's own failure; every other variant
/// identifies the policy layer that produced it.
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum PolicyError<E> {
    /// The wrapped operation's own domain failure
    #[error("operation failed: {0}")]
    Operation(E),

    /// Circuit breaker short-circuited the call; the operation was not invoked
    #[error("circuit breaker is open")]
    CircuitOpen,

    /// The operation exceeded its deadline
    #[error("operation timed out after {0:?}")]
    Timeout(Duration),

    /// Bulkhead concurrency and queue limits are both saturated
    #[error("bulkhead rejected the call")]
    BulkheadRejected,

    /// The caller's cancellation token fired
    #[error("operation was cancelled")]
    Cancelled,

    /// The fallback action itself failed; fatal and never swallowed
    #[error("fallback action failed: {0}")]
    FallbackExhausted(E),
}

impl<E> PolicyError<E> {
    /// Whether this failure came from the caller's cancellation token.
    ///
    /// Cancelled outcomes are exempt from retry and from circuit breaker
    /// failure accounting.
    #[must_use]
    pub const fn is_cancelled(&self) -> bool {
        matches!(self, Self::Cancelled)
    }

    /// Whether this is the wrapped operation's own failure.
    #[must_use]
    pub const fn is_operation(&self) -> bool {
        matches!(self, Self::Operation(_))
    }

    /// Whether this failure was produced by a timeout layer.
    #[must_use]
    pub const fn is_timeout(&self) -> bool {
        matches!(self, Self::Timeout(_))
    }
}

/// Shared predicate over an outcome, used to classify results.
///
/// Mirrors the caller-supplied "handle" predicates of the policy configs:
/// retry uses one to decide retry-worthiness, the circuit breaker to decide
/// what counts as a failure, fallback to decide what to substitute.
pub type OutcomePredicate<T, E> = Arc<dyn Fn(&Outcome<T, E>) -> bool + Send + Sync>;

/// Predicate matching only the operation's own failures.
///
/// Timeouts, rejections and short-circuits pass through unmatched.
#[must_use]
pub fn operation_failures<T, E>() -> OutcomePredicate<T, E> {
    Arc::new(|outcome| matches!(outcome, Err(PolicyError::Operation(_))))
}

/// Predicate matching operation failures and timeouts.
///
/// The usual choice for retry layers wrapping a timeout layer.
#[must_use]
pub fn failures_and_timeouts<T, E>() -> OutcomePredicate<T, E> {
    Arc::new(|outcome| {
        matches!(
            outcome,
            Err(PolicyError::Operation(_) | PolicyError::Timeout(_))
        )
    })
}

/// Predicate matching every failure except cancellation.
///
/// Cancellation is excluded so that a fired token always propagates
/// unchanged to the caller.
#[must_use]
pub fn all_failures<T, E>() -> OutcomePredicate<T, E> {
    Arc::new(|outcome| matches!(outcome, Err(e) if !e.is_cancelled()))
}

#[cfg(test)]
#[allow(clippy::unwrap_used, clippy::expect_used)]
mod tests {
    use super::*;

    #[test]
    fn classification_helpers() {
        let err: PolicyError<String> = PolicyError::Cancelled;
        assert!(err.is_cancelled());
        assert!(!err.is_operation());

        let err: PolicyError<String> = PolicyError::Timeout(Duration::from_secs(1));
        assert!(err.is_timeout());
        assert!(!err.is_cancelled());

        let err = PolicyError::Operation("boom".to_string());
        assert!(err.is_operation());
    }

    #[test]
    fn operation_failures_ignores_policy_failures() {
        let pred = operation_failures::<u32, String>();
        assert!(pred(&Err(PolicyError::Operation("boom".to_string()))));
        assert!(!pred(&Err(PolicyError::Timeout(Duration::from_secs(1)))));
        assert!(!pred(&Err(PolicyError::CircuitOpen)));
        assert!(!pred(&Ok(7)));
    }

    #[test]
    fn failures_and_timeouts_matches_both() {
        let pred = failures_and_timeouts::<u32, String>();
        assert!(pred(&Err(PolicyError::Operation("boom".to_string()))));
        assert!(pred(&Err(PolicyError::Timeout(Duration::from_secs(1)))));
        assert!(!pred(&Err(PolicyError::BulkheadRejected)));
    }

    #[test]
    fn all_failures_excludes_cancellation() {
        let pred = all_failures::<u32, String>();
        assert!(pred(&Err(PolicyError::CircuitOpen)));
        assert!(pred(&Err(PolicyError::BulkheadRejected)));
        assert!(!pred(&Err(PolicyError::Cancelled)));
        assert!(!pred(&Ok(7)));
    }

    #[test]
    fn error_messages_are_stable() {
        let err = PolicyError::Operation("503".to_string());
        assert_eq!(err.to_string(), "operation failed: 503");

        let err: PolicyError<String> = PolicyError::CircuitOpen;
        assert_eq!(err.to_string(), "circuit breaker is open");
    }
}
