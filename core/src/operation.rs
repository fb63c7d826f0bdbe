//! The unit-of-work abstraction executed under policy control.
//!
//! An [`Operation`] is a deferred computation that a policy may invoke zero
//! times (short-circuited), once, or several times (retried). It is therefore
//! a cloneable `Fn` closure rather than a one-shot future: each invocation
//! produces a fresh future.

use crate::cancel::CancelToken;
use crate::outcome::{Outcome, PolicyError};
use futures::future::BoxFuture;
use std::future::Future;
use std::sync::Arc;

/// A re-invocable asynchronous unit of work.
///
/// The closure receives the cancellation token in effect for this
/// invocation; cooperative operations should observe it and return promptly
/// when it fires.
///
/// # Example
///
/// ```
/// use failgate_core::prelude::*;
///
/// # #[tokio::main(flavor = "current_thread")]
/// # async fn main() {
/// let op = Operation::from_result_fn(|_cancel| async { Ok::<_, String>(42) });
/// let outcome = op.invoke(CancelToken::new()).await;
/// assert_eq!(outcome, Ok(42));
/// # }
/// ```
pub struct Operation<T, E> {
    run: Arc<dyn Fn(CancelToken) -> BoxFuture<'static, Outcome<T, E>> + Send + Sync>,
}

impl<T, E> Clone for Operation<T, E> {
    fn clone(&self) -> Self {
        Self {
            run: Arc::clone(&self.run),
        }
    }
}

impl<T, E> std::fmt::Debug for Operation<T, E> {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Operation").finish_non_exhaustive()
    }
}

impl<T, E> Operation<T, E>
where
    T: Send + 'static,
    E: Send + 'static,
{
    /// Create an operation from a closure yielding a full [`Outcome`].
    ///
    /// Use this when the closure needs to surface pre-classified failures
    /// (for instance `PolicyError::Cancelled` after observing the token).
    pub fn new<F, Fut>(f: F) -> Self
    where
        F: Fn(CancelToken) -> Fut + Send + Sync + 'static,
        Fut: Future<Output = Outcome<T, E>> + Send + 'static,
    {
        Self {
            run: Arc::new(move |cancel| Box::pin(f(cancel))),
        }
    }

    /// Create an operation from a closure yielding a plain `Result`.
    ///
    /// A domain `Err(e)` is classified as `PolicyError::Operation(e)`.
    pub fn from_result_fn<F, Fut>(f: F) -> Self
    where
        F: Fn(CancelToken) -> Fut + Send + Sync + 'static,
        Fut: Future<Output = Result<T, E>> + Send + 'static,
    {
        Self::new(move |cancel| {
            let fut = f(cancel);
            async move { fut.await.map_err(PolicyError::Operation) }
        })
    }

    /// Invoke the operation once under the given cancellation token.
    ///
    /// An already-fired token resolves to `Cancelled` without running the
    /// closure at all.
    ///
    /// # Errors
    ///
    /// Returns whatever classified failure the operation produces, or
    /// `PolicyError::Cancelled` when the token has already fired.
    pub async fn invoke(&self, cancel: CancelToken) -> Outcome<T, E> {
        if cancel.is_cancelled() {
            return Err(PolicyError::Cancelled);
        }
        (self.run)(cancel).await
    }
}
