//! The `Policy` trait and the composition primitives.
//!
//! A policy is middleware around an [`Operation`]: it may invoke the
//! operation zero, one, or many times and resolves to exactly one
//! [`Outcome`]. Composition nests policies outermost-first; the composed
//! value is itself a policy with the same single `execute` entry point, so
//! the type signature does not grow with chain length.
//!
//! Composition order is observable behavior, not an implementation detail:
//! a retry wrapping a circuit breaker retries through a possibly-open
//! circuit, while a breaker wrapping a retry counts the whole retry
//! sequence as one outcome.

use crate::cancel::CancelToken;
use crate::operation::Operation;
use crate::outcome::Outcome;
use async_trait::async_trait;
use std::sync::Arc;

/// Middleware around an operation with a single `execute` entry point.
#[async_trait]
pub trait Policy<T, E>: Send + Sync {
    /// Execute the operation under this policy.
    ///
    /// The caller's cancellation token must be propagated to the operation
    /// and to any suspension point this policy introduces.
    async fn execute(&self, op: Operation<T, E>, cancel: CancelToken) -> Outcome<T, E>;
}

/// A shareable, type-erased policy.
pub type SharedPolicy<T, E> = Arc<dyn Policy<T, E>>;

/// Compose two policies: `outer` intercepts `inner`'s execution of the
/// operation.
///
/// Associative and order-sensitive. `wrap(a, wrap(b, c))` and
/// `wrap(wrap(a, b), c)` both execute a → b → c → operation.
#[must_use]
pub fn wrap<T, E>(outer: SharedPolicy<T, E>, inner: SharedPolicy<T, E>) -> SharedPolicy<T, E>
where
    T: Send + 'static,
    E: Send + 'static,
{
    Arc::new(Wrapped { outer, inner })
}

struct Wrapped<T, E> {
    outer: SharedPolicy<T, E>,
    inner: SharedPolicy<T, E>,
}

#[async_trait]
impl<T, E> Policy<T, E> for Wrapped<T, E>
where
    T: Send + 'static,
    E: Send + 'static,
{
    async fn execute(&self, op: Operation<T, E>, cancel: CancelToken) -> Outcome<T, E> {
        let inner = Arc::clone(&self.inner);
        // Present the inner policy's execution to the outer policy as an
        // ordinary operation, so the outer layer can re-invoke it at will.
        let inner_op = Operation::new(move |token| {
            let inner = Arc::clone(&inner);
            let op = op.clone();
            async move { inner.execute(op, token).await }
        });
        self.outer.execute(inner_op, cancel).await
    }
}

/// Pass-through policy: executes the operation with no interception.
///
/// The identity element of composition; an empty [`PolicyChain`] builds one.
#[derive(Debug, Default, Clone, Copy)]
pub struct Passthrough;

#[async_trait]
impl<T, E> Policy<T, E> for Passthrough
where
    T: Send + 'static,
    E: Send + 'static,
{
    async fn execute(&self, op: Operation<T, E>, cancel: CancelToken) -> Outcome<T, E> {
        op.invoke(cancel).await
    }
}

/// Explicit middleware-chain builder.
///
/// Layers are pushed outermost-first and folded into one [`SharedPolicy`].
///
/// # Example
///
/// ```ignore
/// let policy = PolicyChain::new()
///     .layer(retry)      // outermost: sees breaker rejections
///     .layer(breaker)    // inner: sees raw operation outcomes
///     .build();
/// ```
pub struct PolicyChain<T, E> {
    layers: Vec<SharedPolicy<T, E>>,
}

impl<T, E> PolicyChain<T, E>
where
    T: Send + 'static,
    E: Send + 'static,
{
    /// Create an empty chain.
    #[must_use]
    pub fn new() -> Self {
        Self { layers: Vec::new() }
    }

    /// Push the next layer. The first layer pushed is the outermost.
    #[must_use]
    pub fn layer(mut self, policy: SharedPolicy<T, E>) -> Self {
        self.layers.push(policy);
        self
    }

    /// Fold the layers into a single policy.
    ///
    /// An empty chain builds a [`Passthrough`].
    #[must_use]
    pub fn build(self) -> SharedPolicy<T, E> {
        let mut layers = self.layers;
        let Some(innermost) = layers.pop() else {
            return Arc::new(Passthrough);
        };
        layers
            .into_iter()
            .rev()
            .fold(innermost, |inner, outer| wrap(outer, inner))
    }
}

impl<T, E> Default for PolicyChain<T, E>
where
    T: Send + 'static,
    E: Send + 'static,
{
    fn default() -> Self {
        Self::new()
    }
}
