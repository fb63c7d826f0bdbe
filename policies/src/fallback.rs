//! Safe-result substitution for terminal failures.
//!
//! A fallback policy invokes the operation once; when the outcome matches
//! its predicate, it fires the `on_fallback` notification and substitutes
//! the fallback action's value as a success. A fallback action that itself
//! fails is a design error and surfaces as `FallbackExhausted` — never
//! swallowed. Non-matching outcomes pass through unchanged, as does
//! cancellation.

use async_trait::async_trait;
use failgate_core::cancel::CancelToken;
use failgate_core::operation::Operation;
use failgate_core::outcome::{Outcome, OutcomePredicate, PolicyError, all_failures};
use failgate_core::policy::Policy;
use std::sync::Arc;

type FallbackAction<T, E> = Arc<dyn Fn(&Outcome<T, E>) -> Result<T, E> + Send + Sync>;
type FallbackHook<T, E> = Arc<dyn Fn(&Outcome<T, E>) + Send + Sync>;

/// Policy that substitutes a safe result when the operation ultimately
/// fails.
pub struct FallbackPolicy<T, E> {
    should_fallback: OutcomePredicate<T, E>,
    fallback_action: FallbackAction<T, E>,
    on_fallback: Option<FallbackHook<T, E>>,
}

impl<T, E> FallbackPolicy<T, E> {
    /// Create a fallback policy from its substitution action.
    ///
    /// By default every failure except cancellation triggers the fallback;
    /// narrow this with [`handling`](Self::handling).
    pub fn new<F>(fallback_action: F) -> Self
    where
        F: Fn(&Outcome<T, E>) -> Result<T, E> + Send + Sync + 'static,
    {
        Self {
            should_fallback: all_failures(),
            fallback_action: Arc::new(fallback_action),
            on_fallback: None,
        }
    }

    /// Replace the predicate deciding which outcomes are substituted.
    #[must_use]
    pub fn handling(mut self, predicate: OutcomePredicate<T, E>) -> Self {
        self.should_fallback = predicate;
        self
    }

    /// Attach a notification fired once per substitution, before the
    /// fallback action runs.
    #[must_use]
    pub fn on_fallback<F>(mut self, hook: F) -> Self
    where
        F: Fn(&Outcome<T, E>) + Send + Sync + 'static,
    {
        self.on_fallback = Some(Arc::new(hook));
        self
    }
}

#[async_trait]
impl<T, E> Policy<T, E> for FallbackPolicy<T, E>
where
    T: Send + 'static,
    E: Send + 'static,
{
    async fn execute(&self, op: Operation<T, E>, cancel: CancelToken) -> Outcome<T, E> {
        let outcome = op.invoke(cancel).await;

        if matches!(outcome, Err(ref e) if e.is_cancelled()) {
            return outcome;
        }

        if !(self.should_fallback)(&outcome) {
            return outcome;
        }

        tracing::info!("substituting fallback result");
        if let Some(hook) = &self.on_fallback {
            hook(&outcome);
        }

        match (self.fallback_action)(&outcome) {
            Ok(value) => Ok(value),
            Err(e) => {
                tracing::error!("fallback action itself failed");
                Err(PolicyError::FallbackExhausted(e))
            }
        }
    }
}
