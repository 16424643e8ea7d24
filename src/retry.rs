//! Retry classification for failed fulfillment calls.
//!
//! The policy lives at the backend-adapter layer: the drain loop only ever
//! sees success or final failure, never an individual retryable attempt.

use std::time::Duration;

use crate::backend::BackendError;

/// What the policy knows about one failed attempt.
#[derive(Debug)]
pub struct RetryContext<'a> {
    /// HTTP status code when the failure carried one.
    pub status: Option<u16>,
    /// 1-based attempt counter.
    pub attempt: u32,
    /// The failure itself, for policies that look deeper than the status.
    pub cause: &'a BackendError,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RetryDecision {
    /// Wait this long, then try again.
    RetryAfter(Duration),
    /// Give up; the batch fails.
    Abort,
}

/// Pluggable retry policy consulted by [`RetryingBackend`].
///
/// [`RetryingBackend`]: crate::backend::RetryingBackend
pub trait RetryPolicy: Send + Sync {
    fn decide(&self, ctx: &RetryContext<'_>) -> RetryDecision;
}

/// Built-in policy: retry rate limiting (429) and server errors (5xx) with
/// `2^attempt` seconds of backoff, abort everything else or once the attempt
/// budget is spent.
#[derive(Debug, Clone)]
pub struct ExponentialBackoff {
    max_retries: u32,
}

impl ExponentialBackoff {
    pub fn new(max_retries: u32) -> Self {
        Self { max_retries }
    }
}

impl Default for ExponentialBackoff {
    fn default() -> Self {
        Self::new(3)
    }
}

impl RetryPolicy for ExponentialBackoff {
    fn decide(&self, ctx: &RetryContext<'_>) -> RetryDecision {
        if ctx.attempt > self.max_retries {
            return RetryDecision::Abort;
        }
        let retryable = matches!(ctx.status, Some(429) | Some(500..=599));
        if retryable {
            RetryDecision::RetryAfter(Duration::from_secs(1u64 << ctx.attempt))
        } else {
            RetryDecision::Abort
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn ctx(status: Option<u16>, attempt: u32, cause: &BackendError) -> RetryContext<'_> {
        RetryContext {
            status,
            attempt,
            cause,
        }
    }

    #[test]
    fn rate_limited_retries_with_exponential_delay() {
        let policy = ExponentialBackoff::new(3);
        let cause = BackendError::status(429, "slow down");
        assert_eq!(
            policy.decide(&ctx(Some(429), 1, &cause)),
            RetryDecision::RetryAfter(Duration::from_secs(2))
        );
        assert_eq!(
            policy.decide(&ctx(Some(429), 2, &cause)),
            RetryDecision::RetryAfter(Duration::from_secs(4))
        );
    }

    #[test]
    fn server_errors_are_retryable() {
        let policy = ExponentialBackoff::new(3);
        let cause = BackendError::status(503, "unavailable");
        assert!(matches!(
            policy.decide(&ctx(Some(503), 1, &cause)),
            RetryDecision::RetryAfter(_)
        ));
    }

    #[test]
    fn client_errors_abort() {
        let policy = ExponentialBackoff::new(3);
        let cause = BackendError::status(400, "bad request");
        assert_eq!(policy.decide(&ctx(Some(400), 1, &cause)), RetryDecision::Abort);
    }

    #[test]
    fn missing_status_aborts() {
        let policy = ExponentialBackoff::new(3);
        let cause = BackendError::Malformed("not a list".into());
        assert_eq!(policy.decide(&ctx(None, 1, &cause)), RetryDecision::Abort);
    }

    #[test]
    fn attempt_budget_is_enforced() {
        let policy = ExponentialBackoff::new(3);
        let cause = BackendError::status(429, "slow down");
        assert!(matches!(
            policy.decide(&ctx(Some(429), 3, &cause)),
            RetryDecision::RetryAfter(_)
        ));
        assert_eq!(policy.decide(&ctx(Some(429), 4, &cause)), RetryDecision::Abort);
    }
}
