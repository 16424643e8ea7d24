//! Fulfillment backend boundary.
//!
//! A backend takes one ordered batch of (content, context) items and returns
//! translated strings 1:1 by position, or fails with a classifiable error.
//! Retry lives here too, as a wrapping adapter: the drain loop never sees an
//! individual retryable attempt.

pub mod deepseek;

use futures_util::future::BoxFuture;
use thiserror::Error;
use tracing::warn;

use crate::context::TranslationContext;
use crate::retry::{RetryContext, RetryDecision, RetryPolicy};

/// One item of a fulfillment batch.
#[derive(Debug, Clone, PartialEq)]
pub struct BatchItem {
    pub content: String,
    pub context: Option<TranslationContext>,
}

#[derive(Debug, Error)]
pub enum BackendError {
    /// Non-2xx response; body truncated by the adapter.
    #[error("status {code}: {body}")]
    Status { code: u16, body: String },

    /// Request never produced a classifiable response.
    #[error("transport error: {0}")]
    Transport(String),

    /// Response arrived but is not the expected ordered list.
    #[error("malformed response: {0}")]
    Malformed(String),
}

impl BackendError {
    pub fn status(code: u16, body: impl Into<String>) -> Self {
        Self::Status {
            code,
            body: body.into(),
        }
    }

    pub fn status_code(&self) -> Option<u16> {
        match self {
            Self::Status { code, .. } => Some(*code),
            _ => None,
        }
    }

    /// Whether requeueing the batch for a later drain can help. Malformed
    /// responses and client errors are final; transport blips and the
    /// retryable status classes are not.
    pub fn is_retryable(&self) -> bool {
        match self {
            Self::Status { code, .. } => *code == 429 || (500..=599).contains(code),
            Self::Transport(_) => true,
            Self::Malformed(_) => false,
        }
    }
}

/// Pluggable fulfillment backend.
pub trait TranslationBackend: Send + Sync {
    /// Translate `items` from `from` into `to`, preserving order and count.
    /// Must fail with a classifiable [`BackendError`] rather than silently
    /// truncating the result list.
    fn translate_batch<'a>(
        &'a self,
        items: &'a [BatchItem],
        from: &'a str,
        to: &'a str,
    ) -> BoxFuture<'a, Result<Vec<String>, BackendError>>;

    /// Release backend-owned resources (HTTP clients, native handles).
    fn dispose(&self) {}
}

impl<T: TranslationBackend + ?Sized> TranslationBackend for std::sync::Arc<T> {
    fn translate_batch<'a>(
        &'a self,
        items: &'a [BatchItem],
        from: &'a str,
        to: &'a str,
    ) -> BoxFuture<'a, Result<Vec<String>, BackendError>> {
        (**self).translate_batch(items, from, to)
    }

    fn dispose(&self) {
        (**self).dispose();
    }
}

/// Adapter that retries an inner backend according to a [`RetryPolicy`].
///
/// Attempts are 1-based; after an abort decision the last error is returned
/// unchanged so callers keep its classification.
pub struct RetryingBackend<B> {
    inner: B,
    policy: Box<dyn RetryPolicy>,
}

impl<B: TranslationBackend> RetryingBackend<B> {
    pub fn new(inner: B, policy: impl RetryPolicy + 'static) -> Self {
        Self {
            inner,
            policy: Box::new(policy),
        }
    }
}

impl<B: TranslationBackend> TranslationBackend for RetryingBackend<B> {
    fn translate_batch<'a>(
        &'a self,
        items: &'a [BatchItem],
        from: &'a str,
        to: &'a str,
    ) -> BoxFuture<'a, Result<Vec<String>, BackendError>> {
        Box::pin(async move {
            let mut attempt: u32 = 1;
            loop {
                let err = match self.inner.translate_batch(items, from, to).await {
                    Ok(results) => return Ok(results),
                    Err(err) => err,
                };

                let decision = self.policy.decide(&RetryContext {
                    status: err.status_code(),
                    attempt,
                    cause: &err,
                });
                match decision {
                    RetryDecision::RetryAfter(delay) => {
                        warn!(
                            attempt,
                            delay_ms = delay.as_millis() as u64,
                            error = %err,
                            "batch failed, retrying"
                        );
                        tokio::time::sleep(delay).await;
                        attempt += 1;
                    }
                    RetryDecision::Abort => return Err(err),
                }
            }
        })
    }

    fn dispose(&self) {
        self.inner.dispose();
    }
}
