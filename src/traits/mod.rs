//! Trait definitions for injected dependencies.
//!
//! This module defines the two seams the pipeline consumes:
//! - [`ModelInvoker`]: the single I/O-bound model call
//! - [`ResponseCache`]: optional content-hash-keyed cache lookup
//!
//! # Mocking
//!
//! Both traits are annotated with `#[cfg_attr(test, mockall::automock)]`
//! which generates mock implementations automatically for testing.

use async_trait::async_trait;

use crate::error::InvocationError;

/// The injected model-invocation function.
///
/// The pipeline performs no network I/O of its own; callers select a
/// backend for their deployment environment and hand it in through this
/// trait. Implementations should propagate cooperative cancellation
/// into the in-flight call where their transport supports it.
#[cfg_attr(test, mockall::automock)]
#[async_trait]
pub trait ModelInvoker: Send + Sync {
    /// Send `prompt` to the model and return its raw text response.
    ///
    /// # Errors
    ///
    /// Returns [`InvocationError`] if the call fails.
    async fn invoke(&self, prompt: &str) -> Result<String, InvocationError>;
}

/// Optional cache lookup keyed by a content hash.
///
/// A hook only: the default [`NoopCache`] never hits, and no default
/// store path exists.
#[cfg_attr(test, mockall::automock)]
#[async_trait]
pub trait ResponseCache: Send + Sync {
    /// Look up a previously generated response by content hash.
    async fn lookup(&self, content_hash: &str) -> Option<String>;
}

/// Cache implementation that never hits.
#[derive(Debug, Clone, Copy, Default)]
pub struct NoopCache;

#[async_trait]
impl ResponseCache for NoopCache {
    async fn lookup(&self, _content_hash: &str) -> Option<String> {
        None
    }
}

/// Invoke the model under a caller-imposed timeout.
///
/// An elapsed timeout maps to [`InvocationError::Timeout`] and is
/// handled like any other invocation failure.
pub(crate) async fn invoke_with_timeout(
    invoker: &dyn ModelInvoker,
    prompt: &str,
    timeout_ms: u64,
) -> Result<String, InvocationError> {
    match tokio::time::timeout(
        std::time::Duration::from_millis(timeout_ms),
        invoker.invoke(prompt),
    )
    .await
    {
        Ok(result) => result,
        Err(_elapsed) => Err(InvocationError::Timeout { timeout_ms }),
    }
}

#[cfg(test)]
#[allow(clippy::unwrap_used, clippy::expect_used)]
mod tests {
    use super::*;
    use static_assertions::assert_impl_all;

    assert_impl_all!(NoopCache: Send, Sync, Clone, Copy, Default);

    #[tokio::test]
    async fn test_noop_cache_never_hits() {
        let cache = NoopCache;
        assert_eq!(cache.lookup("abc123").await, None);
    }

    #[tokio::test]
    async fn test_mock_invoker_success() {
        let mut mock = MockModelInvoker::new();
        mock.expect_invoke()
            .returning(|_prompt| Ok("mock response".to_string()));

        let result = mock.invoke("prompt").await;
        assert_eq!(result.unwrap(), "mock response");
    }

    #[tokio::test]
    async fn test_mock_invoker_error() {
        let mut mock = MockModelInvoker::new();
        mock.expect_invoke().returning(|_prompt| {
            Err(InvocationError::Network {
                message: "connection reset".to_string(),
            })
        });

        let result = mock.invoke("prompt").await;
        assert!(matches!(result, Err(InvocationError::Network { .. })));
    }

    #[tokio::test]
    async fn test_mock_cache_hit() {
        let mut mock = MockResponseCache::new();
        mock.expect_lookup()
            .withf(|hash: &str| hash == "deadbeef")
            .returning(|_hash| Some("cached".to_string()));

        assert_eq!(mock.lookup("deadbeef").await, Some("cached".to_string()));
    }
}
