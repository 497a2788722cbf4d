//! Bounded retry with linear backoff.

use std::future::Future;
use std::time::Duration;

use crate::error::{Result, SagaError};

/// Configuration for retrying transient failures.
#[derive(Debug, Clone)]
pub struct RetryConfig {
    /// Total attempts, including the first.
    pub max_attempts: u32,
    /// Delay before the second attempt; later attempts wait a multiple of it.
    pub base_delay: Duration,
}

impl Default for RetryConfig {
    fn default() -> Self {
        Self {
            max_attempts: 3,
            base_delay: Duration::from_millis(100),
        }
    }
}

impl RetryConfig {
    /// Delay after the given failed attempt (1-based).
    pub fn delay_for(&self, attempt: u32) -> Duration {
        self.base_delay * attempt
    }
}

/// Runs `operation` until it succeeds, fails permanently, or runs out of attempts.
///
/// Errors for which [`SagaError::is_transient`] holds are retried. When the
/// last attempt also fails transiently the error is wrapped in
/// [`SagaError::RetriesExhausted`].
pub async fn with_retry<T, F, Fut>(config: &RetryConfig, name: &str, operation: F) -> Result<T>
where
    F: FnMut() -> Fut,
    Fut: Future<Output = Result<T>>,
{
    with_retry_when(config, name, SagaError::is_transient, operation).await
}

/// Like [`with_retry`], retrying only the errors `should_retry` accepts.
pub async fn with_retry_when<T, F, Fut>(
    config: &RetryConfig,
    name: &str,
    should_retry: impl Fn(&SagaError) -> bool,
    mut operation: F,
) -> Result<T>
where
    F: FnMut() -> Fut,
    Fut: Future<Output = Result<T>>,
{
    let max_attempts = config.max_attempts.max(1);
    let mut attempt = 1;

    loop {
        match operation().await {
            Ok(value) => return Ok(value),
            Err(e) if !should_retry(&e) => return Err(e),
            Err(e) if attempt >= max_attempts => {
                return Err(SagaError::RetriesExhausted {
                    operation: name.to_string(),
                    attempts: attempt,
                    source: Box::new(e),
                });
            }
            Err(e) => {
                let delay = config.delay_for(attempt);
                tracing::warn!(
                    operation = name,
                    attempt,
                    delay_ms = delay.as_millis() as u64,
                    error = %e,
                    "Transient failure, retrying"
                );
                tokio::time::sleep(delay).await;
                attempt += 1;
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use std::sync::atomic::{AtomicU32, Ordering};

    use super::*;
    use common::OrderId;

    fn transient() -> SagaError {
        SagaError::QueryUnavailable("timeout".into())
    }

    #[test]
    fn test_linear_backoff() {
        let config = RetryConfig::default();
        assert_eq!(config.delay_for(1), Duration::from_millis(100));
        assert_eq!(config.delay_for(2), Duration::from_millis(200));
    }

    #[tokio::test(start_paused = true)]
    async fn test_succeeds_after_transient_failures() {
        let counter = AtomicU32::new(0);
        let calls = &counter;
        let result = with_retry(&RetryConfig::default(), "op", move || async move {
            if calls.fetch_add(1, Ordering::SeqCst) < 2 {
                Err(transient())
            } else {
                Ok(42)
            }
        })
        .await;

        assert_eq!(result.unwrap(), 42);
        assert_eq!(calls.load(Ordering::SeqCst), 3);
    }

    #[tokio::test(start_paused = true)]
    async fn test_gives_up_after_max_attempts() {
        let counter = AtomicU32::new(0);
        let calls = &counter;
        let result: Result<()> = with_retry(&RetryConfig::default(), "op", move || async move {
            calls.fetch_add(1, Ordering::SeqCst);
            Err(transient())
        })
        .await;

        assert!(matches!(
            result,
            Err(SagaError::RetriesExhausted { attempts: 3, .. })
        ));
        assert_eq!(calls.load(Ordering::SeqCst), 3);
    }

    #[tokio::test]
    async fn test_permanent_errors_are_not_retried() {
        let counter = AtomicU32::new(0);
        let calls = &counter;
        let result: Result<()> = with_retry(&RetryConfig::default(), "op", move || async move {
            calls.fetch_add(1, Ordering::SeqCst);
            Err(SagaError::OrderNotFound(OrderId::new("100")))
        })
        .await;

        assert!(matches!(result, Err(SagaError::OrderNotFound(_))));
        assert_eq!(calls.load(Ordering::SeqCst), 1);
    }
}
