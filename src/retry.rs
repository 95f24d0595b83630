// Retry utilities
//
// Linear back-off: the n-th retry waits `base_interval * n`.

use std::future::Future;
use std::time::Duration;
use tokio::time::sleep;

use crate::error::Result;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct RetryPolicy {
    pub max_retries: u32,
    pub base_interval: Duration,
}

impl RetryPolicy {
    pub fn new(max_retries: u32, base_interval: Duration) -> Self {
        Self { max_retries, base_interval }
    }

    /// Single attempt, no retries
    pub fn none() -> Self {
        Self::new(0, Duration::ZERO)
    }

    fn delay(&self, attempt: u32) -> Duration {
        self.base_interval.saturating_mul(attempt)
    }
}

impl Default for RetryPolicy {
    fn default() -> Self {
        Self::none()
    }
}

/// Runs `operation` until it succeeds, fails with a non-retryable error, or
/// `policy.max_retries` retries are used up.
pub async fn with_retry<F, Fut, T>(mut operation: F, policy: &RetryPolicy) -> Result<T>
where
    F: FnMut() -> Fut,
    Fut: Future<Output = Result<T>>,
{
    let mut attempt = 0;

    loop {
        match operation().await {
            Ok(result) => return Ok(result),
            Err(error) => {
                if !error.is_retryable() || attempt >= policy.max_retries {
                    return Err(error);
                }
                attempt += 1;

                let delay = policy.delay(attempt);
                tracing::warn!("Retrying after error (attempt {}/{}, wait {:?}): {}", attempt, policy.max_retries, delay, error);
                sleep(delay).await;
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::error::StorageError;
    use std::sync::atomic::{AtomicU32, Ordering};

    #[tokio::test]
    async fn test_retries_backend_errors() {
        let calls = AtomicU32::new(0);
        let counter = &calls;
        let policy = RetryPolicy::new(3, Duration::from_millis(1));
        let result = with_retry(
            move || async move {
                let n = counter.fetch_add(1, Ordering::SeqCst);
                if n < 2 {
                    Err(StorageError::backend("S3", "500 Backend Error"))
                } else {
                    Ok(n)
                }
            },
            &policy,
        )
        .await;
        assert_eq!(result.unwrap(), 2);
        assert_eq!(calls.load(Ordering::SeqCst), 3);
    }

    #[tokio::test]
    async fn test_gives_up_after_max_retries() {
        let calls = AtomicU32::new(0);
        let counter = &calls;
        let policy = RetryPolicy::new(2, Duration::from_millis(1));
        let result: Result<()> = with_retry(
            move || async move {
                counter.fetch_add(1, Ordering::SeqCst);
                Err(StorageError::backend("S3", "503"))
            },
            &policy,
        )
        .await;
        assert!(result.is_err());
        assert_eq!(calls.load(Ordering::SeqCst), 3);
    }

    #[tokio::test]
    async fn test_does_not_retry_argument_errors() {
        let calls = AtomicU32::new(0);
        let counter = &calls;
        let policy = RetryPolicy::new(5, Duration::from_millis(1));
        let result: Result<()> = with_retry(
            move || async move {
                counter.fetch_add(1, Ordering::SeqCst);
                Err(StorageError::InvalidArgument("bad".into()))
            },
            &policy,
        )
        .await;
        assert!(matches!(result, Err(StorageError::InvalidArgument(_))));
        assert_eq!(calls.load(Ordering::SeqCst), 1);
    }

    #[test]
    fn test_linear_delay() {
        let policy = RetryPolicy::new(3, Duration::from_secs(20));
        assert_eq!(policy.delay(1), Duration::from_secs(20));
        assert_eq!(policy.delay(3), Duration::from_secs(60));
    }
}
