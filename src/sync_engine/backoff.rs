use std::future::Future;
use std::time::Duration;

use rand::Rng;

use crate::error::SyncError;

const MAX_ATTEMPTS: u32 = 5;

/// Real exponential back-off with full jitter, replacing the source's
/// `executeWithBackoff` which returned on the first attempt despite its name
/// actually retry despite the name. Only `RateLimitExceeded` retries;
/// every other error is propagated on the first attempt.
pub async fn with_rate_limit_retry<F, Fut, T>(mut call: F) -> Result<T, SyncError>
where
    F: FnMut() -> Fut,
    Fut: Future<Output = Result<T, SyncError>>,
{
    let mut attempt = 0u32;
    loop {
        match call().await {
            Ok(value) => return Ok(value),
            Err(SyncError::RateLimitExceeded) if attempt + 1 < MAX_ATTEMPTS => {
                let delay = delay_for_attempt(attempt);
                tracing::debug!(attempt, delay_ms = delay.as_millis() as u64, "rate limited, backing off");
                tokio::time::sleep(delay).await;
                attempt += 1;
            }
            Err(SyncError::RateLimitExceeded) => return Err(SyncError::RateLimitExceeded),
            Err(other) => return Err(other),
        }
    }
}

fn delay_for_attempt(attempt: u32) -> Duration {
    let base_secs = 2u64.saturating_pow(attempt);
    let jitter_ms = rand::rng().random_range(0..1000u64);
    Duration::from_millis(base_secs * 1000 + jitter_ms)
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::atomic::{AtomicU32, Ordering};

    #[tokio::test]
    async fn succeeds_immediately_without_retry() {
        let calls = AtomicU32::new(0);
        let result = with_rate_limit_retry(|| {
            calls.fetch_add(1, Ordering::SeqCst);
            async { Ok::<_, SyncError>(42) }
        })
        .await;
        assert_eq!(result.unwrap(), 42);
        assert_eq!(calls.load(Ordering::SeqCst), 1);
    }

    #[tokio::test]
    async fn non_rate_limit_errors_do_not_retry() {
        let calls = AtomicU32::new(0);
        let result = with_rate_limit_retry(|| {
            calls.fetch_add(1, Ordering::SeqCst);
            async { Err::<(), _>(SyncError::ConnectionNotFound) }
        })
        .await;
        assert!(result.is_err());
        assert_eq!(calls.load(Ordering::SeqCst), 1);
    }

    #[tokio::test]
    async fn retries_rate_limit_until_cap_then_propagates() {
        let calls = AtomicU32::new(0);
        let result = with_rate_limit_retry(|| {
            calls.fetch_add(1, Ordering::SeqCst);
            async { Err::<(), _>(SyncError::RateLimitExceeded) }
        })
        .await;
        assert!(matches!(result, Err(SyncError::RateLimitExceeded)));
        assert_eq!(calls.load(Ordering::SeqCst), MAX_ATTEMPTS);
    }

    #[tokio::test]
    async fn eventually_succeeds_after_transient_rate_limit() {
        let calls = AtomicU32::new(0);
        let result = with_rate_limit_retry(|| {
            let n = calls.fetch_add(1, Ordering::SeqCst);
            async move {
                if n < 2 {
                    Err(SyncError::RateLimitExceeded)
                } else {
                    Ok(99)
                }
            }
        })
        .await;
        assert_eq!(result.unwrap(), 99);
        assert_eq!(calls.load(Ordering::SeqCst), 3);
    }
}
