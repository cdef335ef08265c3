use crate::config::RetryConfig;
use crate::error::{FetchError, LabelingError, ProviderError, SynthesisError};
use std::future::Future;
use std::time::Duration;
use tokio::time::sleep;
use tracing::warn;

/// Classifies an error as transient (worth another attempt) or fatal
pub trait Retryable {
    fn is_retryable(&self) -> bool;

    /// Minimum wait requested by the upstream, if any
    fn retry_after(&self) -> Option<Duration> {
        None
    }
}

impl Retryable for ProviderError {
    fn is_retryable(&self) -> bool {
        match self {
            ProviderError::Http { status, .. } => *status == 429 || *status >= 500,
            ProviderError::Timeout(_) | ProviderError::Network(_) => true,
            ProviderError::Decode(_)
            | ProviderError::EmptyResponse
            | ProviderError::InvalidHeader(_) => false,
        }
    }
}

impl Retryable for FetchError {
    fn is_retryable(&self) -> bool {
        match self {
            FetchError::Upstream { status, .. } => *status >= 500,
            FetchError::RateLimited { .. } | FetchError::Network(_) | FetchError::Timeout(_) => {
                true
            }
            FetchError::Auth { .. } | FetchError::Parse(_) | FetchError::NoResults => false,
        }
    }

    fn retry_after(&self) -> Option<Duration> {
        match self {
            FetchError::RateLimited { retry_after } => *retry_after,
            _ => None,
        }
    }
}

impl Retryable for LabelingError {
    fn is_retryable(&self) -> bool {
        match self {
            LabelingError::Provider(e) => e.is_retryable(),
            // Malformed output is worth a second sample
            LabelingError::ParseOutput(_) => true,
        }
    }
}

impl Retryable for SynthesisError {
    fn is_retryable(&self) -> bool {
        match self {
            SynthesisError::Provider(e) => e.is_retryable(),
            SynthesisError::Ungrounded => true,
        }
    }
}

/// Execute an async operation with jittered exponential backoff.
/// Non-retryable errors are returned without further attempts.
pub async fn retry_with_backoff<F, Fut, T, E>(
    config: &RetryConfig,
    mut operation: F,
) -> Result<T, E>
where
    F: FnMut() -> Fut,
    Fut: Future<Output = Result<T, E>>,
    E: std::fmt::Display + Retryable,
{
    let mut attempts = 0;
    let mut backoff_ms = config.backoff_base_ms;

    loop {
        attempts += 1;

        match operation().await {
            Ok(result) => return Ok(result),
            Err(e) if !e.is_retryable() => {
                warn!("Attempt {} failed with non-retryable error: {}", attempts, e);
                return Err(e);
            }
            Err(e) if attempts >= config.max_attempts => {
                warn!("All {} attempts failed: {}", attempts, e);
                return Err(e);
            }
            Err(e) => {
                // Jittered backoff: base * 2^attempt + random(0..base)
                let jitter = rand::random::<u64>() % config.backoff_base_ms.max(1);
                let mut delay = Duration::from_millis(backoff_ms + jitter);
                if let Some(hint) = e.retry_after() {
                    delay = delay.max(hint);
                }

                warn!(
                    "Attempt {} failed: {}. Retrying in {:?}...",
                    attempts, e, delay
                );

                sleep(delay).await;
                backoff_ms = backoff_ms.saturating_mul(2);
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::atomic::{AtomicU32, Ordering};
    use std::sync::Arc;

    #[derive(Debug)]
    enum TestError {
        Transient,
        Fatal,
    }

    impl std::fmt::Display for TestError {
        fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
            write!(f, "{:?}", self)
        }
    }

    impl Retryable for TestError {
        fn is_retryable(&self) -> bool {
            matches!(self, TestError::Transient)
        }
    }

    fn config() -> RetryConfig {
        RetryConfig {
            max_attempts: 3,
            backoff_base_ms: 10,
        }
    }

    #[tokio::test]
    async fn test_retry_success_first_attempt() {
        let result: Result<i32, TestError> =
            retry_with_backoff(&config(), || async { Ok(42) }).await;

        assert_eq!(result.unwrap(), 42);
    }

    #[tokio::test]
    async fn test_retry_success_after_failures() {
        let attempts = Arc::new(AtomicU32::new(0));
        let attempts_clone = attempts.clone();

        let result: Result<i32, TestError> = retry_with_backoff(&config(), || {
            let attempts = attempts_clone.clone();
            async move {
                let n = attempts.fetch_add(1, Ordering::SeqCst);
                if n < 2 {
                    Err(TestError::Transient)
                } else {
                    Ok(42)
                }
            }
        })
        .await;

        assert_eq!(result.unwrap(), 42);
        assert_eq!(attempts.load(Ordering::SeqCst), 3);
    }

    #[tokio::test]
    async fn test_retry_all_failures() {
        let attempts = Arc::new(AtomicU32::new(0));
        let attempts_clone = attempts.clone();

        let result: Result<i32, TestError> = retry_with_backoff(&config(), || {
            let attempts = attempts_clone.clone();
            async move {
                attempts.fetch_add(1, Ordering::SeqCst);
                Err(TestError::Transient)
            }
        })
        .await;

        assert!(result.is_err());
        assert_eq!(attempts.load(Ordering::SeqCst), 3);
    }

    #[tokio::test]
    async fn test_fatal_error_is_not_retried() {
        let attempts = Arc::new(AtomicU32::new(0));
        let attempts_clone = attempts.clone();

        let result: Result<i32, TestError> = retry_with_backoff(&config(), || {
            let attempts = attempts_clone.clone();
            async move {
                attempts.fetch_add(1, Ordering::SeqCst);
                Err(TestError::Fatal)
            }
        })
        .await;

        assert!(matches!(result, Err(TestError::Fatal)));
        assert_eq!(attempts.load(Ordering::SeqCst), 1);
    }

    #[test]
    fn test_error_classification() {
        assert!(!FetchError::Auth {
            status: 401,
            message: String::new()
        }
        .is_retryable());
        assert!(FetchError::RateLimited {
            retry_after: Some(Duration::from_secs(2))
        }
        .is_retryable());
        assert!(ProviderError::Http {
            status: 529,
            body: String::new()
        }
        .is_retryable());
        assert!(!ProviderError::Http {
            status: 400,
            body: String::new()
        }
        .is_retryable());
        assert!(!ProviderError::InvalidHeader("x-api-key".to_string()).is_retryable());
    }
}
