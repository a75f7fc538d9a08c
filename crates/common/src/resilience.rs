//! Time-boxing and retries for external provider calls

use backoff::{future::retry, ExponentialBackoffBuilder};
use std::future::Future;
use std::time::Duration;

use crate::errors::{AppError, Result};

/// Run a provider call with a deadline.
///
/// Expiry becomes `AppError::ProviderTimeout` tagged with `stage`. The inner
/// future is dropped on expiry; nothing is cancelled on the provider side.
pub async fn bounded<T, F>(stage: &str, limit: Duration, call: F) -> Result<T>
where
    F: Future<Output = Result<T>>,
{
    match tokio::time::timeout(limit, call).await {
        Ok(result) => result,
        Err(_) => {
            tracing::warn!(stage, timeout_ms = limit.as_millis() as u64, "Provider call timed out");
            Err(AppError::ProviderTimeout {
                stage: stage.to_string(),
                timeout_ms: limit.as_millis() as u64,
            })
        }
    }
}

/// Retry a provider call with exponential backoff.
///
/// Client errors fail immediately; anything else is retried until
/// `max_retries` extra attempts have been made. The caller is expected to
/// wrap the whole retry loop in [`bounded`].
pub async fn with_retries<T, F, Fut>(operation: &str, max_retries: u32, mut call: F) -> Result<T>
where
    F: FnMut() -> Fut,
    Fut: Future<Output = Result<T>>,
{
    let policy = ExponentialBackoffBuilder::new()
        .with_initial_interval(Duration::from_millis(100))
        .with_max_interval(Duration::from_secs(2))
        .with_max_elapsed_time(None)
        .build();

    let mut attempt = 0u32;
    retry(policy, || {
        attempt += 1;
        let current = attempt;
        let pending = call();
        async move {
            pending.await.map_err(|e| {
                if e.is_client_error() || current > max_retries {
                    backoff::Error::permanent(e)
                } else {
                    tracing::warn!(
                        operation,
                        attempt = current,
                        max_retries,
                        error = %e,
                        "Provider request failed, retrying"
                    );
                    backoff::Error::transient(e)
                }
            })
        }
    })
    .await
}
