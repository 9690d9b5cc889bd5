//! Bounded exponential retry around provider calls.
//!
//! Only errors whose [`ErrorCode::retryable`] is true are retried: transport
//! failures, 429 and 5xx. Everything else is returned on first failure.

use std::future::Future;
use std::time::Duration;

use backoff::ExponentialBackoff;
use backoff::future::retry;

use super::config::RetryPolicy;
use super::types::LlmError;
use crate::error::ErrorCode;

/// Run `op` until it succeeds, fails permanently, or the policy is exhausted.
///
/// # Errors
///
/// Returns the last [`LlmError`] produced by `op`.
pub async fn with_retry<T, F, Fut>(policy: RetryPolicy, mut op: F) -> Result<T, LlmError>
where
    F: FnMut() -> Fut,
    Fut: Future<Output = Result<T, LlmError>>,
{
    let initial = Duration::from_millis(policy.initial_interval_ms);
    let backoff = ExponentialBackoff {
        initial_interval: initial,
        current_interval: initial,
        max_elapsed_time: Some(Duration::from_secs(policy.max_elapsed_secs)),
        ..Default::default()
    };

    let max_attempts = policy.max_attempts.max(1);
    let mut attempt = 0_u32;

    retry(backoff, || {
        attempt += 1;
        let current = attempt;
        let call = op();
        async move {
            match call.await {
                Ok(value) => Ok(value),
                Err(e) if e.retryable() && current < max_attempts => {
                    tracing::warn!(attempt = current, code = e.error_code(), error = %e, "llm call failed; retrying");
                    Err(backoff::Error::transient(e))
                }
                Err(e) => Err(backoff::Error::permanent(e)),
            }
        }
    })
    .await
}

#[cfg(test)]
#[path = "retry_test.rs"]
mod tests;
