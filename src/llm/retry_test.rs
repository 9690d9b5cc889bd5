use std::sync::Arc;
use std::sync::atomic::{AtomicU32, Ordering};

use super::*;

fn fast_policy(max_attempts: u32) -> RetryPolicy {
    RetryPolicy { max_attempts, initial_interval_ms: 1, max_elapsed_secs: 5 }
}

fn overloaded() -> LlmError {
    LlmError::ApiResponse { status: 503, body: "overloaded".into() }
}

#[tokio::test]
async fn succeeds_after_transient_failures() {
    let calls = Arc::new(AtomicU32::new(0));
    let counter = calls.clone();
    let result = with_retry(fast_policy(3), || {
        let counter = counter.clone();
        async move {
            let n = counter.fetch_add(1, Ordering::SeqCst) + 1;
            if n < 3 { Err(overloaded()) } else { Ok("done") }
        }
    })
    .await;

    assert_eq!(result.unwrap(), "done");
    assert_eq!(calls.load(Ordering::SeqCst), 3);
}

#[tokio::test]
async fn stops_after_max_attempts() {
    let calls = Arc::new(AtomicU32::new(0));
    let counter = calls.clone();
    let result: Result<(), _> = with_retry(fast_policy(2), || {
        let counter = counter.clone();
        async move {
            counter.fetch_add(1, Ordering::SeqCst);
            Err(overloaded())
        }
    })
    .await;

    assert!(matches!(result.unwrap_err(), LlmError::ApiResponse { status: 503, .. }));
    assert_eq!(calls.load(Ordering::SeqCst), 2);
}

#[tokio::test]
async fn permanent_errors_are_not_retried() {
    let calls = Arc::new(AtomicU32::new(0));
    let counter = calls.clone();
    let result: Result<(), _> = with_retry(fast_policy(5), || {
        let counter = counter.clone();
        async move {
            counter.fetch_add(1, Ordering::SeqCst);
            Err(LlmError::ApiResponse { status: 400, body: "bad request".into() })
        }
    })
    .await;

    assert!(result.is_err());
    assert_eq!(calls.load(Ordering::SeqCst), 1);
}

#[tokio::test]
async fn single_attempt_policy_disables_retry() {
    let calls = Arc::new(AtomicU32::new(0));
    let counter = calls.clone();
    let result: Result<(), _> = with_retry(fast_policy(1), || {
        let counter = counter.clone();
        async move {
            counter.fetch_add(1, Ordering::SeqCst);
            Err(LlmError::ApiRequest("connection reset".into()))
        }
    })
    .await;

    assert!(result.is_err());
    assert_eq!(calls.load(Ordering::SeqCst), 1);
}
