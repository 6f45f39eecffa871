use std::time::Duration;

use tokio::time::Instant;
use tokio_util::sync::CancellationToken;

use rollout_core::error::InstallerError;
use rollout_core::retry::{RetryExecutor, RetryPolicy};

/// Paused clock: elapsed time is the sum of the timers, up to timer granularity.
fn assert_elapsed(start: Instant, secs: u64) {
    let elapsed = start.elapsed();
    assert!(
        elapsed >= Duration::from_secs(secs) && elapsed < Duration::from_secs(secs) + Duration::from_millis(100),
        "elapsed {:?}, expected about {}s",
        elapsed,
        secs
    );
}

fn transient(message: &str) -> InstallerError {
    InstallerError::Failed(anyhow::anyhow!(message.to_string()))
}

#[tokio::test(start_paused = true)]
async fn succeeds_on_third_attempt_after_two_waits() {
    let executor = RetryExecutor::new(RetryPolicy::INSTALLATION);
    let token = CancellationToken::new();
    let start = Instant::now();
    let mut seen = Vec::new();

    let result = executor
        .execute(&token, |attempt| {
            seen.push(attempt);
            async move {
                if attempt < 3 {
                    Err(transient("connection refused"))
                } else {
                    Ok(attempt)
                }
            }
        })
        .await;

    assert_eq!(result.unwrap(), 3);
    assert_eq!(seen, vec![1, 2, 3]);
    assert_elapsed(start, 15);
}

#[tokio::test(start_paused = true)]
async fn branch_not_found_returns_after_one_attempt() {
    let executor = RetryExecutor::new(RetryPolicy::INSTALLATION);
    let token = CancellationToken::new();
    let start = Instant::now();
    let mut calls = 0;

    let result: Result<(), _> = executor
        .execute(&token, |_| {
            calls += 1;
            async {
                Err(InstallerError::BranchNotFound {
                    repository: "https://github.com/acme/platform".to_string(),
                    branch: "feature/x".to_string(),
                })
            }
        })
        .await;

    assert!(matches!(result, Err(InstallerError::BranchNotFound { .. })));
    assert_eq!(calls, 1);
    assert_eq!(start.elapsed(), Duration::ZERO);
}

#[tokio::test(start_paused = true)]
async fn exhaustion_returns_last_error() {
    let executor = RetryExecutor::new(RetryPolicy::INSTALLATION);
    let token = CancellationToken::new();

    let result: Result<(), _> = executor
        .execute(&token, |attempt| async move {
            Err(transient(&format!("failure {}", attempt)))
        })
        .await;

    let err = result.unwrap_err();
    assert_eq!(err.to_string(), "failure 3");
}

#[tokio::test(start_paused = true)]
async fn cancellation_during_backoff_skips_remaining_wait() {
    let executor = RetryExecutor::new(RetryPolicy::INSTALLATION);
    let token = CancellationToken::new();
    let start = Instant::now();
    let mut calls = 0;

    let canceller = tokio::spawn({
        let token = token.clone();
        async move {
            tokio::time::sleep(Duration::from_secs(1)).await;
            token.cancel();
        }
    });

    let result: Result<(), _> = executor
        .execute(&token, |_| {
            calls += 1;
            async { Err(transient("timeout")) }
        })
        .await;
    canceller.await.unwrap();

    assert!(matches!(result, Err(InstallerError::Cancelled)));
    assert_eq!(calls, 1);
    assert_elapsed(start, 1);
}

#[tokio::test]
async fn cancelled_token_prevents_first_attempt() {
    let executor = RetryExecutor::new(RetryPolicy::INSTALLATION);
    let token = CancellationToken::new();
    token.cancel();
    let mut calls = 0;

    let result: Result<(), InstallerError> = executor
        .execute(&token, |_| {
            calls += 1;
            async { Ok(()) }
        })
        .await;

    assert!(matches!(result, Err(InstallerError::Cancelled)));
    assert_eq!(calls, 0);
}

#[tokio::test(start_paused = true)]
async fn custom_policy_backoff_grows_and_caps() {
    let policy = RetryPolicy::new(
        "custom",
        4,
        Duration::from_secs(2),
        Duration::from_secs(5),
        3.0,
    );
    let executor = RetryExecutor::new(policy);
    let token = CancellationToken::new();
    let start = Instant::now();

    let result: Result<(), _> = executor
        .execute(&token, |_| async { Err(transient("busy")) })
        .await;

    assert!(result.is_err());
    // 2s, then 6s capped to 5s, then 18s capped to 5s
    assert_elapsed(start, 12);
}
