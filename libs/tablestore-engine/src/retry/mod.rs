pub mod classifier;
pub mod policy;

use std::future::Future;
use std::time::Duration;

use tablestore_api::ClientError;

pub use classifier::{Operation, is_no_effect_error, is_retryable};
pub use policy::{
    AlwaysRetryConfig, CustomRetryConfig, DefaultRetryConfig, RetryPolicy, RetryState,
    RetryStrategy,
};

/// Decide what to do after `err`; `None` means surface it.
fn plan_retry(
    policy: &RetryPolicy,
    state: &mut RetryState,
    op: Operation,
    err: &ClientError,
) -> Option<Duration> {
    let pause = policy.next_pause(state, op, err);
    if pause.is_zero() {
        if state.retry_count() > 0 {
            tracing::warn!(
                operation = %op,
                retries = state.retry_count(),
                error = %err,
                "giving up after retries"
            );
        }
        return None;
    }
    tracing::debug!(
        operation = %op,
        retry = state.retry_count(),
        pause_ms = pause.as_millis() as u64,
        error = %err,
        "retrying request"
    );
    Some(pause)
}

/// Run `f` until it succeeds or the policy stops granting pauses, sleeping
/// the calling thread between attempts.
///
/// The error returned is the last one `f` produced, unchanged.
pub fn execute<T, F>(policy: &RetryPolicy, op: Operation, mut f: F) -> Result<T, ClientError>
where
    F: FnMut() -> Result<T, ClientError>,
{
    let mut state = policy.start();
    loop {
        match f() {
            Ok(value) => return Ok(value),
            Err(err) => match plan_retry(policy, &mut state, op, &err) {
                Some(pause) => std::thread::sleep(pause),
                None => return Err(err),
            },
        }
    }
}

/// Async counterpart of [`execute`], pausing with `tokio::time::sleep`.
pub async fn execute_async<T, F, Fut>(
    policy: &RetryPolicy,
    op: Operation,
    mut f: F,
) -> Result<T, ClientError>
where
    F: FnMut() -> Fut,
    Fut: Future<Output = Result<T, ClientError>>,
{
    let mut state = policy.start();
    loop {
        match f().await {
            Ok(value) => return Ok(value),
            Err(err) => match plan_retry(policy, &mut state, op, &err) {
                Some(pause) => tokio::time::sleep(pause).await,
                None => return Err(err),
            },
        }
    }
}

#[cfg(test)]
mod tests {
    use std::cell::Cell;

    use tablestore_api::error::codes;

    use super::*;

    fn busy() -> ClientError {
        ClientError::service(codes::SERVER_BUSY, "busy", 503)
    }

    #[test]
    fn execute_returns_first_success() {
        let calls = Cell::new(0);
        let result = execute(&RetryPolicy::default(), Operation::GetRow, || {
            calls.set(calls.get() + 1);
            if calls.get() < 3 { Err(busy()) } else { Ok(calls.get()) }
        });
        assert_eq!(result, Ok(3));
    }

    #[test]
    fn execute_surfaces_last_error_unchanged() {
        let calls = Cell::new(0);
        let result: Result<(), _> = execute(&RetryPolicy::always(2), Operation::PutRow, || {
            calls.set(calls.get() + 1);
            Err(ClientError::transport(format!("attempt {}", calls.get())))
        });
        assert_eq!(result, Err(ClientError::transport("attempt 3")));
        assert_eq!(calls.get(), 3);
    }

    #[test]
    fn execute_does_not_retry_unsafe_write() {
        let calls = Cell::new(0);
        let result: Result<(), _> = execute(&RetryPolicy::default(), Operation::PutRow, || {
            calls.set(calls.get() + 1);
            Err(ClientError::transport("reset"))
        });
        assert!(result.is_err());
        assert_eq!(calls.get(), 1);
    }

    #[tokio::test(start_paused = true)]
    async fn execute_async_retries_with_sleep() {
        let calls = Cell::new(0);
        let result = execute_async(&RetryPolicy::always(5), Operation::GetRange, || {
            calls.set(calls.get() + 1);
            let n = calls.get();
            async move { if n < 4 { Err(busy()) } else { Ok(n) } }
        })
        .await;
        assert_eq!(result, Ok(4));
    }
}
