//! Retry/timeout executor (§4.6).
//!
//! Grounded on the ancestor SDK's `execute_with_enhanced_retry` in
//! `client.rs` for the backoff-loop shape, combined with its
//! `CircuitBreaker::call`'s use of `tokio::time::timeout` for the per-attempt
//! deadline race — the SDK never combined the two in one place, this spec
//! does.

use std::time::Duration;

use rand::Rng;

use crate::error::{AdapterError, AdapterErrorKind};

const INITIAL_BACKOFF_MS: u64 = 250;
const MAX_BACKOFF_MS: u64 = 4000;

/// What the executor decided about one finished attempt.
pub enum Outcome<T> {
    Success(T),
    /// Auth errors bypass retry entirely regardless of attempts remaining.
    AuthFailure(AdapterError),
    /// Retries exhausted (or none configured) on a non-auth error.
    Exhausted(AdapterError),
    /// The operation itself ran out the per-call deadline on every attempt.
    TimedOut,
}

/// Runs `operation` up to `retry_limit + 1` times total, racing each attempt
/// against `timeout_ms` (0 disables the race) and sleeping a jittered,
/// doubling backoff between attempts. Auth errors abort immediately.
pub async fn execute_with_retry<F, Fut, T>(
    mut operation: F,
    timeout_ms: u32,
    retry_limit: u32,
) -> Outcome<T>
where
    F: FnMut() -> Fut,
    Fut: std::future::Future<Output = Result<T, AdapterError>>,
{
    let mut backoff_ms = INITIAL_BACKOFF_MS;
    let mut attempt: u32 = 0;

    loop {
        let attempt_result = if timeout_ms > 0 {
            match tokio::time::timeout(Duration::from_millis(timeout_ms as u64), operation()).await
            {
                Ok(result) => result,
                Err(_) => {
                    if attempt >= retry_limit {
                        return Outcome::TimedOut;
                    }
                    attempt += 1;
                    sleep_backoff(&mut backoff_ms).await;
                    continue;
                }
            }
        } else {
            operation().await
        };

        match attempt_result {
            Ok(value) => return Outcome::Success(value),
            Err(error) => {
                if error.kind() == AdapterErrorKind::Auth {
                    return Outcome::AuthFailure(error);
                }
                if attempt >= retry_limit {
                    return Outcome::Exhausted(error);
                }
                attempt += 1;
                sleep_backoff(&mut backoff_ms).await;
            }
        }
    }
}

/// Sleeps `min(backoff + jitter, MAX_BACKOFF)` then doubles `backoff`,
/// capped at `MAX_BACKOFF_MS`. `jitter = backoff * (0.5 + rand())`.
async fn sleep_backoff(backoff_ms: &mut u64) {
    let jitter_factor = 0.5 + rand::thread_rng().gen::<f64>();
    let jitter_ms = (*backoff_ms as f64 * jitter_factor) as u64;
    let delay_ms = (*backoff_ms + jitter_ms).min(MAX_BACKOFF_MS);
    tokio::time::sleep(Duration::from_millis(delay_ms)).await;
    *backoff_ms = (*backoff_ms * 2).min(MAX_BACKOFF_MS);
}
