//! Retry policy
//!
//! Two distinct retry loops live here:
//!
//! - **Record backoff**: after a failed upload the record goes back to
//!   `Local` with `next_attempt_at = now + backoff_delay(n)`, where `n` is
//!   its failure count. The delay doubles from the base and is capped.
//! - **Store retry**: every engine write to the record store is retried a
//!   bounded number of times with a short linear delay (100ms, 200ms, ...)
//!   before it surfaces as [`SyncError::StoreUnavailable`].

use std::future::Future;
use std::time::Duration;

use chrono::{DateTime, Utc};
use tracing::{info, warn};

use crate::SyncError;

/// Step of the linear delay between store retries
pub const STORE_RETRY_STEP: Duration = Duration::from_millis(100);

/// Delay before the next attempt of a record that failed `failed_attempts` times
///
/// `base * 2^(failed_attempts - 1)`, capped at `max`. Zero failures yield
/// no delay.
pub fn backoff_delay(failed_attempts: u32, base: Duration, max: Duration) -> Duration {
    if failed_attempts == 0 {
        return Duration::ZERO;
    }
    let exponent = (failed_attempts - 1).min(31);
    base.checked_mul(1u32 << exponent).unwrap_or(max).min(max)
}

/// Instant at which a record that failed `failed_attempts` times becomes due
pub fn next_attempt_at(
    now: DateTime<Utc>,
    failed_attempts: u32,
    base: Duration,
    max: Duration,
) -> DateTime<Utc> {
    let delay = backoff_delay(failed_attempts, base, max);
    chrono::Duration::from_std(delay)
        .ok()
        .and_then(|d| now.checked_add_signed(d))
        .unwrap_or(now)
}

/// Runs a record store operation, retrying failures
///
/// Every error from the store is retried; after `attempts` tries the last
/// error is returned as [`SyncError::StoreUnavailable`].
pub async fn with_store_retry<F, Fut, T>(
    operation_name: &str,
    attempts: u32,
    f: F,
) -> Result<T, SyncError>
where
    F: Fn() -> Fut,
    Fut: Future<Output = anyhow::Result<T>>,
{
    let attempts = attempts.max(1);
    let mut last_error: Option<anyhow::Error> = None;

    for attempt in 1..=attempts {
        match f().await {
            Ok(value) => {
                if attempt > 1 {
                    info!(
                        operation = operation_name,
                        attempt, "Store operation succeeded after retry"
                    );
                }
                return Ok(value);
            }
            Err(err) => {
                if attempt < attempts {
                    let delay = STORE_RETRY_STEP * attempt;
                    warn!(
                        operation = operation_name,
                        attempt,
                        delay_ms = delay.as_millis() as u64,
                        error = %err,
                        "Store operation failed, retrying"
                    );
                    tokio::time::sleep(delay).await;
                }
                last_error = Some(err);
            }
        }
    }

    let message = last_error
        .map(|e| format!("{operation_name}: {e:#}"))
        .unwrap_or_else(|| format!("{operation_name}: retries exhausted"));
    Err(SyncError::StoreUnavailable(message))
}
