//! Bounded platform calls.
//!
//! Every call to the chat platform is a network round-trip, so:
//! - each call is wrapped in a timeout (`with_timeout`), a timeout becomes
//!   `PlatformError::Timeout` instead of hanging the caller
//! - the update poller retries transient failures with exponential backoff
//!   (2^n seconds, capped at one minute)

use super::traits::{PlatformError, PlatformResult};
use std::future::Future;
use std::time::Duration;
use tokio::time::sleep;
use tracing::warn;

/// Maximum retry attempts before giving up.
const MAX_RETRIES: u32 = 6; // 1+2+4+8+16+32 seconds

/// Maximum backoff duration (1 minute).
const MAX_BACKOFF_SECS: u64 = 60;

/// Run a platform call, failing with `PlatformError::Timeout` after `limit`.
pub async fn with_timeout<T, Fut>(limit: Duration, call: Fut) -> PlatformResult<T>
where
    Fut: Future<Output = PlatformResult<T>>,
{
    match tokio::time::timeout(limit, call).await {
        Ok(result) => result,
        Err(_) => Err(PlatformError::Timeout(limit)),
    }
}

/// Retry a platform operation with exponential backoff.
///
/// # Arguments
///
/// * `operation` - The async operation to retry (e.g., receive_updates)
/// * `is_retryable` - Function to determine if error is transient and retryable
///
/// # Returns
///
/// Result of the operation, or the last error after all retries exhausted.
pub async fn retry_with_backoff<F, Fut, T, E>(
    mut operation: F,
    is_retryable: fn(&E) -> bool,
) -> Result<T, E>
where
    F: FnMut() -> Fut,
    Fut: Future<Output = Result<T, E>>,
    E: std::fmt::Display,
{
    let mut attempt = 0;

    loop {
        match operation().await {
            Ok(result) => return Ok(result),
            Err(err) => {
                if !is_retryable(&err) || attempt >= MAX_RETRIES {
                    return Err(err);
                }

                let backoff_secs = backoff_secs(attempt);
                warn!(
                    attempt = attempt + 1,
                    backoff_secs,
                    error = %err,
                    "platform call failed, retrying"
                );

                sleep(Duration::from_secs(backoff_secs)).await;
                attempt += 1;
            }
        }
    }
}

/// Backoff for a given attempt: 2^attempt seconds, capped.
fn backoff_secs(attempt: u32) -> u64 {
    2u64.saturating_pow(attempt).min(MAX_BACKOFF_SECS)
}

/// Determine if a platform error is transient.
///
/// Network failures and timeouts are retried; API rejections are not.
pub fn is_transient(err: &PlatformError) -> bool {
    matches!(err, PlatformError::Network(_) | PlatformError::Timeout(_))
}
