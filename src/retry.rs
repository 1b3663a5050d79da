//! Retry logic with a fixed inter-attempt delay
//!
//! Transfers are retried with a constant delay rather than exponential
//! backoff; the inter-page pacing of the catalog walker already keeps
//! request rates low, and a constant delay keeps run duration predictable.
//! Whether production use would want exponential backoff with jitter is an
//! open question — do not change this silently.

use std::future::Future;
use std::time::Duration;

/// Execute an async operation, retrying every failure a bounded number of
/// times with a fixed delay between attempts
///
/// Makes `retries + 1` attempts in total and returns the first `Ok`, or the
/// last error once the budget is spent. The loop is explicit so stack depth
/// stays flat no matter how many attempts are configured.
pub async fn with_fixed_delay<F, Fut, T, E>(retries: u32, delay: Duration, operation: F) -> Result<T, E>
where
    F: Fn() -> Fut,
    Fut: Future<Output = Result<T, E>>,
    E: std::fmt::Display,
{
    let total_attempts = retries + 1;
    let mut last_err: Option<E> = None;

    for attempt in 1..=total_attempts {
        match operation().await {
            Ok(value) => return Ok(value),
            Err(e) => {
                if attempt < total_attempts {
                    tracing::warn!(
                        attempt,
                        total_attempts,
                        delay_ms = delay.as_millis() as u64,
                        error = %e,
                        "attempt failed, retrying"
                    );
                    tokio::time::sleep(delay).await;
                }
                last_err = Some(e);
            }
        }
    }

    // The loop runs at least once, so last_err is always populated here.
    match last_err {
        Some(e) => Err(e),
        None => unreachable!("retry loop makes at least one attempt"),
    }
}
