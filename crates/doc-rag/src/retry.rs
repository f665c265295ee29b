//! Exponential backoff for transient failures

use std::future::Future;
use std::time::Duration;
use tokio::time::sleep;

use crate::error::Result;

/// Run `operation` up to `max_retries + 1` times, doubling `base_delay` between attempts
///
/// Only errors for which [`crate::Error::is_transient`] holds are retried.
pub async fn retry_with_backoff<F, Fut, T>(
    label: &str,
    max_retries: u32,
    base_delay: Duration,
    mut operation: F,
) -> Result<T>
where
    F: FnMut() -> Fut,
    Fut: Future<Output = Result<T>>,
{
    let mut attempt = 0u32;
    loop {
        match operation().await {
            Ok(result) => return Ok(result),
            Err(e) if e.is_transient() && attempt < max_retries => {
                let delay = base_delay * 2u32.pow(attempt.min(10));
                tracing::warn!(
                    "{} failed (attempt {}/{}): {}; retrying in {:?}",
                    label,
                    attempt + 1,
                    max_retries + 1,
                    e,
                    delay
                );
                sleep(delay).await;
                attempt += 1;
            }
            Err(e) => return Err(e),
        }
    }
}
