//! Bounded retry without backoff.
//!
//! The signing call is retried immediately, with no delay and no jitter, up
//! to a fixed number of total attempts. Every failure kind is retried; the
//! caller classifies the final error.

use std::future::Future;

/// Run `op` until it succeeds or `max_attempts` calls have failed.
///
/// `op` receives the 1-based attempt number. A `max_attempts` of zero is
/// treated as one. The error of the last attempt is returned.
pub async fn retry_bounded<T, E, F, Fut>(max_attempts: u32, mut op: F) -> Result<T, E>
where
    F: FnMut(u32) -> Fut,
    Fut: Future<Output = Result<T, E>>,
    E: std::fmt::Display,
{
    let max_attempts = max_attempts.max(1);
    let mut attempt = 1;
    loop {
        match op(attempt).await {
            Ok(value) => return Ok(value),
            Err(e) if attempt < max_attempts => {
                tracing::warn!(attempt, max_attempts, "oracle call failed, retrying: {e}");
                attempt += 1;
            }
            Err(e) => return Err(e),
        }
    }
}
