//! Timeout helper.

use std::future::Future;
use std::time::Duration;

/// Errors that can stand for an elapsed deadline.
pub trait TimeoutError {
    fn timed_out(after_ms: u64) -> Self;
}

impl TimeoutError for crate::auth::AuthError {
    fn timed_out(after_ms: u64) -> Self {
        Self::Timeout(after_ms)
    }
}

impl TimeoutError for crate::poll::FetchError {
    fn timed_out(after_ms: u64) -> Self {
        Self::Timeout(after_ms)
    }
}

/// Wrap a future with a timeout.
pub async fn with_timeout<T, E: TimeoutError>(
    duration: Duration,
    future: impl Future<Output = Result<T, E>>,
) -> Result<T, E> {
    match tokio::time::timeout(duration, future).await {
        Ok(result) => result,
        Err(_) => Err(E::timed_out(duration.as_millis() as u64)),
    }
}
