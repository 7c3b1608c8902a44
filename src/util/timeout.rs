//! Deadlines for provider calls.

use std::future::Future;
use std::time::Duration;

use crate::error::LoginError;

/// Wrap a future with a deadline.
///
/// A long poll the provider never answers would otherwise pin its session in
/// `waiting_for_scan` forever; the elapsed deadline surfaces as a retryable
/// [`LoginError::Timeout`] instead.
pub async fn with_timeout<T>(
    duration: Duration,
    future: impl Future<Output = Result<T, LoginError>>,
) -> Result<T, LoginError> {
    match tokio::time::timeout(duration, future).await {
        Ok(result) => result,
        Err(_) => Err(LoginError::Timeout(duration.as_millis() as u64)),
    }
}
