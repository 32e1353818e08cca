//! Timeout helper.

use std::future::Future;
use std::time::Duration;

use crate::error::ParleyError;

/// Wrap a fallible future with a timeout, mapping expiry to [`ParleyError::Timeout`].
pub async fn with_timeout<T>(
    duration: Duration,
    future: impl Future<Output = Result<T, ParleyError>>,
) -> Result<T, ParleyError> {
    match tokio::time::timeout(duration, future).await {
        Ok(result) => result,
        Err(_) => Err(ParleyError::Timeout(duration.as_millis() as u64)),
    }
}

/// Like [`with_timeout`], but `None` means unbounded.
pub async fn with_optional_timeout<T>(
    duration: Option<Duration>,
    future: impl Future<Output = Result<T, ParleyError>>,
) -> Result<T, ParleyError> {
    match duration {
        Some(duration) => with_timeout(duration, future).await,
        None => future.await,
    }
}
