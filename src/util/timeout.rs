//! Timeout helper.

use std::future::Future;
use std::time::Duration;

use crate::error::SessionError;

/// Wrap a future with a timeout, mapping expiry to [`SessionError::Timeout`].
pub async fn with_timeout<T>(
    duration: Duration,
    future: impl Future<Output = Result<T, SessionError>>,
) -> Result<T, SessionError> {
    match tokio::time::timeout(duration, future).await {
        Ok(result) => result,
        Err(_) => Err(SessionError::Timeout(duration.as_millis() as u64)),
    }
}
