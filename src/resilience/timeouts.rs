//! Timeout enforcement for backend calls.

use std::future::Future;
use std::time::Duration;

use crate::backend::BackendError;

/// Run a backend call with a deadline; an elapsed deadline becomes
/// [`BackendError::Timeout`], which is retryable.
pub async fn with_timeout<T, F>(limit: Duration, call: F) -> Result<T, BackendError>
where
    F: Future<Output = Result<T, BackendError>>,
{
    match tokio::time::timeout(limit, call).await {
        Ok(result) => result,
        Err(_) => Err(BackendError::Timeout(limit.as_secs())),
    }
}
