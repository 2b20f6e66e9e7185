//! Retry helper for bridge bootstrap calls.

use crate::client::ClientError;
use crate::config::{BRIDGE_INITIAL_BACKOFF_MS, BRIDGE_MAX_BACKOFF_MS, BRIDGE_MAX_RETRIES};
use std::future::Future;
use std::time::Duration;
use tokio_retry::strategy::{jitter, ExponentialBackoff};
use tokio_retry::RetryIf;
use tracing::warn;

/// Retry a bridge operation with exponential backoff and jitter.
///
/// Only transient errors are retried, see [`ClientError::is_transient`]. Only used
/// while bootstrapping the session. Broadcast sends are never retried.
///
/// # Errors
///
/// Returns the first permanent error, or the last error once all retries are
/// exhausted.
pub async fn retry_bridge_operation<F, Fut, T>(operation: F) -> Result<T, ClientError>
where
    F: FnMut() -> Fut,
    Fut: Future<Output = Result<T, ClientError>>,
{
    let retry_strategy = ExponentialBackoff::from_millis(BRIDGE_INITIAL_BACKOFF_MS)
        .max_delay(Duration::from_millis(BRIDGE_MAX_BACKOFF_MS))
        .map(jitter)
        .take(BRIDGE_MAX_RETRIES);

    RetryIf::spawn(retry_strategy, operation, ClientError::is_transient)
        .await
        .map_err(|e| {
            if e.is_transient() {
                warn!(
                    "Bridge operation failed after {} attempts: {}",
                    BRIDGE_MAX_RETRIES + 1,
                    e
                );
            } else {
                warn!("Bridge operation failed permanently: {}", e);
            }
            e
        })
}
