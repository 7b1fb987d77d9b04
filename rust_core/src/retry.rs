//! Retry with exponential backoff for persistence writes.

use crate::error::StoreError;
use std::future::Future;
use std::time::Duration;
use tracing::warn;

pub const DEFAULT_RETRY_ATTEMPTS: u32 = 3;
pub const DEFAULT_RETRY_BASE_MS: u64 = 100;

/// Run a store operation, retrying transient failures.
///
/// Backoff doubles from `base_backoff_ms` each attempt. Non-transient errors
/// are returned immediately.
pub async fn execute_with_retry<F, Fut, T>(
    what: &str,
    mut f: F,
    max_attempts: u32,
    base_backoff_ms: u64,
) -> Result<T, StoreError>
where
    F: FnMut() -> Fut,
    Fut: Future<Output = Result<T, StoreError>>,
{
    let mut attempt = 0;
    loop {
        attempt += 1;
        match f().await {
            Ok(result) => return Ok(result),
            Err(e) if attempt < max_attempts && e.is_transient() => {
                let backoff_ms = base_backoff_ms * 2_u64.pow(attempt - 1);
                warn!(
                    "{} failed (attempt {}/{}): {}. Retrying in {}ms",
                    what, attempt, max_attempts, e, backoff_ms
                );
                tokio::time::sleep(Duration::from_millis(backoff_ms)).await;
            }
            Err(e) => return Err(e),
        }
    }
}
