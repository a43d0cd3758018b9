//! Bounded retry of store calls that failed transiently.

use std::future::Future;

use renderfarm_core::backoff::RetryConfig;
use renderfarm_db::store::StoreError;

use crate::error::ClientError;

/// Run `op` until it succeeds, fails permanently, or `config.max_attempts`
/// transient failures ([`StoreError::is_transient`]) have been seen.
///
/// Sleeps [`RetryConfig::jittered_delay_for`] between attempts.
pub async fn retry_transient<T, F, Fut>(
    config: &RetryConfig,
    operation: &'static str,
    mut op: F,
) -> Result<T, ClientError>
where
    F: FnMut() -> Fut,
    Fut: Future<Output = Result<T, StoreError>>,
{
    let max_attempts = config.max_attempts.max(1);
    let mut attempt = 1;

    loop {
        match op().await {
            Ok(value) => return Ok(value),
            Err(err) if !err.is_transient() => return Err(ClientError::Store(err)),
            Err(err) if attempt >= max_attempts => {
                tracing::error!(
                    operation,
                    attempts = attempt,
                    error = %err,
                    "Store unavailable, giving up",
                );
                return Err(ClientError::RetriesExhausted {
                    operation,
                    attempts: attempt,
                    last: err,
                });
            }
            Err(err) => {
                let delay = config.jittered_delay_for(attempt);
                tracing::warn!(
                    operation,
                    attempt,
                    delay_ms = delay.as_millis() as u64,
                    error = %err,
                    "Store unavailable, retrying",
                );
                tokio::time::sleep(delay).await;
                attempt += 1;
            }
        }
    }
}
