//! Bounded retry for network calls

use std::future::Future;
use std::time::Duration;

use ethpm_common::TransportError;
use tokio_retry::RetryIf;
use tokio_retry::strategy::ExponentialBackoff;

use crate::config::RetryPolicy;
use crate::error::{Error, Result};

impl RetryPolicy {
    /// Delays between attempts: `base_delay`, doubling, capped at
    /// `max_delay`, at most `max_retries` of them.
    pub fn delays(&self) -> impl Iterator<Item = Duration> + use<> {
        let base_ms = self.base_delay.as_millis().min(u64::MAX as u128) as u64;
        ExponentialBackoff::from_millis(2)
            .factor((base_ms / 2).max(1))
            .max_delay(self.max_delay)
            .take(self.max_retries)
    }
}

/// Run `action`, retrying transient failures according to `policy`.
///
/// Permanent failures are returned immediately.
pub async fn with_retry<T, F, Fut>(policy: &RetryPolicy, what: &str, action: F) -> Result<T>
where
    F: FnMut() -> Fut,
    Fut: Future<Output = Result<T>>,
{
    RetryIf::spawn(
        policy.delays(),
        action,
        |e: &Error| {
            let retry = e.is_transient();
            if retry {
                tracing::warn!(what, error = %e, "transient failure, retrying");
            }
            retry
        },
    )
    .await
}

/// Bound `fut` by `timeout`; expiry is a transient transport error.
pub async fn with_timeout<T>(
    timeout: Duration,
    fut: impl Future<Output = Result<T>>,
) -> Result<T> {
    match tokio::time::timeout(timeout, fut).await {
        Ok(res) => res,
        Err(_) => Err(Error::transport(TransportError::Timeout)),
    }
}
