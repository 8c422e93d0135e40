//! Re-invocation with backoff for idempotent operations.
//!
//! The core never retries: every operation returns its error (a 4xx is
//! terminal, and AEAD or decryption failures must reach the user). What
//! the CLI *may* do is re-issue an idempotent operation — list, head,
//! delete — after a transient failure, and this helper holds that policy
//! in one place.

use std::future::Future;
use std::time::Duration;
use tracing::debug;

use crate::s3::S3Error;

#[derive(Debug, Clone)]
pub struct RetryPolicy {
    pub max_retries: u32,
    pub base_delay_ms: u64,
    pub max_delay_ms: u64,
}

impl Default for RetryPolicy {
    fn default() -> Self {
        Self {
            max_retries: 3,
            base_delay_ms: 1000,
            max_delay_ms: 30_000,
        }
    }
}

impl RetryPolicy {
    /// Exponential backoff with 10–30% jitter.
    fn delay(&self, attempt: u32) -> Duration {
        let base = self.base_delay_ms as f64 * 2f64.powi(attempt as i32);
        let capped = base.min(self.max_delay_ms as f64);
        let jitter = capped * (0.1 + rand::random::<f64>() * 0.2);
        Duration::from_millis((capped + jitter) as u64)
    }
}

/// Run `op`, re-invoking it on retryable errors (5xx, network, timeout)
/// up to the policy's limit. Terminal errors return immediately.
pub async fn with_retry<T, F, Fut>(policy: &RetryPolicy, mut op: F) -> Result<T, S3Error>
where
    F: FnMut() -> Fut,
    Fut: Future<Output = Result<T, S3Error>>,
{
    let mut attempt = 0;
    loop {
        match op().await {
            Ok(value) => return Ok(value),
            Err(e) if e.is_retryable() && attempt < policy.max_retries => {
                let delay = policy.delay(attempt);
                debug!("retryable failure ({e}); attempt {}/{} after {delay:?}", attempt + 1, policy.max_retries);
                tokio::time::sleep(delay).await;
                attempt += 1;
            }
            Err(e) => return Err(e),
        }
    }
}
