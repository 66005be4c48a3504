//! Exponential backoff with jitter, used both for mutation writes (§4.5
//! step 4) and for the maintenance trigger's retry loop (§4.7).
use std::future::Future;
use std::time::Duration;

/// Retry policy: exhausts after `max_attempts`, waiting
/// `base_delay_ms * 2^attempt` plus jitter between attempts.
#[derive(Debug, Clone)]
pub struct RetryOptions {
    /// Total number of attempts, including the first. `1` disables retries.
    pub max_attempts: u32,
    /// Base delay before the first retry.
    pub base_delay_ms: u64,
}

impl Default for RetryOptions {
    fn default() -> Self {
        Self {
            max_attempts: 3,
            base_delay_ms: 200,
        }
    }
}

impl RetryOptions {
    fn delay_for(&self, attempt: u32) -> Duration {
        let backoff = self.base_delay_ms.saturating_mul(1u64 << attempt.min(16));
        let jitter = rand::random::<u64>() % (backoff / 2 + 1);
        Duration::from_millis(backoff + jitter)
    }
}

/// Runs `op` until it succeeds or `options.max_attempts` is exhausted,
/// sleeping between attempts per [`RetryOptions::delay_for`]. The retried
/// operation is not re-entrant: each call to `op` starts from scratch, so a
/// caller that mints a fresh key per attempt (e.g. a mutation blob's uuid)
/// never produces two copies under one key.
pub async fn retry_with_backoff<F, Fut, T, E>(options: &RetryOptions, mut op: F) -> Result<T, E>
where
    F: FnMut() -> Fut,
    Fut: Future<Output = Result<T, E>>,
{
    let mut attempt = 0;
    loop {
        match op().await {
            Ok(value) => return Ok(value),
            Err(err) => {
                attempt += 1;
                if attempt >= options.max_attempts {
                    return Err(err);
                }
                tokio::time::sleep(options.delay_for(attempt)).await;
            }
        }
    }
}
