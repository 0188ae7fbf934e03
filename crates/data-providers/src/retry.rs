use market_core::{SourceFailure, SourceResult, SourceUnavailable};
use std::future::Future;
use std::time::Duration;

/// Bounded retry with exponential backoff
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct RetryPolicy {
    pub max_attempts: u32,
    /// Delay before the second attempt; doubled for each further attempt
    pub base_delay: Duration,
}

impl Default for RetryPolicy {
    fn default() -> Self {
        Self {
            max_attempts: 3,
            base_delay: Duration::from_millis(500),
        }
    }
}

impl RetryPolicy {
    pub fn delay_after(&self, attempt: u32) -> Duration {
        self.base_delay * 2u32.saturating_pow(attempt.saturating_sub(1))
    }
}

/// Run `op` until it succeeds or `policy.max_attempts` is reached.
///
/// `op` receives the 1-based attempt number. Exhaustion yields
/// `SourceFailure::RetriesExhausted` carrying the last failure.
pub async fn retry_with_backoff<T, F, Fut>(
    source_id: &'static str,
    policy: RetryPolicy,
    mut op: F,
) -> SourceResult<T>
where
    F: FnMut(u32) -> Fut,
    Fut: Future<Output = SourceResult<T>>,
{
    let attempts = policy.max_attempts.max(1);
    let mut last = SourceFailure::Empty;

    for attempt in 1..=attempts {
        match op(attempt).await {
            Ok(value) => return Ok(value),
            Err(e) => {
                tracing::warn!(
                    "{} attempt {}/{} failed: {}",
                    source_id,
                    attempt,
                    attempts,
                    e.failure
                );
                last = e.failure;
            }
        }

        if attempt < attempts {
            tokio::time::sleep(policy.delay_after(attempt)).await;
        }
    }

    Err(SourceUnavailable::new(
        source_id,
        SourceFailure::RetriesExhausted {
            attempts,
            last: Box::new(last),
        },
    ))
}
