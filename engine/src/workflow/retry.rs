//! Bounded retry executor for activities.

use std::time::Duration;

use tracing::warn;

use crate::workflow::ActivityError;

/// Retry policy applied to every activity invocation.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct RetryPolicy {
    pub initial_backoff: Duration,
    pub backoff_coefficient: f64,
    pub max_interval: Duration,
    pub max_attempts: u32,
}

impl Default for RetryPolicy {
    fn default() -> Self {
        Self {
            initial_backoff: Duration::from_millis(100),
            backoff_coefficient: 2.0,
            max_interval: Duration::from_secs(10),
            max_attempts: 3,
        }
    }
}

impl RetryPolicy {
    /// A single attempt, no backoff.
    pub fn no_retry() -> Self {
        Self {
            max_attempts: 1,
            ..Self::default()
        }
    }

    fn next_backoff(&self, current: Duration) -> Duration {
        current.mul_f64(self.backoff_coefficient).min(self.max_interval)
    }
}

/// Run `attempt` until it succeeds, returns a non-retryable error, or the
/// budget is spent. Retryable failures back off exponentially between tries.
pub(crate) async fn execute_with_retry<F, Fut>(
    policy: &RetryPolicy,
    activity: &str,
    attempt_fn: F,
) -> Result<serde_json::Value, ActivityError>
where
    F: Fn() -> Fut,
    Fut: std::future::Future<Output = Result<serde_json::Value, ActivityError>>,
{
    let mut backoff = policy.initial_backoff;
    let max_attempts = policy.max_attempts.max(1);

    for attempt in 1..=max_attempts {
        match attempt_fn().await {
            Ok(value) => return Ok(value),
            Err(err @ ActivityError::NonRetryable { .. }) => return Err(err),
            Err(err) => {
                if attempt == max_attempts {
                    return Err(err);
                }
                warn!(
                    activity,
                    attempt,
                    max_attempts,
                    error = %err,
                    backoff_ms = backoff.as_millis() as u64,
                    "activity attempt failed, retrying"
                );
                tokio::time::sleep(backoff).await;
                backoff = policy.next_backoff(backoff);
            }
        }
    }
    // max_attempts >= 1 guarantees the loop returned.
    unreachable!("retry loop always returns")
}
