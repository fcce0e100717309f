//! Per-node retry loop: wraps a fallible async attempt,
//! retrying up to `RetryPolicy::max_retries` times with the configured
//! backoff strategy plus ±50% jitter. The retry counter is scoped to one
//! job attempt — it is never persisted across separate job runs.

use std::future::Future;
use std::time::Duration;

use rand::Rng;
use synqx_protocol::types::RetryPolicy;
use tracing::warn;

/// Runs `attempt` up to `policy.max_retries + 1` times, sleeping between
/// attempts per `policy.strategy` with jittered backoff. Returns the last
/// error if every attempt fails.
pub async fn with_retries<T, E, F, Fut>(policy: &RetryPolicy, node_id: &str, mut attempt: F) -> Result<T, E>
where
    F: FnMut() -> Fut,
    Fut: Future<Output = Result<T, E>>,
    E: std::fmt::Display,
{
    let mut last_err = None;
    for attempt_number in 1..=(policy.max_retries + 1) {
        match attempt().await {
            Ok(value) => return Ok(value),
            Err(err) => {
                if attempt_number <= policy.max_retries {
                    let delay = jittered_delay(policy, attempt_number);
                    warn!(node_id, attempt_number, delay_ms = delay.as_millis() as u64, error = %err, "node attempt failed, retrying");
                    tokio::time::sleep(delay).await;
                }
                last_err = Some(err);
            }
        }
    }
    Err(last_err.expect("loop runs at least once"))
}

/// Applies ±50% jitter to `policy.strategy`'s base delay for `attempt`.
fn jittered_delay(policy: &RetryPolicy, attempt: u32) -> Duration {
    let base = Duration::from_secs(policy.retry_delay_seconds);
    let unjittered = policy.strategy.base_delay(base, attempt);
    let factor = rand::thread_rng().gen_range(0.5..=1.5);
    Duration::from_secs_f64(unjittered.as_secs_f64() * factor)
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::atomic::{AtomicU32, Ordering};
    use synqx_protocol::types::RetryStrategy;

    #[tokio::test(start_paused = true)]
    async fn retries_until_success_within_max_retries() {
        let policy = RetryPolicy { max_retries: 3, strategy: RetryStrategy::Fixed, retry_delay_seconds: 1 };
        let calls = AtomicU32::new(0);
        let result: Result<u32, String> = with_retries(&policy, "n1", || {
            let n = calls.fetch_add(1, Ordering::SeqCst);
            async move { if n < 2 { Err("not yet".to_string()) } else { Ok(42) } }
        })
        .await;
        assert_eq!(result.unwrap(), 42);
        assert_eq!(calls.load(Ordering::SeqCst), 3);
    }

    #[tokio::test(start_paused = true)]
    async fn exhausting_retries_returns_the_last_error() {
        let policy = RetryPolicy { max_retries: 2, strategy: RetryStrategy::Fixed, retry_delay_seconds: 1 };
        let calls = AtomicU32::new(0);
        let result: Result<u32, String> = with_retries(&policy, "n1", || {
            calls.fetch_add(1, Ordering::SeqCst);
            async move { Err("always fails".to_string()) }
        })
        .await;
        assert_eq!(result.unwrap_err(), "always fails");
        assert_eq!(calls.load(Ordering::SeqCst), 3);
    }
}
