//! # Retry Module
//!
//! Bounded retries with exponential backoff and random jitter for inference
//! calls. Only errors that [`InferenceError::is_transient`] accepts are
//! retried; everything else is returned on the first failure.

use rand::Rng;
use std::future::Future;
use std::time::Duration;
use tracing::{debug, warn};

use crate::config::RecoveryConfig;
use crate::errors::InferenceError;

/// Backoff before retry number `attempt` (0-based), without jitter
///
/// Doubles from `base_retry_delay_ms` and is capped at `max_retry_delay_ms`.
pub fn backoff_delay(config: &RecoveryConfig, attempt: u32) -> Duration {
    let factor = 2u64.saturating_pow(attempt);
    let delay_ms = config
        .base_retry_delay_ms
        .saturating_mul(factor)
        .min(config.max_retry_delay_ms);
    Duration::from_millis(delay_ms)
}

/// Backoff with up to 25% random jitter added
pub fn jittered_delay(config: &RecoveryConfig, attempt: u32) -> Duration {
    let delay = backoff_delay(config, attempt);
    let jitter_cap = delay.as_millis() as u64 / 4;
    if jitter_cap == 0 {
        return delay;
    }
    let jitter = rand::thread_rng().gen_range(0..=jitter_cap);
    delay + Duration::from_millis(jitter)
}

/// Run `operation` with a per-attempt timeout, retrying transient failures
///
/// Makes at most `max_retries + 1` attempts. `label` only feeds the logs.
pub async fn retry_with_backoff<T, F, Fut>(
    config: &RecoveryConfig,
    label: &str,
    mut operation: F,
) -> Result<T, InferenceError>
where
    F: FnMut() -> Fut,
    Fut: Future<Output = Result<T, InferenceError>>,
{
    let timeout = Duration::from_secs(config.operation_timeout_secs);
    let mut attempt = 0;

    loop {
        let result = match tokio::time::timeout(timeout, operation()).await {
            Ok(result) => result,
            Err(_) => Err(InferenceError::Timeout(format!(
                "{label} exceeded {}s",
                config.operation_timeout_secs
            ))),
        };

        match result {
            Ok(value) => {
                if attempt > 0 {
                    debug!(label, attempt, "Inference call succeeded after retry");
                }
                return Ok(value);
            }
            Err(err) if err.is_transient() && attempt < config.max_retries => {
                let delay = jittered_delay(config, attempt);
                warn!(
                    label,
                    attempt,
                    delay_ms = delay.as_millis() as u64,
                    error = %err,
                    "Transient inference failure, retrying"
                );
                tokio::time::sleep(delay).await;
                attempt += 1;
            }
            Err(err) => return Err(err),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::atomic::{AtomicU32, Ordering};

    fn fast_config(max_retries: u32) -> RecoveryConfig {
        RecoveryConfig {
            max_retries,
            base_retry_delay_ms: 1,
            max_retry_delay_ms: 4,
            operation_timeout_secs: 5,
            ..Default::default()
        }
    }

    #[test]
    fn test_backoff_doubles_and_caps() {
        let config = RecoveryConfig::default();
        assert_eq!(backoff_delay(&config, 0), Duration::from_millis(1000));
        assert_eq!(backoff_delay(&config, 1), Duration::from_millis(2000));
        assert_eq!(backoff_delay(&config, 2), Duration::from_millis(4000));
        assert_eq!(backoff_delay(&config, 10), Duration::from_millis(10000));
        assert_eq!(backoff_delay(&config, 200), Duration::from_millis(10000));
    }

    #[test]
    fn test_jitter_stays_within_a_quarter() {
        let config = RecoveryConfig::default();
        for _ in 0..50 {
            let delay = jittered_delay(&config, 1);
            assert!(delay >= Duration::from_millis(2000));
            assert!(delay <= Duration::from_millis(2500));
        }
    }

    #[tokio::test]
    async fn test_transient_errors_are_retried_until_success() {
        let counter = AtomicU32::new(0);
        let calls = &counter;
        let result = retry_with_backoff(&fast_config(3), "test", || async move {
            let n = calls.fetch_add(1, Ordering::SeqCst);
            if n < 2 {
                Err(InferenceError::Transport("connection reset".to_string()))
            } else {
                Ok("42")
            }
        })
        .await;

        assert_eq!(result, Ok("42"));
        assert_eq!(calls.load(Ordering::SeqCst), 3);
    }

    #[tokio::test]
    async fn test_retries_are_bounded() {
        let counter = AtomicU32::new(0);
        let calls = &counter;
        let result: Result<(), _> = retry_with_backoff(&fast_config(2), "test", || async move {
            calls.fetch_add(1, Ordering::SeqCst);
            Err(InferenceError::Status {
                status: 503,
                body: "overloaded".to_string(),
            })
        })
        .await;

        assert!(result.is_err());
        assert_eq!(calls.load(Ordering::SeqCst), 3);
    }

    #[tokio::test]
    async fn test_permanent_errors_are_not_retried() {
        let counter = AtomicU32::new(0);
        let calls = &counter;
        let result: Result<(), _> = retry_with_backoff(&fast_config(5), "test", || async move {
            calls.fetch_add(1, Ordering::SeqCst);
            Err(InferenceError::Status {
                status: 401,
                body: "bad key".to_string(),
            })
        })
        .await;

        assert!(result.is_err());
        assert_eq!(calls.load(Ordering::SeqCst), 1);
    }

    #[tokio::test(start_paused = true)]
    async fn test_slow_attempt_times_out() {
        let config = RecoveryConfig {
            max_retries: 0,
            operation_timeout_secs: 1,
            ..Default::default()
        };
        let result: Result<(), _> = retry_with_backoff(&config, "slow", || async {
            tokio::time::sleep(Duration::from_secs(10)).await;
            Ok(())
        })
        .await;

        assert!(matches!(result, Err(InferenceError::Timeout(_))));
    }
}
