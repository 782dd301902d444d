//! # Circuit Breaker Module
//!
//! This module implements the circuit breaker pattern for inference calls.
//! It prevents a struggling inference endpoint from stalling every
//! reconciliation run by failing fast once calls have failed repeatedly.

use std::sync::{Mutex, PoisonError};
use std::time::{Duration, Instant};

use crate::config::RecoveryConfig;

#[derive(Debug, Default)]
struct BreakerState {
    failure_count: u32,
    last_failure_time: Option<Instant>,
}

/// Circuit breaker for inference calls
///
/// # State Machine
///
/// - **Closed**: Normal operation, calls pass through
/// - **Open**: Failure threshold exceeded, calls fail fast
/// - **Half-Open**: Reset timeout elapsed, the next call is let through
///
/// # Configuration
///
/// Uses `RecoveryConfig` for:
/// - `circuit_breaker_threshold`: Failures before opening (default: 5)
/// - `circuit_breaker_reset_secs`: Time before attempting reset (default: 60s)
#[derive(Debug)]
pub struct CircuitBreaker {
    state: Mutex<BreakerState>,
    config: RecoveryConfig,
}

impl CircuitBreaker {
    /// Create a new circuit breaker with the given configuration
    ///
    /// # Examples
    ///
    /// ```rust
    /// use pantry::config::RecoveryConfig;
    /// use pantry::circuit_breaker::CircuitBreaker;
    ///
    /// let circuit_breaker = CircuitBreaker::new(RecoveryConfig::default());
    /// assert!(!circuit_breaker.is_open());
    /// ```
    pub fn new(config: RecoveryConfig) -> Self {
        Self {
            state: Mutex::new(BreakerState::default()),
            config,
        }
    }

    /// Check if the circuit is open (blocking calls)
    ///
    /// Returns `true` while the failure count is at or above the threshold and
    /// the reset timeout has not elapsed. Once it has elapsed the breaker
    /// closes again.
    pub fn is_open(&self) -> bool {
        let mut state = self.state.lock().unwrap_or_else(PoisonError::into_inner);

        if state.failure_count >= self.config.circuit_breaker_threshold {
            if let Some(last_time) = state.last_failure_time {
                if last_time.elapsed() < Duration::from_secs(self.config.circuit_breaker_reset_secs)
                {
                    return true;
                }
                *state = BreakerState::default();
            }
        }
        false
    }

    /// Record a failed call
    pub fn record_failure(&self) {
        let mut state = self.state.lock().unwrap_or_else(PoisonError::into_inner);
        state.failure_count += 1;
        state.last_failure_time = Some(Instant::now());
    }

    /// Record a successful call, closing the circuit
    pub fn record_success(&self) {
        let mut state = self.state.lock().unwrap_or_else(PoisonError::into_inner);
        *state = BreakerState::default();
    }

    /// Number of consecutive failures recorded
    pub fn failure_count(&self) -> u32 {
        self.state
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .failure_count
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_circuit_breaker_failure_recording() {
        let config = RecoveryConfig {
            circuit_breaker_threshold: 2,
            ..Default::default()
        };
        let circuit_breaker = CircuitBreaker::new(config);

        assert!(!circuit_breaker.is_open());

        circuit_breaker.record_failure();
        assert!(!circuit_breaker.is_open());

        circuit_breaker.record_failure();
        assert!(circuit_breaker.is_open());
        assert_eq!(circuit_breaker.failure_count(), 2);
    }

    #[test]
    fn test_circuit_breaker_success_recording() {
        let config = RecoveryConfig {
            circuit_breaker_threshold: 1,
            ..Default::default()
        };
        let circuit_breaker = CircuitBreaker::new(config);

        circuit_breaker.record_failure();
        assert!(circuit_breaker.is_open());

        circuit_breaker.record_success();
        assert!(!circuit_breaker.is_open());
        assert_eq!(circuit_breaker.failure_count(), 0);
    }

    #[test]
    fn test_circuit_breaker_resets_after_timeout() {
        let config = RecoveryConfig {
            circuit_breaker_threshold: 1,
            circuit_breaker_reset_secs: 0,
            ..Default::default()
        };
        let circuit_breaker = CircuitBreaker::new(config);

        circuit_breaker.record_failure();
        // zero reset timeout: the breaker closes on the next check
        assert!(!circuit_breaker.is_open());
        assert_eq!(circuit_breaker.failure_count(), 0);
    }
}
