//! Circuit breaker for the gateway adapter
//!
//! Opens after a run of consecutive failures, blocks calls while open,
//! and half-opens after the reset timeout to let probes through. A run
//! of successful probes closes it again.

use std::sync::atomic::{AtomicBool, AtomicU64, Ordering};
use std::time::{Duration, Instant};
use tokio::sync::RwLock;

use core_kernel::CircuitBreakerConfig;

#[derive(Debug)]
pub struct CircuitBreaker {
    config: CircuitBreakerConfig,
    failure_count: AtomicU64,
    success_count: AtomicU64,
    is_open: AtomicBool,
    last_failure_time: RwLock<Option<Instant>>,
}

impl CircuitBreaker {
    pub fn new(config: CircuitBreakerConfig) -> Self {
        Self {
            config,
            failure_count: AtomicU64::new(0),
            success_count: AtomicU64::new(0),
            is_open: AtomicBool::new(false),
            last_failure_time: RwLock::new(None),
        }
    }

    /// Whether a call may go through right now
    pub async fn is_available(&self) -> bool {
        if !self.is_open.load(Ordering::Relaxed) {
            return true;
        }

        // Half-open after the reset timeout: one probe is allowed
        let last_failure = self.last_failure_time.read().await;
        if let Some(time) = *last_failure {
            if time.elapsed() > Duration::from_secs(self.config.reset_timeout_secs) {
                return true;
            }
        }

        false
    }

    pub fn record_success(&self) {
        self.failure_count.store(0, Ordering::Relaxed);
        let successes = self.success_count.fetch_add(1, Ordering::Relaxed) + 1;
        if successes >= self.config.success_threshold as u64 {
            self.is_open.store(false, Ordering::Relaxed);
            self.success_count.store(0, Ordering::Relaxed);
        }
    }

    pub async fn record_failure(&self) {
        self.success_count.store(0, Ordering::Relaxed);
        let failures = self.failure_count.fetch_add(1, Ordering::Relaxed) + 1;
        if failures >= self.config.failure_threshold as u64 {
            self.is_open.store(true, Ordering::Relaxed);
            *self.last_failure_time.write().await = Some(Instant::now());
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn breaker(failure_threshold: u32) -> CircuitBreaker {
        CircuitBreaker::new(CircuitBreakerConfig {
            failure_threshold,
            reset_timeout_secs: 60,
            success_threshold: 2,
        })
    }

    #[tokio::test]
    async fn test_opens_after_threshold_failures() {
        let cb = breaker(3);
        assert!(cb.is_available().await);

        cb.record_failure().await;
        cb.record_failure().await;
        assert!(cb.is_available().await);

        cb.record_failure().await;
        assert!(!cb.is_available().await);
    }

    #[tokio::test]
    async fn test_success_resets_failure_run() {
        let cb = breaker(3);
        cb.record_failure().await;
        cb.record_failure().await;
        cb.record_success();
        cb.record_failure().await;
        cb.record_failure().await;
        assert!(cb.is_available().await);
    }
}
