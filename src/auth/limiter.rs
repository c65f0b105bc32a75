//! Login attempt limiter
//!
//! Every failed login is answered after a short random delay. Once the failure
//! count reaches the threshold, the next attempt is held for a long random
//! delay and rejected without looking at the credentials; that attempt also
//! resets the count.
//!
//! The count is process-wide, not per client: it throttles credential
//! guessing as a whole.

use rand::Rng;
use std::sync::atomic::{AtomicU32, Ordering};
use std::time::Duration;
use tracing::{debug, warn};

use crate::config::LimiterConfig;

/// Outcome of [`LoginAttemptLimiter::admit`]
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Admission {
    /// Credentials may be checked
    Open,
    /// The attempt was delayed and must be rejected
    LockedOut,
}

pub struct LoginAttemptLimiter {
    failures: AtomicU32,
    config: LimiterConfig,
}

impl LoginAttemptLimiter {
    pub fn new(config: LimiterConfig) -> Self {
        Self {
            failures: AtomicU32::new(0),
            config,
        }
    }

    /// Failed attempts since the last reset
    pub fn failures(&self) -> u32 {
        self.failures.load(Ordering::SeqCst)
    }

    /// Gate a login attempt
    ///
    /// When the failure count has reached the threshold, the count is reset
    /// atomically, so exactly one concurrent attempt takes the lockout.
    pub async fn admit(&self) -> Admission {
        let threshold = self.config.threshold.max(1);
        let tripped = self
            .failures
            .fetch_update(Ordering::SeqCst, Ordering::SeqCst, |n| {
                (n >= threshold).then_some(0)
            })
            .is_ok();

        if !tripped {
            return Admission::Open;
        }

        let delay = self.lockout_delay();
        warn!(
            "Too many failed logins, holding attempt for {}s",
            delay.as_secs()
        );
        tokio::time::sleep(delay).await;
        Admission::LockedOut
    }

    /// Count a failed attempt and wait a short random time
    ///
    /// Returns the failure count after this attempt.
    pub async fn record_failure(&self) -> u32 {
        let failures = self.failures.fetch_add(1, Ordering::SeqCst).saturating_add(1);
        let delay = self.jitter_delay();
        debug!("Failed login #{}, delaying {:?}", failures, delay);
        tokio::time::sleep(delay).await;
        failures
    }

    /// Reset after a successful login
    pub fn record_success(&self) {
        self.failures.store(0, Ordering::SeqCst);
    }

    fn lockout_delay(&self) -> Duration {
        let min = self.config.lockout_min_secs;
        let max = self.config.lockout_max_secs.max(min);
        Duration::from_secs(rand::thread_rng().gen_range(min..=max))
    }

    fn jitter_delay(&self) -> Duration {
        let tenths = rand::thread_rng().gen_range(0..=self.config.jitter_max_tenths);
        Duration::from_millis(u64::from(tenths) * 100)
    }
}

impl Default for LoginAttemptLimiter {
    fn default() -> Self {
        Self::new(LimiterConfig::default())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::Arc;
    use tokio::time::Instant;

    #[tokio::test(start_paused = true)]
    async fn test_fourth_attempt_is_locked_out() {
        let limiter = LoginAttemptLimiter::default();

        for expected in 1..=3 {
            assert_eq!(limiter.admit().await, Admission::Open);
            assert_eq!(limiter.record_failure().await, expected);
        }

        let start = Instant::now();
        assert_eq!(limiter.admit().await, Admission::LockedOut);
        let waited = start.elapsed();
        assert!(waited >= Duration::from_secs(5) && waited <= Duration::from_secs(10));
        assert_eq!(limiter.failures(), 0);

        // The lockout rearms the gate
        assert_eq!(limiter.admit().await, Admission::Open);
    }

    #[tokio::test(start_paused = true)]
    async fn test_success_resets() {
        let limiter = LoginAttemptLimiter::default();
        limiter.record_failure().await;
        limiter.record_failure().await;
        limiter.record_success();
        assert_eq!(limiter.failures(), 0);
        assert_eq!(limiter.admit().await, Admission::Open);
    }

    #[tokio::test(start_paused = true)]
    async fn test_failure_jitter_is_bounded() {
        let limiter = LoginAttemptLimiter::default();
        for _ in 0..10 {
            let start = Instant::now();
            limiter.record_failure().await;
            let waited = start.elapsed();
            assert!(waited <= Duration::from_millis(900));
            assert_eq!(waited.as_millis() % 100, 0);
        }
    }

    #[tokio::test(start_paused = true)]
    async fn test_concurrent_failures_are_all_counted() {
        let limiter = Arc::new(LoginAttemptLimiter::new(LimiterConfig {
            threshold: 1000,
            ..Default::default()
        }));

        let tasks: Vec<_> = (0..64)
            .map(|_| {
                let limiter = limiter.clone();
                tokio::spawn(async move { limiter.record_failure().await })
            })
            .collect();
        for task in tasks {
            task.await.unwrap();
        }
        assert_eq!(limiter.failures(), 64);
    }

    #[tokio::test(start_paused = true)]
    async fn test_only_one_concurrent_attempt_takes_lockout() {
        let limiter = Arc::new(LoginAttemptLimiter::default());
        for _ in 0..3 {
            limiter.record_failure().await;
        }

        let tasks: Vec<_> = (0..8)
            .map(|_| {
                let limiter = limiter.clone();
                tokio::spawn(async move { limiter.admit().await })
            })
            .collect();
        let mut locked = 0;
        for task in tasks {
            if task.await.unwrap() == Admission::LockedOut {
                locked += 1;
            }
        }
        assert_eq!(locked, 1);
    }
}
