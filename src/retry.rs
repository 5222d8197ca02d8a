// src/retry.rs
//! Bounded exponential backoff for AI capability calls, plus the adaptive
//! delay used to pace sequential external calls.

use std::future::Future;
use std::sync::atomic::{AtomicU32, Ordering};
use std::sync::Mutex;
use std::time::Duration;

use backoff::{future::retry, ExponentialBackoff};
use tracing::{debug, warn};

use crate::error::CapabilityError;

/// Initial delay `initial_delay`, doubling per attempt, capped at `max_delay`,
/// at most `max_attempts` calls in total.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct RetryPolicy {
    pub initial_delay: Duration,
    pub max_delay: Duration,
    pub max_attempts: u32,
}

impl Default for RetryPolicy {
    fn default() -> Self {
        Self {
            initial_delay: Duration::from_secs(1),
            max_delay: Duration::from_secs(30),
            max_attempts: 3,
        }
    }
}

impl RetryPolicy {
    fn backoff(&self) -> ExponentialBackoff {
        ExponentialBackoff {
            current_interval: self.initial_delay,
            initial_interval: self.initial_delay,
            randomization_factor: 0.0,
            multiplier: 2.0,
            max_interval: self.max_delay,
            max_elapsed_time: None,
            ..Default::default()
        }
    }

    /// Calls `operation` until it succeeds, fails with a non-retryable error,
    /// or runs out of attempts. Outcomes are reported to `pacing`.
    pub async fn run<T, F, Fut>(
        &self,
        label: &str,
        pacing: Option<&AdaptiveDelay>,
        mut operation: F,
    ) -> Result<T, CapabilityError>
    where
        F: FnMut() -> Fut,
        Fut: Future<Output = Result<T, CapabilityError>>,
    {
        let attempts = AtomicU32::new(0);
        let max_attempts = self.max_attempts.max(1);
        let max_delay = self.max_delay;

        retry(self.backoff(), || {
            let attempt = attempts.fetch_add(1, Ordering::SeqCst) + 1;
            let call = operation();
            async move {
                match call.await {
                    Ok(value) => {
                        if let Some(pacing) = pacing {
                            pacing.on_success();
                        }
                        if attempt > 1 {
                            debug!("{} succeeded on attempt {}", label, attempt);
                        }
                        Ok(value)
                    }
                    Err(err) => {
                        if err.is_rate_limit() {
                            if let Some(pacing) = pacing {
                                pacing.on_rate_limited();
                            }
                        }
                        if !err.is_retryable() {
                            warn!("{} failed with non-retryable error: {}", label, err);
                            return Err(backoff::Error::permanent(err));
                        }
                        if attempt >= max_attempts {
                            warn!("{} failed after {} attempts: {}", label, attempt, err);
                            return Err(backoff::Error::permanent(err));
                        }
                        warn!(
                            "{} failed on attempt {}/{} (retrying): {}",
                            label, attempt, max_attempts, err
                        );
                        match err.retry_after() {
                            Some(after) => Err(backoff::Error::retry_after(err, after.min(max_delay))),
                            None => Err(backoff::Error::transient(err)),
                        }
                    }
                }
            }
        })
        .await
    }
}

/// Delay inserted between sequential external calls.
///
/// Successes relax it by `relax_factor` down to `min`; rate limits multiply it
/// by `backoff_factor` up to `max`.
#[derive(Debug)]
pub struct AdaptiveDelay {
    current: Mutex<Duration>,
    min: Duration,
    max: Duration,
    relax_factor: f64,
    backoff_factor: f64,
}

impl AdaptiveDelay {
    pub fn new(initial: Duration, min: Duration, max: Duration) -> Self {
        let min = min.min(max);
        Self {
            current: Mutex::new(initial.clamp(min, max)),
            min,
            max,
            relax_factor: 0.9,
            backoff_factor: 2.0,
        }
    }

    /// No pause at all, for tests and dry runs.
    pub fn disabled() -> Self {
        Self::new(Duration::ZERO, Duration::ZERO, Duration::ZERO)
    }

    pub fn current(&self) -> Duration {
        *self.current.lock().unwrap_or_else(|p| p.into_inner())
    }

    pub async fn pause(&self) {
        let delay = self.current();
        if !delay.is_zero() {
            debug!("Pacing external calls, waiting {:?}", delay);
            tokio::time::sleep(delay).await;
        }
    }

    pub fn on_success(&self) {
        let mut current = self.current.lock().unwrap_or_else(|p| p.into_inner());
        *current = current.mul_f64(self.relax_factor).max(self.min);
    }

    pub fn on_rate_limited(&self) {
        let mut current = self.current.lock().unwrap_or_else(|p| p.into_inner());
        *current = current.mul_f64(self.backoff_factor).min(self.max);
        warn!("Rate limited, call pacing raised to {:?}", *current);
    }
}

impl Default for AdaptiveDelay {
    fn default() -> Self {
        Self::new(
            Duration::from_secs(1),
            Duration::from_millis(500),
            Duration::from_secs(60),
        )
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::atomic::AtomicUsize;

    fn fast_policy() -> RetryPolicy {
        RetryPolicy {
            initial_delay: Duration::from_millis(1),
            max_delay: Duration::from_millis(4),
            max_attempts: 3,
        }
    }

    fn rate_limited() -> CapabilityError {
        CapabilityError::RateLimited {
            retry_after: None,
            message: "429".to_string(),
        }
    }

    #[tokio::test]
    async fn test_retryable_errors_are_retried_until_success() {
        let calls = AtomicUsize::new(0);
        let result = fast_policy()
            .run("text", None, || async {
                if calls.fetch_add(1, Ordering::SeqCst) < 2 {
                    Err(CapabilityError::Unavailable("503".to_string()))
                } else {
                    Ok("done")
                }
            })
            .await;
        assert_eq!(result, Ok("done"));
        assert_eq!(calls.load(Ordering::SeqCst), 3);
    }

    #[tokio::test]
    async fn test_attempts_are_bounded() {
        let calls = AtomicUsize::new(0);
        let result: Result<(), _> = fast_policy()
            .run("text", None, || async {
                calls.fetch_add(1, Ordering::SeqCst);
                Err(rate_limited())
            })
            .await;
        assert!(matches!(result, Err(CapabilityError::RateLimited { .. })));
        assert_eq!(calls.load(Ordering::SeqCst), 3);
    }

    #[tokio::test]
    async fn test_non_retryable_error_aborts_immediately() {
        let calls = AtomicUsize::new(0);
        let result: Result<(), _> = fast_policy()
            .run("text", None, || async {
                calls.fetch_add(1, Ordering::SeqCst);
                Err(CapabilityError::Authentication("bad key".to_string()))
            })
            .await;
        assert!(matches!(result, Err(CapabilityError::Authentication(_))));
        assert_eq!(calls.load(Ordering::SeqCst), 1);
    }

    #[tokio::test]
    async fn test_outcomes_feed_adaptive_delay() {
        let pacing = AdaptiveDelay::new(
            Duration::from_millis(100),
            Duration::from_millis(50),
            Duration::from_millis(300),
        );
        let calls = AtomicUsize::new(0);
        let result = fast_policy()
            .run("image", Some(&pacing), || async {
                if calls.fetch_add(1, Ordering::SeqCst) == 0 {
                    Err(rate_limited())
                } else {
                    Ok(())
                }
            })
            .await;
        assert!(result.is_ok());
        // Doubled by the rate limit, then relaxed once by the success
        assert_eq!(pacing.current(), Duration::from_millis(200).mul_f64(0.9));
    }

    #[test]
    fn test_adaptive_delay_bounds() {
        let pacing = AdaptiveDelay::new(
            Duration::from_secs(1),
            Duration::from_millis(500),
            Duration::from_secs(60),
        );
        for _ in 0..20 {
            pacing.on_success();
        }
        assert_eq!(pacing.current(), Duration::from_millis(500));

        for _ in 0..20 {
            pacing.on_rate_limited();
        }
        assert_eq!(pacing.current(), Duration::from_secs(60));
    }

    #[tokio::test]
    async fn test_disabled_delay_does_not_sleep() {
        let pacing = AdaptiveDelay::disabled();
        pacing.on_rate_limited();
        assert_eq!(pacing.current(), Duration::ZERO);
        pacing.pause().await;
    }
}
