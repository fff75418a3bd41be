//! Retry with randomized exponential backoff around fallible async calls.

use rand::Rng;
use std::fmt::Display;
use std::future::Future;
use std::time::Duration;
use tracing::warn;

/// Retry policy configuration.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RetryPolicy {
    /// Total attempts including the first call
    pub max_attempts: u32,
    /// Lower bound of every delay
    pub floor: Duration,
    /// Upper bound of every delay
    pub ceiling: Duration,
    /// Base of the exponential window: `multiplier * 2^(attempt - 1)`
    pub multiplier: Duration,
}

impl Default for RetryPolicy {
    fn default() -> Self {
        Self {
            max_attempts: 5,
            floor: Duration::from_secs(1),
            ceiling: Duration::from_secs(60),
            multiplier: Duration::from_secs(1),
        }
    }
}

/// All attempts failed; holds the final attempt's error.
#[derive(Debug)]
pub struct RetryExhausted<E> {
    pub attempts: u32,
    pub last_error: E,
}

impl RetryPolicy {
    /// Policy that retries immediately, for tests and local runs.
    pub fn immediate(max_attempts: u32) -> Self {
        Self {
            max_attempts,
            floor: Duration::ZERO,
            ceiling: Duration::ZERO,
            multiplier: Duration::ZERO,
        }
    }

    /// Upper bound of the random window after the given failed attempt (1-indexed).
    pub fn window_for_attempt(&self, attempt: u32) -> Duration {
        let exponent = attempt.saturating_sub(1).min(31);
        let window = self.multiplier.saturating_mul(1u32 << exponent);
        window.clamp(self.floor, self.ceiling.max(self.floor))
    }

    /// Random delay in `[floor, window]` after the given failed attempt.
    pub fn delay_for_attempt(&self, attempt: u32) -> Duration {
        let high = self.window_for_attempt(attempt).as_millis() as u64;
        let low = (self.floor.as_millis() as u64).min(high);
        Duration::from_millis(rand::rng().random_range(low..=high))
    }

    /// Run `op` until it succeeds or attempts run out.
    pub async fn run<T, E, F, Fut>(&self, label: &str, mut op: F) -> Result<T, RetryExhausted<E>>
    where
        F: FnMut(u32) -> Fut,
        Fut: Future<Output = Result<T, E>>,
        E: Display,
    {
        let max_attempts = self.max_attempts.max(1);
        let mut attempt = 1;
        loop {
            match op(attempt).await {
                Ok(value) => return Ok(value),
                Err(err) if attempt >= max_attempts => {
                    warn!("{} failed on final attempt {}/{}: {}", label, attempt, max_attempts, err);
                    return Err(RetryExhausted {
                        attempts: attempt,
                        last_error: err,
                    });
                }
                Err(err) => {
                    let delay = self.delay_for_attempt(attempt);
                    warn!(
                        "{} failed on attempt {}/{}: {}. Retrying in {:?}",
                        label, attempt, max_attempts, err, delay
                    );
                    if !delay.is_zero() {
                        tokio::time::sleep(delay).await;
                    }
                    attempt += 1;
                }
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::atomic::{AtomicU32, Ordering};

    #[tokio::test]
    async fn test_exhausts_exactly_max_attempts_and_keeps_last_error() {
        let calls = AtomicU32::new(0);
        let policy = RetryPolicy::immediate(5);

        let result: Result<(), _> = policy
            .run("flaky call", |attempt| {
                calls.fetch_add(1, Ordering::SeqCst);
                async move { Err(format!("failure {}", attempt)) }
            })
            .await;

        let exhausted = result.unwrap_err();
        assert_eq!(calls.load(Ordering::SeqCst), 5);
        assert_eq!(exhausted.attempts, 5);
        assert_eq!(exhausted.last_error, "failure 5");
    }

    #[tokio::test]
    async fn test_stops_on_first_success() {
        let calls = AtomicU32::new(0);
        let policy = RetryPolicy::immediate(5);

        let value = policy
            .run("recovering call", |attempt| {
                calls.fetch_add(1, Ordering::SeqCst);
                async move {
                    if attempt < 3 {
                        Err("not yet")
                    } else {
                        Ok(attempt)
                    }
                }
            })
            .await
            .unwrap();

        assert_eq!(value, 3);
        assert_eq!(calls.load(Ordering::SeqCst), 3);
    }

    #[test]
    fn test_window_grows_then_caps() {
        let policy = RetryPolicy::default();
        assert_eq!(policy.window_for_attempt(1), Duration::from_secs(1));
        assert_eq!(policy.window_for_attempt(2), Duration::from_secs(2));
        assert_eq!(policy.window_for_attempt(4), Duration::from_secs(8));
        assert_eq!(policy.window_for_attempt(7), Duration::from_secs(60));
        assert_eq!(policy.window_for_attempt(40), Duration::from_secs(60));
    }

    #[test]
    fn test_delay_within_floor_and_ceiling() {
        let policy = RetryPolicy::default();
        for attempt in 1..=10 {
            let delay = policy.delay_for_attempt(attempt);
            assert!(delay >= policy.floor);
            assert!(delay <= policy.ceiling);
            assert!(delay <= policy.window_for_attempt(attempt));
        }
    }

    #[tokio::test(start_paused = true)]
    async fn test_sleeps_between_attempts() {
        let policy = RetryPolicy {
            max_attempts: 3,
            floor: Duration::from_secs(1),
            ceiling: Duration::from_secs(1),
            multiplier: Duration::from_secs(1),
        };
        let start = tokio::time::Instant::now();
        let result: Result<(), _> = policy.run("slow call", |_| async { Err("down") }).await;

        assert!(result.is_err());
        let elapsed = start.elapsed();
        assert!(elapsed >= Duration::from_secs(2));
        assert!(elapsed < Duration::from_secs(3));
    }
}
