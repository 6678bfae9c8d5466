//! Exponential backoff for establishing the chain connection.
//!
//! Only connecting is retried. Submissions and queries fail fast.

use rand::Rng;
use std::future::Future;
use std::time::Duration;

/// Backoff settings for connection attempts
#[derive(Debug, Clone, PartialEq)]
pub struct BackoffConfig {
    /// Retries after the first attempt (0 = single attempt)
    pub max_retries: u32,
    pub initial_delay: Duration,
    /// Cap on a single delay
    pub max_delay: Duration,
    pub multiplier: f64,
    /// Fraction of the delay randomized in either direction (0.0-1.0)
    pub jitter: f64,
}

impl Default for BackoffConfig {
    fn default() -> Self {
        Self {
            max_retries: 3,
            initial_delay: Duration::from_millis(500),
            max_delay: Duration::from_secs(10),
            multiplier: 2.0,
            jitter: 0.3,
        }
    }
}

impl BackoffConfig {
    /// No retries and no waiting
    pub fn none() -> Self {
        Self {
            max_retries: 0,
            initial_delay: Duration::ZERO,
            max_delay: Duration::ZERO,
            multiplier: 1.0,
            jitter: 0.0,
        }
    }

    pub fn with_max_retries(mut self, max: u32) -> Self {
        self.max_retries = max;
        self
    }

    pub fn with_initial_delay(mut self, delay: Duration) -> Self {
        self.initial_delay = delay;
        self
    }

    pub fn with_jitter(mut self, jitter: f64) -> Self {
        self.jitter = jitter.clamp(0.0, 1.0);
        self
    }

    /// Delay before retry number `attempt` (0-indexed)
    pub fn delay_for_attempt(&self, attempt: u32) -> Duration {
        let base = self.initial_delay.as_secs_f64() * self.multiplier.powi(attempt as i32);
        let capped = base.min(self.max_delay.as_secs_f64());

        let delay = if self.jitter > 0.0 && capped > 0.0 {
            let spread = capped * self.jitter;
            let offset = rand::thread_rng().gen_range(-spread..=spread);
            (capped + offset).max(0.0)
        } else {
            capped
        };

        Duration::from_secs_f64(delay)
    }
}

/// Run `operation` until it succeeds or the retry budget is spent,
/// returning the last error on exhaustion.
pub async fn with_backoff<F, Fut, T, E>(
    config: &BackoffConfig,
    context: &str,
    operation: F,
) -> Result<T, E>
where
    F: Fn() -> Fut,
    Fut: Future<Output = Result<T, E>>,
    E: std::fmt::Display,
{
    let mut attempts = 0u32;

    loop {
        attempts += 1;

        match operation().await {
            Ok(value) => {
                if attempts > 1 {
                    tracing::info!(context, attempts, "Operation succeeded after retries");
                }
                return Ok(value);
            }
            Err(e) => {
                if attempts > config.max_retries {
                    tracing::warn!(
                        context,
                        attempts,
                        error = %e,
                        "Operation failed after all retries exhausted"
                    );
                    return Err(e);
                }

                let delay = config.delay_for_attempt(attempts - 1);
                tracing::warn!(
                    context,
                    attempt = attempts,
                    max_retries = config.max_retries,
                    delay_ms = delay.as_millis() as u64,
                    error = %e,
                    "Operation failed, will retry"
                );
                tokio::time::sleep(delay).await;
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::atomic::{AtomicU32, Ordering};
    use std::sync::Arc;

    #[test]
    fn test_delay_grows_and_caps() {
        let config = BackoffConfig {
            max_retries: 5,
            initial_delay: Duration::from_millis(100),
            max_delay: Duration::from_millis(350),
            multiplier: 2.0,
            jitter: 0.0,
        };
        assert_eq!(config.delay_for_attempt(0), Duration::from_millis(100));
        assert_eq!(config.delay_for_attempt(1), Duration::from_millis(200));
        assert_eq!(config.delay_for_attempt(2), Duration::from_millis(350));
        assert_eq!(config.delay_for_attempt(8), Duration::from_millis(350));
    }

    #[test]
    fn test_jitter_stays_in_range() {
        let config = BackoffConfig::default()
            .with_initial_delay(Duration::from_millis(100))
            .with_jitter(0.5);
        for _ in 0..50 {
            let delay = config.delay_for_attempt(0);
            assert!(delay >= Duration::from_millis(49));
            assert!(delay <= Duration::from_millis(151));
        }
    }

    #[tokio::test]
    async fn test_succeeds_after_failures() {
        let calls = Arc::new(AtomicU32::new(0));
        let config = BackoffConfig::none().with_max_retries(3);

        let count = calls.clone();
        let result: Result<u32, String> = with_backoff(&config, "test", || {
            let count = count.clone();
            async move {
                let n = count.fetch_add(1, Ordering::SeqCst);
                if n < 2 {
                    Err(format!("attempt {} failed", n))
                } else {
                    Ok(n)
                }
            }
        })
        .await;

        assert_eq!(result.unwrap(), 2);
        assert_eq!(calls.load(Ordering::SeqCst), 3);
    }

    #[tokio::test]
    async fn test_gives_up_after_budget() {
        let calls = Arc::new(AtomicU32::new(0));
        let config = BackoffConfig::none().with_max_retries(2);

        let count = calls.clone();
        let result: Result<(), String> = with_backoff(&config, "test", || {
            let count = count.clone();
            async move {
                count.fetch_add(1, Ordering::SeqCst);
                Err("down".to_string())
            }
        })
        .await;

        assert_eq!(result.unwrap_err(), "down");
        assert_eq!(calls.load(Ordering::SeqCst), 3);
    }
}
