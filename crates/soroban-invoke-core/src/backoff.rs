/// Exponential backoff for idempotent RPC reads
/// Submission and simulation are never retried through here
use std::fmt::Display;
use std::future::Future;
use std::time::Duration;
use tracing::{debug, warn};

/// Exponential backoff state tracker
#[derive(Debug, Clone)]
pub struct ExponentialBackoff {
    base_interval: Duration,
    max_interval: Duration,
    current_attempt: u32,
    current_interval: Duration,
}

impl ExponentialBackoff {
    pub fn new(base_interval: Duration, max_interval: Duration) -> Self {
        ExponentialBackoff {
            base_interval,
            max_interval,
            current_attempt: 0,
            current_interval: base_interval,
        }
    }

    /// Record a failure and return how long to wait before the next attempt
    pub fn on_failure(&mut self, error_message: &str) -> Duration {
        self.current_attempt += 1;

        // base * 2^(attempts - 1), capped
        let factor = 2_u32.saturating_pow(self.current_attempt.saturating_sub(1));
        self.current_interval = self
            .base_interval
            .saturating_mul(factor)
            .min(self.max_interval);

        warn!(
            attempt = self.current_attempt,
            interval_ms = self.current_interval.as_millis() as u64,
            error = error_message,
            "RPC failure: backing off before retry"
        );

        self.current_interval
    }

    pub fn on_success(&mut self) {
        if self.current_attempt > 0 {
            debug!(attempts = self.current_attempt, "RPC recovered, resetting backoff");
        }
        self.current_attempt = 0;
        self.current_interval = self.base_interval;
    }

    pub fn attempts(&self) -> u32 {
        self.current_attempt
    }

    pub fn interval(&self) -> Duration {
        self.current_interval
    }

    pub fn should_give_up(&self, max_total_attempts: u32) -> bool {
        self.current_attempt >= max_total_attempts
    }
}

/// Run `operation` until it succeeds, fails with a non-retryable error, or
/// `max_attempts` failures have been recorded
pub async fn execute_with_backoff<F, Fut, T, E>(
    mut backoff: ExponentialBackoff,
    max_attempts: u32,
    is_retryable: impl Fn(&E) -> bool,
    mut operation: F,
) -> Result<T, E>
where
    F: FnMut() -> Fut,
    Fut: Future<Output = Result<T, E>>,
    E: Display,
{
    loop {
        match operation().await {
            Ok(result) => {
                backoff.on_success();
                return Ok(result);
            }
            Err(err) if !is_retryable(&err) => return Err(err),
            Err(err) => {
                let wait = backoff.on_failure(&err.to_string());
                if backoff.should_give_up(max_attempts) {
                    warn!(attempts = backoff.attempts(), error = %err, "Giving up");
                    return Err(err);
                }
                tokio::time::sleep(wait).await;
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::atomic::{AtomicU32, Ordering};

    #[test]
    fn test_exponential_backoff_sequence() {
        let mut backoff = ExponentialBackoff::new(Duration::from_millis(100), Duration::from_secs(10));

        assert_eq!(backoff.on_failure("e1"), Duration::from_millis(100));
        assert_eq!(backoff.on_failure("e2"), Duration::from_millis(200));
        assert_eq!(backoff.on_failure("e3"), Duration::from_millis(400));
        assert_eq!(backoff.attempts(), 3);
    }

    #[test]
    fn test_backoff_max_interval() {
        let mut backoff = ExponentialBackoff::new(Duration::from_millis(100), Duration::from_secs(1));
        for _ in 0..10 {
            backoff.on_failure("test");
        }
        assert_eq!(backoff.interval(), Duration::from_secs(1));

        backoff.on_success();
        assert_eq!(backoff.attempts(), 0);
        assert_eq!(backoff.interval(), Duration::from_millis(100));
    }

    #[tokio::test]
    async fn test_retries_until_success() {
        let calls = AtomicU32::new(0);
        let backoff = ExponentialBackoff::new(Duration::from_millis(1), Duration::from_millis(5));

        let result = execute_with_backoff(backoff, 5, |_: &String| true, || {
            let n = calls.fetch_add(1, Ordering::SeqCst);
            async move {
                if n < 2 {
                    Err(format!("failure {}", n))
                } else {
                    Ok(n)
                }
            }
        })
        .await;

        assert_eq!(result, Ok(2));
        assert_eq!(calls.load(Ordering::SeqCst), 3);
    }

    #[tokio::test]
    async fn test_non_retryable_fails_fast() {
        let calls = AtomicU32::new(0);
        let backoff = ExponentialBackoff::new(Duration::from_millis(1), Duration::from_millis(5));

        let result: Result<(), String> =
            execute_with_backoff(backoff, 5, |_: &String| false, || {
                calls.fetch_add(1, Ordering::SeqCst);
                async { Err("fatal".to_string()) }
            })
            .await;

        assert!(result.is_err());
        assert_eq!(calls.load(Ordering::SeqCst), 1);
    }

    #[tokio::test]
    async fn test_gives_up_after_max_attempts() {
        let calls = AtomicU32::new(0);
        let backoff = ExponentialBackoff::new(Duration::from_millis(1), Duration::from_millis(5));

        let result: Result<(), String> = execute_with_backoff(backoff, 3, |_: &String| true, || {
            calls.fetch_add(1, Ordering::SeqCst);
            async { Err("down".to_string()) }
        })
        .await;

        assert_eq!(result, Err("down".to_string()));
        assert_eq!(calls.load(Ordering::SeqCst), 3);
    }
}
