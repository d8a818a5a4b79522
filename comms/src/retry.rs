//! Bounded retry with exponential backoff for transient failures.

use std::{future::Future, num::NonZeroU32, time::Duration};

use log::warn;

/// How many times, and how patiently, a transient failure is retried.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct RetryPolicy {
    max_attempts: NonZeroU32,
    initial_backoff: Duration,
    max_backoff: Duration,
}

impl Default for RetryPolicy {
    /// Three attempts, waiting 2s and then 4s, never more than 10s.
    fn default() -> Self {
        Self {
            max_attempts: NonZeroU32::new(3).unwrap_or(NonZeroU32::MIN),
            initial_backoff: Duration::from_secs(2),
            max_backoff: Duration::from_secs(10),
        }
    }
}

impl RetryPolicy {
    /// Creates a new `RetryPolicy`.
    ///
    /// # Arguments
    /// * `max_attempts` - Total attempts, the first one included.
    /// * `initial_backoff` - Wait before the second attempt, doubled afterwards.
    /// * `max_backoff` - Upper bound for any single wait.
    ///
    /// # Returns
    /// A new `RetryPolicy` instance.
    pub fn new(max_attempts: NonZeroU32, initial_backoff: Duration, max_backoff: Duration) -> Self {
        Self {
            max_attempts,
            initial_backoff,
            max_backoff: max_backoff.max(initial_backoff),
        }
    }

    /// A policy that never retries.
    pub fn once() -> Self {
        Self::new(NonZeroU32::MIN, Duration::ZERO, Duration::ZERO)
    }

    pub fn max_attempts(&self) -> u32 {
        self.max_attempts.get()
    }

    /// Returns the wait that follows the failed attempt number `attempt` (1-based).
    pub fn backoff(&self, attempt: u32) -> Duration {
        let factor = 1u32.checked_shl(attempt.saturating_sub(1)).unwrap_or(u32::MAX);
        self.initial_backoff
            .checked_mul(factor)
            .unwrap_or(self.max_backoff)
            .min(self.max_backoff)
    }

    /// Runs `op` until it succeeds, fails permanently, or the attempts run out.
    ///
    /// # Arguments
    /// * `what` - Label used in the retry log lines.
    /// * `is_transient` - Decides whether an error deserves another attempt.
    /// * `op` - Produces a fresh future per attempt.
    ///
    /// # Returns
    /// The first success, or the last error observed.
    pub async fn run<T, E, F, Fut, P>(&self, what: &str, is_transient: P, mut op: F) -> Result<T, E>
    where
        F: FnMut() -> Fut,
        Fut: Future<Output = Result<T, E>>,
        P: Fn(&E) -> bool,
        E: std::fmt::Display,
    {
        let mut attempt = 1;

        loop {
            match op().await {
                Ok(value) => return Ok(value),
                Err(e) if attempt < self.max_attempts() && is_transient(&e) => {
                    let wait = self.backoff(attempt);
                    warn!(
                        "{what} failed on attempt {attempt}/{}: {e}, retrying in {wait:?}",
                        self.max_attempts()
                    );
                    tokio::time::sleep(wait).await;
                    attempt += 1;
                }
                Err(e) => return Err(e),
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use std::sync::atomic::{AtomicU32, Ordering};

    use super::*;

    fn fast(attempts: u32) -> RetryPolicy {
        RetryPolicy::new(
            NonZeroU32::new(attempts).unwrap(),
            Duration::from_millis(1),
            Duration::from_millis(4),
        )
    }

    #[test]
    fn backoff_doubles_and_caps() {
        let policy = RetryPolicy::default();

        assert_eq!(policy.backoff(1), Duration::from_secs(2));
        assert_eq!(policy.backoff(2), Duration::from_secs(4));
        assert_eq!(policy.backoff(3), Duration::from_secs(8));
        assert_eq!(policy.backoff(4), Duration::from_secs(10));
        assert_eq!(policy.backoff(40), Duration::from_secs(10));
    }

    #[tokio::test]
    async fn retries_transient_errors_until_success() {
        let calls = AtomicU32::new(0);

        let res: Result<u32, String> = fast(3)
            .run("op", |_| true, || async {
                let n = calls.fetch_add(1, Ordering::SeqCst) + 1;
                if n < 3 { Err(format!("flaky {n}")) } else { Ok(n) }
            })
            .await;

        assert_eq!(res, Ok(3));
    }

    #[tokio::test]
    async fn stops_after_max_attempts() {
        let calls = AtomicU32::new(0);

        let res: Result<(), String> = fast(2)
            .run("op", |_| true, || async {
                calls.fetch_add(1, Ordering::SeqCst);
                Err("down".to_string())
            })
            .await;

        assert_eq!(res, Err("down".to_string()));
        assert_eq!(calls.load(Ordering::SeqCst), 2);
    }

    #[tokio::test]
    async fn permanent_errors_are_not_retried() {
        let calls = AtomicU32::new(0);

        let res: Result<(), String> = fast(5)
            .run("op", |_| false, || async {
                calls.fetch_add(1, Ordering::SeqCst);
                Err("not found".to_string())
            })
            .await;

        assert!(res.is_err());
        assert_eq!(calls.load(Ordering::SeqCst), 1);
    }
}
