//! Bounded retry for fallible async operations.
//!
//! Only session initialization goes through this; per-target fetches are
//! bounded by a deadline instead, so one slow target cannot starve the
//! rest of the cycle.

use std::fmt::Display;
use std::future::Future;
use std::time::Duration;

#[derive(Debug, Clone, Copy)]
pub struct RetryPolicy {
    pub max_attempts: u32,
    pub delay: Duration,
}

impl RetryPolicy {
    pub fn new(max_attempts: u32, delay: Duration) -> Self {
        Self {
            max_attempts: max_attempts.max(1),
            delay,
        }
    }

    /// Run `op` up to `max_attempts` times, sleeping `delay` between
    /// attempts. Only errors for which `retryable` returns true are
    /// retried; anything else propagates immediately. The last failing
    /// attempt's error is returned unchanged.
    pub async fn attempt<T, E, Fut, Op, Ret>(&self, what: &str, mut op: Op, retryable: Ret) -> Result<T, E>
    where
        Op: FnMut() -> Fut,
        Fut: Future<Output = Result<T, E>>,
        Ret: Fn(&E) -> bool,
        E: Display,
    {
        for attempt in 1..=self.max_attempts {
            match op().await {
                Ok(v) => {
                    if attempt > 1 {
                        tracing::info!(what, attempt, "succeeded after retry");
                    }
                    return Ok(v);
                }
                Err(e) if attempt < self.max_attempts && retryable(&e) => {
                    tracing::warn!(
                        what,
                        attempt,
                        max_attempts = self.max_attempts,
                        error = %e,
                        "attempt failed, retrying after {:?}",
                        self.delay
                    );
                    tokio::time::sleep(self.delay).await;
                }
                Err(e) => {
                    if attempt == self.max_attempts && retryable(&e) {
                        tracing::error!(what, attempts = self.max_attempts, error = %e, "retries exhausted");
                    }
                    return Err(e);
                }
            }
        }
        unreachable!("retry loop always returns")
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::atomic::{AtomicU32, Ordering};

    fn immediate() -> RetryPolicy {
        RetryPolicy::new(3, Duration::ZERO)
    }

    #[tokio::test]
    async fn succeeds_after_transient_failures() {
        let calls = AtomicU32::new(0);
        let out: Result<u32, String> = immediate()
            .attempt(
                "op",
                || {
                    let n = calls.fetch_add(1, Ordering::SeqCst);
                    async move {
                        if n < 2 {
                            Err("transient".to_string())
                        } else {
                            Ok(42)
                        }
                    }
                },
                |_| true,
            )
            .await;
        assert_eq!(out.unwrap(), 42);
        assert_eq!(calls.load(Ordering::SeqCst), 3);
    }

    #[tokio::test]
    async fn non_retryable_propagates_immediately() {
        let calls = AtomicU32::new(0);
        let out: Result<(), String> = immediate()
            .attempt(
                "op",
                || {
                    calls.fetch_add(1, Ordering::SeqCst);
                    async { Err("fatal".to_string()) }
                },
                |e| e != "fatal",
            )
            .await;
        assert_eq!(out.unwrap_err(), "fatal");
        assert_eq!(calls.load(Ordering::SeqCst), 1);
    }

    #[tokio::test]
    async fn exhaustion_returns_last_error() {
        let calls = AtomicU32::new(0);
        let out: Result<(), String> = immediate()
            .attempt(
                "op",
                || {
                    let n = calls.fetch_add(1, Ordering::SeqCst);
                    async move { Err(format!("err-{n}")) }
                },
                |_| true,
            )
            .await;
        assert_eq!(out.unwrap_err(), "err-2");
        assert_eq!(calls.load(Ordering::SeqCst), 3);
    }
}
