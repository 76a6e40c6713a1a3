//! Retry with backoff, shared by the connection check and template setup.

use std::future::Future;
use std::time::Duration;
use tokio::time::sleep;
use tracing::warn;

/// How many times an operation may be retried after its first attempt.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RetryLimit {
    Bounded(u32),
    Unbounded,
}

/// Delay schedule for [`BackoffOperation`].
#[derive(Debug, Clone)]
pub struct BackoffPolicy {
    pub limit: RetryLimit,
    pub initial_delay: Duration,
    /// Multiplier applied per retry. `1.0` gives a fixed delay.
    pub factor: f64,
    pub max_delay: Duration,
}

impl Default for BackoffPolicy {
    fn default() -> Self {
        Self {
            limit: RetryLimit::Unbounded,
            initial_delay: Duration::from_secs(1),
            factor: 1.0,
            max_delay: Duration::from_secs(10),
        }
    }
}

impl BackoffPolicy {
    pub fn with_limit(mut self, limit: RetryLimit) -> Self {
        self.limit = limit;
        self
    }

    /// Delay before retry number `retry` (zero based), capped at `max_delay`.
    pub fn delay(&self, retry: u32) -> Duration {
        let millis = self.initial_delay.as_millis() as f64 * self.factor.powi(retry as i32);
        let max = self.max_delay.as_millis() as f64;
        Duration::from_millis(millis.min(max) as u64)
    }

    pub fn should_retry(&self, retries_done: u32) -> bool {
        match self.limit {
            RetryLimit::Bounded(max) => retries_done < max,
            RetryLimit::Unbounded => true,
        }
    }
}

/// Why [`BackoffOperation::run`] gave up.
#[derive(Debug)]
pub enum BackoffError<E> {
    /// Bounded retries ran out; carries the last attempt's error.
    Exhausted { attempts: u32, last: E },
    /// The cancellation future resolved before the operation succeeded.
    Cancelled,
}

/// Runs an async attempt until it succeeds, retries run out or the
/// operation is cancelled.
#[derive(Debug, Clone)]
pub struct BackoffOperation {
    name: &'static str,
    policy: BackoffPolicy,
}

impl BackoffOperation {
    pub fn new(name: &'static str, policy: BackoffPolicy) -> Self {
        Self { name, policy }
    }

    pub fn policy(&self) -> &BackoffPolicy {
        &self.policy
    }

    /// Drive `attempt` to completion.
    ///
    /// **Parameters**
    /// - `attempt`: produces one try of the operation per call.
    /// - `cancelled`: resolves when the caller no longer wants a result.
    ///   It is checked between attempts and while waiting out a delay; an
    ///   attempt already in flight is allowed to finish.
    pub async fn run<T, E, F, Fut, C>(&self, mut attempt: F, cancelled: C) -> Result<T, BackoffError<E>>
    where
        F: FnMut() -> Fut,
        Fut: Future<Output = Result<T, E>>,
        E: std::fmt::Display,
        C: Future<Output = ()>,
    {
        tokio::pin!(cancelled);
        let mut retries = 0u32;

        loop {
            let err = match attempt().await {
                Ok(value) => return Ok(value),
                Err(err) => err,
            };

            if !self.policy.should_retry(retries) {
                return Err(BackoffError::Exhausted {
                    attempts: retries + 1,
                    last: err,
                });
            }

            let delay = self.policy.delay(retries);
            warn!(
                operation = self.name,
                attempt = retries + 1,
                delay_ms = delay.as_millis() as u64,
                error = %err,
                "attempt failed, retrying"
            );
            retries += 1;

            tokio::select! {
                biased;
                _ = &mut cancelled => return Err(BackoffError::Cancelled),
                _ = sleep(delay) => {}
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::future::pending;
    use std::sync::atomic::{AtomicU32, Ordering};
    use std::sync::Arc;

    fn fast_policy(limit: RetryLimit) -> BackoffPolicy {
        BackoffPolicy {
            limit,
            initial_delay: Duration::from_millis(10),
            factor: 2.0,
            max_delay: Duration::from_millis(50),
        }
    }

    #[test]
    fn delay_grows_and_is_capped() {
        let policy = fast_policy(RetryLimit::Unbounded);
        assert_eq!(policy.delay(0), Duration::from_millis(10));
        assert_eq!(policy.delay(1), Duration::from_millis(20));
        assert_eq!(policy.delay(2), Duration::from_millis(40));
        assert_eq!(policy.delay(3), Duration::from_millis(50));
        assert_eq!(policy.delay(30), Duration::from_millis(50));
    }

    #[test]
    fn fixed_delay_with_unit_factor() {
        let policy = BackoffPolicy::default();
        assert_eq!(policy.delay(0), policy.delay(5));
    }

    #[tokio::test(start_paused = true)]
    async fn succeeds_after_transient_failures() {
        let calls = Arc::new(AtomicU32::new(0));
        let op = BackoffOperation::new("test", fast_policy(RetryLimit::Unbounded));

        let counter = calls.clone();
        let result: Result<u32, BackoffError<String>> = op
            .run(
                move || {
                    let counter = counter.clone();
                    async move {
                        let n = counter.fetch_add(1, Ordering::SeqCst);
                        if n < 3 {
                            Err(format!("fail {n}"))
                        } else {
                            Ok(n)
                        }
                    }
                },
                pending(),
            )
            .await;

        assert_eq!(result.unwrap(), 3);
        assert_eq!(calls.load(Ordering::SeqCst), 4);
    }

    #[tokio::test(start_paused = true)]
    async fn bounded_retries_report_exhaustion() {
        let calls = Arc::new(AtomicU32::new(0));
        let op = BackoffOperation::new("test", fast_policy(RetryLimit::Bounded(2)));

        let counter = calls.clone();
        let result: Result<(), BackoffError<String>> = op
            .run(
                move || {
                    counter.fetch_add(1, Ordering::SeqCst);
                    async { Err("down".to_string()) }
                },
                pending(),
            )
            .await;

        match result {
            Err(BackoffError::Exhausted { attempts, last }) => {
                assert_eq!(attempts, 3);
                assert_eq!(last, "down");
            }
            other => panic!("unexpected result: {other:?}"),
        }
        assert_eq!(calls.load(Ordering::SeqCst), 3);
    }

    #[tokio::test(start_paused = true)]
    async fn cancellation_interrupts_the_wait() {
        let op = BackoffOperation::new("test", fast_policy(RetryLimit::Unbounded));
        let result: Result<(), BackoffError<String>> = op
            .run(
                || async { Err("down".to_string()) },
                sleep(Duration::from_millis(25)),
            )
            .await;
        assert!(matches!(result, Err(BackoffError::Cancelled)));
    }
}
