//! Retry with exponential backoff.
//!
//! Policy-agnostic: every error returned by the operation is retried until
//! the budget runs out. Callers classify non-retryable errors before getting
//! here. The last error is returned as-is.

use std::future::Future;
use std::time::Duration;

use tracing::warn;

/// Retry budget for one unit of work.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct BackoffPolicy {
    /// Retries after the first attempt; total calls = `retries + 1`.
    pub retries: u32,
    pub initial_delay: Duration,
}

impl BackoffPolicy {
    pub fn new(retries: u32, initial_delay: Duration) -> Self {
        Self {
            retries,
            initial_delay,
        }
    }

    /// Delay before retry number `n` (1-based): `initial_delay * 2^(n-1)`.
    pub fn delay_for(&self, n: u32) -> Duration {
        let shift = n.saturating_sub(1).min(31);
        self.initial_delay.saturating_mul(1u32 << shift)
    }
}

/// Runs `op` until it succeeds or `policy.retries` retries are spent.
///
/// Before each wait, `on_retry(&error, attempts_left)` is awaited, where
/// `attempts_left` counts the retries still available including the one
/// about to happen. The wait is a `tokio::time::sleep`, so other tasks keep
/// running while this one backs off.
pub async fn retry_with_backoff<T, E, Op, Fut, OnRetry, RetryFut>(
    policy: BackoffPolicy,
    mut op: Op,
    mut on_retry: OnRetry,
) -> Result<T, E>
where
    E: std::fmt::Display,
    Op: FnMut() -> Fut,
    Fut: Future<Output = Result<T, E>>,
    OnRetry: FnMut(&E, u32) -> RetryFut,
    RetryFut: Future<Output = ()>,
{
    let mut attempts_left = policy.retries;

    loop {
        let err = match op().await {
            Ok(value) => return Ok(value),
            Err(err) => err,
        };

        if attempts_left == 0 {
            return Err(err);
        }

        let delay = policy.delay_for(policy.retries - attempts_left + 1);
        on_retry(&err, attempts_left).await;
        warn!(
            "Attempt failed ({err}); retrying in {}ms, {attempts_left} retries left",
            delay.as_millis()
        );
        tokio::time::sleep(delay).await;

        attempts_left -= 1;
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::{Arc, Mutex};
    use tokio::time::Instant;

    #[derive(Debug, PartialEq)]
    enum Boom {
        Transient(u32),
        Fatal,
    }

    impl std::fmt::Display for Boom {
        fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
            write!(f, "{self:?}")
        }
    }

    async fn retry<T, Op, Fut>(policy: BackoffPolicy, op: Op) -> Result<T, Boom>
    where
        Op: FnMut() -> Fut,
        Fut: Future<Output = Result<T, Boom>>,
    {
        retry_with_backoff(policy, op, |_, _| async {}).await
    }

    #[tokio::test(start_paused = true)]
    async fn test_delays_double_between_attempts() {
        let calls = Arc::new(Mutex::new(Vec::<Instant>::new()));
        let policy = BackoffPolicy::new(3, Duration::from_millis(100));

        let result: Result<(), Boom> = retry(policy, || {
            let calls = calls.clone();
            async move {
                calls.lock().unwrap().push(Instant::now());
                Err(Boom::Fatal)
            }
        })
        .await;
        assert_eq!(result, Err(Boom::Fatal));

        let calls = calls.lock().unwrap();
        assert_eq!(calls.len(), 4);
        let gaps: Vec<Duration> = calls.windows(2).map(|w| w[1] - w[0]).collect();
        let expected = [100, 200, 400].map(Duration::from_millis);
        for (gap, want) in gaps.iter().zip(expected) {
            // The paused clock can land up to one timer tick late.
            assert!(
                *gap >= want && *gap < want + Duration::from_millis(5),
                "gap {gap:?}, expected {want:?}"
            );
        }
    }

    #[tokio::test(start_paused = true)]
    async fn test_success_after_failures_stops_retrying() {
        let attempts = Arc::new(Mutex::new(0u32));
        let policy = BackoffPolicy::new(5, Duration::from_millis(10));

        let result = retry(policy, || {
            let attempts = attempts.clone();
            async move {
                let mut n = attempts.lock().unwrap();
                *n += 1;
                if *n < 3 {
                    Err(Boom::Transient(*n))
                } else {
                    Ok(*n)
                }
            }
        })
        .await;

        assert_eq!(result, Ok(3));
        assert_eq!(*attempts.lock().unwrap(), 3);
    }

    #[tokio::test(start_paused = true)]
    async fn test_exhaustion_returns_last_error_unchanged() {
        let attempts = Arc::new(Mutex::new(0u32));
        let policy = BackoffPolicy::new(2, Duration::from_millis(10));

        let result: Result<(), Boom> = retry(policy, || {
            let attempts = attempts.clone();
            async move {
                let mut n = attempts.lock().unwrap();
                *n += 1;
                Err(Boom::Transient(*n))
            }
        })
        .await;

        assert_eq!(result, Err(Boom::Transient(3)));
    }

    #[tokio::test(start_paused = true)]
    async fn test_on_retry_sees_each_failure_with_attempts_left() {
        let seen = Arc::new(Mutex::new(Vec::new()));
        let policy = BackoffPolicy::new(2, Duration::from_millis(10));
        let attempts = Arc::new(Mutex::new(0u32));

        let _: Result<(), Boom> = retry_with_backoff(
            policy,
            || {
                let attempts = attempts.clone();
                async move {
                    let mut n = attempts.lock().unwrap();
                    *n += 1;
                    Err(Boom::Transient(*n))
                }
            },
            |err, left| {
                seen.lock().unwrap().push((err.to_string(), left));
                async {}
            },
        )
        .await;

        assert_eq!(
            *seen.lock().unwrap(),
            vec![
                ("Transient(1)".to_string(), 2),
                ("Transient(2)".to_string(), 1)
            ]
        );
    }

    #[tokio::test(start_paused = true)]
    async fn test_zero_retries_calls_once() {
        let attempts = Arc::new(Mutex::new(0u32));
        let result: Result<(), Boom> = retry(BackoffPolicy::new(0, Duration::from_secs(1)), || {
            let attempts = attempts.clone();
            async move {
                *attempts.lock().unwrap() += 1;
                Err(Boom::Fatal)
            }
        })
        .await;
        assert_eq!(result, Err(Boom::Fatal));
        assert_eq!(*attempts.lock().unwrap(), 1);
    }

    #[test]
    fn test_delay_for_matches_doubling() {
        let policy = BackoffPolicy::new(3, Duration::from_millis(100));
        assert_eq!(policy.delay_for(1), Duration::from_millis(100));
        assert_eq!(policy.delay_for(2), Duration::from_millis(200));
        assert_eq!(policy.delay_for(3), Duration::from_millis(400));
    }
}
