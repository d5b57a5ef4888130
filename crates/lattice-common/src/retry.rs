//! Retry utilities with exponential backoff and cancellation.
//!
//! Wraps any async operation that may fail transiently. Each failure is run
//! through a caller-supplied classifier: terminal errors are returned at once,
//! retryable errors are retried with a doubling delay capped at `max_delay`
//! until the attempt budget runs out. A [`CancellationToken`] aborts both an
//! in-flight attempt and the wait between attempts.
//!
//! # Example
//!
//! ```ignore
//! use lattice_common::retry::{retry_with_backoff, RetryConfig};
//!
//! let cluster = retry_with_backoff(
//!     &RetryConfig::with_max_attempts(4),
//!     "get_cluster",
//!     &cancel,
//!     |e: &BackendError| e.is_retryable(),
//!     || backend.get(resource, "fleet-default", name),
//! )
//! .await?;
//! ```

use std::fmt::Display;
use std::future::Future;
use std::time::Duration;

use rand::Rng;
use thiserror::Error;
use tokio_util::sync::CancellationToken;
use tracing::{debug, warn};

/// Configuration for operations that may fail transiently.
#[derive(Clone, Debug)]
pub struct RetryConfig {
    /// Maximum number of attempts, including the first one (0 = infinite)
    pub max_attempts: u32,
    /// Delay before the first retry
    pub initial_delay: Duration,
    /// Maximum delay between retries
    pub max_delay: Duration,
    /// Multiplier for exponential backoff
    pub backoff_multiplier: f64,
    /// Randomize each delay to 0.5x..1.5x to avoid thundering herds
    pub jitter: bool,
}

impl Default for RetryConfig {
    fn default() -> Self {
        Self {
            max_attempts: 0, // infinite
            initial_delay: Duration::from_millis(100),
            max_delay: Duration::from_secs(30),
            backoff_multiplier: 2.0,
            jitter: true,
        }
    }
}

impl RetryConfig {
    /// Create a config with a maximum number of attempts
    pub fn with_max_attempts(attempts: u32) -> Self {
        Self {
            max_attempts: attempts,
            ..Default::default()
        }
    }

    /// Delay to wait after `delay`, doubled (by the multiplier) and capped.
    fn next_delay(&self, delay: Duration) -> Duration {
        Duration::from_secs_f64(
            (delay.as_secs_f64() * self.backoff_multiplier).min(self.max_delay.as_secs_f64()),
        )
    }

    fn sleep_for(&self, delay: Duration) -> Duration {
        if !self.jitter {
            return delay;
        }
        let factor = rand::thread_rng().gen_range(0.5..1.5);
        Duration::from_secs_f64(delay.as_secs_f64() * factor)
    }
}

/// Why a retried operation gave up
#[derive(Debug, Error)]
pub enum RetryError<E> {
    /// The operation failed with a terminal error or ran out of attempts
    #[error("{error}")]
    Failed {
        /// Attempts made, including the failing one
        attempts: u32,
        /// The last error returned by the operation
        error: E,
    },

    /// The cancellation token fired before the operation succeeded
    #[error("{operation} cancelled after {attempts} attempt(s)")]
    Cancelled {
        /// Name of the operation, for logging
        operation: String,
        /// Attempts that completed before cancellation
        attempts: u32,
    },
}

impl<E> RetryError<E> {
    /// Number of attempts made before giving up
    pub fn attempts(&self) -> u32 {
        match self {
            RetryError::Failed { attempts, .. } | RetryError::Cancelled { attempts, .. } => {
                *attempts
            }
        }
    }
}

/// Execute an async operation with exponential backoff.
///
/// `is_retryable` decides whether a failure is worth another attempt. The
/// delay starts at `initial_delay` and is multiplied by `backoff_multiplier`
/// after each retry, never exceeding `max_delay`.
///
/// # Returns
/// The first successful result, the terminal or last error wrapped in
/// [`RetryError::Failed`], or [`RetryError::Cancelled`] once `cancel` fires.
pub async fn retry_with_backoff<F, Fut, T, E, P>(
    config: &RetryConfig,
    operation_name: &str,
    cancel: &CancellationToken,
    is_retryable: P,
    mut operation: F,
) -> Result<T, RetryError<E>>
where
    F: FnMut() -> Fut,
    Fut: Future<Output = Result<T, E>>,
    E: Display,
    P: Fn(&E) -> bool,
{
    let cancelled = |attempts| RetryError::Cancelled {
        operation: operation_name.to_string(),
        attempts,
    };

    let mut attempt = 0u32;
    let mut delay = config.initial_delay;

    loop {
        if cancel.is_cancelled() {
            return Err(cancelled(attempt));
        }
        attempt += 1;

        let result = tokio::select! {
            biased;
            _ = cancel.cancelled() => return Err(cancelled(attempt - 1)),
            result = operation() => result,
        };

        let e = match result {
            Ok(value) => return Ok(value),
            Err(e) => e,
        };

        if !is_retryable(&e) {
            debug!(
                operation = %operation_name,
                attempt = attempt,
                error = %e,
                "Operation failed with non-retryable error"
            );
            return Err(RetryError::Failed {
                attempts: attempt,
                error: e,
            });
        }

        if config.max_attempts > 0 && attempt >= config.max_attempts {
            warn!(
                operation = %operation_name,
                attempt = attempt,
                error = %e,
                "Operation failed after max retries"
            );
            return Err(RetryError::Failed {
                attempts: attempt,
                error: e,
            });
        }

        let wait = config.sleep_for(delay);
        debug!(
            operation = %operation_name,
            attempt = attempt,
            error = %e,
            delay_ms = wait.as_millis(),
            "Operation failed, retrying"
        );

        tokio::select! {
            biased;
            _ = cancel.cancelled() => return Err(cancelled(attempt)),
            _ = tokio::time::sleep(wait) => {}
        }

        delay = config.next_delay(delay);
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::atomic::{AtomicU32, Ordering};

    /// Fails with `error` for the first `failures` calls, then returns the call number
    struct Flaky {
        failures: u32,
        error: &'static str,
        calls: AtomicU32,
    }

    impl Flaky {
        fn new(failures: u32, error: &'static str) -> Self {
            Self {
                failures,
                error,
                calls: AtomicU32::new(0),
            }
        }

        async fn call(&self) -> Result<u32, &'static str> {
            let n = self.calls.fetch_add(1, Ordering::SeqCst) + 1;
            if n <= self.failures {
                Err(self.error)
            } else {
                Ok(n)
            }
        }

        fn calls(&self) -> u32 {
            self.calls.load(Ordering::SeqCst)
        }
    }

    fn no_jitter(max_attempts: u32, initial_ms: u64, max_ms: u64) -> RetryConfig {
        RetryConfig {
            max_attempts,
            initial_delay: Duration::from_millis(initial_ms),
            max_delay: Duration::from_millis(max_ms),
            backoff_multiplier: 2.0,
            jitter: false,
        }
    }

    #[tokio::test]
    async fn first_success_is_returned() {
        let op = Flaky::new(0, "unused");
        let result =
            retry_with_backoff(&no_jitter(3, 1, 10), "op", &CancellationToken::new(), |_| true, || op.call())
                .await;
        assert_eq!(result.ok(), Some(1));
        assert_eq!(op.calls(), 1);
    }

    #[tokio::test]
    async fn transient_failures_are_retried() {
        let op = Flaky::new(2, "connection reset");
        let result =
            retry_with_backoff(&no_jitter(5, 1, 10), "op", &CancellationToken::new(), |_| true, || op.call())
                .await;
        assert_eq!(result.ok(), Some(3));
    }

    #[tokio::test]
    async fn attempt_budget_is_respected() {
        let op = Flaky::new(u32::MAX, "connection reset");
        let result =
            retry_with_backoff(&no_jitter(4, 1, 10), "op", &CancellationToken::new(), |_| true, || op.call())
                .await;

        match result {
            Err(RetryError::Failed { attempts, error }) => {
                assert_eq!(attempts, 4);
                assert_eq!(error, "connection reset");
            }
            other => panic!("expected Failed, got {other:?}"),
        }
        assert_eq!(op.calls(), 4);
    }

    #[tokio::test]
    async fn terminal_error_stops_immediately() {
        let op = Flaky::new(u32::MAX, "not found");
        let result = retry_with_backoff(
            &no_jitter(4, 1, 10),
            "op",
            &CancellationToken::new(),
            |e| *e != "not found",
            || op.call(),
        )
        .await;

        assert_eq!(result.err().map(|e| e.attempts()), Some(1));
        assert_eq!(op.calls(), 1);
    }

    #[tokio::test]
    async fn pre_cancelled_token_never_calls_operation() {
        let cancel = CancellationToken::new();
        cancel.cancel();
        let op = Flaky::new(0, "unused");

        let result = retry_with_backoff(&no_jitter(4, 1, 10), "op", &cancel, |_| true, || op.call()).await;

        assert!(matches!(result, Err(RetryError::Cancelled { attempts: 0, .. })));
        assert_eq!(op.calls(), 0);
    }

    #[tokio::test(start_paused = true)]
    async fn cancellation_cuts_backoff_short() {
        let cancel = CancellationToken::new();
        let trigger = cancel.clone();
        tokio::spawn(async move {
            tokio::time::sleep(Duration::from_secs(1)).await;
            trigger.cancel();
        });

        let op = Flaky::new(u32::MAX, "connection reset");
        let started = tokio::time::Instant::now();
        let result =
            retry_with_backoff(&no_jitter(10, 60_000, 60_000), "op", &cancel, |_| true, || op.call()).await;

        assert!(matches!(result, Err(RetryError::Cancelled { attempts: 1, .. })));
        assert!(started.elapsed() < Duration::from_secs(60));
    }

    #[tokio::test(start_paused = true)]
    async fn delays_double_up_to_the_cap() {
        let op = Flaky::new(u32::MAX, "connection reset");
        let started = tokio::time::Instant::now();
        let _ = retry_with_backoff(&no_jitter(5, 100, 300), "op", &CancellationToken::new(), |_| true, || {
            op.call()
        })
        .await;

        // 100 + 200 + 300 + 300 between five attempts
        assert_eq!(started.elapsed(), Duration::from_millis(900));
    }

    #[test]
    fn jittered_delay_stays_within_half_to_one_and_a_half() {
        let config = RetryConfig::default();
        let base = Duration::from_millis(100);
        assert!((0..100)
            .map(|_| config.sleep_for(base))
            .all(|d| d >= base / 2 && d <= base * 3 / 2));
    }

    #[test]
    fn retry_error_messages() {
        let cancelled: RetryError<&str> = RetryError::Cancelled {
            operation: "get_cluster".to_string(),
            attempts: 2,
        };
        assert_eq!(cancelled.to_string(), "get_cluster cancelled after 2 attempt(s)");

        let failed = RetryError::Failed {
            attempts: 1,
            error: "boom",
        };
        assert_eq!(failed.to_string(), "boom");
        assert_eq!(failed.attempts(), 1);
    }
}
