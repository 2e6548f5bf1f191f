//! Unified retry and backoff logic for TalentDB storage paths
//!
//! Download, upload and backup-upload all go through the same `RetryPolicy`
//! so their behavior is uniform and independently testable.

use std::time::Duration;
use thiserror::Error;
use tracing::{debug, warn};

/// Common retry error types
#[derive(Error, Debug)]
pub enum RetryError {
    #[error("Operation '{operation}' exceeded maximum retry attempts: {source}")]
    MaxRetriesExceeded {
        operation: &'static str,
        source: Box<dyn std::error::Error + Send + Sync>,
    },
    #[error("Transient error in '{operation}': {source}")]
    Transient {
        operation: &'static str,
        source: Box<dyn std::error::Error + Send + Sync>,
    },
    #[error("Permanent error in '{operation}': {source}")]
    Permanent {
        operation: &'static str,
        source: Box<dyn std::error::Error + Send + Sync>,
    },
}

/// Result type for retry operations
pub type RetryResult<T> = std::result::Result<T, RetryError>;

/// How long to wait between attempts.
#[derive(Debug, Clone, Copy, PartialEq)]
pub enum BackoffStrategy {
    /// Same delay before every retry.
    Fixed { delay: Duration },
    /// Delay grows by `multiplier` per attempt, capped at `max`.
    Exponential {
        initial: Duration,
        multiplier: f64,
        max: Duration,
    },
}

impl BackoffStrategy {
    /// Delay before the retry following attempt number `attempt` (1-based).
    pub fn delay_for(&self, attempt: usize) -> Duration {
        match *self {
            BackoffStrategy::Fixed { delay } => delay,
            BackoffStrategy::Exponential {
                initial,
                multiplier,
                max,
            } => {
                let factor = multiplier.powi(attempt.saturating_sub(1) as i32);
                let scaled = initial.as_secs_f64() * factor;
                Duration::from_secs_f64(scaled.min(max.as_secs_f64()))
            }
        }
    }
}

/// Retry policy: attempt budget plus backoff strategy.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct RetryPolicy {
    pub max_attempts: usize,
    pub backoff: BackoffStrategy,
}

impl RetryPolicy {
    pub fn new(max_attempts: usize, backoff: BackoffStrategy) -> Self {
        Self {
            max_attempts,
            backoff,
        }
    }

    /// Three attempts with a short fixed delay, the default for remote
    /// store uploads and downloads.
    pub fn transfer_default() -> Self {
        Self::new(
            3,
            BackoffStrategy::Fixed {
                delay: Duration::from_millis(500),
            },
        )
    }

    /// Single attempt, no waiting. Useful in tests and for operations whose
    /// caller handles failure itself.
    pub fn no_retry() -> Self {
        Self::new(
            1,
            BackoffStrategy::Fixed {
                delay: Duration::ZERO,
            },
        )
    }

    /// Policy tuned for cloud object storage: more patience, growing delays.
    pub fn cloud_storage() -> Self {
        Self::new(
            4,
            BackoffStrategy::Exponential {
                initial: Duration::from_millis(500),
                multiplier: 1.5,
                max: Duration::from_secs(10),
            },
        )
    }

    /// Execute `f` under this policy.
    ///
    /// The closure receives the 1-based attempt number. `Transient` errors are
    /// retried until the attempt budget runs out; `Permanent` errors and
    /// budget exhaustion both surface as `MaxRetriesExceeded`.
    pub fn run<T, F>(&self, op_name: &'static str, mut f: F) -> RetryResult<T>
    where
        F: FnMut(usize) -> RetryResult<T>,
    {
        let mut attempt = 1;

        loop {
            debug!("Attempting operation '{}' (attempt {})", op_name, attempt);

            match f(attempt) {
                Ok(result) => {
                    if attempt > 1 {
                        debug!(
                            "Operation '{}' succeeded after {} attempts",
                            op_name, attempt
                        );
                    }
                    return Ok(result);
                }
                Err(RetryError::Permanent { source, .. }) => {
                    warn!(
                        "Operation '{}' failed permanently on attempt {}",
                        op_name, attempt
                    );
                    return Err(RetryError::MaxRetriesExceeded {
                        operation: op_name,
                        source,
                    });
                }
                Err(err) => {
                    warn!(
                        "Operation '{}' failed on attempt {}: {}",
                        op_name, attempt, err
                    );

                    if attempt >= self.max_attempts {
                        return Err(RetryError::MaxRetriesExceeded {
                            operation: op_name,
                            source: match err {
                                RetryError::Transient { source, .. } => source,
                                other => Box::new(other),
                            },
                        });
                    }

                    let delay = self.backoff.delay_for(attempt);
                    if !delay.is_zero() {
                        std::thread::sleep(delay);
                    }
                    attempt += 1;
                }
            }
        }
    }
}

/// Trait for categorizing errors as transient or permanent
pub trait RetryableError {
    /// Returns true if the error is transient and the operation should be retried
    fn is_transient(&self) -> bool;

    /// Returns true if the error is permanent and retries should stop
    fn is_permanent(&self) -> bool {
        !self.is_transient()
    }
}

/// Helper macro for creating transient errors
#[macro_export]
macro_rules! transient_error {
    ($op:expr, $err:expr) => {
        $crate::RetryError::Transient {
            operation: $op,
            source: Box::new($err),
        }
    };
}

/// Helper macro for creating permanent errors
#[macro_export]
macro_rules! permanent_error {
    ($op:expr, $err:expr) => {
        $crate::RetryError::Permanent {
            operation: $op,
            source: Box::new($err),
        }
    };
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::atomic::{AtomicUsize, Ordering};
    use std::sync::Arc;

    fn fast_policy(max_attempts: usize) -> RetryPolicy {
        RetryPolicy::new(
            max_attempts,
            BackoffStrategy::Fixed {
                delay: Duration::ZERO,
            },
        )
    }

    #[test]
    fn successful_operation_runs_once() {
        let result = fast_policy(3).run("test_op", |_attempt| Ok("success"));

        assert!(result.is_ok());
        assert_eq!(result.unwrap(), "success");
    }

    #[test]
    fn transient_failure_then_success() {
        let attempt_count = Arc::new(AtomicUsize::new(0));
        let attempt_count_clone = Arc::clone(&attempt_count);

        let result = fast_policy(3).run("test_op", move |_attempt| {
            let count = attempt_count_clone.fetch_add(1, Ordering::SeqCst);
            if count < 2 {
                Err(transient_error!(
                    "test_op",
                    std::io::Error::new(
                        std::io::ErrorKind::ConnectionRefused,
                        "connection refused"
                    )
                ))
            } else {
                Ok("success")
            }
        });

        assert!(result.is_ok());
        assert_eq!(result.unwrap(), "success");
        assert_eq!(attempt_count.load(Ordering::SeqCst), 3);
    }

    #[test]
    fn permanent_failure_stops_immediately() {
        let attempts = Arc::new(AtomicUsize::new(0));
        let attempts_clone = Arc::clone(&attempts);

        let result: RetryResult<&str> = fast_policy(5).run("test_op", move |_attempt| {
            attempts_clone.fetch_add(1, Ordering::SeqCst);
            Err(permanent_error!(
                "test_op",
                std::io::Error::new(std::io::ErrorKind::PermissionDenied, "permission denied")
            ))
        });

        assert!(matches!(result, Err(RetryError::MaxRetriesExceeded { .. })));
        assert_eq!(attempts.load(Ordering::SeqCst), 1);
    }

    #[test]
    fn budget_exhaustion_surfaces_max_retries() {
        let result: RetryResult<()> = fast_policy(3).run("test_op", |_attempt| {
            Err(transient_error!(
                "test_op",
                std::io::Error::new(std::io::ErrorKind::TimedOut, "timed out")
            ))
        });

        assert!(matches!(result, Err(RetryError::MaxRetriesExceeded { .. })));
    }

    #[test]
    fn exponential_backoff_grows_and_caps() {
        let backoff = BackoffStrategy::Exponential {
            initial: Duration::from_millis(100),
            multiplier: 2.0,
            max: Duration::from_millis(300),
        };

        assert_eq!(backoff.delay_for(1), Duration::from_millis(100));
        assert_eq!(backoff.delay_for(2), Duration::from_millis(200));
        assert_eq!(backoff.delay_for(3), Duration::from_millis(300));
        assert_eq!(backoff.delay_for(10), Duration::from_millis(300));
    }
}
