//! Throttle-aware retry with randomized backoff.
//!
//! The executor knows nothing about the call it wraps: a classifier decides
//! which failures are throttling, and only those are retried.

use crate::cancel::{CancelToken, Interrupt};
use crate::types::RetryPolicy;
use rand::Rng;
use std::fmt;
use std::time::Duration;
use tracing::debug;

/// Why `RetryExecutor::execute` gave up.
#[derive(Debug, PartialEq)]
pub enum RetryError<E> {
    /// A non-throttling failure; returned on first sight.
    Failed { attempts: u32, error: E },
    /// Every attempt was throttled.
    Exhausted { attempts: u32, last_error: E },
    /// The backoff sleep was interrupted.
    Interrupted {
        attempts: u32,
        interrupt: Interrupt,
        last_error: E,
    },
}

impl<E> RetryError<E> {
    pub fn attempts(&self) -> u32 {
        match self {
            RetryError::Failed { attempts, .. }
            | RetryError::Exhausted { attempts, .. }
            | RetryError::Interrupted { attempts, .. } => *attempts,
        }
    }
}

impl<E: fmt::Display> fmt::Display for RetryError<E> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            RetryError::Failed { attempts, error } => {
                write!(f, "failed on attempt {attempts}: {error}")
            }
            RetryError::Exhausted {
                attempts,
                last_error,
            } => write!(f, "retry budget exhausted after {attempts} attempts: {last_error}"),
            RetryError::Interrupted {
                attempts,
                interrupt,
                ..
            } => write!(f, "interrupted ({interrupt:?}) after {attempts} attempts"),
        }
    }
}

/// Runs mutating calls under a `RetryPolicy`.
#[derive(Clone, Debug)]
pub struct RetryExecutor {
    policy: RetryPolicy,
}

impl RetryExecutor {
    pub fn new(policy: RetryPolicy) -> Self {
        Self { policy }
    }

    pub fn policy(&self) -> &RetryPolicy {
        &self.policy
    }

    /// Invoke `call` until it succeeds, fails with a non-throttle error, or
    /// the attempt budget runs out.
    pub fn execute<T, E, F, C>(
        &self,
        mut call: F,
        is_throttle: C,
        cancel: &CancelToken,
    ) -> Result<T, RetryError<E>>
    where
        F: FnMut() -> Result<T, E>,
        C: Fn(&E) -> bool,
        E: fmt::Display,
    {
        let max_attempts = self.policy.max_attempts.max(1);
        let mut attempts = 0;

        loop {
            attempts += 1;
            let error = match call() {
                Ok(value) => return Ok(value),
                Err(error) => error,
            };

            if !is_throttle(&error) {
                return Err(RetryError::Failed { attempts, error });
            }
            if attempts >= max_attempts {
                return Err(RetryError::Exhausted {
                    attempts,
                    last_error: error,
                });
            }

            let delay = self.backoff_delay();
            debug!(
                attempt = attempts,
                max_attempts,
                delay_ms = delay.as_millis() as u64,
                error = %error,
                "throttled, backing off"
            );
            if let Err(interrupt) = cancel.sleep(delay) {
                return Err(RetryError::Interrupted {
                    attempts,
                    interrupt,
                    last_error: error,
                });
            }
        }
    }

    /// `base_delay` plus a uniform share of `base_delay * jitter_fraction`.
    ///
    /// A non-finite fraction adds no jitter.
    pub fn backoff_delay(&self) -> Duration {
        let base = self.policy.base_delay;
        let fraction = self.policy.jitter_fraction;
        let fraction = if fraction.is_finite() {
            fraction.clamp(0.0, 1.0)
        } else {
            0.0
        };
        jitter_between(base, base + base.mul_f64(fraction))
    }
}

impl Default for RetryExecutor {
    fn default() -> Self {
        Self::new(RetryPolicy::default())
    }
}

/// Uniform sample in `[min, max]`.
pub fn jitter_between(min: Duration, max: Duration) -> Duration {
    if max <= min {
        return min;
    }
    let mut rng = rand::thread_rng();
    let min_secs = min.as_secs_f64();
    let span = max.as_secs_f64() - min_secs;
    let sample = rng.gen::<f64>() * span + min_secs;
    Duration::from_secs_f64(sample)
}
