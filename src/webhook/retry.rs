//! Retry policy and the cancellable retry scheduler.

use std::fmt;
use std::future::Future;
use std::time::Duration;

use thiserror::Error;
use tokio::time::Instant;
use tokio_util::sync::CancellationToken;

use crate::time::{Sleeper, TokioSleeper};

/// Configuration for exponential backoff retry behavior.
///
/// Delays are deterministic (no jitter): the wait after failed attempt `n`
/// is `min(initial_delay * multiplier^(n-1), max_delay)`.
///
/// # Defaults
///
/// - `max_attempts`: 3
/// - `initial_delay`: 1 second
/// - `max_delay`: 10 seconds
/// - `multiplier`: 2.0
///
/// # Example
///
/// ```
/// use chat_webhook::webhook::RetryPolicy;
/// use std::time::Duration;
///
/// let policy = RetryPolicy::new()
///     .with_max_attempts(5)
///     .with_initial_delay(Duration::from_millis(200))
///     .with_max_delay(Duration::from_secs(2))
///     .with_multiplier(1.5);
/// assert_eq!(policy.delay_for_retry(0), Duration::from_millis(200));
/// ```
#[derive(Debug, Clone, PartialEq)]
pub struct RetryPolicy {
    /// Maximum number of attempts (including the initial attempt).
    ///
    /// A value of 1 means no retries.
    pub max_attempts: u32,

    /// Delay before the first retry.
    pub initial_delay: Duration,

    /// Cap on any single delay.
    pub max_delay: Duration,

    /// Factor applied to the delay after each retry.
    pub multiplier: f64,
}

impl RetryPolicy {
    /// Default maximum attempts.
    pub const DEFAULT_MAX_ATTEMPTS: u32 = 3;

    /// Default initial delay (1 second).
    pub const DEFAULT_INITIAL_DELAY: Duration = Duration::from_secs(1);

    /// Default maximum delay (10 seconds).
    pub const DEFAULT_MAX_DELAY: Duration = Duration::from_secs(10);

    /// Default multiplier (2.0).
    pub const DEFAULT_MULTIPLIER: f64 = 2.0;

    /// Minimum value for `max_attempts`.
    pub const MIN_MAX_ATTEMPTS: u32 = 1;

    /// Creates a new retry policy with default values.
    #[must_use]
    pub const fn new() -> Self {
        Self {
            max_attempts: Self::DEFAULT_MAX_ATTEMPTS,
            initial_delay: Self::DEFAULT_INITIAL_DELAY,
            max_delay: Self::DEFAULT_MAX_DELAY,
            multiplier: Self::DEFAULT_MULTIPLIER,
        }
    }

    /// Sets the maximum number of attempts.
    ///
    /// # Panics
    ///
    /// Panics if `max_attempts` is less than 1.
    #[must_use]
    pub const fn with_max_attempts(mut self, max_attempts: u32) -> Self {
        assert!(
            max_attempts >= Self::MIN_MAX_ATTEMPTS,
            "max_attempts must be at least 1"
        );
        self.max_attempts = max_attempts;
        self
    }

    /// Sets the initial delay between retries.
    ///
    /// Zero is allowed, which is mostly useful in tests.
    #[must_use]
    pub const fn with_initial_delay(mut self, delay: Duration) -> Self {
        self.initial_delay = delay;
        self
    }

    /// Sets the maximum delay between retries.
    #[must_use]
    pub const fn with_max_delay(mut self, delay: Duration) -> Self {
        self.max_delay = delay;
        self
    }

    /// Sets the delay multiplier.
    ///
    /// # Panics
    ///
    /// Panics if `multiplier` is not a finite number of at least 1.0.
    #[must_use]
    pub fn with_multiplier(mut self, multiplier: f64) -> Self {
        assert!(
            multiplier.is_finite() && multiplier >= 1.0,
            "multiplier must be at least 1.0"
        );
        self.multiplier = multiplier;
        self
    }

    /// Computes the delay for a given retry number (0-indexed).
    ///
    /// `retry` 0 is the wait before the second attempt. The result never
    /// exceeds `max_delay` and never decreases as `retry` grows.
    #[must_use]
    pub fn delay_for_retry(&self, retry: u32) -> Duration {
        // 0 * inf is NaN for large exponents.
        if self.initial_delay.is_zero() {
            return Duration::ZERO;
        }
        let exponent = i32::try_from(retry).unwrap_or(i32::MAX);
        let delay_secs = self.initial_delay.as_secs_f64() * self.multiplier.powi(exponent);
        let capped = delay_secs.min(self.max_delay.as_secs_f64());
        if capped.is_finite() && capped >= 0.0 {
            Duration::from_secs_f64(capped)
        } else {
            self.max_delay
        }
    }

    /// Returns true if another attempt may follow attempt number `attempt` (1-based).
    #[must_use]
    pub const fn should_retry(&self, attempt: u32) -> bool {
        attempt < self.max_attempts
    }
}

impl Default for RetryPolicy {
    fn default() -> Self {
        Self::new()
    }
}

/// Classifies failures as transient or terminal.
pub trait IsRetryable {
    /// Returns true if the error is potentially transient and should be retried.
    fn is_retryable(&self) -> bool;
}

/// What the scheduler does after a failed attempt.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RetryStep {
    /// Wait this long, then attempt again.
    Wait(Duration),
    /// Give up: attempts are used up.
    Exhausted,
    /// Give up: the failure is terminal.
    Abort,
}

/// Explicit retry state machine: attempt count and next delay.
///
/// The scheduler drives it; tests can drive it directly to check the
/// delay sequence without any timers.
#[derive(Debug, Clone)]
pub struct RetryState<'a> {
    policy: &'a RetryPolicy,
    attempts: u32,
}

impl<'a> RetryState<'a> {
    /// Creates the state before the first attempt.
    #[must_use]
    pub const fn new(policy: &'a RetryPolicy) -> Self {
        Self {
            policy,
            attempts: 0,
        }
    }

    /// Attempts started so far.
    #[must_use]
    pub const fn attempts(&self) -> u32 {
        self.attempts
    }

    /// Starts the next attempt and returns its 1-based number.
    pub const fn begin_attempt(&mut self) -> u32 {
        self.attempts += 1;
        self.attempts
    }

    /// Decides the next step after the current attempt failed.
    #[must_use]
    pub fn after_failure(&self, retryable: bool) -> RetryStep {
        if !retryable {
            RetryStep::Abort
        } else if !self.policy.should_retry(self.attempts) {
            RetryStep::Exhausted
        } else {
            RetryStep::Wait(
                self.policy
                    .delay_for_retry(self.attempts.saturating_sub(1)),
            )
        }
    }
}

/// Terminal outcome of a retried operation.
#[derive(Debug, Error)]
pub enum RetryError<E> {
    /// Every allowed attempt failed with a retryable error.
    #[error("Gave up after {attempts} attempt(s): {last_error}")]
    Exhausted {
        /// Attempts made.
        attempts: u32,
        /// Failure of the final attempt.
        #[source]
        last_error: E,
    },

    /// An attempt failed with a terminal error.
    #[error("Attempt {attempts} failed permanently: {error}")]
    Aborted {
        /// Attempts made, including the failing one.
        attempts: u32,
        /// The terminal failure.
        #[source]
        error: E,
    },

    /// The cancellation token fired.
    #[error("Cancelled after {attempts} attempt(s)")]
    Cancelled {
        /// Attempts started before cancellation.
        attempts: u32,
    },
}

/// One completed attempt, handed to the scheduler's observer.
#[derive(Debug)]
pub struct AttemptReport<'a, T, E> {
    /// 1-based attempt number.
    pub attempt: u32,
    /// Time from starting the attempt to its result.
    pub duration: Duration,
    /// The attempt's result.
    pub outcome: Result<&'a T, &'a E>,
}

/// Runs an operation under a [`RetryPolicy`] with cancellable waits.
///
/// Cancellation is checked before every attempt and raced against both
/// the in-flight attempt (whose future is dropped) and every delay.
/// Attempts interrupted by cancellation are not reported to the observer.
///
/// # Type Parameters
///
/// - `S`: The sleeper used between attempts (defaults to [`TokioSleeper`])
#[derive(Debug, Clone, Default)]
pub struct RetryScheduler<S = TokioSleeper> {
    sleeper: S,
}

impl RetryScheduler<TokioSleeper> {
    /// Creates a scheduler that waits with tokio timers.
    #[must_use]
    pub const fn new() -> Self {
        Self {
            sleeper: TokioSleeper,
        }
    }
}

impl<S: Sleeper> RetryScheduler<S> {
    /// Creates a scheduler with a custom sleeper.
    #[must_use]
    pub const fn with_sleeper(sleeper: S) -> Self {
        Self { sleeper }
    }

    /// Returns the sleeper.
    #[must_use]
    pub const fn sleeper(&self) -> &S {
        &self.sleeper
    }

    /// Executes `attempt_fn` until it succeeds, fails terminally, runs out
    /// of attempts, or `cancel` fires.
    ///
    /// `attempt_fn` receives the 1-based attempt number. `observer` sees
    /// every completed attempt, including those that are retried.
    ///
    /// # Errors
    ///
    /// - [`RetryError::Aborted`] on a non-retryable failure
    /// - [`RetryError::Exhausted`] when `max_attempts` retryable failures occurred
    /// - [`RetryError::Cancelled`] when the token fired
    pub async fn execute<T, E, F, Fut, O>(
        &self,
        policy: &RetryPolicy,
        cancel: &CancellationToken,
        mut attempt_fn: F,
        mut observer: O,
    ) -> Result<T, RetryError<E>>
    where
        F: FnMut(u32) -> Fut,
        Fut: Future<Output = Result<T, E>>,
        E: IsRetryable + fmt::Display,
        O: FnMut(&AttemptReport<'_, T, E>),
    {
        let mut state = RetryState::new(policy);

        loop {
            if cancel.is_cancelled() {
                return Err(RetryError::Cancelled {
                    attempts: state.attempts(),
                });
            }

            let attempt = state.begin_attempt();
            let started = Instant::now();
            let result = tokio::select! {
                biased;
                () = cancel.cancelled() => {
                    tracing::debug!(attempt, "Attempt cancelled in flight");
                    return Err(RetryError::Cancelled { attempts: attempt });
                }
                result = attempt_fn(attempt) => result,
            };
            let duration = started.elapsed();

            let error = match result {
                Ok(value) => {
                    observer(&AttemptReport {
                        attempt,
                        duration,
                        outcome: Ok(&value),
                    });
                    return Ok(value);
                }
                Err(error) => error,
            };

            observer(&AttemptReport {
                attempt,
                duration,
                outcome: Err(&error),
            });

            match state.after_failure(error.is_retryable()) {
                RetryStep::Abort => {
                    tracing::debug!(attempt, error = %error, "Attempt failed, not retryable");
                    return Err(RetryError::Aborted {
                        attempts: attempt,
                        error,
                    });
                }
                RetryStep::Exhausted => {
                    tracing::warn!(attempts = attempt, error = %error, "Retries exhausted");
                    return Err(RetryError::Exhausted {
                        attempts: attempt,
                        last_error: error,
                    });
                }
                RetryStep::Wait(delay) => {
                    tracing::warn!(
                        attempt,
                        max_attempts = policy.max_attempts,
                        delay_ms = u64::try_from(delay.as_millis()).unwrap_or(u64::MAX),
                        error = %error,
                        "Attempt failed, retrying"
                    );
                    tokio::select! {
                        biased;
                        () = cancel.cancelled() => {
                            return Err(RetryError::Cancelled { attempts: attempt });
                        }
                        () = self.sleeper.sleep(delay) => {}
                    }
                }
            }
        }
    }
}
