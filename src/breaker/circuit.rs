//! Circuit breaker state machine.

use std::fmt;
use std::sync::{Arc, Mutex, MutexGuard, PoisonError};
use std::time::{Duration, SystemTime};

use serde::Serialize;
use thiserror::Error;

use crate::time::{Clock, SystemClock};

/// The three states of a circuit breaker.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum CircuitState {
    /// Calls flow normally.
    Closed,
    /// Calls are rejected until the recovery timeout elapses.
    Open,
    /// One trial call is allowed to probe recovery.
    HalfOpen,
}

impl fmt::Display for CircuitState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(match self {
            Self::Closed => "closed",
            Self::Open => "open",
            Self::HalfOpen => "half-open",
        })
    }
}

/// Thresholds controlling when the breaker opens and recovers.
///
/// # Defaults
///
/// - `threshold`: 5 consecutive failures
/// - `recovery_timeout`: 60 seconds
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
pub struct BreakerConfig {
    /// Consecutive failures that open the circuit.
    pub threshold: u32,
    /// Time after the last failure before a trial call is allowed.
    pub recovery_timeout: Duration,
}

impl BreakerConfig {
    /// Default failure threshold.
    pub const DEFAULT_THRESHOLD: u32 = 5;

    /// Default recovery timeout (60 seconds).
    pub const DEFAULT_RECOVERY_TIMEOUT: Duration = Duration::from_secs(60);

    /// Creates a configuration with default values.
    #[must_use]
    pub const fn new() -> Self {
        Self {
            threshold: Self::DEFAULT_THRESHOLD,
            recovery_timeout: Self::DEFAULT_RECOVERY_TIMEOUT,
        }
    }

    /// Sets the failure threshold.
    ///
    /// # Panics
    ///
    /// Panics if `threshold` is 0.
    #[must_use]
    pub const fn with_threshold(mut self, threshold: u32) -> Self {
        assert!(threshold >= 1, "threshold must be at least 1");
        self.threshold = threshold;
        self
    }

    /// Sets the recovery timeout.
    #[must_use]
    pub const fn with_recovery_timeout(mut self, timeout: Duration) -> Self {
        self.recovery_timeout = timeout;
        self
    }
}

impl Default for BreakerConfig {
    fn default() -> Self {
        Self::new()
    }
}

/// Point-in-time view of a breaker.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
pub struct BreakerSnapshot {
    /// Logical state. An open breaker whose recovery timeout has elapsed
    /// reports `HalfOpen` even before the trial is claimed.
    pub state: CircuitState,
    /// Failures since the last success or reset.
    pub consecutive_failures: u32,
    /// Time of the most recent failure.
    pub last_failure_time: Option<SystemTime>,
    /// Configured failure threshold.
    pub threshold: u32,
    /// Configured recovery timeout.
    pub recovery_timeout: Duration,
}

/// Returned when a call is rejected because the circuit is open.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
#[error("circuit is open after {consecutive_failures} consecutive failure(s)")]
pub struct CircuitOpenError {
    /// Consecutive failures when the call was rejected.
    pub consecutive_failures: u32,
    /// Time remaining until a trial call may be attempted, if known.
    pub retry_after: Option<Duration>,
}

#[derive(Debug, Clone, Copy)]
struct Inner {
    state: CircuitState,
    consecutive_failures: u32,
    last_failure_time: Option<SystemTime>,
    trial_in_flight: bool,
    /// Bumped every time a trial is claimed. Never reset.
    trial_generation: u64,
}

impl Inner {
    const fn closed(trial_generation: u64) -> Self {
        Self {
            state: CircuitState::Closed,
            consecutive_failures: 0,
            last_failure_time: None,
            trial_in_flight: false,
            trial_generation,
        }
    }
}

enum Claim {
    Rejected,
    Call,
    Trial(u64),
}

/// Failure-counting guard in front of the webhook.
///
/// All transitions happen under one mutex that is never held across an
/// `.await`, so interleaved async completions cannot lose updates.
///
/// # Half-open trials
///
/// Once the recovery timeout has elapsed, the first caller of
/// [`try_acquire`](Self::try_acquire) (or [`can_attempt`](Self::can_attempt))
/// claims the single trial slot. Every other caller is rejected until that
/// trial reports back. A [`CallPermit`] reports back on its own: settling it
/// records the outcome and dropping it unsettled gives the slot back, so an
/// abandoned call cannot leave the breaker stuck half-open.
///
/// # Example
///
/// ```
/// use chat_webhook::breaker::{BreakerConfig, CircuitBreaker, CircuitState};
///
/// let breaker = CircuitBreaker::new(BreakerConfig::new().with_threshold(2));
/// breaker.record_failure();
/// breaker.record_failure();
///
/// assert!(!breaker.can_attempt());
/// assert_eq!(breaker.state().state, CircuitState::Open);
/// ```
pub struct CircuitBreaker {
    config: BreakerConfig,
    clock: Arc<dyn Clock>,
    inner: Mutex<Inner>,
}

impl fmt::Debug for CircuitBreaker {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("CircuitBreaker")
            .field("config", &self.config)
            .field("inner", &*self.lock())
            .finish_non_exhaustive()
    }
}

impl CircuitBreaker {
    /// Creates a closed breaker using the system clock.
    #[must_use]
    pub fn new(config: BreakerConfig) -> Self {
        Self::with_clock(config, Arc::new(SystemClock))
    }

    /// Creates a closed breaker reading time from `clock`.
    #[must_use]
    pub fn with_clock(config: BreakerConfig, clock: Arc<dyn Clock>) -> Self {
        Self {
            config,
            clock,
            inner: Mutex::new(Inner::closed(0)),
        }
    }

    /// Returns the breaker configuration.
    #[must_use]
    pub const fn config(&self) -> BreakerConfig {
        self.config
    }

    fn lock(&self) -> MutexGuard<'_, Inner> {
        self.inner.lock().unwrap_or_else(PoisonError::into_inner)
    }

    fn recovery_elapsed(&self, inner: &Inner, now: SystemTime) -> bool {
        inner.last_failure_time.is_none_or(|last| {
            now.duration_since(last).unwrap_or(Duration::ZERO) >= self.config.recovery_timeout
        })
    }

    fn claim(&self) -> Claim {
        let now = self.clock.now();
        let mut inner = self.lock();

        match inner.state {
            CircuitState::Closed => Claim::Call,
            CircuitState::Open => {
                if !self.recovery_elapsed(&inner, now) {
                    return Claim::Rejected;
                }
                inner.state = CircuitState::HalfOpen;
                tracing::info!(
                    failures = inner.consecutive_failures,
                    "Circuit breaker half-open, allowing trial request"
                );
                Self::claim_trial(&mut inner)
            }
            CircuitState::HalfOpen if inner.trial_in_flight => Claim::Rejected,
            CircuitState::HalfOpen => Self::claim_trial(&mut inner),
        }
    }

    const fn claim_trial(inner: &mut Inner) -> Claim {
        inner.trial_in_flight = true;
        inner.trial_generation = inner.trial_generation.wrapping_add(1);
        Claim::Trial(inner.trial_generation)
    }

    /// Asks for permission to make one call.
    ///
    /// Returns `None` when the call must be rejected. The permit reports the
    /// outcome through [`CallPermit::succeed`] or [`CallPermit::fail`];
    /// dropping it unsettled releases a claimed half-open trial.
    pub fn try_acquire(&self) -> Option<CallPermit<'_>> {
        let trial = match self.claim() {
            Claim::Rejected => return None,
            Claim::Call => None,
            Claim::Trial(generation) => Some(generation),
        };
        Some(CallPermit {
            breaker: self,
            trial,
        })
    }

    /// Asks whether a call may proceed.
    ///
    /// In the open state this claims the half-open trial slot once the
    /// recovery timeout has elapsed, so a `true` answer obliges the caller
    /// to report the outcome. Prefer [`try_acquire`](Self::try_acquire),
    /// which reports back even when the call is abandoned.
    pub fn can_attempt(&self) -> bool {
        !matches!(self.claim(), Claim::Rejected)
    }

    /// Returns the rejection error for the current state.
    #[must_use]
    pub fn open_error(&self) -> CircuitOpenError {
        let now = self.clock.now();
        let inner = self.lock();

        let retry_after = match inner.state {
            CircuitState::Open => inner.last_failure_time.map(|last| {
                let elapsed = now.duration_since(last).unwrap_or(Duration::ZERO);
                self.config.recovery_timeout.saturating_sub(elapsed)
            }),
            CircuitState::Closed | CircuitState::HalfOpen => None,
        };

        CircuitOpenError {
            consecutive_failures: inner.consecutive_failures,
            retry_after,
        }
    }

    /// Records a successful call.
    ///
    /// Clears the failure count when closed and closes the circuit after a
    /// half-open trial. A success that lands while the circuit is open comes
    /// from a call admitted before it opened and is ignored.
    pub fn record_success(&self) {
        let mut inner = self.lock();

        match inner.state {
            CircuitState::Closed => inner.consecutive_failures = 0,
            CircuitState::Open => {
                tracing::debug!(
                    failures = inner.consecutive_failures,
                    "Ignoring late success while circuit breaker is open"
                );
            }
            CircuitState::HalfOpen => {
                inner.state = CircuitState::Closed;
                inner.consecutive_failures = 0;
                inner.trial_in_flight = false;
                tracing::info!("Circuit breaker closed after successful trial");
            }
        }
    }

    /// Records a failed call.
    ///
    /// Opens the circuit once the threshold is reached, and re-opens it
    /// (restarting the recovery timer) when a half-open trial fails.
    pub fn record_failure(&self) {
        let now = self.clock.now();
        let mut inner = self.lock();
        inner.consecutive_failures = inner.consecutive_failures.saturating_add(1);
        inner.last_failure_time = Some(now);

        match inner.state {
            CircuitState::Closed if inner.consecutive_failures >= self.config.threshold => {
                inner.state = CircuitState::Open;
                tracing::warn!(
                    failures = inner.consecutive_failures,
                    threshold = self.config.threshold,
                    "Circuit breaker opened"
                );
            }
            CircuitState::HalfOpen => {
                inner.state = CircuitState::Open;
                inner.trial_in_flight = false;
                tracing::warn!(
                    failures = inner.consecutive_failures,
                    "Circuit breaker trial failed, re-opening"
                );
            }
            CircuitState::Closed | CircuitState::Open => {}
        }
    }

    /// Gives back a claimed half-open trial slot without an outcome.
    ///
    /// Used when the trial call was cancelled by its caller: cancellation
    /// says nothing about the endpoint's health.
    pub fn release_trial(&self) {
        let mut inner = self.lock();
        if inner.state == CircuitState::HalfOpen {
            inner.trial_in_flight = false;
        }
    }

    fn release_trial_generation(&self, generation: u64) {
        let mut inner = self.lock();
        if inner.state == CircuitState::HalfOpen
            && inner.trial_in_flight
            && inner.trial_generation == generation
        {
            inner.trial_in_flight = false;
            tracing::debug!("Circuit breaker trial abandoned, slot released");
        }
    }

    /// Returns a snapshot of the breaker.
    #[must_use]
    pub fn state(&self) -> BreakerSnapshot {
        let now = self.clock.now();
        let inner = *self.lock();

        let state = if inner.state == CircuitState::Open && self.recovery_elapsed(&inner, now) {
            CircuitState::HalfOpen
        } else {
            inner.state
        };

        BreakerSnapshot {
            state,
            consecutive_failures: inner.consecutive_failures,
            last_failure_time: inner.last_failure_time,
            threshold: self.config.threshold,
            recovery_timeout: self.config.recovery_timeout,
        }
    }

    /// Forces the breaker closed and clears all counters.
    pub fn reset(&self) {
        let mut inner = self.lock();
        let generation = inner.trial_generation;
        *inner = Inner::closed(generation);
        drop(inner);
        tracing::debug!("Circuit breaker reset");
    }
}

/// Admission to make one call through a [`CircuitBreaker`].
///
/// A permit that holds the half-open trial gives the slot back when dropped
/// without [`succeed`](Self::succeed) or [`fail`](Self::fail), for example
/// when the future driving the call is cancelled.
#[derive(Debug)]
#[must_use = "an unsettled permit records no outcome"]
pub struct CallPermit<'a> {
    breaker: &'a CircuitBreaker,
    trial: Option<u64>,
}

impl CallPermit<'_> {
    /// Whether this permit holds the half-open trial slot.
    #[must_use]
    pub const fn is_trial(&self) -> bool {
        self.trial.is_some()
    }

    /// Records a successful call.
    pub fn succeed(mut self) {
        self.trial = None;
        self.breaker.record_success();
    }

    /// Records a failed call.
    pub fn fail(mut self) {
        self.trial = None;
        self.breaker.record_failure();
    }
}

impl Drop for CallPermit<'_> {
    fn drop(&mut self) {
        if let Some(generation) = self.trial.take() {
            self.breaker.release_trial_generation(generation);
        }
    }
}
