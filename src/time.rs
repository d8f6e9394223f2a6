//! Time abstractions for testability.
//!
//! This module provides:
//! - A [`Clock`] trait for reading wall-clock time ([`SystemClock`], [`ManualClock`])
//! - A [`Sleeper`] trait for waiting between retries ([`TokioSleeper`], [`InstantSleeper`])
//!
//! Production code uses the real clock and tokio timers; tests inject
//! controlled implementations so breaker recovery windows and retry
//! delays can be driven without real waiting.

use std::sync::atomic::{AtomicU64, Ordering};
use std::time::{Duration, SystemTime};

/// Abstraction over system time for testability.
///
/// Implementations provide the current time, allowing tests to inject
/// controlled time values instead of relying on actual system time.
///
/// # Example
///
/// ```
/// use chat_webhook::time::{Clock, SystemClock};
///
/// let clock = SystemClock;
/// let now = clock.now();
/// assert!(now >= std::time::SystemTime::UNIX_EPOCH);
/// ```
pub trait Clock: Send + Sync {
    /// Returns the current time.
    fn now(&self) -> SystemTime;
}

/// Production clock using actual system time.
#[derive(Debug, Clone, Copy, Default)]
pub struct SystemClock;

impl Clock for SystemClock {
    fn now(&self) -> SystemTime {
        SystemTime::now()
    }
}

/// A clock that only moves when told to.
///
/// Stores milliseconds since `UNIX_EPOCH` atomically, so it can be shared
/// between the breaker, the metrics aggregator and the test driving them.
///
/// # Example
///
/// ```
/// use chat_webhook::time::{Clock, ManualClock};
/// use std::time::Duration;
///
/// let clock = ManualClock::from_millis(1_000);
/// clock.advance(Duration::from_millis(500));
/// assert_eq!(
///     clock.now(),
///     std::time::SystemTime::UNIX_EPOCH + Duration::from_millis(1_500)
/// );
/// ```
#[derive(Debug, Default)]
pub struct ManualClock {
    millis: AtomicU64,
}

impl ManualClock {
    /// Creates a clock fixed at the given number of milliseconds after the epoch.
    #[must_use]
    pub const fn from_millis(millis: u64) -> Self {
        Self {
            millis: AtomicU64::new(millis),
        }
    }

    /// Moves the clock forward.
    pub fn advance(&self, by: Duration) {
        let by = u64::try_from(by.as_millis()).unwrap_or(u64::MAX);
        self.millis.fetch_add(by, Ordering::SeqCst);
    }

    /// Sets the clock to an absolute number of milliseconds after the epoch.
    pub fn set_millis(&self, millis: u64) {
        self.millis.store(millis, Ordering::SeqCst);
    }
}

impl Clock for ManualClock {
    fn now(&self) -> SystemTime {
        SystemTime::UNIX_EPOCH + Duration::from_millis(self.millis.load(Ordering::SeqCst))
    }
}

/// Returns milliseconds since the Unix epoch, or 0 for pre-epoch times.
#[must_use]
pub fn epoch_millis(time: SystemTime) -> u64 {
    time.duration_since(SystemTime::UNIX_EPOCH)
        .map_or(0, |d| u64::try_from(d.as_millis()).unwrap_or(u64::MAX))
}

/// Abstraction over waiting between retry attempts.
///
/// The retry scheduler races every sleep against a cancellation token,
/// so implementations only need to complete after (roughly) `duration`.
pub trait Sleeper: Send + Sync {
    /// Waits for the given duration.
    fn sleep(&self, duration: Duration) -> impl std::future::Future<Output = ()> + Send;
}

/// Production sleeper backed by [`tokio::time::sleep`].
///
/// Honors tokio's paused test clock, so `#[tokio::test(start_paused = true)]`
/// tests advance through retry delays instantly.
#[derive(Debug, Clone, Copy, Default)]
pub struct TokioSleeper;

impl Sleeper for TokioSleeper {
    async fn sleep(&self, duration: Duration) {
        tokio::time::sleep(duration).await;
    }
}

/// Sleeper that returns immediately.
///
/// Useful in tests that exercise retry counts without caring about delays.
#[derive(Debug, Clone, Copy, Default)]
pub struct InstantSleeper;

impl Sleeper for InstantSleeper {
    async fn sleep(&self, _duration: Duration) {}
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn system_clock_returns_current_time() {
        let clock = SystemClock;
        let before = SystemTime::now();
        let result = clock.now();
        let after = SystemTime::now();

        assert!(result >= before);
        assert!(result <= after);
    }

    #[test]
    fn clocks_are_send_sync() {
        fn assert_send_sync<T: Send + Sync>() {}
        assert_send_sync::<SystemClock>();
        assert_send_sync::<ManualClock>();
    }

    #[test]
    fn manual_clock_returns_controlled_time() {
        let clock = ManualClock::from_millis(1_000_000);
        let expected = SystemTime::UNIX_EPOCH + Duration::from_millis(1_000_000);

        assert_eq!(clock.now(), expected);
    }

    #[test]
    fn manual_clock_can_advance_and_be_set() {
        let clock = ManualClock::default();
        assert_eq!(clock.now(), SystemTime::UNIX_EPOCH);

        clock.advance(Duration::from_secs(100));
        assert_eq!(clock.now(), SystemTime::UNIX_EPOCH + Duration::from_secs(100));

        clock.set_millis(50);
        assert_eq!(clock.now(), SystemTime::UNIX_EPOCH + Duration::from_millis(50));
    }

    #[test]
    fn epoch_millis_converts_and_clamps() {
        let t = SystemTime::UNIX_EPOCH + Duration::from_millis(1_234);
        assert_eq!(epoch_millis(t), 1_234);
        assert_eq!(epoch_millis(SystemTime::UNIX_EPOCH), 0);
    }

    #[tokio::test]
    async fn instant_sleeper_returns_immediately() {
        let start = std::time::Instant::now();
        InstantSleeper.sleep(Duration::from_secs(3600)).await;
        assert!(start.elapsed() < Duration::from_secs(1));
    }

    #[tokio::test(start_paused = true)]
    async fn tokio_sleeper_follows_paused_clock() {
        let start = tokio::time::Instant::now();
        TokioSleeper.sleep(Duration::from_secs(30)).await;
        assert!(start.elapsed() >= Duration::from_secs(30));
    }
}
