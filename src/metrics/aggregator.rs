//! Attempt recording, percentile latencies and alert dispatch.

use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::{Arc, Mutex, MutexGuard, PoisonError};
use std::time::{Duration, SystemTime};

use serde::Serialize;

use super::alerts::{Alert, AlertCallback, AlertEngine, AlertInputs, AlertRule, SubscriptionId};
use super::dashboard::{self, DashboardData};
use super::record::PerformanceRecord;
use super::ring::RingBuffer;
use super::serde_fmt;
use crate::time::{Clock, SystemClock};

const MINUTE: Duration = Duration::from_secs(60);
const HOUR: Duration = Duration::from_secs(3600);

/// Settings for the metrics aggregator.
///
/// # Defaults
///
/// - `capacity`: 1000 records
/// - `latency_budget`: 3 seconds (p95 above this marks the service degraded)
/// - `alert_rules`: [`AlertRule::defaults`]
#[derive(Debug, Clone, PartialEq)]
pub struct MetricsConfig {
    /// Ring buffer capacity.
    pub capacity: usize,
    /// p95 latency above which the dashboard reports `Degraded`.
    pub latency_budget: Duration,
    /// Rules evaluated after every recorded attempt.
    pub alert_rules: Vec<AlertRule>,
}

impl MetricsConfig {
    /// Default ring buffer capacity.
    pub const DEFAULT_CAPACITY: usize = 1000;

    /// Default latency budget (3 seconds).
    pub const DEFAULT_LATENCY_BUDGET: Duration = Duration::from_secs(3);

    /// Creates a configuration with default values.
    #[must_use]
    pub fn new() -> Self {
        Self {
            capacity: Self::DEFAULT_CAPACITY,
            latency_budget: Self::DEFAULT_LATENCY_BUDGET,
            alert_rules: AlertRule::defaults(),
        }
    }

    /// Sets the ring buffer capacity.
    ///
    /// # Panics
    ///
    /// Panics if `capacity` is 0.
    #[must_use]
    pub fn with_capacity(mut self, capacity: usize) -> Self {
        assert!(capacity > 0, "capacity must be at least 1");
        self.capacity = capacity;
        self
    }

    /// Sets the latency budget.
    #[must_use]
    pub const fn with_latency_budget(mut self, budget: Duration) -> Self {
        self.latency_budget = budget;
        self
    }

    /// Replaces the alert rules.
    #[must_use]
    pub fn with_alert_rules(mut self, rules: Vec<AlertRule>) -> Self {
        self.alert_rules = rules;
        self
    }
}

impl Default for MetricsConfig {
    fn default() -> Self {
        Self::new()
    }
}

/// Aggregated view of the recorded attempts.
///
/// Rates and percentiles cover the records still in the ring buffer;
/// the `total_*` counters cover the aggregator's whole lifetime (until
/// [`MetricsAggregator::clear`]).
#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct MetricsSnapshot {
    /// Attempts completed in the trailing minute.
    pub requests_per_minute: u64,
    /// Attempts completed in the trailing hour.
    pub requests_per_hour: u64,
    /// Median latency.
    #[serde(rename = "p50Ms", serialize_with = "serde_fmt::millis")]
    pub p50: Duration,
    /// 95th percentile latency.
    #[serde(rename = "p95Ms", serialize_with = "serde_fmt::millis")]
    pub p95: Duration,
    /// 99th percentile latency.
    #[serde(rename = "p99Ms", serialize_with = "serde_fmt::millis")]
    pub p99: Duration,
    /// Fraction of failed attempts in the buffer (0.0..=1.0).
    pub error_rate: f64,
    /// Completion time of the newest attempt.
    #[serde(serialize_with = "serde_fmt::opt_timestamp")]
    pub last_request_timestamp: Option<SystemTime>,
    /// Records currently in the buffer.
    pub sample_count: usize,
    /// Attempts recorded since creation or the last clear.
    pub total_attempts: u64,
    /// Failed attempts recorded since creation or the last clear.
    pub total_failures: u64,
    /// Sends rejected by payload validation.
    pub validation_failures: u64,
    /// Sends rejected by an open circuit.
    pub circuit_rejections: u64,
}

/// Returns the nearest-rank percentile of `sorted` (ascending).
///
/// The rank is `ceil(pct / 100 * n)`, computed in integers. An empty
/// slice yields [`Duration::ZERO`].
///
/// # Example
///
/// ```
/// use chat_webhook::metrics::percentile;
/// use std::time::Duration;
///
/// let sorted: Vec<_> = [10, 20, 30, 40, 100].map(Duration::from_millis).to_vec();
/// assert_eq!(percentile(&sorted, 50), Duration::from_millis(30));
/// assert_eq!(percentile(&sorted, 95), Duration::from_millis(100));
/// ```
#[must_use]
pub fn percentile(sorted: &[Duration], pct: u32) -> Duration {
    if sorted.is_empty() {
        return Duration::ZERO;
    }
    let n = sorted.len();
    let pct = usize::try_from(pct.min(100)).unwrap_or(100);
    let rank = (pct * n).div_ceil(100).clamp(1, n);
    sorted[rank - 1]
}

#[derive(Debug, Default, Clone, Copy)]
struct Totals {
    attempts: u64,
    failures: u64,
    validation_failures: u64,
    circuit_rejections: u64,
}

#[derive(Debug)]
struct State {
    records: RingBuffer<PerformanceRecord>,
    totals: Totals,
    alerts: AlertEngine,
}

impl State {
    fn snapshot(&self, now: SystemTime) -> MetricsSnapshot {
        let within = |record: &PerformanceRecord, window: Duration| {
            now.duration_since(record.timestamp)
                .map_or(true, |age| age < window)
        };

        let mut latencies: Vec<Duration> = self.records.iter().map(|r| r.duration).collect();
        latencies.sort_unstable();

        let failures = self.records.iter().filter(|r| r.is_failure()).count();
        #[allow(clippy::cast_precision_loss)] // buffer sizes are far below 2^52
        let error_rate = if self.records.is_empty() {
            0.0
        } else {
            failures as f64 / self.records.len() as f64
        };

        MetricsSnapshot {
            requests_per_minute: count(self.records.iter().filter(|r| within(r, MINUTE))),
            requests_per_hour: count(self.records.iter().filter(|r| within(r, HOUR))),
            p50: percentile(&latencies, 50),
            p95: percentile(&latencies, 95),
            p99: percentile(&latencies, 99),
            error_rate,
            last_request_timestamp: self.records.latest().map(|r| r.timestamp),
            sample_count: self.records.len(),
            total_attempts: self.totals.attempts,
            total_failures: self.totals.failures,
            validation_failures: self.totals.validation_failures,
            circuit_rejections: self.totals.circuit_rejections,
        }
    }

    fn trailing_failures(&self) -> u32 {
        let run = self
            .records
            .iter()
            .rev()
            .take_while(|r| r.is_failure())
            .count();
        u32::try_from(run).unwrap_or(u32::MAX)
    }
}

fn count<I: Iterator>(iter: I) -> u64 {
    u64::try_from(iter.count()).unwrap_or(u64::MAX)
}

/// Thread-safe, in-memory metrics store.
///
/// Every mutation happens under a single mutex that is never held across
/// an `.await` or while alert callbacks run, so concurrent sends can
/// record attempts without lost updates.
pub struct MetricsAggregator {
    clock: Arc<dyn Clock>,
    latency_budget: Duration,
    state: Mutex<State>,
    subscribers: Mutex<Vec<(SubscriptionId, AlertCallback)>>,
    next_subscription: AtomicU64,
}

impl std::fmt::Debug for MetricsAggregator {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("MetricsAggregator")
            .field("latency_budget", &self.latency_budget)
            .field("records", &self.lock_state().records.len())
            .finish_non_exhaustive()
    }
}

impl Default for MetricsAggregator {
    fn default() -> Self {
        Self::new(MetricsConfig::default())
    }
}

impl MetricsAggregator {
    /// Creates an empty aggregator using the system clock.
    #[must_use]
    pub fn new(config: MetricsConfig) -> Self {
        Self::with_clock(config, Arc::new(SystemClock))
    }

    /// Creates an empty aggregator reading time from `clock`.
    #[must_use]
    pub fn with_clock(config: MetricsConfig, clock: Arc<dyn Clock>) -> Self {
        Self {
            clock,
            latency_budget: config.latency_budget,
            state: Mutex::new(State {
                records: RingBuffer::with_capacity(config.capacity),
                totals: Totals::default(),
                alerts: AlertEngine::new(config.alert_rules),
            }),
            subscribers: Mutex::new(Vec::new()),
            next_subscription: AtomicU64::new(1),
        }
    }

    fn lock_state(&self) -> MutexGuard<'_, State> {
        self.state.lock().unwrap_or_else(PoisonError::into_inner)
    }

    fn lock_subscribers(&self) -> MutexGuard<'_, Vec<(SubscriptionId, AlertCallback)>> {
        self.subscribers
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
    }

    /// Appends an attempt and evaluates the alert rules.
    pub fn record_attempt(&self, record: PerformanceRecord) {
        let now = self.clock.now();
        let fired = {
            let mut state = self.lock_state();
            state.totals.attempts += 1;
            if record.is_failure() {
                state.totals.failures += 1;
            }
            state.records.push(record);

            let snapshot = state.snapshot(now);
            let inputs = AlertInputs {
                samples: snapshot.sample_count,
                error_rate: snapshot.error_rate,
                p95: snapshot.p95,
                p99: snapshot.p99,
                consecutive_failures: state.trailing_failures(),
            };
            state.alerts.evaluate(&inputs, now)
        };

        if !fired.is_empty() {
            self.dispatch(&fired);
        }
    }

    /// Counts a send rejected by payload validation.
    pub fn record_validation_failure(&self) {
        self.lock_state().totals.validation_failures += 1;
    }

    /// Counts a send rejected by an open circuit.
    pub fn record_circuit_rejection(&self) {
        self.lock_state().totals.circuit_rejections += 1;
    }

    fn dispatch(&self, alerts: &[Alert]) {
        let callbacks: Vec<AlertCallback> = self
            .lock_subscribers()
            .iter()
            .map(|(_, cb)| Arc::clone(cb))
            .collect();

        for alert in alerts {
            tracing::warn!(rule = %alert.rule, severity = ?alert.severity, "Alert fired: {alert}");
            for callback in &callbacks {
                callback(alert);
            }
        }
    }

    /// Returns the current aggregated metrics.
    #[must_use]
    pub fn snapshot(&self) -> MetricsSnapshot {
        let now = self.clock.now();
        self.lock_state().snapshot(now)
    }

    /// Returns the dashboard view: snapshot, health, inferred circuit state,
    /// recent errors and recent alerts.
    #[must_use]
    pub fn dashboard_data(&self) -> DashboardData {
        let now = self.clock.now();
        let state = self.lock_state();
        let records: Vec<&PerformanceRecord> = state.records.iter().collect();
        dashboard::build(
            state.snapshot(now),
            &records,
            state.alerts.history(),
            self.latency_budget,
            now,
        )
    }

    /// Returns the configured alert rules.
    #[must_use]
    pub fn alert_rules(&self) -> Vec<AlertRule> {
        self.lock_state().alerts.rules().to_vec()
    }

    /// Registers a callback invoked for every fired alert.
    pub fn subscribe_alerts<F>(&self, callback: F) -> SubscriptionId
    where
        F: Fn(&Alert) + Send + Sync + 'static,
    {
        let id = SubscriptionId(self.next_subscription.fetch_add(1, Ordering::Relaxed));
        self.lock_subscribers().push((id, Arc::new(callback)));
        id
    }

    /// Removes a subscription. Returns false if it was not registered.
    pub fn unsubscribe_alerts(&self, id: SubscriptionId) -> bool {
        let mut subscribers = self.lock_subscribers();
        let before = subscribers.len();
        subscribers.retain(|(sid, _)| *sid != id);
        subscribers.len() != before
    }

    /// Drops every record, counter and alert cooldown.
    ///
    /// Subscriptions are kept.
    pub fn clear(&self) {
        let mut state = self.lock_state();
        state.records.clear();
        state.totals = Totals::default();
        state.alerts.clear();
    }
}
