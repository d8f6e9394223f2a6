use super::{
    ErrorKind, HealthStatus, MetricsAggregator, MetricsConfig, MetricsSnapshot, PerformanceRecord,
    classify_health, infer_circuit_state,
};
use crate::breaker::CircuitState;
use crate::time::{Clock, ManualClock};
use std::sync::Arc;
use std::time::{Duration, SystemTime};

fn records(pattern: &str) -> Vec<PerformanceRecord> {
    pattern
        .chars()
        .map(|c| {
            let ts = SystemTime::UNIX_EPOCH;
            let dur = Duration::from_millis(10);
            if c == 'x' {
                PerformanceRecord::failure(ts, dur, ErrorKind::Network)
            } else {
                PerformanceRecord::success(ts, dur)
            }
        })
        .collect()
}

fn infer(pattern: &str) -> CircuitState {
    let owned = records(pattern);
    let refs: Vec<&PerformanceRecord> = owned.iter().collect();
    infer_circuit_state(&refs)
}

fn snapshot(samples: usize, error_rate: f64, p95_ms: u64) -> MetricsSnapshot {
    MetricsSnapshot {
        requests_per_minute: 0,
        requests_per_hour: 0,
        p50: Duration::from_millis(p95_ms),
        p95: Duration::from_millis(p95_ms),
        p99: Duration::from_millis(p95_ms),
        error_rate,
        last_request_timestamp: None,
        sample_count: samples,
        total_attempts: 0,
        total_failures: 0,
        validation_failures: 0,
        circuit_rejections: 0,
    }
}

const BUDGET: Duration = Duration::from_secs(3);

mod inference {
    use super::*;

    #[test]
    fn no_records_is_closed() {
        assert_eq!(infer(""), CircuitState::Closed);
    }

    #[test]
    fn five_trailing_failures_is_open() {
        assert_eq!(infer("ooooooxxxxx"), CircuitState::Open);
    }

    #[test]
    fn four_trailing_failures_with_mostly_success_is_closed() {
        assert_eq!(infer("ooooooooxxxx"), CircuitState::Closed);
    }

    #[test]
    fn half_failures_in_window_is_half_open() {
        assert_eq!(infer("xoxoxoxoxo"), CircuitState::HalfOpen);
    }

    #[test]
    fn only_last_ten_records_count() {
        assert_eq!(infer("xxxxxxxxxoooooooxoo"), CircuitState::Closed);
    }
}

mod classification {
    use super::*;

    #[test]
    fn no_samples_is_healthy() {
        let metrics = snapshot(0, 0.0, 0);
        assert_eq!(
            classify_health(&metrics, CircuitState::Closed, BUDGET),
            HealthStatus::Healthy
        );
    }

    #[test]
    fn low_errors_within_budget_is_healthy() {
        let metrics = snapshot(100, 0.05, 200);
        assert_eq!(
            classify_health(&metrics, CircuitState::Closed, BUDGET),
            HealthStatus::Healthy
        );
    }

    #[test]
    fn slow_p95_is_degraded() {
        let metrics = snapshot(100, 0.0, 3500);
        assert_eq!(
            classify_health(&metrics, CircuitState::Closed, BUDGET),
            HealthStatus::Degraded
        );
    }

    #[test]
    fn moderate_error_rate_is_degraded() {
        let metrics = snapshot(100, 0.1, 100);
        assert_eq!(
            classify_health(&metrics, CircuitState::Closed, BUDGET),
            HealthStatus::Degraded
        );
    }

    #[test]
    fn half_open_is_degraded() {
        let metrics = snapshot(100, 0.0, 100);
        assert_eq!(
            classify_health(&metrics, CircuitState::HalfOpen, BUDGET),
            HealthStatus::Degraded
        );
    }

    #[test]
    fn high_error_rate_is_unhealthy() {
        let metrics = snapshot(100, 0.5, 100);
        assert_eq!(
            classify_health(&metrics, CircuitState::Closed, BUDGET),
            HealthStatus::Unhealthy
        );
    }

    #[test]
    fn inferred_open_is_unhealthy() {
        let metrics = snapshot(100, 0.05, 100);
        assert_eq!(
            classify_health(&metrics, CircuitState::Open, BUDGET),
            HealthStatus::Unhealthy
        );
    }
}

mod dashboard {
    use super::*;

    fn aggregator() -> (MetricsAggregator, Arc<ManualClock>) {
        let clock = Arc::new(ManualClock::from_millis(5_000_000));
        let config = MetricsConfig::new()
            .with_alert_rules(Vec::new())
            .with_latency_budget(Duration::from_millis(500));
        (MetricsAggregator::with_clock(config, clock.clone()), clock)
    }

    #[test]
    fn recent_errors_are_newest_first_and_capped() {
        let (metrics, clock) = aggregator();
        for attempt in 1..=12 {
            metrics.record_attempt(
                PerformanceRecord::failure(clock.now(), Duration::from_millis(5), ErrorKind::Timeout)
                    .with_attempt(attempt),
            );
        }
        metrics.record_attempt(PerformanceRecord::success(clock.now(), Duration::from_millis(5)));

        let data = metrics.dashboard_data();
        let attempts: Vec<u32> = data.recent_errors.iter().map(|r| r.attempt).collect();
        assert_eq!(attempts, (3..=12).rev().collect::<Vec<_>>());
    }

    #[test]
    fn failing_service_reads_unhealthy_and_open() {
        let (metrics, clock) = aggregator();
        for _ in 0..5 {
            metrics.record_attempt(PerformanceRecord::failure(
                clock.now(),
                Duration::from_millis(5),
                ErrorKind::Http,
            ));
        }

        let data = metrics.dashboard_data();
        assert_eq!(data.inferred_circuit_state, CircuitState::Open);
        assert_eq!(data.health, HealthStatus::Unhealthy);
        assert_eq!(data.generated_at, clock.now());
        assert_eq!(data.latency_budget, Duration::from_millis(500));
    }

    #[test]
    fn serializes_for_dashboards() {
        let (metrics, clock) = aggregator();
        metrics.record_attempt(
            PerformanceRecord::failure(clock.now(), Duration::from_millis(5), ErrorKind::Http)
                .with_status(503),
        );

        let json = serde_json::to_value(metrics.dashboard_data()).unwrap();
        assert_eq!(json["latencyBudgetMs"], 500);
        assert_eq!(json["inferredCircuitState"], "half_open");
        assert_eq!(json["health"], "unhealthy");
        assert!(json["metrics"]["p95Ms"].is_u64());
        assert_eq!(json["recentErrors"].as_array().unwrap().len(), 1);
    }
}
