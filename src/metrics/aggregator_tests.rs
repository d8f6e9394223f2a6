//! Tests for `MetricsAggregator` and `percentile`.

use super::{ErrorKind, MetricsAggregator, MetricsConfig, PerformanceRecord, percentile};
use crate::time::{Clock, ManualClock};
use std::sync::Arc;
use std::time::Duration;

fn ms(values: &[u64]) -> Vec<Duration> {
    values.iter().copied().map(Duration::from_millis).collect()
}

fn aggregator(capacity: usize) -> (MetricsAggregator, Arc<ManualClock>) {
    let clock = Arc::new(ManualClock::from_millis(10_000_000));
    let config = MetricsConfig::new()
        .with_capacity(capacity)
        .with_alert_rules(Vec::new());
    (MetricsAggregator::with_clock(config, clock.clone()), clock)
}

fn success(clock: &ManualClock, millis: u64) -> PerformanceRecord {
    PerformanceRecord::success(clock.now(), Duration::from_millis(millis))
}

fn failure(clock: &ManualClock, millis: u64) -> PerformanceRecord {
    PerformanceRecord::failure(clock.now(), Duration::from_millis(millis), ErrorKind::Network)
}

mod percentiles {
    use super::*;

    #[test]
    fn nearest_rank_on_known_set() {
        let sorted = ms(&[10, 20, 30, 40, 100]);

        assert_eq!(percentile(&sorted, 50), Duration::from_millis(30));
        assert_eq!(percentile(&sorted, 95), Duration::from_millis(100));
        assert_eq!(percentile(&sorted, 99), Duration::from_millis(100));
    }

    #[test]
    fn empty_input_is_zero() {
        assert_eq!(percentile(&[], 50), Duration::ZERO);
        assert_eq!(percentile(&[], 99), Duration::ZERO);
    }

    #[test]
    fn single_value_is_every_percentile() {
        let sorted = ms(&[42]);
        for pct in [0, 1, 50, 95, 99, 100] {
            assert_eq!(percentile(&sorted, pct), Duration::from_millis(42));
        }
    }

    #[test]
    fn hundred_values_map_rank_directly() {
        let sorted: Vec<_> = (1..=100).map(Duration::from_millis).collect();

        assert_eq!(percentile(&sorted, 50), Duration::from_millis(50));
        assert_eq!(percentile(&sorted, 95), Duration::from_millis(95));
        assert_eq!(percentile(&sorted, 99), Duration::from_millis(99));
        assert_eq!(percentile(&sorted, 100), Duration::from_millis(100));
    }
}

mod snapshot {
    use super::*;

    #[test]
    fn empty_aggregator_reports_zeros() {
        let (metrics, _) = aggregator(10);
        let snapshot = metrics.snapshot();

        assert_eq!(snapshot.requests_per_minute, 0);
        assert_eq!(snapshot.requests_per_hour, 0);
        assert_eq!(snapshot.p50, Duration::ZERO);
        assert_eq!(snapshot.p99, Duration::ZERO);
        assert!(snapshot.error_rate.abs() < f64::EPSILON);
        assert!(snapshot.last_request_timestamp.is_none());
        assert_eq!(snapshot.sample_count, 0);
    }

    #[test]
    fn percentiles_are_computed_regardless_of_insertion_order() {
        let (metrics, clock) = aggregator(10);
        for millis in [100, 10, 40, 30, 20] {
            metrics.record_attempt(success(&clock, millis));
        }

        let snapshot = metrics.snapshot();
        assert_eq!(snapshot.p50, Duration::from_millis(30));
        assert_eq!(snapshot.p95, Duration::from_millis(100));
    }

    #[test]
    fn error_rate_counts_failures_in_buffer() {
        let (metrics, clock) = aggregator(10);
        metrics.record_attempt(success(&clock, 10));
        metrics.record_attempt(failure(&clock, 10));
        metrics.record_attempt(success(&clock, 10));
        metrics.record_attempt(failure(&clock, 10));

        let snapshot = metrics.snapshot();
        assert!((snapshot.error_rate - 0.5).abs() < f64::EPSILON);
        assert_eq!(snapshot.total_attempts, 4);
        assert_eq!(snapshot.total_failures, 2);
    }

    #[test]
    fn request_rates_use_trailing_windows() {
        let (metrics, clock) = aggregator(100);

        metrics.record_attempt(success(&clock, 10));
        clock.advance(Duration::from_secs(30 * 60));
        metrics.record_attempt(success(&clock, 10));
        clock.advance(Duration::from_secs(30));
        metrics.record_attempt(success(&clock, 10));
        metrics.record_attempt(success(&clock, 10));

        let snapshot = metrics.snapshot();
        // The record from thirty seconds ago is still inside the minute.
        assert_eq!(snapshot.requests_per_minute, 3);
        assert_eq!(snapshot.requests_per_hour, 4);

        clock.advance(Duration::from_secs(31 * 60));
        let snapshot = metrics.snapshot();
        assert_eq!(snapshot.requests_per_minute, 0);
        assert_eq!(snapshot.requests_per_hour, 3);
    }

    #[test]
    fn last_request_timestamp_tracks_newest_record() {
        let (metrics, clock) = aggregator(10);
        metrics.record_attempt(success(&clock, 10));
        clock.advance(Duration::from_secs(5));
        let newest = clock.now();
        metrics.record_attempt(success(&clock, 10));

        assert_eq!(metrics.snapshot().last_request_timestamp, Some(newest));
    }

    #[test]
    fn ring_buffer_evicts_oldest_but_totals_keep_counting() {
        let (metrics, clock) = aggregator(3);
        metrics.record_attempt(failure(&clock, 1000));
        for _ in 0..3 {
            metrics.record_attempt(success(&clock, 10));
        }

        let snapshot = metrics.snapshot();
        assert_eq!(snapshot.sample_count, 3);
        assert!(snapshot.error_rate.abs() < f64::EPSILON);
        assert_eq!(snapshot.p99, Duration::from_millis(10));
        assert_eq!(snapshot.total_attempts, 4);
        assert_eq!(snapshot.total_failures, 1);
    }

    #[test]
    fn rejection_counters_are_separate_from_attempts() {
        let (metrics, _) = aggregator(10);
        metrics.record_validation_failure();
        metrics.record_validation_failure();
        metrics.record_circuit_rejection();

        let snapshot = metrics.snapshot();
        assert_eq!(snapshot.validation_failures, 2);
        assert_eq!(snapshot.circuit_rejections, 1);
        assert_eq!(snapshot.total_attempts, 0);
    }

    #[test]
    fn clear_resets_everything() {
        let (metrics, clock) = aggregator(10);
        metrics.record_attempt(failure(&clock, 10));
        metrics.record_validation_failure();

        metrics.clear();

        let snapshot = metrics.snapshot();
        assert_eq!(snapshot.sample_count, 0);
        assert_eq!(snapshot.total_attempts, 0);
        assert_eq!(snapshot.validation_failures, 0);
    }

    #[test]
    fn snapshot_serializes_with_millisecond_fields() {
        let (metrics, clock) = aggregator(10);
        metrics.record_attempt(success(&clock, 250));

        let json = serde_json::to_value(metrics.snapshot()).unwrap();
        assert_eq!(json["p50Ms"], 250);
        assert_eq!(json["requestsPerMinute"], 1);
        assert!(json["lastRequestTimestamp"].is_string());
    }
}

mod concurrency {
    use super::*;

    #[tokio::test(flavor = "multi_thread", worker_threads = 4)]
    async fn concurrent_records_are_not_lost() {
        let (metrics, clock) = aggregator(10_000);
        let metrics = Arc::new(metrics);

        let tasks: Vec<_> = (0..16)
            .map(|i| {
                let metrics = metrics.clone();
                let clock = clock.clone();
                tokio::spawn(async move {
                    for j in 0..100 {
                        let record = if (i + j) % 4 == 0 {
                            failure(&clock, 5)
                        } else {
                            success(&clock, 5)
                        };
                        metrics.record_attempt(record);
                        tokio::task::yield_now().await;
                    }
                })
            })
            .collect();
        for task in tasks {
            task.await.unwrap();
        }

        let snapshot = metrics.snapshot();
        assert_eq!(snapshot.total_attempts, 1600);
        assert_eq!(snapshot.sample_count, 1600);
        assert_eq!(snapshot.total_failures, 400);
    }
}
