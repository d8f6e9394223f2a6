use super::{
    Alert, AlertCondition, AlertRule, AlertSeverity, ErrorKind, MetricsAggregator, MetricsConfig,
    PerformanceRecord,
};
use crate::time::{Clock, ManualClock};
use std::sync::{Arc, Mutex};
use std::time::Duration;

fn aggregator_with(rules: Vec<AlertRule>) -> (MetricsAggregator, Arc<ManualClock>) {
    let clock = Arc::new(ManualClock::from_millis(1_000_000));
    let config = MetricsConfig::new().with_alert_rules(rules);
    (MetricsAggregator::with_clock(config, clock.clone()), clock)
}

fn record_failure(metrics: &MetricsAggregator, clock: &ManualClock) {
    metrics.record_attempt(PerformanceRecord::failure(
        clock.now(),
        Duration::from_millis(20),
        ErrorKind::Http,
    ));
}

fn record_success(metrics: &MetricsAggregator, clock: &ManualClock, millis: u64) {
    metrics.record_attempt(PerformanceRecord::success(
        clock.now(),
        Duration::from_millis(millis),
    ));
}

fn collect(metrics: &MetricsAggregator) -> Arc<Mutex<Vec<Alert>>> {
    let seen = Arc::new(Mutex::new(Vec::new()));
    let sink = seen.clone();
    metrics.subscribe_alerts(move |alert| sink.lock().unwrap().push(alert.clone()));
    seen
}

mod rules {
    use super::*;

    #[test]
    fn defaults_cover_error_rate_latency_and_failure_runs() {
        let rules = AlertRule::defaults();
        let names: Vec<_> = rules.iter().map(|r| r.name.as_str()).collect();

        assert_eq!(
            names,
            [
                "high_error_rate",
                "critical_error_rate",
                "slow_p95",
                "slow_p99",
                "consecutive_failures"
            ]
        );
        assert!(rules.iter().all(|r| r.cooldown == AlertRule::DEFAULT_COOLDOWN));
    }

    #[test]
    fn builder_overrides_fields() {
        let rule = AlertRule::new("x", AlertCondition::ConsecutiveFailures(2))
            .with_severity(AlertSeverity::Critical)
            .with_cooldown(Duration::from_secs(1))
            .with_min_samples(0);

        assert_eq!(rule.severity, AlertSeverity::Critical);
        assert_eq!(rule.cooldown, Duration::from_secs(1));
        assert_eq!(rule.min_samples, 0);
    }

    #[test]
    fn aggregator_exposes_configured_rules() {
        let rule = AlertRule::new("only", AlertCondition::ErrorRateAbove(0.9));
        let (metrics, _) = aggregator_with(vec![rule.clone()]);

        assert_eq!(metrics.alert_rules(), vec![rule]);
    }
}

mod firing {
    use super::*;

    #[test]
    fn consecutive_failures_fires_once_within_cooldown() {
        let rule = AlertRule::new("failures", AlertCondition::ConsecutiveFailures(3))
            .with_min_samples(1)
            .with_cooldown(Duration::from_secs(60));
        let (metrics, clock) = aggregator_with(vec![rule]);
        let seen = collect(&metrics);

        for _ in 0..6 {
            record_failure(&metrics, &clock);
        }

        let alerts = seen.lock().unwrap();
        assert_eq!(alerts.len(), 1);
        assert_eq!(alerts[0].rule, "failures");
        assert!((alerts[0].value - 3.0).abs() < f64::EPSILON);
        assert!((alerts[0].threshold - 3.0).abs() < f64::EPSILON);
    }

    #[test]
    fn rule_fires_again_after_cooldown() {
        let rule = AlertRule::new("failures", AlertCondition::ConsecutiveFailures(1))
            .with_min_samples(1)
            .with_cooldown(Duration::from_secs(60));
        let (metrics, clock) = aggregator_with(vec![rule]);
        let seen = collect(&metrics);

        record_failure(&metrics, &clock);
        clock.advance(Duration::from_secs(59));
        record_failure(&metrics, &clock);
        clock.advance(Duration::from_secs(1));
        record_failure(&metrics, &clock);

        assert_eq!(seen.lock().unwrap().len(), 2);
    }

    #[test]
    fn min_samples_suppresses_early_evaluation() {
        let rule = AlertRule::new("errors", AlertCondition::ErrorRateAbove(0.5)).with_min_samples(4);
        let (metrics, clock) = aggregator_with(vec![rule]);
        let seen = collect(&metrics);

        for _ in 0..3 {
            record_failure(&metrics, &clock);
        }
        assert!(seen.lock().unwrap().is_empty());

        record_failure(&metrics, &clock);
        assert_eq!(seen.lock().unwrap().len(), 1);
    }

    #[test]
    fn latency_rule_reports_milliseconds() {
        let rule = AlertRule::new("slow", AlertCondition::P95Above(Duration::from_millis(100)))
            .with_min_samples(1);
        let (metrics, clock) = aggregator_with(vec![rule]);
        let seen = collect(&metrics);

        record_success(&metrics, &clock, 50);
        assert!(seen.lock().unwrap().is_empty());
        record_success(&metrics, &clock, 400);

        let alerts = seen.lock().unwrap();
        assert_eq!(alerts.len(), 1);
        assert!((alerts[0].value - 400.0).abs() < f64::EPSILON);
        assert!((alerts[0].threshold - 100.0).abs() < f64::EPSILON);
    }

    #[test]
    fn fired_alerts_appear_on_dashboard() {
        let rule = AlertRule::new("failures", AlertCondition::ConsecutiveFailures(1))
            .with_severity(AlertSeverity::Critical)
            .with_min_samples(1);
        let (metrics, clock) = aggregator_with(vec![rule]);

        record_failure(&metrics, &clock);

        let dashboard = metrics.dashboard_data();
        assert_eq!(dashboard.recent_alerts.len(), 1);
        assert_eq!(dashboard.recent_alerts[0].severity, AlertSeverity::Critical);
        assert_eq!(dashboard.recent_alerts[0].fired_at, clock.now());
    }

    #[test]
    fn clear_resets_cooldowns() {
        let rule = AlertRule::new("failures", AlertCondition::ConsecutiveFailures(1))
            .with_min_samples(1);
        let (metrics, clock) = aggregator_with(vec![rule]);
        let seen = collect(&metrics);

        record_failure(&metrics, &clock);
        metrics.clear();
        record_failure(&metrics, &clock);

        assert_eq!(seen.lock().unwrap().len(), 2);
    }
}

mod subscriptions {
    use super::*;

    #[test]
    fn every_subscriber_is_notified() {
        let rule = AlertRule::new("failures", AlertCondition::ConsecutiveFailures(1))
            .with_min_samples(1);
        let (metrics, clock) = aggregator_with(vec![rule]);
        let first = collect(&metrics);
        let second = collect(&metrics);

        record_failure(&metrics, &clock);

        assert_eq!(first.lock().unwrap().len(), 1);
        assert_eq!(second.lock().unwrap().len(), 1);
    }

    #[test]
    fn unsubscribed_callback_is_not_invoked() {
        let rule = AlertRule::new("failures", AlertCondition::ConsecutiveFailures(1))
            .with_min_samples(1)
            .with_cooldown(Duration::ZERO);
        let (metrics, clock) = aggregator_with(vec![rule]);
        let seen = Arc::new(Mutex::new(0_u32));
        let sink = seen.clone();
        let id = metrics.subscribe_alerts(move |_| *sink.lock().unwrap() += 1);

        record_failure(&metrics, &clock);
        assert!(metrics.unsubscribe_alerts(id));
        record_failure(&metrics, &clock);

        assert_eq!(*seen.lock().unwrap(), 1);
        assert!(!metrics.unsubscribe_alerts(id));
    }

    #[test]
    fn callback_may_read_metrics() {
        let rule = AlertRule::new("failures", AlertCondition::ConsecutiveFailures(1))
            .with_min_samples(1);
        let (metrics, clock) = aggregator_with(vec![rule]);
        let metrics = Arc::new(metrics);
        let observed = Arc::new(Mutex::new(None));

        let reader = Arc::downgrade(&metrics);
        let sink = observed.clone();
        metrics.subscribe_alerts(move |_| {
            if let Some(metrics) = reader.upgrade() {
                *sink.lock().unwrap() = Some(metrics.snapshot().total_failures);
            }
        });

        record_failure(&metrics, &clock);

        assert_eq!(*observed.lock().unwrap(), Some(1));
    }
}
