//! Declarative alert rules with per-rule cooldowns.

use std::collections::VecDeque;
use std::fmt;
use std::sync::Arc;
use std::time::{Duration, SystemTime};

use serde::Serialize;

use super::serde_fmt;

/// Number of fired alerts kept for the dashboard.
const ALERT_HISTORY: usize = 20;

/// How urgent an alert is.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum AlertSeverity {
    /// Worth a look.
    Warning,
    /// Needs attention now.
    Critical,
}

/// Condition evaluated against the current metrics window.
#[derive(Debug, Clone, Copy, PartialEq, Serialize)]
#[serde(tag = "kind", content = "threshold", rename_all = "snake_case")]
pub enum AlertCondition {
    /// Error rate (0.0..=1.0) strictly above the threshold.
    ErrorRateAbove(f64),
    /// p95 latency strictly above the threshold.
    P95Above(#[serde(serialize_with = "serde_fmt::millis")] Duration),
    /// p99 latency strictly above the threshold.
    P99Above(#[serde(serialize_with = "serde_fmt::millis")] Duration),
    /// At least this many failed attempts in a row.
    ConsecutiveFailures(u32),
}

/// A named condition with its cooldown.
///
/// A rule fires at most once per `cooldown`, however long its condition
/// keeps holding.
#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct AlertRule {
    /// Unique rule name.
    pub name: String,
    /// What triggers the rule.
    pub condition: AlertCondition,
    /// Severity of fired alerts.
    pub severity: AlertSeverity,
    /// Minimum time between two firings.
    #[serde(rename = "cooldownMs", serialize_with = "serde_fmt::millis")]
    pub cooldown: Duration,
    /// Minimum records in the window before the rule is evaluated.
    pub min_samples: usize,
}

impl AlertRule {
    /// Default cooldown (5 minutes).
    pub const DEFAULT_COOLDOWN: Duration = Duration::from_secs(300);

    /// Default minimum sample count.
    pub const DEFAULT_MIN_SAMPLES: usize = 10;

    /// Creates a warning-level rule with default cooldown and sample floor.
    #[must_use]
    pub fn new(name: impl Into<String>, condition: AlertCondition) -> Self {
        Self {
            name: name.into(),
            condition,
            severity: AlertSeverity::Warning,
            cooldown: Self::DEFAULT_COOLDOWN,
            min_samples: Self::DEFAULT_MIN_SAMPLES,
        }
    }

    /// Sets the severity.
    #[must_use]
    pub const fn with_severity(mut self, severity: AlertSeverity) -> Self {
        self.severity = severity;
        self
    }

    /// Sets the cooldown.
    #[must_use]
    pub const fn with_cooldown(mut self, cooldown: Duration) -> Self {
        self.cooldown = cooldown;
        self
    }

    /// Sets the minimum sample count.
    #[must_use]
    pub const fn with_min_samples(mut self, min_samples: usize) -> Self {
        self.min_samples = min_samples;
        self
    }

    /// Built-in rules used when none are configured.
    #[must_use]
    pub fn defaults() -> Vec<Self> {
        vec![
            Self::new("high_error_rate", AlertCondition::ErrorRateAbove(0.25)),
            Self::new("critical_error_rate", AlertCondition::ErrorRateAbove(0.5))
                .with_severity(AlertSeverity::Critical),
            Self::new("slow_p95", AlertCondition::P95Above(Duration::from_secs(5))),
            Self::new("slow_p99", AlertCondition::P99Above(Duration::from_secs(10))),
            Self::new("consecutive_failures", AlertCondition::ConsecutiveFailures(5))
                .with_severity(AlertSeverity::Critical)
                .with_min_samples(1),
        ]
    }

    /// Returns the observed value and threshold if the condition holds.
    fn check(&self, inputs: &AlertInputs) -> Option<(f64, f64)> {
        let (value, threshold, holds) = match self.condition {
            AlertCondition::ErrorRateAbove(limit) => {
                (inputs.error_rate, limit, inputs.error_rate > limit)
            }
            AlertCondition::P95Above(limit) => (
                as_millis_f64(inputs.p95),
                as_millis_f64(limit),
                inputs.p95 > limit,
            ),
            AlertCondition::P99Above(limit) => (
                as_millis_f64(inputs.p99),
                as_millis_f64(limit),
                inputs.p99 > limit,
            ),
            AlertCondition::ConsecutiveFailures(limit) => (
                f64::from(inputs.consecutive_failures),
                f64::from(limit),
                inputs.consecutive_failures >= limit,
            ),
        };
        holds.then_some((value, threshold))
    }
}

fn as_millis_f64(duration: Duration) -> f64 {
    duration.as_secs_f64() * 1000.0
}

/// A fired alert.
#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct Alert {
    /// Name of the rule that fired.
    pub rule: String,
    /// Severity of the rule.
    pub severity: AlertSeverity,
    /// Observed value (rate, milliseconds or count).
    pub value: f64,
    /// Threshold it crossed, in the same unit.
    pub threshold: f64,
    /// When the alert fired.
    #[serde(serialize_with = "serde_fmt::timestamp")]
    pub fired_at: SystemTime,
}

impl fmt::Display for Alert {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "{} ({:?}): value {:.3} crossed threshold {:.3}",
            self.rule, self.severity, self.value, self.threshold
        )
    }
}

/// Identifies an alert subscription for later removal.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct SubscriptionId(pub(crate) u64);

/// Callback invoked for each fired alert.
pub type AlertCallback = Arc<dyn Fn(&Alert) + Send + Sync>;

/// Values the rules are evaluated against.
#[derive(Debug, Clone, Copy, Default)]
pub(crate) struct AlertInputs {
    pub samples: usize,
    pub error_rate: f64,
    pub p95: Duration,
    pub p99: Duration,
    pub consecutive_failures: u32,
}

/// Rule evaluation state: cooldown bookkeeping and recent history.
#[derive(Debug)]
pub(crate) struct AlertEngine {
    rules: Vec<AlertRule>,
    last_fired: Vec<Option<SystemTime>>,
    history: VecDeque<Alert>,
}

impl AlertEngine {
    pub fn new(rules: Vec<AlertRule>) -> Self {
        let last_fired = vec![None; rules.len()];
        Self {
            rules,
            last_fired,
            history: VecDeque::with_capacity(ALERT_HISTORY),
        }
    }

    pub fn rules(&self) -> &[AlertRule] {
        &self.rules
    }

    /// Evaluates every rule, returning the alerts that fired now.
    pub fn evaluate(&mut self, inputs: &AlertInputs, now: SystemTime) -> Vec<Alert> {
        let mut fired = Vec::new();

        for (rule, last) in self.rules.iter().zip(self.last_fired.iter_mut()) {
            if inputs.samples < rule.min_samples {
                continue;
            }
            let Some((value, threshold)) = rule.check(inputs) else {
                continue;
            };
            let cooling = last.is_some_and(|at| {
                now.duration_since(at).unwrap_or(Duration::ZERO) < rule.cooldown
            });
            if cooling {
                continue;
            }

            *last = Some(now);
            fired.push(Alert {
                rule: rule.name.clone(),
                severity: rule.severity,
                value,
                threshold,
                fired_at: now,
            });
        }

        for alert in &fired {
            if self.history.len() == ALERT_HISTORY {
                self.history.pop_front();
            }
            self.history.push_back(alert.clone());
        }

        fired
    }

    /// Returns recently fired alerts, newest last.
    pub fn history(&self) -> Vec<Alert> {
        self.history.iter().cloned().collect()
    }

    /// Forgets cooldowns and history.
    pub fn clear(&mut self) {
        self.last_fired.iter_mut().for_each(|t| *t = None);
        self.history.clear();
    }
}
