//! Dashboard view and health classification.

use std::fmt;
use std::time::{Duration, SystemTime};

use serde::Serialize;

use super::aggregator::MetricsSnapshot;
use super::alerts::Alert;
use super::record::PerformanceRecord;
use super::serde_fmt;
use crate::breaker::CircuitState;

/// Trailing failures that make the dashboard infer an open circuit.
const INFERRED_OPEN_RUN: usize = 5;

/// Records inspected when inferring a half-open circuit.
const INFERENCE_WINDOW: usize = 10;

/// Number of recent failures listed on the dashboard.
const RECENT_ERRORS: usize = 10;

/// Error rate at or above which the service is unhealthy.
const UNHEALTHY_ERROR_RATE: f64 = 0.5;

/// Error rate at or above which the service is degraded.
const DEGRADED_ERROR_RATE: f64 = 0.1;

/// Three-state service health.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum HealthStatus {
    /// Working within budget.
    Healthy,
    /// Working, but slow or error-prone.
    Degraded,
    /// Failing.
    Unhealthy,
}

impl fmt::Display for HealthStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(match self {
            Self::Healthy => "healthy",
            Self::Degraded => "degraded",
            Self::Unhealthy => "unhealthy",
        })
    }
}

/// Everything a monitoring dashboard needs in one serializable value.
#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct DashboardData {
    /// When this view was built.
    #[serde(serialize_with = "serde_fmt::timestamp")]
    pub generated_at: SystemTime,
    /// Aggregated metrics.
    pub metrics: MetricsSnapshot,
    /// Health derived from the metrics.
    pub health: HealthStatus,
    /// Circuit state guessed from recent failures.
    ///
    /// This is a diagnostic aid derived from the records alone; the real
    /// breaker may disagree.
    pub inferred_circuit_state: CircuitState,
    /// Latency budget used for the health verdict.
    #[serde(rename = "latencyBudgetMs", serialize_with = "serde_fmt::millis")]
    pub latency_budget: Duration,
    /// Most recent failed attempts, newest first.
    pub recent_errors: Vec<PerformanceRecord>,
    /// Most recent alerts, oldest first.
    pub recent_alerts: Vec<Alert>,
}

/// Guesses the breaker state from the failure pattern of `records` (oldest first).
///
/// - A trailing run of 5 or more failures reads as `Open`
/// - Half or more failures among the last 10 records reads as `HalfOpen`
/// - Anything else reads as `Closed`
#[must_use]
pub fn infer_circuit_state(records: &[&PerformanceRecord]) -> CircuitState {
    let trailing = records.iter().rev().take_while(|r| r.is_failure()).count();
    if trailing >= INFERRED_OPEN_RUN {
        return CircuitState::Open;
    }

    let window = records.len().min(INFERENCE_WINDOW);
    let failures = records
        .iter()
        .rev()
        .take(window)
        .filter(|r| r.is_failure())
        .count();
    if window > 0 && failures * 2 >= window {
        CircuitState::HalfOpen
    } else {
        CircuitState::Closed
    }
}

/// Derives a health verdict from metrics and the inferred circuit state.
#[must_use]
pub fn classify_health(
    metrics: &MetricsSnapshot,
    inferred: CircuitState,
    latency_budget: Duration,
) -> HealthStatus {
    if metrics.sample_count == 0 {
        return HealthStatus::Healthy;
    }
    if inferred == CircuitState::Open || metrics.error_rate >= UNHEALTHY_ERROR_RATE {
        return HealthStatus::Unhealthy;
    }
    if inferred == CircuitState::HalfOpen
        || metrics.error_rate >= DEGRADED_ERROR_RATE
        || metrics.p95 > latency_budget
    {
        return HealthStatus::Degraded;
    }
    HealthStatus::Healthy
}

pub(crate) fn build(
    metrics: MetricsSnapshot,
    records: &[&PerformanceRecord],
    recent_alerts: Vec<Alert>,
    latency_budget: Duration,
    now: SystemTime,
) -> DashboardData {
    let inferred = infer_circuit_state(records);
    let health = classify_health(&metrics, inferred, latency_budget);
    let recent_errors = records
        .iter()
        .rev()
        .filter(|r| r.is_failure())
        .take(RECENT_ERRORS)
        .map(|r| (*r).clone())
        .collect();

    DashboardData {
        generated_at: now,
        metrics,
        health,
        inferred_circuit_state: inferred,
        latency_budget,
        recent_errors,
        recent_alerts,
    }
}
