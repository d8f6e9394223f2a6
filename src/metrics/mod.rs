//! Metrics and health aggregation for webhook attempts.
//!
//! This module provides:
//! - Per-attempt records ([`PerformanceRecord`]) kept in a bounded [`RingBuffer`]
//! - The thread-safe [`MetricsAggregator`] with nearest-rank [`percentile`]s
//! - Declarative alert rules with cooldowns ([`AlertRule`], [`Alert`])
//! - A serializable dashboard view with health classification ([`DashboardData`], [`HealthStatus`])
//!
//! Everything is in memory; nothing here performs I/O.

mod aggregator;
mod alerts;
mod dashboard;
mod record;
mod ring;
pub(crate) mod serde_fmt;

#[cfg(test)]
mod aggregator_tests;
#[cfg(test)]
mod alerts_tests;
#[cfg(test)]
mod dashboard_tests;

pub use aggregator::{MetricsAggregator, MetricsConfig, MetricsSnapshot, percentile};
pub use alerts::{Alert, AlertCallback, AlertCondition, AlertRule, AlertSeverity, SubscriptionId};
pub use dashboard::{DashboardData, HealthStatus, classify_health, infer_circuit_state};
pub use record::{ErrorKind, Outcome, PerformanceRecord};
pub use ring::RingBuffer;
