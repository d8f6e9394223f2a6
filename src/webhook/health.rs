//! Result of an endpoint health probe.

use std::time::{Duration, SystemTime};

use serde::Serialize;

use crate::metrics::HealthStatus;
use crate::metrics::serde_fmt;

/// Outcome of [`ChatWebhook::health_check`](super::ChatWebhook::health_check).
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct HealthReport {
    /// Verdict.
    pub status: HealthStatus,
    /// Probe round-trip time.
    #[serde(rename = "latencyMs", serialize_with = "serde_fmt::millis")]
    pub latency: Duration,
    /// When the probe finished.
    #[serde(serialize_with = "serde_fmt::timestamp")]
    pub checked_at: SystemTime,
    /// Response status, if any.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub status_code: Option<u16>,
    /// Why the probe failed.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub error: Option<String>,
}

impl HealthReport {
    pub(crate) fn answered(
        status_code: u16,
        latency: Duration,
        budget: Duration,
        checked_at: SystemTime,
    ) -> Self {
        let status = if latency <= budget {
            HealthStatus::Healthy
        } else {
            HealthStatus::Degraded
        };
        Self {
            status,
            latency,
            checked_at,
            status_code: Some(status_code),
            error: None,
        }
    }

    pub(crate) fn failed(
        latency: Duration,
        checked_at: SystemTime,
        status_code: Option<u16>,
        error: String,
    ) -> Self {
        Self {
            status: HealthStatus::Unhealthy,
            latency,
            checked_at,
            status_code,
            error: Some(error),
        }
    }

    /// Returns true unless the endpoint is unhealthy.
    #[must_use]
    pub fn is_available(&self) -> bool {
        self.status != HealthStatus::Unhealthy
    }
}
