//! Per-attempt performance records.

use std::fmt;
use std::time::{Duration, SystemTime};

use serde::Serialize;

use super::serde_fmt;

/// Classification of a failed attempt or send.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum ErrorKind {
    /// Payload or response failed schema checks.
    Validation,
    /// Rejected by an open circuit breaker.
    CircuitOpen,
    /// Transport failure (DNS, connection refused, reset).
    Network,
    /// Attempt exceeded its deadline.
    Timeout,
    /// Non-2xx HTTP status.
    Http,
    /// Cancelled by the caller.
    Cancelled,
}

impl fmt::Display for ErrorKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(match self {
            Self::Validation => "validation",
            Self::CircuitOpen => "circuit_open",
            Self::Network => "network",
            Self::Timeout => "timeout",
            Self::Http => "http",
            Self::Cancelled => "cancelled",
        })
    }
}

/// Outcome of one attempt.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum Outcome {
    /// The attempt produced a valid response.
    Success,
    /// The attempt failed.
    Failure,
}

/// One completed HTTP attempt.
///
/// Records are immutable once created; the aggregator only appends them
/// and evicts the oldest.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct PerformanceRecord {
    /// When the attempt completed.
    #[serde(serialize_with = "serde_fmt::timestamp")]
    pub timestamp: SystemTime,
    /// How long the attempt took.
    #[serde(rename = "durationMs", serialize_with = "serde_fmt::millis")]
    pub duration: Duration,
    /// Success or failure.
    pub outcome: Outcome,
    /// HTTP status, if a response was received.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub http_status: Option<u16>,
    /// Failure classification.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub error_kind: Option<ErrorKind>,
    /// 1-based attempt number within its send.
    pub attempt: u32,
    /// Correlation ID of the send.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub request_id: Option<String>,
}

impl PerformanceRecord {
    /// Creates a successful first-attempt record.
    #[must_use]
    pub const fn success(timestamp: SystemTime, duration: Duration) -> Self {
        Self {
            timestamp,
            duration,
            outcome: Outcome::Success,
            http_status: None,
            error_kind: None,
            attempt: 1,
            request_id: None,
        }
    }

    /// Creates a failed first-attempt record.
    #[must_use]
    pub const fn failure(timestamp: SystemTime, duration: Duration, kind: ErrorKind) -> Self {
        Self {
            timestamp,
            duration,
            outcome: Outcome::Failure,
            http_status: None,
            error_kind: Some(kind),
            attempt: 1,
            request_id: None,
        }
    }

    /// Sets the HTTP status.
    #[must_use]
    pub const fn with_status(mut self, status: u16) -> Self {
        self.http_status = Some(status);
        self
    }

    /// Sets the attempt number.
    #[must_use]
    pub const fn with_attempt(mut self, attempt: u32) -> Self {
        self.attempt = attempt;
        self
    }

    /// Sets the correlation ID.
    #[must_use]
    pub fn with_request_id(mut self, request_id: impl Into<String>) -> Self {
        self.request_id = Some(request_id.into());
        self
    }

    /// Returns true for failed attempts.
    #[must_use]
    pub fn is_failure(&self) -> bool {
        self.outcome == Outcome::Failure
    }
}
