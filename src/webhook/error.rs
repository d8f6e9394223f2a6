//! Error types for webhook transport, single attempts and whole sends.

use std::time::Duration;

use thiserror::Error;

use super::retry::IsRetryable;
use crate::breaker::CircuitOpenError;
use crate::metrics::ErrorKind;
use crate::payload::ValidationErrors;

/// Transport-level failure reported by an [`HttpClient`](super::HttpClient).
///
/// Describes what went wrong without dictating recovery strategy.
#[derive(Debug, Error)]
pub enum HttpError {
    /// Network connection failed.
    ///
    /// This includes DNS resolution failures, connection refused,
    /// and resets while reading the body.
    #[error("Connection error: {0}")]
    Connection(#[source] Box<dyn std::error::Error + Send + Sync>),

    /// Request timed out.
    #[error("Request timed out")]
    Timeout,

    /// The request could not be built (bad URL or header).
    ///
    /// This indicates a configuration error rather than a transient failure.
    #[error("Invalid URL: {0}")]
    InvalidUrl(String),
}

impl IsRetryable for HttpError {
    fn is_retryable(&self) -> bool {
        match self {
            Self::Connection(_) | Self::Timeout => true,
            Self::InvalidUrl(_) => false,
        }
    }
}

/// Failure of one HTTP attempt within a send.
#[derive(Debug, Error)]
pub enum AttemptError {
    /// The request never produced a response.
    #[error(transparent)]
    Transport(#[from] HttpError),

    /// The endpoint answered with a non-2xx status.
    #[error("Unexpected status {status}")]
    Status {
        /// Response status.
        status: http::StatusCode,
        /// Response body, if it was valid UTF-8.
        body: Option<String>,
    },

    /// The endpoint answered 2xx but the body broke the response schema.
    #[error("Invalid response body: {0}")]
    InvalidResponse(#[source] ValidationErrors),
}

impl AttemptError {
    /// Classification used for metrics.
    #[must_use]
    pub const fn kind(&self) -> ErrorKind {
        match self {
            Self::Transport(HttpError::Timeout) => ErrorKind::Timeout,
            Self::Transport(_) => ErrorKind::Network,
            Self::Status { .. } => ErrorKind::Http,
            Self::InvalidResponse(_) => ErrorKind::Validation,
        }
    }

    /// HTTP status, if a response was received.
    #[must_use]
    pub const fn status(&self) -> Option<http::StatusCode> {
        match self {
            Self::Status { status, .. } => Some(*status),
            Self::Transport(_) | Self::InvalidResponse(_) => None,
        }
    }
}

impl IsRetryable for AttemptError {
    fn is_retryable(&self) -> bool {
        match self {
            Self::Transport(e) => e.is_retryable(),
            // 5xx, 429 Too Many Requests and 408 Request Timeout are transient
            Self::Status { status, .. } => {
                status.is_server_error()
                    || *status == http::StatusCode::TOO_MANY_REQUESTS
                    || *status == http::StatusCode::REQUEST_TIMEOUT
            }
            Self::InvalidResponse(_) => false,
        }
    }
}

/// Typed outcome of a failed [`ChatWebhook::send_message`](super::ChatWebhook::send_message).
#[derive(Debug, Error)]
pub enum WebhookError {
    /// The outbound payload or the inbound response broke its schema.
    ///
    /// Never retried. Carries every violation found.
    #[error("Validation failed: {0}")]
    Validation(#[source] ValidationErrors),

    /// The circuit breaker rejected the send; no request was made.
    #[error(transparent)]
    CircuitOpen(#[from] CircuitOpenError),

    /// Transport failure on the last attempt.
    #[error("Network error after {attempts} attempt(s): {message}")]
    Network {
        /// Attempts made.
        attempts: u32,
        /// Description of the last transport failure.
        message: String,
    },

    /// The last attempt exceeded its deadline.
    #[error("Timed out after {attempts} attempt(s) ({timeout:?} per attempt)")]
    Timeout {
        /// Attempts made.
        attempts: u32,
        /// Per-attempt deadline.
        timeout: Duration,
    },

    /// The endpoint answered with a non-2xx status.
    #[error("HTTP {status} after {attempts} attempt(s)")]
    Http {
        /// Status of the last response.
        status: u16,
        /// Attempts made.
        attempts: u32,
        /// Body of the last response, if it was valid UTF-8.
        body: Option<String>,
    },

    /// The caller cancelled the send.
    #[error("Cancelled after {attempts} attempt(s)")]
    Cancelled {
        /// Attempts started before cancellation.
        attempts: u32,
    },
}

impl WebhookError {
    /// Converts the failure of the final attempt into a send error.
    pub(crate) fn from_attempt(error: AttemptError, attempts: u32, timeout: Duration) -> Self {
        match error {
            AttemptError::Transport(HttpError::Timeout) => Self::Timeout { attempts, timeout },
            AttemptError::Transport(e) => Self::Network {
                attempts,
                message: e.to_string(),
            },
            AttemptError::Status { status, body } => Self::Http {
                status: status.as_u16(),
                attempts,
                body,
            },
            AttemptError::InvalidResponse(errors) => Self::Validation(errors),
        }
    }

    /// Classification used for metrics and callers' branching.
    #[must_use]
    pub const fn kind(&self) -> ErrorKind {
        match self {
            Self::Validation(_) => ErrorKind::Validation,
            Self::CircuitOpen(_) => ErrorKind::CircuitOpen,
            Self::Network { .. } => ErrorKind::Network,
            Self::Timeout { .. } => ErrorKind::Timeout,
            Self::Http { .. } => ErrorKind::Http,
            Self::Cancelled { .. } => ErrorKind::Cancelled,
        }
    }

    /// Number of HTTP attempts made.
    ///
    /// `Validation` and `CircuitOpen` report 0.
    #[must_use]
    pub const fn attempts(&self) -> u32 {
        match self {
            Self::Validation(_) | Self::CircuitOpen(_) => 0,
            Self::Network { attempts, .. }
            | Self::Timeout { attempts, .. }
            | Self::Http { attempts, .. }
            | Self::Cancelled { attempts } => *attempts,
        }
    }

    /// Returns true when callers should answer with a locally generated reply.
    ///
    /// This holds when the endpoint is unreachable: an open circuit or a
    /// network failure.
    #[must_use]
    pub const fn should_fallback(&self) -> bool {
        matches!(self, Self::CircuitOpen(_) | Self::Network { .. })
    }
}
