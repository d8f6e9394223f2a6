//! Construction-time settings and per-send options.

use std::fmt;
use std::time::Duration;

use tokio_util::sync::CancellationToken;

use super::RetryPolicy;
use crate::breaker::BreakerConfig;
use crate::metrics::MetricsConfig;
use crate::payload::Metadata;

/// Health probe settings.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct HealthCheckConfig {
    /// Probe target; the webhook URL when `None`.
    pub url: Option<url::Url>,
    /// Deadline for the probe request.
    pub timeout: Duration,
    /// Probe latency above which the endpoint counts as degraded.
    pub latency_budget: Duration,
}

impl HealthCheckConfig {
    /// Default probe timeout (5 seconds).
    pub const DEFAULT_TIMEOUT: Duration = Duration::from_secs(5);

    /// Default probe latency budget (1 second).
    pub const DEFAULT_LATENCY_BUDGET: Duration = Duration::from_secs(1);
}

impl Default for HealthCheckConfig {
    fn default() -> Self {
        Self {
            url: None,
            timeout: Self::DEFAULT_TIMEOUT,
            latency_budget: Self::DEFAULT_LATENCY_BUDGET,
        }
    }
}

/// Everything a [`ChatWebhook`](super::ChatWebhook) needs at construction.
///
/// # Defaults
///
/// - `secret`: none (no `Authorization` header)
/// - `timeout`: 30 seconds per attempt
/// - `retry`, `breaker`, `health`, `metrics`: their own defaults
/// - `monitoring_enabled`: true
/// - `client_version`: this crate's version
#[derive(Clone, PartialEq)]
pub struct WebhookConfig {
    /// Workflow webhook endpoint.
    pub url: url::Url,
    /// Shared secret sent as a bearer token.
    pub secret: Option<String>,
    /// Deadline for each HTTP attempt.
    pub timeout: Duration,
    /// Retry behavior.
    pub retry: RetryPolicy,
    /// Circuit breaker threshold and recovery timeout.
    pub breaker: BreakerConfig,
    /// Whether attempts are recorded in the metrics aggregator.
    pub monitoring_enabled: bool,
    /// Health probe settings.
    pub health: HealthCheckConfig,
    /// Value of `clientVersion` in every payload.
    pub client_version: String,
    /// Metrics buffer size, latency budget and alert rules.
    pub metrics: MetricsConfig,
}

impl WebhookConfig {
    /// Default per-attempt timeout (30 seconds).
    pub const DEFAULT_TIMEOUT: Duration = Duration::from_secs(30);

    /// Creates a configuration for `url` with default values.
    #[must_use]
    pub fn new(url: url::Url) -> Self {
        Self {
            url,
            secret: None,
            timeout: Self::DEFAULT_TIMEOUT,
            retry: RetryPolicy::default(),
            breaker: BreakerConfig::default(),
            monitoring_enabled: true,
            health: HealthCheckConfig::default(),
            client_version: env!("CARGO_PKG_VERSION").to_string(),
            metrics: MetricsConfig::default(),
        }
    }

    /// Sets the shared secret.
    #[must_use]
    pub fn with_secret(mut self, secret: impl Into<String>) -> Self {
        self.secret = Some(secret.into());
        self
    }

    /// Sets the per-attempt timeout.
    #[must_use]
    pub const fn with_timeout(mut self, timeout: Duration) -> Self {
        self.timeout = timeout;
        self
    }

    /// Sets the retry policy.
    #[must_use]
    pub fn with_retry_policy(mut self, policy: RetryPolicy) -> Self {
        self.retry = policy;
        self
    }

    /// Sets the breaker configuration.
    #[must_use]
    pub const fn with_breaker(mut self, breaker: BreakerConfig) -> Self {
        self.breaker = breaker;
        self
    }

    /// Enables or disables metrics recording.
    #[must_use]
    pub const fn with_monitoring(mut self, enabled: bool) -> Self {
        self.monitoring_enabled = enabled;
        self
    }

    /// Sets the health probe settings.
    #[must_use]
    pub fn with_health(mut self, health: HealthCheckConfig) -> Self {
        self.health = health;
        self
    }

    /// Sets the client version reported in payloads.
    #[must_use]
    pub fn with_client_version(mut self, version: impl Into<String>) -> Self {
        self.client_version = version.into();
        self
    }

    /// Sets the metrics configuration.
    #[must_use]
    pub fn with_metrics(mut self, metrics: MetricsConfig) -> Self {
        self.metrics = metrics;
        self
    }

    /// Returns the URL the health probe targets.
    #[must_use]
    pub fn health_url(&self) -> &url::Url {
        self.health.url.as_ref().unwrap_or(&self.url)
    }
}

impl fmt::Debug for WebhookConfig {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("WebhookConfig")
            .field("url", &self.url.as_str())
            .field("secret", &self.secret.as_ref().map(|_| "[REDACTED]"))
            .field("timeout", &self.timeout)
            .field("retry", &self.retry)
            .field("breaker", &self.breaker)
            .field("monitoring_enabled", &self.monitoring_enabled)
            .field("health", &self.health)
            .field("client_version", &self.client_version)
            .field("metrics", &self.metrics)
            .finish()
    }
}

/// Optional parts of a single send.
#[derive(Debug, Clone, Default)]
pub struct SendOptions {
    /// Conversation the message belongs to.
    pub conversation_id: Option<String>,
    /// Free-form metadata.
    pub metadata: Option<Metadata>,
    /// Token that aborts the send when cancelled.
    pub cancel: Option<CancellationToken>,
}

impl SendOptions {
    /// Creates empty options.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Sets the conversation ID.
    #[must_use]
    pub fn with_conversation_id(mut self, id: impl Into<String>) -> Self {
        self.conversation_id = Some(id.into());
        self
    }

    /// Sets the metadata.
    #[must_use]
    pub fn with_metadata(mut self, metadata: Metadata) -> Self {
        self.metadata = Some(metadata);
        self
    }

    /// Sets the cancellation token.
    #[must_use]
    pub fn with_cancellation(mut self, token: CancellationToken) -> Self {
        self.cancel = Some(token);
        self
    }
}
