//! TOML configuration file parsing.
//!
//! Defines the structure of the configuration file with serde.

use std::path::Path;

use serde::Deserialize;

use super::ConfigError;

/// Root configuration structure from TOML file.
///
/// All fields are optional to allow partial configuration
/// that can be merged with CLI arguments.
#[derive(Debug, Default, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct TomlConfig {
    /// Webhook configuration section
    #[serde(default)]
    pub webhook: WebhookSection,

    /// Retry policy configuration
    #[serde(default)]
    pub retry: RetrySection,

    /// Circuit breaker configuration
    #[serde(default)]
    pub breaker: BreakerSection,

    /// Health probe configuration
    #[serde(default)]
    pub health: HealthSection,

    /// Metrics configuration
    #[serde(default)]
    pub monitoring: MonitoringSection,
}

/// Webhook configuration section.
#[derive(Debug, Default, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct WebhookSection {
    /// Webhook URL
    pub url: Option<String>,

    /// Shared secret sent as a bearer token
    pub secret: Option<String>,

    /// Per-attempt timeout in milliseconds
    pub timeout_ms: Option<u64>,

    /// Value reported as `clientVersion`
    pub client_version: Option<String>,
}

/// Retry policy configuration section.
#[derive(Debug, Default, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct RetrySection {
    /// Maximum number of attempts
    pub max_attempts: Option<u32>,

    /// Initial retry delay in milliseconds
    pub initial_delay_ms: Option<u64>,

    /// Maximum retry delay in milliseconds
    pub max_delay_ms: Option<u64>,

    /// Backoff multiplier
    pub multiplier: Option<f64>,
}

/// Circuit breaker configuration section.
#[derive(Debug, Default, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct BreakerSection {
    /// Consecutive failures that open the circuit
    pub threshold: Option<u32>,

    /// Seconds after the last failure before a trial call
    pub recovery_timeout_secs: Option<u64>,
}

/// Health probe configuration section.
#[derive(Debug, Default, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct HealthSection {
    /// Probe URL (defaults to the webhook URL)
    pub url: Option<String>,

    /// Probe timeout in milliseconds
    pub timeout_ms: Option<u64>,

    /// Probe latency above which the endpoint is degraded
    pub latency_budget_ms: Option<u64>,
}

/// Metrics configuration section.
#[derive(Debug, Default, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct MonitoringSection {
    /// Record attempts in the metrics aggregator
    pub enabled: Option<bool>,

    /// Ring buffer capacity
    pub capacity: Option<usize>,

    /// Dashboard p95 latency budget in milliseconds
    pub latency_budget_ms: Option<u64>,
}

impl TomlConfig {
    /// Loads configuration from a TOML file.
    ///
    /// # Errors
    ///
    /// Returns an error if the file cannot be read or parsed.
    pub fn load(path: &Path) -> Result<Self, ConfigError> {
        let content = std::fs::read_to_string(path).map_err(|e| ConfigError::FileRead {
            path: path.to_path_buf(),
            source: e,
        })?;

        Self::parse(&content)
    }

    /// Parses configuration from a TOML string.
    ///
    /// # Errors
    ///
    /// Returns an error if the TOML is invalid.
    pub fn parse(content: &str) -> Result<Self, ConfigError> {
        toml::from_str(content).map_err(ConfigError::from)
    }
}

/// Generates a default configuration file with comments.
#[must_use]
pub fn default_config_template() -> String {
    r#"# chat-webhook Configuration File

[webhook]
# Workflow webhook URL (required)
# url = "https://n8n.example.com/webhook/chat"

# Shared secret, sent as "Authorization: Bearer <secret>"
# Prefer the CHAT_WEBHOOK_SECRET environment variable over storing it here.
# secret = "your-secret-here"

# Per-attempt timeout in milliseconds (default: 30000)
# timeout_ms = 30000

# Value reported as clientVersion (default: the binary's version)
# client_version = "1.0.0"

[retry]
# Maximum number of attempts per send, including the first (default: 3)
# max_attempts = 3

# Delay after the first failed attempt in milliseconds (default: 1000)
# initial_delay_ms = 1000

# Upper bound for any delay in milliseconds (default: 10000)
# max_delay_ms = 10000

# Backoff multiplier, at least 1.0 (default: 2.0)
# multiplier = 2.0

[breaker]
# Consecutive failed sends that open the circuit (default: 5)
# threshold = 5

# Seconds after the last failure before a trial send (default: 60)
# recovery_timeout_secs = 60

[health]
# Probe URL (default: the webhook URL)
# url = "https://n8n.example.com/healthz"

# Probe timeout in milliseconds (default: 5000)
# timeout_ms = 5000

# Probe latency above which the endpoint is degraded (default: 1000)
# latency_budget_ms = 1000

[monitoring]
# Record every attempt in the metrics aggregator (default: true)
enabled = true

# Number of attempts kept for percentiles and rates (default: 1000)
# capacity = 1000

# p95 latency above which the dashboard reports degraded (default: 3000)
# latency_budget_ms = 3000
"#
    .to_string()
}
