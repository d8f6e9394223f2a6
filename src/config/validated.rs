//! Validated configuration after merging CLI and TOML sources.
//!
//! This module contains the final, validated configuration that is used
//! by the application. All validation is performed during construction.

use std::fmt;
use std::path::Path;
use std::time::Duration;

use http::HeaderValue;
use url::Url;

use crate::breaker::BreakerConfig;
use crate::metrics::MetricsConfig;
use crate::webhook::{HealthCheckConfig, RetryPolicy, WebhookConfig};

use super::cli::Cli;
use super::defaults;
use super::error::{ConfigError, field};
use super::toml::TomlConfig;

/// Fully validated configuration ready for use by the application.
///
/// # Construction
///
/// Use [`ValidatedConfig::from_raw`] to create from CLI args and optional TOML config.
/// The function validates all inputs and returns errors for invalid configurations.
#[derive(Debug)]
pub struct ValidatedConfig {
    /// Library configuration for the webhook client
    pub webhook: WebhookConfig,

    /// Verbose logging enabled
    pub verbose: bool,
}

impl fmt::Display for ValidatedConfig {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let webhook = &self.webhook;
        write!(
            f,
            "Config {{ url: {}, secret: {}, timeout: {}ms, retry: {}x/{}ms, \
             breaker: {}/{}s, monitoring: {} }}",
            webhook.url,
            if webhook.secret.is_some() { "set" } else { "none" },
            webhook.timeout.as_millis(),
            webhook.retry.max_attempts,
            webhook.retry.initial_delay.as_millis(),
            webhook.breaker.threshold,
            webhook.breaker.recovery_timeout.as_secs(),
            webhook.monitoring_enabled,
        )
    }
}

impl ValidatedConfig {
    /// Creates a validated configuration from CLI arguments and optional TOML config.
    ///
    /// CLI arguments take precedence over TOML config values.
    ///
    /// # Errors
    ///
    /// Returns an error if:
    /// - The webhook URL is missing
    /// - A URL is invalid or not http(s)
    /// - The secret is empty or not a valid header value
    /// - A timeout is zero
    /// - Retry, breaker, or monitoring values are out of range
    pub fn from_raw(cli: &Cli, toml: Option<&TomlConfig>) -> Result<Self, ConfigError> {
        let url = Self::resolve_url(cli, toml)?;
        let secret = Self::resolve_secret(cli, toml)?;
        let timeout = Self::resolve_timeout(cli, toml)?;
        let retry = Self::build_retry_policy(cli, toml)?;
        let breaker = Self::build_breaker(cli, toml)?;
        let health = Self::build_health(toml)?;
        let metrics = Self::build_metrics(toml)?;

        // --no-monitoring only disables; TOML decides otherwise
        let monitoring_enabled =
            !cli.no_monitoring && toml.and_then(|t| t.monitoring.enabled).unwrap_or(true);

        let mut webhook = WebhookConfig::new(url)
            .with_timeout(timeout)
            .with_retry_policy(retry)
            .with_breaker(breaker)
            .with_health(health)
            .with_metrics(metrics)
            .with_monitoring(monitoring_enabled);

        if let Some(secret) = secret {
            webhook = webhook.with_secret(secret);
        }

        if let Some(version) = toml.and_then(|t| t.webhook.client_version.as_deref()) {
            webhook = webhook.with_client_version(version);
        }

        Ok(Self {
            webhook,
            verbose: cli.verbose,
        })
    }

    /// Loads and merges configuration from CLI and optional config file.
    ///
    /// If `cli.config` is set, loads the TOML file from that path.
    ///
    /// # Errors
    ///
    /// Returns an error if:
    /// - The config file cannot be read or parsed
    /// - The merged configuration is invalid
    pub fn load(cli: &Cli) -> Result<Self, ConfigError> {
        let toml = if let Some(ref path) = cli.config {
            Some(TomlConfig::load(path)?)
        } else {
            None
        };

        Self::from_raw(cli, toml.as_ref())
    }

    fn resolve_url(cli: &Cli, toml: Option<&TomlConfig>) -> Result<Url, ConfigError> {
        // CLI takes precedence
        let url_str = cli
            .url
            .as_deref()
            .or_else(|| toml.and_then(|t| t.webhook.url.as_deref()))
            .ok_or_else(|| {
                ConfigError::missing(field::URL, "Use --url or set webhook.url in config file")
            })?;

        parse_http_url(url_str)
    }

    fn resolve_secret(cli: &Cli, toml: Option<&TomlConfig>) -> Result<Option<String>, ConfigError> {
        let Some(secret) = cli
            .secret
            .clone()
            .or_else(|| toml.and_then(|t| t.webhook.secret.clone()))
        else {
            return Ok(None);
        };

        if secret.is_empty() {
            return Err(ConfigError::InvalidSecret {
                reason: "must not be empty",
            });
        }

        if HeaderValue::from_str(&format!("Bearer {secret}")).is_err() {
            return Err(ConfigError::InvalidSecret {
                reason: "contains characters not allowed in an HTTP header",
            });
        }

        Ok(Some(secret))
    }

    fn resolve_timeout(cli: &Cli, toml: Option<&TomlConfig>) -> Result<Duration, ConfigError> {
        // Priority: CLI explicit > TOML > default
        let millis = cli
            .timeout_ms
            .or_else(|| toml.and_then(|t| t.webhook.timeout_ms))
            .unwrap_or(defaults::TIMEOUT_MS);

        non_zero_millis("timeout_ms", millis)
    }

    fn build_retry_policy(
        cli: &Cli,
        toml: Option<&TomlConfig>,
    ) -> Result<RetryPolicy, ConfigError> {
        let retry = toml.map(|t| &t.retry);

        // Priority: CLI explicit > TOML > default
        let max_attempts = cli
            .retry_max
            .or_else(|| retry.and_then(|r| r.max_attempts))
            .unwrap_or(defaults::RETRY_MAX_ATTEMPTS);

        let initial_delay_ms = cli
            .retry_delay_ms
            .or_else(|| retry.and_then(|r| r.initial_delay_ms))
            .unwrap_or(defaults::RETRY_INITIAL_DELAY_MS);

        let max_delay_ms = retry
            .and_then(|r| r.max_delay_ms)
            .unwrap_or(defaults::RETRY_MAX_DELAY_MS);

        let multiplier = retry
            .and_then(|r| r.multiplier)
            .unwrap_or(defaults::RETRY_MULTIPLIER);

        if max_attempts == 0 {
            return Err(ConfigError::InvalidRetry(
                "max_attempts must be greater than 0".to_string(),
            ));
        }

        if initial_delay_ms == 0 {
            return Err(ConfigError::InvalidRetry(
                "initial_delay_ms must be greater than 0".to_string(),
            ));
        }

        if multiplier < 1.0 || !multiplier.is_finite() {
            return Err(ConfigError::InvalidRetry(
                "multiplier must be a finite number >= 1.0".to_string(),
            ));
        }

        if max_delay_ms < initial_delay_ms {
            return Err(ConfigError::InvalidRetry(format!(
                "max_delay_ms ({max_delay_ms}) must be >= initial_delay_ms ({initial_delay_ms})"
            )));
        }

        Ok(RetryPolicy::new()
            .with_max_attempts(max_attempts)
            .with_initial_delay(Duration::from_millis(initial_delay_ms))
            .with_max_delay(Duration::from_millis(max_delay_ms))
            .with_multiplier(multiplier))
    }

    fn build_breaker(cli: &Cli, toml: Option<&TomlConfig>) -> Result<BreakerConfig, ConfigError> {
        let breaker = toml.map(|t| &t.breaker);

        let threshold = cli
            .breaker_threshold
            .or_else(|| breaker.and_then(|b| b.threshold))
            .unwrap_or(defaults::BREAKER_THRESHOLD);

        let recovery_secs = breaker
            .and_then(|b| b.recovery_timeout_secs)
            .unwrap_or(defaults::BREAKER_RECOVERY_SECS);

        if threshold == 0 {
            return Err(ConfigError::InvalidBreaker(
                "threshold must be greater than 0".to_string(),
            ));
        }

        if recovery_secs == 0 {
            return Err(ConfigError::InvalidBreaker(
                "recovery_timeout_secs must be greater than 0".to_string(),
            ));
        }

        Ok(BreakerConfig::new()
            .with_threshold(threshold)
            .with_recovery_timeout(Duration::from_secs(recovery_secs)))
    }

    fn build_health(toml: Option<&TomlConfig>) -> Result<HealthCheckConfig, ConfigError> {
        let health = toml.map(|t| &t.health);

        let url = health
            .and_then(|h| h.url.as_deref())
            .map(parse_http_url)
            .transpose()?;

        let timeout = non_zero_millis(
            "health.timeout_ms",
            health
                .and_then(|h| h.timeout_ms)
                .unwrap_or(defaults::HEALTH_TIMEOUT_MS),
        )?;

        let latency_budget = non_zero_millis(
            "health.latency_budget_ms",
            health
                .and_then(|h| h.latency_budget_ms)
                .unwrap_or(defaults::HEALTH_LATENCY_BUDGET_MS),
        )?;

        Ok(HealthCheckConfig {
            url,
            timeout,
            latency_budget,
        })
    }

    fn build_metrics(toml: Option<&TomlConfig>) -> Result<MetricsConfig, ConfigError> {
        let monitoring = toml.map(|t| &t.monitoring);

        let capacity = monitoring
            .and_then(|m| m.capacity)
            .unwrap_or(defaults::METRICS_CAPACITY);

        if capacity == 0 {
            return Err(ConfigError::InvalidMonitoring(
                "capacity must be greater than 0".to_string(),
            ));
        }

        let latency_budget = non_zero_millis(
            "monitoring.latency_budget_ms",
            monitoring
                .and_then(|m| m.latency_budget_ms)
                .unwrap_or(defaults::METRICS_LATENCY_BUDGET_MS),
        )?;

        Ok(MetricsConfig::new()
            .with_capacity(capacity)
            .with_latency_budget(latency_budget))
    }
}

/// Writes the default configuration template to a file.
///
/// # Errors
///
/// Returns an error if the file cannot be written.
pub fn write_default_config(path: &Path) -> Result<(), ConfigError> {
    let template = super::toml::default_config_template();
    std::fs::write(path, template).map_err(|e| ConfigError::FileWrite {
        path: path.to_path_buf(),
        source: e,
    })
}

// Helper functions

fn parse_http_url(s: &str) -> Result<Url, ConfigError> {
    let url = Url::parse(s).map_err(|e| ConfigError::InvalidUrl {
        url: s.to_string(),
        reason: e.to_string(),
    })?;

    match url.scheme() {
        "http" | "https" => Ok(url),
        other => Err(ConfigError::InvalidUrl {
            url: s.to_string(),
            reason: format!("unsupported scheme '{other}', expected http or https"),
        }),
    }
}

fn non_zero_millis(field: &'static str, millis: u64) -> Result<Duration, ConfigError> {
    if millis == 0 {
        return Err(ConfigError::InvalidDuration {
            field,
            reason: "must be greater than 0".to_string(),
        });
    }

    Ok(Duration::from_millis(millis))
}
