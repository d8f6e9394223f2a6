//! Default values for configuration options.
//!
//! Centralized constants to avoid magic numbers scattered across the codebase.
//! They mirror the library defaults so a bare `--url` invocation behaves like
//! `WebhookConfig::new`.

use std::time::Duration;

/// Default path written by `chat-webhook init`.
pub const CONFIG_FILE: &str = "chat-webhook.toml";

/// Default per-attempt timeout in milliseconds.
pub const TIMEOUT_MS: u64 = 30_000;

/// Default maximum number of attempts per send.
pub const RETRY_MAX_ATTEMPTS: u32 = 3;

/// Default initial retry delay in milliseconds.
pub const RETRY_INITIAL_DELAY_MS: u64 = 1_000;

/// Default maximum retry delay in milliseconds.
pub const RETRY_MAX_DELAY_MS: u64 = 10_000;

/// Default retry backoff multiplier.
pub const RETRY_MULTIPLIER: f64 = 2.0;

/// Default number of consecutive failures that open the circuit.
pub const BREAKER_THRESHOLD: u32 = 5;

/// Default breaker recovery timeout in seconds.
pub const BREAKER_RECOVERY_SECS: u64 = 60;

/// Default health probe timeout in milliseconds.
pub const HEALTH_TIMEOUT_MS: u64 = 5_000;

/// Default health probe latency budget in milliseconds.
pub const HEALTH_LATENCY_BUDGET_MS: u64 = 1_000;

/// Default metrics ring buffer capacity.
pub const METRICS_CAPACITY: usize = 1000;

/// Default dashboard p95 latency budget in milliseconds.
pub const METRICS_LATENCY_BUDGET_MS: u64 = 3_000;

/// Default per-attempt timeout as Duration.
#[must_use]
pub const fn timeout() -> Duration {
    Duration::from_millis(TIMEOUT_MS)
}

/// Default breaker recovery timeout as Duration.
#[must_use]
pub const fn breaker_recovery() -> Duration {
    Duration::from_secs(BREAKER_RECOVERY_SECS)
}

/// Default health probe timeout as Duration.
#[must_use]
pub const fn health_timeout() -> Duration {
    Duration::from_millis(HEALTH_TIMEOUT_MS)
}
