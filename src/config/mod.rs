//! Configuration layer for the chat-webhook binary.
//!
//! This module provides:
//! - CLI argument parsing ([`Cli`], [`Command`])
//! - TOML configuration file parsing ([`TomlConfig`])
//! - Validated configuration ([`ValidatedConfig`]) wrapping a [`WebhookConfig`](crate::webhook::WebhookConfig)
//! - Configuration file generation ([`write_default_config`])
//! - Default values ([`defaults`])
//!
//! # Priority
//!
//! Configuration values are resolved with the following priority (highest to lowest):
//!
//! 1. **Explicit CLI arguments** - Values explicitly passed via command line
//! 2. **TOML config file** - Values from the configuration file
//! 3. **Built-in defaults** - Hardcoded default values
//!
//! The secret is also read from `CHAT_WEBHOOK_SECRET` when `--secret` is
//! absent; the environment counts as a CLI value.
//!
//! # Boolean Flag Semantics
//!
//! `--no-monitoring` only disables. Without it, `monitoring.enabled` from
//! the TOML file decides, defaulting to enabled.
//!
//! # TOML-Only Options
//!
//! - `retry.max_delay_ms`, `retry.multiplier`
//! - `breaker.recovery_timeout_secs`
//! - the whole `[health]` section
//! - `monitoring.capacity`, `monitoring.latency_budget_ms`
//! - `webhook.client_version`

mod cli;
pub mod defaults;
mod error;
mod toml;
mod validated;

#[cfg(test)]
mod toml_tests;

pub use cli::{Cli, Command};
pub use error::{ConfigError, field};
pub use toml::{TomlConfig, default_config_template};
pub use validated::{ValidatedConfig, write_default_config};
