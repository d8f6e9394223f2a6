//! CLI argument parsing using clap.
//!
//! Defines the command-line interface with all options and subcommands.

use std::path::PathBuf;

use clap::{Parser, Subcommand};

use crate::payload::ToolId;

use super::defaults;

/// chat-webhook: resilient n8n chat webhook client
///
/// Sends chat messages to a workflow webhook with validation, retries
/// and a circuit breaker, and probes the endpoint's health.
#[derive(Debug, Parser)]
#[command(name = "chat-webhook")]
#[command(version, about, long_about = None)]
pub struct Cli {
    /// Subcommand to run
    #[command(subcommand)]
    pub command: Command,

    /// Webhook URL (required for send and health)
    #[arg(long, global = true)]
    pub url: Option<String>,

    /// Shared secret sent as a bearer token
    #[arg(long, env = "CHAT_WEBHOOK_SECRET", global = true, hide_env_values = true)]
    pub secret: Option<String>,

    /// Per-attempt timeout in milliseconds
    #[arg(long = "timeout-ms", global = true)]
    pub timeout_ms: Option<u64>,

    /// Maximum number of attempts per send
    #[arg(long = "retry-max", global = true)]
    pub retry_max: Option<u32>,

    /// Initial retry delay in milliseconds
    #[arg(long = "retry-delay-ms", global = true)]
    pub retry_delay_ms: Option<u64>,

    /// Consecutive failures that open the circuit
    #[arg(long = "breaker-threshold", global = true)]
    pub breaker_threshold: Option<u32>,

    /// Disable metrics recording
    #[arg(long = "no-monitoring", global = true)]
    pub no_monitoring: bool,

    /// Path to configuration file
    #[arg(long, short, global = true)]
    pub config: Option<PathBuf>,

    /// Enable verbose logging
    #[arg(long, short, global = true)]
    pub verbose: bool,
}

/// Subcommands for chat-webhook
#[derive(Debug, Subcommand)]
pub enum Command {
    /// Generate a default configuration file
    Init {
        /// Output path for the configuration file
        #[arg(long, short, default_value = defaults::CONFIG_FILE)]
        output: PathBuf,
    },

    /// Send one chat message and print the workflow's reply
    Send {
        /// Message text
        #[arg(long, short)]
        message: String,

        /// Sender's user ID (UUID v4)
        #[arg(long = "user-id")]
        user_id: String,

        /// Conversation the message belongs to
        #[arg(long = "conversation-id")]
        conversation_id: Option<String>,

        /// Tool the workflow may use (can be specified multiple times)
        #[arg(long = "tool", value_name = "ID")]
        tools: Vec<ToolId>,

        /// Origin reported as `metadata.source`
        #[arg(long)]
        source: Option<String>,

        /// Print the metrics dashboard after the send
        #[arg(long)]
        dashboard: bool,
    },

    /// Probe the webhook endpoint and print the health report
    Health,
}

impl Cli {
    /// Parses CLI arguments from the command line.
    #[must_use]
    pub fn parse_args() -> Self {
        Self::parse()
    }

    /// Parses CLI arguments from an iterator (useful for testing).
    pub fn parse_from_iter<I, T>(iter: I) -> Self
    where
        I: IntoIterator<Item = T>,
        T: Into<std::ffi::OsString> + Clone,
    {
        Self::parse_from(iter)
    }

    /// Returns true if this is the init command.
    #[must_use]
    pub const fn is_init(&self) -> bool {
        matches!(self.command, Command::Init { .. })
    }
}
