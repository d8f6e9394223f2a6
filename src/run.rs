//! Application execution logic.
//!
//! This module runs one `send` or `health` task against the configured
//! webhook and writes the JSON result to stdout.

use std::io::Write;

use thiserror::Error;
use tokio::signal;
use tokio_util::sync::CancellationToken;

use chat_webhook::config::{Command, ValidatedConfig};
use chat_webhook::metrics::HealthStatus;
use chat_webhook::payload::{InboundResponse, Metadata, ToolId};
use chat_webhook::time::Sleeper;
use chat_webhook::webhook::{
    ChatWebhook, HttpClient, HttpError, ReqwestClient, SendOptions, WebhookError,
};

#[cfg(test)]
#[path = "run_tests.rs"]
mod tests;

/// Error type for runtime execution failures.
#[derive(Debug, Error)]
pub enum RunError {
    /// Failed to build the HTTP client.
    #[error("Failed to create HTTP client: {0}")]
    ClientCreation(#[source] HttpError),

    /// The send did not produce a reply.
    #[error("Send failed: {0}")]
    Send(#[from] WebhookError),

    /// The workflow answered but reported a failure.
    #[error("Workflow reported failure: {}", .0.as_deref().unwrap_or("no details"))]
    WorkflowFailed(Option<String>),

    /// The health probe found the endpoint unusable.
    #[error("Webhook endpoint is {0}")]
    Unhealthy(HealthStatus),

    /// Failed to encode the result as JSON.
    #[error("Failed to encode output: {0}")]
    Encode(#[from] serde_json::Error),

    /// Failed to write the result.
    #[error("Failed to write output: {0}")]
    Output(#[from] std::io::Error),
}

/// Arguments of the `send` subcommand.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SendArgs {
    message: String,
    user_id: String,
    conversation_id: Option<String>,
    tools: Vec<ToolId>,
    source: Option<String>,
    dashboard: bool,
}

impl SendArgs {
    /// Builds the per-send options; metadata is only attached when
    /// there is something to put in it.
    fn options(&self, cancel: CancellationToken) -> SendOptions {
        let mut options = SendOptions::new().with_cancellation(cancel);

        if let Some(ref id) = self.conversation_id {
            options = options.with_conversation_id(id.clone());
        }

        if self.source.is_some() || !self.tools.is_empty() {
            let mut metadata = Metadata::new();
            if let Some(ref source) = self.source {
                metadata = metadata.with_source(source.clone());
            }
            if !self.tools.is_empty() {
                metadata = metadata.with_selected_tools(self.tools.iter().map(|t| t.as_str()));
            }
            options = options.with_metadata(metadata);
        }

        options
    }
}

/// Work the binary performs after configuration is loaded.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Task {
    /// Send one message.
    Send(SendArgs),
    /// Probe the endpoint.
    Health,
}

impl Task {
    /// Converts a parsed subcommand into a task; `init` has none.
    pub fn from_command(command: Command) -> Option<Self> {
        match command {
            Command::Init { .. } => None,
            Command::Send {
                message,
                user_id,
                conversation_id,
                tools,
                source,
                dashboard,
            } => Some(Self::Send(SendArgs {
                message,
                user_id,
                conversation_id,
                tools,
                source,
                dashboard,
            })),
            Command::Health => Some(Self::Health),
        }
    }
}

/// Executes `task` against the configured webhook.
///
/// Ctrl+C (or SIGTERM) cancels an in-flight send through its token.
///
/// # Errors
///
/// Returns an error if the HTTP client cannot be built, the task fails,
/// or the output cannot be written.
///
/// # Coverage Note
///
/// This function is excluded from coverage because it requires
/// real network access and signal handling.
#[cfg(not(tarpaulin_include))]
pub async fn execute(config: ValidatedConfig, task: Task) -> Result<(), RunError> {
    let user_agent = format!("chat-webhook/{}", config.webhook.client_version);
    let client = ReqwestClient::configured(config.webhook.timeout, &user_agent)
        .map_err(RunError::ClientCreation)?;
    let webhook = ChatWebhook::new(client, config.webhook);

    let cancel = CancellationToken::new();
    let watcher = tokio::spawn(cancel_on_shutdown(cancel.clone()));

    let result = run_task(&webhook, task, cancel, &mut std::io::stdout().lock()).await;

    watcher.abort();
    result
}

/// Runs `task` and writes pretty-printed JSON documents to `out`.
///
/// For `send`, the reply is written even when the workflow reports
/// failure, so the caller sees its error text; the dashboard follows it
/// when requested.
async fn run_task<H, S, W>(
    webhook: &ChatWebhook<H, S>,
    task: Task,
    cancel: CancellationToken,
    out: &mut W,
) -> Result<(), RunError>
where
    H: HttpClient,
    S: Sleeper,
    W: Write,
{
    match task {
        Task::Send(args) => {
            let options = args.options(cancel);
            let reply = webhook
                .send_message(&args.message, &args.user_id, options)
                .await;

            // Dashboard is useful after failures too
            let reply = match reply {
                Ok(reply) => reply,
                Err(e) => {
                    if args.dashboard {
                        write_json(out, &webhook.dashboard_data())?;
                    }
                    return Err(e.into());
                }
            };

            write_json(out, &reply)?;
            if args.dashboard {
                write_json(out, &webhook.dashboard_data())?;
            }
            check_reply(reply)
        }
        Task::Health => {
            let report = webhook.health_check().await;
            write_json(out, &report)?;

            if report.is_available() {
                Ok(())
            } else {
                Err(RunError::Unhealthy(report.status))
            }
        }
    }
}

fn check_reply(reply: InboundResponse) -> Result<(), RunError> {
    if reply.success {
        tracing::debug!("Workflow replied with {} chars", reply.response.chars().count());
        Ok(())
    } else {
        Err(RunError::WorkflowFailed(reply.error))
    }
}

fn write_json<W: Write, T: serde::Serialize>(out: &mut W, value: &T) -> Result<(), RunError> {
    serde_json::to_writer_pretty(&mut *out, value)?;
    writeln!(out)?;
    Ok(())
}

/// Cancels `token` when a shutdown signal is received.
///
/// Excluded from coverage - requires OS signal handling.
#[cfg(not(tarpaulin_include))]
async fn cancel_on_shutdown(token: CancellationToken) {
    let ctrl_c = async {
        if let Err(e) = signal::ctrl_c().await {
            tracing::warn!("Failed to install Ctrl+C handler: {e}");
            std::future::pending::<()>().await;
        }
    };

    #[cfg(unix)]
    let terminate = async {
        match signal::unix::signal(signal::unix::SignalKind::terminate()) {
            Ok(mut stream) => {
                stream.recv().await;
            }
            Err(e) => {
                tracing::warn!("Failed to install SIGTERM handler: {e}");
                std::future::pending::<()>().await;
            }
        }
    };

    #[cfg(not(unix))]
    let terminate = std::future::pending::<()>();

    tokio::select! {
        () = ctrl_c => {}
        () = terminate => {}
    }

    tracing::info!("Shutdown signal received, cancelling...");
    token.cancel();
}
