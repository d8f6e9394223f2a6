//! Webhook layer: transport, retries and the chat client.
//!
//! This module provides types and traits for:
//! - Building HTTP requests ([`HttpRequest`]) and handling responses ([`HttpResponse`])
//! - Abstracting HTTP clients ([`HttpClient`]) with a reqwest implementation ([`ReqwestClient`])
//! - Bounded, cancellable retries ([`RetryPolicy`], [`RetryScheduler`])
//! - The resilient chat client itself ([`ChatWebhook`]) and its probe ([`HealthReport`])

mod client;
mod error;
mod health;
mod http;
mod options;
mod retry;
mod sender;

#[cfg(test)]
mod retry_tests;

pub use client::ReqwestClient;
pub use error::{AttemptError, HttpError, WebhookError};
pub use health::HealthReport;
pub use http::{HttpClient, HttpRequest, HttpResponse};
pub use options::{HealthCheckConfig, SendOptions, WebhookConfig};
pub use retry::{
    AttemptReport, IsRetryable, RetryError, RetryPolicy, RetryScheduler, RetryState, RetryStep,
};
pub use sender::{ChatWebhook, REQUEST_ID_HEADER};
