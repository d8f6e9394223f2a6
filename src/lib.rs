//! chat-webhook: resilient client for n8n chat workflows
//!
//! A library for sending chat messages to a workflow webhook with strict
//! payload validation, a circuit breaker, bounded retries and in-memory
//! latency/health metrics.

pub mod breaker;
pub mod config;
pub mod metrics;
pub mod payload;
pub mod time;
pub mod webhook;
