//! Circuit breaker guarding calls to the chat workflow.
//!
//! This module provides:
//! - The breaker itself ([`CircuitBreaker`]) and its per-call admission ([`CallPermit`])
//! - Its configuration ([`BreakerConfig`]) and observable state ([`BreakerSnapshot`], [`CircuitState`])
//! - The rejection error surfaced to callers ([`CircuitOpenError`])
//!
//! # Lifecycle
//!
//! ```text
//!            threshold reached              recovery timeout elapsed
//!  Closed ──────────────────────► Open ──────────────────────────► HalfOpen
//!    ▲                             ▲                                  │
//!    │        trial succeeded      │        trial failed              │
//!    └─────────────────────────────┼──────────────────────────────────┤
//!                                  └──────────────────────────────────┘
//! ```

mod circuit;


pub use circuit::{
    BreakerConfig, BreakerSnapshot, CallPermit, CircuitBreaker, CircuitOpenError, CircuitState,
};
