//! Payload layer: wire types and their closed-schema validation.
//!
//! This module provides:
//! - The outbound chat turn ([`OutboundPayload`]) and its [`Metadata`]
//! - The decoded workflow reply ([`InboundResponse`])
//! - The closed set of selectable tools ([`ToolId`])
//! - Validators that collect every violation ([`validate_outbound`], [`validate_inbound`])

mod types;
mod validate;


pub use types::{
    InboundResponse, MAX_MESSAGE_CHARS, Metadata, OutboundPayload, ToolId, UnknownToolId,
    format_timestamp, generate_request_id,
};
pub use validate::{
    ValidationErrors, Violation, validate_inbound, validate_inbound_value, validate_outbound,
    validate_outbound_value,
};
