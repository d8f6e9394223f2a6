//! Serialization helpers producing dashboard-friendly JSON.
//!
//! Durations become integer milliseconds and timestamps RFC 3339 strings.

use std::time::{Duration, SystemTime};

use serde::Serializer;

use crate::payload::format_timestamp;

pub fn millis<S: Serializer>(duration: &Duration, serializer: S) -> Result<S::Ok, S::Error> {
    serializer.serialize_u64(u64::try_from(duration.as_millis()).unwrap_or(u64::MAX))
}

pub fn timestamp<S: Serializer>(time: &SystemTime, serializer: S) -> Result<S::Ok, S::Error> {
    serializer.serialize_str(&format_timestamp(*time))
}

#[allow(clippy::ref_option)] // serde's serialize_with signature
pub fn opt_timestamp<S: Serializer>(
    time: &Option<SystemTime>,
    serializer: S,
) -> Result<S::Ok, S::Error> {
    match time {
        Some(time) => serializer.serialize_some(&format_timestamp(*time)),
        None => serializer.serialize_none(),
    }
}
