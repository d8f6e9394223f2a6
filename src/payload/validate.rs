//! Closed-schema validation of outbound payloads and inbound responses.
//!
//! Validation works on `serde_json::Value` so that unknown keys, `null`s
//! and wrong types are reported instead of being absorbed by serde
//! defaults. Every violation is collected before returning.

use std::fmt;
use std::sync::LazyLock;

use regex::Regex;
use serde_json::{Map, Value};
use uuid::Uuid;

use super::types::{InboundResponse, MAX_MESSAGE_CHARS, Metadata, OutboundPayload, ToolId};

static REQUEST_ID_PATTERN: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"^req_[0-9]+_[a-z0-9]+$").expect("request id pattern is valid"));

const OUTBOUND_FIELDS: &[&str] = &[
    "message",
    "userId",
    "timestamp",
    "conversationId",
    "requestId",
    "clientVersion",
    "metadata",
];

const INBOUND_FIELDS: &[&str] = &["response", "success", "requestId", "processingTime", "error"];

/// A single schema violation.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Violation {
    /// Dotted path of the offending field (empty for the document root).
    pub path: String,
    /// Human-readable reason.
    pub reason: String,
}

impl Violation {
    /// Creates a violation for `path`.
    #[must_use]
    pub fn new(path: impl Into<String>, reason: impl Into<String>) -> Self {
        Self {
            path: path.into(),
            reason: reason.into(),
        }
    }
}

impl fmt::Display for Violation {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        if self.path.is_empty() {
            write!(f, "<root>: {}", self.reason)
        } else {
            write!(f, "{}: {}", self.path, self.reason)
        }
    }
}

/// Non-empty list of violations produced by a failed validation.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ValidationErrors(Vec<Violation>);

impl ValidationErrors {
    /// Wraps a list of violations.
    #[must_use]
    pub const fn new(violations: Vec<Violation>) -> Self {
        Self(violations)
    }

    /// Creates an error holding one violation.
    #[must_use]
    pub fn single(path: impl Into<String>, reason: impl Into<String>) -> Self {
        Self(vec![Violation::new(path, reason)])
    }

    /// Returns the violations.
    #[must_use]
    pub fn violations(&self) -> &[Violation] {
        &self.0
    }

    /// Returns the number of violations.
    #[must_use]
    pub fn len(&self) -> usize {
        self.0.len()
    }

    /// Returns true if there are no violations.
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.0.is_empty()
    }

    /// Returns the paths of all violations, in discovery order.
    #[must_use]
    pub fn paths(&self) -> Vec<&str> {
        self.0.iter().map(|v| v.path.as_str()).collect()
    }

    /// Returns true if any violation concerns `path`.
    #[must_use]
    pub fn has_path(&self, path: &str) -> bool {
        self.0.iter().any(|v| v.path == path)
    }
}

impl fmt::Display for ValidationErrors {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{} schema violation(s)", self.0.len())?;
        for (i, violation) in self.0.iter().enumerate() {
            let sep = if i == 0 { ": " } else { "; " };
            write!(f, "{sep}{violation}")?;
        }
        Ok(())
    }
}

impl std::error::Error for ValidationErrors {}

/// Accumulates violations while walking a JSON object.
#[derive(Default)]
struct Checker {
    violations: Vec<Violation>,
}

impl Checker {
    fn push(&mut self, path: impl Into<String>, reason: impl Into<String>) {
        self.violations.push(Violation::new(path, reason));
    }

    fn reject_unknown(&mut self, obj: &Map<String, Value>, allowed: &[&str]) {
        for key in obj.keys() {
            if !allowed.contains(&key.as_str()) {
                self.push(key.clone(), "unknown field");
            }
        }
    }

    fn required_str<'a>(&mut self, obj: &'a Map<String, Value>, key: &str) -> Option<&'a str> {
        match obj.get(key) {
            None => {
                self.push(key, "is required");
                None
            }
            Some(value) => self.expect_str(key, value),
        }
    }

    fn optional_str<'a>(&mut self, obj: &'a Map<String, Value>, key: &str) -> Option<&'a str> {
        obj.get(key).and_then(|value| self.expect_str(key, value))
    }

    fn expect_str<'a>(&mut self, path: &str, value: &'a Value) -> Option<&'a str> {
        let s = value.as_str();
        if s.is_none() {
            self.push(path, format!("expected a string, found {}", type_name(value)));
        }
        s
    }

    fn finish(self) -> Result<(), ValidationErrors> {
        if self.violations.is_empty() {
            Ok(())
        } else {
            Err(ValidationErrors(self.violations))
        }
    }
}

const fn type_name(value: &Value) -> &'static str {
    match value {
        Value::Null => "null",
        Value::Bool(_) => "boolean",
        Value::Number(_) => "number",
        Value::String(_) => "string",
        Value::Array(_) => "array",
        Value::Object(_) => "object",
    }
}

/// Validates a typed outbound payload.
///
/// # Errors
///
/// Returns every violation found in the payload.
pub fn validate_outbound(payload: &OutboundPayload) -> Result<(), ValidationErrors> {
    let value = serde_json::to_value(payload)
        .map_err(|e| ValidationErrors::single("", format!("payload is not serializable: {e}")))?;
    validate_outbound_value(&value).map(|_| ())
}

/// Validates a raw outbound payload and decodes it.
///
/// # Errors
///
/// Returns every violation found in the document.
pub fn validate_outbound_value(value: &Value) -> Result<OutboundPayload, ValidationErrors> {
    let Some(obj) = value.as_object() else {
        return Err(ValidationErrors::single(
            "",
            format!("expected an object, found {}", type_name(value)),
        ));
    };

    let mut checker = Checker::default();
    checker.reject_unknown(obj, OUTBOUND_FIELDS);

    if let Some(message) = checker.required_str(obj, "message") {
        if message.trim().is_empty() {
            checker.push("message", "must not be empty");
        } else if message.chars().count() > MAX_MESSAGE_CHARS {
            checker.push(
                "message",
                format!("must be at most {MAX_MESSAGE_CHARS} characters"),
            );
        }
    }

    if let Some(user_id) = checker.required_str(obj, "userId") {
        if !is_uuid_v4(user_id) {
            checker.push("userId", "must be a UUID v4");
        }
    }

    if let Some(timestamp) = checker.required_str(obj, "timestamp") {
        if chrono::DateTime::parse_from_rfc3339(timestamp).is_err() {
            checker.push("timestamp", "must be an ISO-8601 date-time");
        }
    }

    checker.optional_str(obj, "conversationId");

    if let Some(request_id) = checker.required_str(obj, "requestId") {
        if !REQUEST_ID_PATTERN.is_match(request_id) {
            checker.push("requestId", "must match req_<epochMillis>_<random>");
        }
    }

    if let Some(version) = checker.required_str(obj, "clientVersion") {
        if version.trim().is_empty() {
            checker.push("clientVersion", "must not be empty");
        }
    }

    if let Some(metadata) = obj.get("metadata") {
        check_metadata(&mut checker, metadata);
    }

    checker.finish()?;
    serde_json::from_value(value.clone()).map_err(|e| ValidationErrors::single("", e.to_string()))
}

fn check_metadata(checker: &mut Checker, metadata: &Value) {
    let Some(obj) = metadata.as_object() else {
        checker.push(
            "metadata",
            format!("expected an object, found {}", type_name(metadata)),
        );
        return;
    };

    let source_path = format!("metadata.{}", Metadata::SOURCE);
    if let Some(source) = obj.get(Metadata::SOURCE) {
        if checker
            .expect_str(&source_path, source)
            .is_some_and(|s| s.trim().is_empty())
        {
            checker.push(source_path, "must not be empty");
        }
    }

    let tools_path = format!("metadata.{}", Metadata::SELECTED_TOOLS);
    let Some(tools) = obj.get(Metadata::SELECTED_TOOLS) else {
        return;
    };
    let Some(tools) = tools.as_array() else {
        checker.push(
            tools_path,
            format!("expected an array, found {}", type_name(tools)),
        );
        return;
    };
    for (i, tool) in tools.iter().enumerate() {
        let path = format!("{tools_path}[{i}]");
        if let Some(id) = checker.expect_str(&path, tool) {
            if let Err(e) = id.parse::<ToolId>() {
                checker.push(path, e.to_string());
            }
        }
    }
}

fn is_uuid_v4(s: &str) -> bool {
    // Only the canonical hyphenated form is accepted.
    s.len() == 36
        && Uuid::parse_str(s).is_ok_and(|id| id.get_version() == Some(uuid::Version::Random))
}

/// Validates a raw response body and decodes it.
///
/// # Errors
///
/// Returns a single violation for malformed JSON, otherwise every schema
/// violation found in the document.
pub fn validate_inbound(body: &[u8]) -> Result<InboundResponse, ValidationErrors> {
    let value: Value = serde_json::from_slice(body)
        .map_err(|e| ValidationErrors::single("", format!("invalid JSON: {e}")))?;
    validate_inbound_value(&value)
}

/// Validates an already-parsed response document.
///
/// # Errors
///
/// Returns every violation found in the document.
pub fn validate_inbound_value(value: &Value) -> Result<InboundResponse, ValidationErrors> {
    let Some(obj) = value.as_object() else {
        return Err(ValidationErrors::single(
            "",
            format!("expected an object, found {}", type_name(value)),
        ));
    };

    let mut checker = Checker::default();
    checker.reject_unknown(obj, INBOUND_FIELDS);

    let success = match obj.get("success") {
        None => {
            checker.push("success", "is required");
            None
        }
        Some(Value::Bool(b)) => Some(*b),
        Some(other) => {
            checker.push(
                "success",
                format!("expected a boolean, found {}", type_name(other)),
            );
            None
        }
    };

    if let Some(response) = checker.required_str(obj, "response") {
        if response.is_empty() && success == Some(true) {
            checker.push("response", "must not be empty when success is true");
        }
    }

    checker.optional_str(obj, "requestId");

    if let Some(time) = obj.get("processingTime") {
        match time.as_f64() {
            Some(ms) if ms.is_finite() && ms >= 0.0 => {}
            Some(_) => checker.push("processingTime", "must be a non-negative number"),
            None => checker.push(
                "processingTime",
                format!("expected a number, found {}", type_name(time)),
            ),
        }
    }

    let error = checker.optional_str(obj, "error");
    if success == Some(false) && error.is_none() && !obj.contains_key("error") {
        checker.push("error", "is required when success is false");
    }

    checker.finish()?;
    serde_json::from_value(value.clone()).map_err(|e| ValidationErrors::single("", e.to_string()))
}
