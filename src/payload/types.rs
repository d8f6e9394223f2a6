//! Wire types exchanged with the chat workflow.

use std::fmt;
use std::str::FromStr;
use std::time::SystemTime;

use rand::Rng;
use rand::distr::Alphanumeric;
use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};

use crate::time::epoch_millis;

/// Maximum message length, counted in Unicode scalar values.
pub const MAX_MESSAGE_CHARS: usize = 4000;

/// Length of the random suffix in generated request IDs.
const REQUEST_ID_SUFFIX_LEN: usize = 9;

/// Capabilities the workflow can be asked to use for a message.
///
/// This is a closed set: metadata naming any other tool is rejected
/// by the validator before the request leaves the process.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ToolId {
    /// Live web search.
    WebSearch,
    /// Multi-step research across several sources.
    DeepResearch,
    /// Image generation from a prompt.
    ImageGeneration,
    /// Analysis of uploaded documents.
    DocumentAnalysis,
    /// Sandboxed code execution.
    CodeExecution,
    /// Calendar lookups and scheduling.
    Calendar,
}

impl ToolId {
    /// Every supported tool, in declaration order.
    pub const ALL: [Self; 6] = [
        Self::WebSearch,
        Self::DeepResearch,
        Self::ImageGeneration,
        Self::DocumentAnalysis,
        Self::CodeExecution,
        Self::Calendar,
    ];

    /// Returns the wire identifier of this tool.
    #[must_use]
    pub const fn as_str(self) -> &'static str {
        match self {
            Self::WebSearch => "web_search",
            Self::DeepResearch => "deep_research",
            Self::ImageGeneration => "image_generation",
            Self::DocumentAnalysis => "document_analysis",
            Self::CodeExecution => "code_execution",
            Self::Calendar => "calendar",
        }
    }
}

impl fmt::Display for ToolId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Error returned when parsing an unsupported tool identifier.
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
#[error("unknown tool id '{0}'")]
pub struct UnknownToolId(pub String);

impl From<ToolId> for String {
    fn from(tool: ToolId) -> Self {
        tool.as_str().to_owned()
    }
}

impl FromStr for ToolId {
    type Err = UnknownToolId;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        Self::ALL
            .into_iter()
            .find(|tool| tool.as_str() == s)
            .ok_or_else(|| UnknownToolId(s.to_string()))
    }
}

/// Free-form request metadata.
///
/// Two keys carry meaning for the workflow: `source` (where the message
/// originated) and `selectedTools` (tool IDs chosen by the user). Any
/// other key is passed through untouched.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(transparent)]
pub struct Metadata(Map<String, Value>);

impl Metadata {
    /// Key holding the origin tag.
    pub const SOURCE: &'static str = "source";

    /// Key holding the selected tool IDs.
    pub const SELECTED_TOOLS: &'static str = "selectedTools";

    /// Creates empty metadata.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Sets the `source` tag.
    #[must_use]
    pub fn with_source(self, source: impl Into<String>) -> Self {
        self.with_entry(Self::SOURCE, Value::String(source.into()))
    }

    /// Sets the selected tools.
    ///
    /// Accepts [`ToolId`] values as well as raw identifiers, so that values
    /// coming straight from a UI are checked by the validator rather than
    /// silently dropped.
    #[must_use]
    pub fn with_selected_tools<I, T>(self, tools: I) -> Self
    where
        I: IntoIterator<Item = T>,
        T: Into<String>,
    {
        let tools = tools
            .into_iter()
            .map(|t| Value::String(t.into()))
            .collect();
        self.with_entry(Self::SELECTED_TOOLS, Value::Array(tools))
    }

    /// Inserts an arbitrary entry, replacing any previous value for `key`.
    #[must_use]
    pub fn with_entry(mut self, key: impl Into<String>, value: Value) -> Self {
        self.0.insert(key.into(), value);
        self
    }

    /// Returns the `source` tag, if set to a string.
    #[must_use]
    pub fn source(&self) -> Option<&str> {
        self.0.get(Self::SOURCE).and_then(Value::as_str)
    }

    /// Returns the value stored under `key`.
    #[must_use]
    pub fn get(&self, key: &str) -> Option<&Value> {
        self.0.get(key)
    }

    /// Returns the underlying JSON map.
    #[must_use]
    pub const fn as_map(&self) -> &Map<String, Value> {
        &self.0
    }
}

/// One chat turn sent to the workflow.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct OutboundPayload {
    /// The user's message text.
    pub message: String,
    /// UUID v4 of the sending user.
    pub user_id: String,
    /// RFC 3339 creation time.
    pub timestamp: String,
    /// Conversation the message belongs to.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub conversation_id: Option<String>,
    /// Correlation ID, shared by all retries of one send.
    pub request_id: String,
    /// Version of the sending client.
    pub client_version: String,
    /// Free-form metadata.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub metadata: Option<Metadata>,
}

impl OutboundPayload {
    /// Creates a payload with the required fields and no optional ones.
    #[must_use]
    pub fn new(
        message: impl Into<String>,
        user_id: impl Into<String>,
        timestamp: impl Into<String>,
        request_id: impl Into<String>,
        client_version: impl Into<String>,
    ) -> Self {
        Self {
            message: message.into(),
            user_id: user_id.into(),
            timestamp: timestamp.into(),
            conversation_id: None,
            request_id: request_id.into(),
            client_version: client_version.into(),
            metadata: None,
        }
    }

    /// Sets the conversation ID.
    #[must_use]
    pub fn with_conversation_id(mut self, id: impl Into<String>) -> Self {
        self.conversation_id = Some(id.into());
        self
    }

    /// Sets the metadata.
    #[must_use]
    pub fn with_metadata(mut self, metadata: Metadata) -> Self {
        self.metadata = Some(metadata);
        self
    }
}

/// Reply decoded from the workflow.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct InboundResponse {
    /// Assistant reply text; may be empty only on failure.
    pub response: String,
    /// Whether the workflow processed the message.
    pub success: bool,
    /// Echo of the request's correlation ID.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub request_id: Option<String>,
    /// Server-side processing time in milliseconds.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub processing_time: Option<f64>,
    /// Failure description, present when `success` is false.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub error: Option<String>,
}

/// Generates a request ID of the form `req_<epochMillis>_<random>`.
#[must_use]
pub fn generate_request_id(now: SystemTime) -> String {
    let suffix: String = rand::rng()
        .sample_iter(&Alphanumeric)
        .take(REQUEST_ID_SUFFIX_LEN)
        .map(|b| char::from(b).to_ascii_lowercase())
        .collect();
    format!("req_{}_{suffix}", epoch_millis(now))
}

/// Formats a timestamp the way the workflow expects (RFC 3339, millisecond precision, UTC).
#[must_use]
pub fn format_timestamp(time: SystemTime) -> String {
    chrono::DateTime::<chrono::Utc>::from(time).to_rfc3339_opts(chrono::SecondsFormat::Millis, true)
}
