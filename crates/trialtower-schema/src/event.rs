use anyhow::{Context, Result};
use serde::{Deserialize, Deserializer, Serialize};

use crate::chat::{Message, ResultSet};

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct StatusEvent {
    pub message: String,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct TextDeltaEvent {
    pub content_index: u32,
    pub text: String,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ThinkingDeltaEvent {
    pub content_index: u32,
    pub text: String,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ThinkingEvent {
    pub content_index: u32,
    pub text: String,
}

/// Tool use/result payloads are rendered verbatim, so everything beyond the
/// grouping index stays an opaque document.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ToolEvent {
    pub content_index: u32,
    #[serde(flatten)]
    pub payload: serde_json::Value,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ChartEvent {
    pub content_index: u32,
    pub chart_spec: String,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct TableEvent {
    pub content_index: u32,
    pub result_set: ResultSet,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ErrorEvent {
    #[serde(deserialize_with = "code_as_string")]
    pub code: String,
    pub message: String,
}

// The remote emits error codes as either strings or bare numbers.
fn code_as_string<'de, D>(deserializer: D) -> std::result::Result<String, D::Error>
where
    D: Deserializer<'de>,
{
    #[derive(Deserialize)]
    #[serde(untagged)]
    enum Raw {
        Text(String),
        Number(i64),
    }
    Ok(match Raw::deserialize(deserializer)? {
        Raw::Text(s) => s,
        Raw::Number(n) => n.to_string(),
    })
}

/// One typed event from the agent's response stream.
#[derive(Debug, Clone, PartialEq)]
pub enum AgentEvent {
    Status(StatusEvent),
    TextDelta(TextDeltaEvent),
    ThinkingDelta(ThinkingDeltaEvent),
    Thinking(ThinkingEvent),
    ToolUse(ToolEvent),
    ToolResult(ToolEvent),
    Chart(ChartEvent),
    Table(TableEvent),
    Error(ErrorEvent),
    /// Terminal, fully-formed assistant message.
    Response(Message),
}

impl AgentEvent {
    /// Decode a named SSE event. Returns `Ok(None)` for event names outside
    /// the protocol, `Err` for a payload that fails to decode.
    pub fn from_named(event: &str, data: &str) -> Result<Option<Self>> {
        let decoded = match event {
            "response.status" => Self::Status(decode(event, data)?),
            "response.text.delta" => Self::TextDelta(decode(event, data)?),
            "response.thinking.delta" => Self::ThinkingDelta(decode(event, data)?),
            "response.thinking" => Self::Thinking(decode(event, data)?),
            "response.tool_use" => Self::ToolUse(decode(event, data)?),
            "response.tool_result" => Self::ToolResult(decode(event, data)?),
            "response.chart" => Self::Chart(decode(event, data)?),
            "response.table" => Self::Table(decode(event, data)?),
            "error" => Self::Error(decode(event, data)?),
            "response" => Self::Response(decode(event, data)?),
            other => {
                tracing::debug!(event = other, "ignoring unknown stream event");
                return Ok(None);
            }
        };
        Ok(Some(decoded))
    }

    pub fn kind(&self) -> &'static str {
        match self {
            Self::Status(_) => "response.status",
            Self::TextDelta(_) => "response.text.delta",
            Self::ThinkingDelta(_) => "response.thinking.delta",
            Self::Thinking(_) => "response.thinking",
            Self::ToolUse(_) => "response.tool_use",
            Self::ToolResult(_) => "response.tool_result",
            Self::Chart(_) => "response.chart",
            Self::Table(_) => "response.table",
            Self::Error(_) => "error",
            Self::Response(_) => "response",
        }
    }
}

fn decode<T: for<'de> Deserialize<'de>>(event: &str, data: &str) -> Result<T> {
    serde_json::from_str(data).with_context(|| format!("invalid payload for event {event}"))
}
