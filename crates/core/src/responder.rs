//! Responder trait: the abstraction over text generators.
//!
//! A Responder reads the whole transcript and returns the next response,
//! either as a complete block or as a stream of text fragments.
//!
//! Implementations: OpenAI-compatible endpoints, scripted test responders.

use async_trait::async_trait;
use serde::{Deserialize, Serialize};

use crate::error::ResponderError;
use crate::transcript::Transcript;

/// A tool invocation requested by the responder.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ToolCallRequest {
    /// Unique call ID (matches the responder's tool_call.id)
    pub id: String,

    /// Name of the tool to execute
    pub name: String,

    /// Arguments as a key/value map
    #[serde(default)]
    pub arguments: serde_json::Map<String, serde_json::Value>,
}

impl ToolCallRequest {
    pub fn new(
        id: impl Into<String>,
        name: impl Into<String>,
        arguments: serde_json::Map<String, serde_json::Value>,
    ) -> Self {
        Self {
            id: id.into(),
            name: name.into(),
            arguments,
        }
    }

    /// Build a request from a raw JSON arguments string.
    ///
    /// Anything that is not a JSON object becomes an empty argument map.
    pub fn from_json_arguments(
        id: impl Into<String>,
        name: impl Into<String>,
        arguments: &str,
    ) -> Self {
        let arguments = match serde_json::from_str::<serde_json::Value>(arguments) {
            Ok(serde_json::Value::Object(map)) => map,
            _ => serde_json::Map::new(),
        };
        Self::new(id, name, arguments)
    }
}

/// Token usage information.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Usage {
    pub prompt_tokens: u32,
    pub completion_tokens: u32,
    pub total_tokens: u32,
}

/// A complete response: plain text plus zero or more tool-call requests.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct ResponseBlock {
    pub text: String,

    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub tool_calls: Vec<ToolCallRequest>,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub usage: Option<Usage>,

    /// Which model actually responded, when the responder knows
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub model: Option<String>,
}

impl ResponseBlock {
    pub fn text(text: impl Into<String>) -> Self {
        Self {
            text: text.into(),
            ..Self::default()
        }
    }

    pub fn with_tool_calls(text: impl Into<String>, tool_calls: Vec<ToolCallRequest>) -> Self {
        Self {
            text: text.into(),
            tool_calls,
            ..Self::default()
        }
    }
}

/// A single chunk in a streaming response.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct StreamChunk {
    /// Text fragment, with no boundary guarantees
    #[serde(default)]
    pub content: Option<String>,

    /// Completed tool calls (typically only in the final chunk)
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub tool_calls: Vec<ToolCallRequest>,

    /// Whether this is the final chunk
    #[serde(default)]
    pub done: bool,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub usage: Option<Usage>,
}

/// Receiving half of a streamed response.
pub type ChunkReceiver =
    tokio::sync::mpsc::Receiver<std::result::Result<StreamChunk, ResponderError>>;

/// The core Responder trait.
///
/// The orchestrator calls `invoke()` or `invoke_streaming()` without knowing
/// which backend answers. Timeouts are the implementation's business: a
/// timed-out call is reported as a `ResponderError`.
#[async_trait]
pub trait Responder: Send + Sync {
    /// A human-readable name (e.g., "openai", "scripted").
    fn name(&self) -> &str;

    /// Send the transcript and get a complete response.
    async fn invoke(
        &self,
        transcript: &Transcript,
    ) -> std::result::Result<ResponseBlock, ResponderError>;

    /// Send the transcript and get a stream of fragments.
    ///
    /// Default implementation calls `invoke()` and wraps the result as a single chunk.
    async fn invoke_streaming(
        &self,
        transcript: &Transcript,
    ) -> std::result::Result<ChunkReceiver, ResponderError> {
        let response = self.invoke(transcript).await?;
        let (tx, rx) = tokio::sync::mpsc::channel(1);
        let _ = tx
            .send(Ok(StreamChunk {
                content: Some(response.text),
                tool_calls: response.tool_calls,
                done: true,
                usage: response.usage,
            }))
            .await;
        Ok(rx)
    }
}
