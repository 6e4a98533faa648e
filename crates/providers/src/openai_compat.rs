//! OpenAI-compatible responder implementation.
//!
//! Works with: OpenAI, OpenRouter, Ollama, vLLM, and any endpoint exposing
//! `/chat/completions` in the OpenAI format.
//!
//! Supports:
//! - Chat completions (non-streaming and streaming SSE)
//! - Tool use / function calling

use std::collections::BTreeMap;
use std::time::Duration;

use async_trait::async_trait;
use forgeloop_config::ResponderConfig;
use forgeloop_core::error::ResponderError;
use forgeloop_core::responder::{
    ChunkReceiver, ResponseBlock, Responder, StreamChunk, ToolCallRequest, Usage,
};
use forgeloop_core::tool::ToolDefinition;
use forgeloop_core::transcript::{Block, Role, Transcript};
use futures::StreamExt;
use serde::{Deserialize, Serialize};
use tracing::{debug, trace, warn};

/// A responder backed by an OpenAI-compatible chat completions endpoint.
pub struct OpenAiCompatResponder {
    name: String,
    base_url: String,
    api_key: String,
    model: String,
    temperature: f32,
    max_tokens: Option<u32>,
    tools: Vec<ToolDefinition>,
    client: reqwest::Client,
}

impl OpenAiCompatResponder {
    pub fn new(
        name: impl Into<String>,
        base_url: impl Into<String>,
        api_key: impl Into<String>,
        model: impl Into<String>,
    ) -> Result<Self, ResponderError> {
        Ok(Self {
            name: name.into(),
            base_url: base_url.into().trim_end_matches('/').to_string(),
            api_key: api_key.into(),
            model: model.into(),
            temperature: 0.2,
            max_tokens: None,
            tools: Vec::new(),
            client: build_client(Duration::from_secs(120))?,
        })
    }

    /// Build from the `[responder]` config section.
    ///
    /// Every provider except `ollama` needs an API key.
    pub fn from_config(config: &ResponderConfig) -> Result<Self, ResponderError> {
        let base_url = match &config.api_url {
            Some(url) => url.clone(),
            None => default_base_url(&config.provider)
                .ok_or_else(|| {
                    ResponderError::NotConfigured(format!(
                        "no api_url configured for provider '{}'",
                        config.provider
                    ))
                })?
                .to_string(),
        };

        let api_key = match (&config.api_key, config.provider.as_str()) {
            (Some(key), _) => key.clone(),
            (None, "ollama") => "ollama".to_string(),
            (None, provider) => {
                return Err(ResponderError::NotConfigured(format!(
                    "no API key for provider '{provider}'; set FORGELOOP_API_KEY"
                )));
            }
        };

        let mut responder = Self::new(&config.provider, base_url, api_key, &config.model)?
            .with_temperature(config.temperature)
            .with_max_tokens(config.max_tokens);
        responder.client = build_client(Duration::from_secs(config.timeout_secs))?;
        Ok(responder)
    }

    pub fn with_temperature(mut self, temperature: f32) -> Self {
        self.temperature = temperature;
        self
    }

    pub fn with_max_tokens(mut self, max_tokens: u32) -> Self {
        self.max_tokens = Some(max_tokens);
        self
    }

    /// Tools advertised to the model on every request.
    pub fn with_tools(mut self, tools: Vec<ToolDefinition>) -> Self {
        self.tools = tools;
        self
    }

    pub fn model(&self) -> &str {
        &self.model
    }

    /// Convert transcript blocks to OpenAI API format.
    ///
    /// A responder block may request several tools but only the ones that
    /// got a result are sent back; the API rejects unanswered tool calls.
    fn to_api_messages(blocks: &[Block]) -> Vec<ApiMessage> {
        blocks
            .iter()
            .enumerate()
            .map(|(i, block)| {
                let answered: Vec<&ToolCallRequest> = block
                    .tool_calls
                    .iter()
                    .filter(|tc| {
                        blocks[i + 1..].iter().any(|later| {
                            later.role == Role::ToolResult
                                && later.tool_call_id.as_deref() == Some(tc.id.as_str())
                        })
                    })
                    .collect();

                ApiMessage {
                    role: match block.role {
                        Role::System => "system".into(),
                        Role::User => "user".into(),
                        Role::Responder => "assistant".into(),
                        Role::ToolResult => "tool".into(),
                    },
                    content: Some(block.content.clone()),
                    tool_calls: if answered.is_empty() {
                        None
                    } else {
                        Some(
                            answered
                                .into_iter()
                                .map(|tc| ApiToolCall {
                                    id: tc.id.clone(),
                                    r#type: "function".into(),
                                    function: ApiFunction {
                                        name: tc.name.clone(),
                                        arguments: serde_json::Value::Object(
                                            tc.arguments.clone(),
                                        )
                                        .to_string(),
                                    },
                                })
                                .collect(),
                        )
                    },
                    tool_call_id: block.tool_call_id.clone(),
                }
            })
            .collect()
    }

    /// Convert tool definitions to OpenAI API format.
    fn to_api_tools(tools: &[ToolDefinition]) -> Vec<ApiToolDefinition> {
        tools
            .iter()
            .map(|t| ApiToolDefinition {
                r#type: "function".into(),
                function: ApiToolFunction {
                    name: t.name.clone(),
                    description: t.description.clone(),
                    parameters: t.parameters.clone(),
                },
            })
            .collect()
    }

    fn request_body(&self, transcript: &Transcript, stream: bool) -> serde_json::Value {
        let mut body = serde_json::json!({
            "model": self.model,
            "messages": Self::to_api_messages(transcript.blocks()),
            "temperature": self.temperature,
            "stream": stream,
        });

        if stream {
            body["stream_options"] = serde_json::json!({ "include_usage": true });
        }

        if let Some(max_tokens) = self.max_tokens {
            body["max_tokens"] = serde_json::json!(max_tokens);
        }

        if !self.tools.is_empty() {
            body["tools"] = serde_json::json!(Self::to_api_tools(&self.tools));
        }

        body
    }

    async fn post(
        &self,
        body: &serde_json::Value,
        stream: bool,
    ) -> Result<reqwest::Response, ResponderError> {
        let url = format!("{}/chat/completions", self.base_url);
        let mut request = self
            .client
            .post(&url)
            .header("Authorization", format!("Bearer {}", self.api_key))
            .header("Content-Type", "application/json");
        if stream {
            request = request.header("Accept", "text/event-stream");
        }

        let response = request.json(body).send().await.map_err(|e| {
            if e.is_timeout() {
                ResponderError::Timeout(e.to_string())
            } else {
                ResponderError::Network(e.to_string())
            }
        })?;

        let status = response.status().as_u16();

        if status == 429 {
            let retry_after_secs = response
                .headers()
                .get("retry-after")
                .and_then(|v| v.to_str().ok())
                .and_then(|v| v.parse().ok())
                .unwrap_or(5);
            return Err(ResponderError::RateLimited { retry_after_secs });
        }

        if status == 401 || status == 403 {
            return Err(ResponderError::AuthenticationFailed(
                "Invalid API key or insufficient permissions".into(),
            ));
        }

        if status != 200 {
            let error_body = response.text().await.unwrap_or_default();
            warn!(status, body = %error_body, "Responder returned error");
            return Err(ResponderError::ApiError {
                status_code: status,
                message: error_body,
            });
        }

        Ok(response)
    }
}

fn build_client(timeout: Duration) -> Result<reqwest::Client, ResponderError> {
    reqwest::Client::builder()
        .timeout(timeout)
        .build()
        .map_err(|e| ResponderError::NotConfigured(format!("failed to create HTTP client: {e}")))
}

fn default_base_url(provider: &str) -> Option<&'static str> {
    match provider {
        "openai" => Some("https://api.openai.com/v1"),
        "openrouter" => Some("https://openrouter.ai/api/v1"),
        "ollama" => Some("http://localhost:11434/v1"),
        _ => None,
    }
}

#[async_trait]
impl Responder for OpenAiCompatResponder {
    fn name(&self) -> &str {
        &self.name
    }

    async fn invoke(&self, transcript: &Transcript) -> Result<ResponseBlock, ResponderError> {
        let body = self.request_body(transcript, false);
        debug!(responder = %self.name, model = %self.model, "Sending completion request");

        let response = self.post(&body, false).await?;

        let api_response: ApiResponse = response
            .json()
            .await
            .map_err(|e| ResponderError::InvalidResponse(format!("Failed to parse response: {e}")))?;

        let choice = api_response
            .choices
            .into_iter()
            .next()
            .ok_or_else(|| ResponderError::InvalidResponse("No choices in response".into()))?;

        let tool_calls = choice
            .message
            .tool_calls
            .unwrap_or_default()
            .into_iter()
            .map(|tc| ToolCallRequest::from_json_arguments(tc.id, tc.function.name, &tc.function.arguments))
            .collect();

        Ok(ResponseBlock {
            text: choice.message.content.unwrap_or_default(),
            tool_calls,
            usage: api_response.usage.map(Usage::from),
            model: Some(api_response.model),
        })
    }

    async fn invoke_streaming(
        &self,
        transcript: &Transcript,
    ) -> Result<ChunkReceiver, ResponderError> {
        let body = self.request_body(transcript, true);
        debug!(responder = %self.name, model = %self.model, "Sending streaming request");

        let response = self.post(&body, true).await?;

        let (tx, rx) = tokio::sync::mpsc::channel(64);
        let responder_name = self.name.clone();

        // Read the SSE byte stream and forward decoded chunks
        tokio::spawn(async move {
            let mut byte_stream = response.bytes_stream();
            let mut decoder = SseDecoder::new(responder_name);

            while let Some(chunk_result) = byte_stream.next().await {
                let bytes = match chunk_result {
                    Ok(b) => b,
                    Err(e) => {
                        let _ = tx
                            .send(Err(ResponderError::StreamInterrupted(e.to_string())))
                            .await;
                        return;
                    }
                };

                for chunk in decoder.push(&bytes) {
                    if tx.send(Ok(chunk)).await.is_err() {
                        return; // receiver dropped
                    }
                }
                if decoder.is_done() {
                    return;
                }
            }

            // Stream ended without [DONE]
            let _ = tx.send(Ok(decoder.finish())).await;
        });

        Ok(rx)
    }
}

/// Incremental decoder for an OpenAI SSE response body.
///
/// Lines are split on raw bytes so a multi-byte character spanning two
/// network chunks is decoded whole. Tool call deltas are accumulated by
/// index and released, in index order, with the final chunk.
struct SseDecoder {
    responder_name: String,
    buffer: Vec<u8>,
    accumulators: BTreeMap<u32, ToolCallAccumulator>,
    done: bool,
}

impl SseDecoder {
    fn new(responder_name: String) -> Self {
        Self {
            responder_name,
            buffer: Vec::new(),
            accumulators: BTreeMap::new(),
            done: false,
        }
    }

    fn is_done(&self) -> bool {
        self.done
    }

    fn push(&mut self, bytes: &[u8]) -> Vec<StreamChunk> {
        self.buffer.extend_from_slice(bytes);
        let mut chunks = Vec::new();

        while !self.done
            && let Some(line_end) = self.buffer.iter().position(|&b| b == b'\n')
        {
            let raw: Vec<u8> = self.buffer.drain(..=line_end).collect();
            let line = String::from_utf8_lossy(&raw);
            let line = line.trim_end_matches(['\n', '\r']);

            // Skip empty lines and SSE comments
            if line.is_empty() || line.starts_with(':') {
                continue;
            }

            let Some(data) = line.strip_prefix("data:") else {
                continue;
            };
            let data = data.trim();

            if data == "[DONE]" {
                chunks.push(self.finish());
                break;
            }

            match serde_json::from_str::<StreamResponse>(data) {
                Ok(stream_resp) => {
                    if let Some(choice) = stream_resp.choices.first() {
                        self.accumulate(choice);
                        if let Some(content) = &choice.delta.content
                            && !content.is_empty()
                        {
                            chunks.push(StreamChunk {
                                content: Some(content.clone()),
                                ..StreamChunk::default()
                            });
                        }
                    }

                    // Usage arrives in the last chunk (stream_options)
                    if let Some(usage) = stream_resp.usage {
                        let mut last = self.finish();
                        last.usage = Some(usage.into());
                        chunks.push(last);
                    }
                }
                Err(e) => {
                    trace!(
                        responder = %self.responder_name,
                        data = %data,
                        error = %e,
                        "Ignoring unparseable SSE chunk"
                    );
                }
            }
        }

        chunks
    }

    fn accumulate(&mut self, choice: &StreamChoice) {
        let Some(deltas) = &choice.delta.tool_calls else {
            return;
        };
        for delta in deltas {
            let acc = self.accumulators.entry(delta.index).or_default();
            if let Some(id) = &delta.id {
                acc.id = id.clone();
            }
            if let Some(func) = &delta.function {
                if let Some(name) = &func.name {
                    acc.name = name.clone();
                }
                if let Some(args) = &func.arguments {
                    acc.arguments.push_str(args);
                }
            }
        }
    }

    /// The terminal chunk, carrying every accumulated tool call.
    fn finish(&mut self) -> StreamChunk {
        self.done = true;
        let tool_calls = std::mem::take(&mut self.accumulators)
            .into_values()
            .map(|acc| acc.into_tool_call())
            .collect();
        StreamChunk {
            content: None,
            tool_calls,
            done: true,
            usage: None,
        }
    }
}

// --- OpenAI API types (internal) ---

#[derive(Debug, Serialize, Deserialize)]
struct ApiMessage {
    role: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    content: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    tool_calls: Option<Vec<ApiToolCall>>,
    #[serde(skip_serializing_if = "Option::is_none")]
    tool_call_id: Option<String>,
}

#[derive(Debug, Serialize, Deserialize)]
struct ApiToolCall {
    id: String,
    r#type: String,
    function: ApiFunction,
}

#[derive(Debug, Serialize, Deserialize)]
struct ApiFunction {
    name: String,
    arguments: String,
}

#[derive(Debug, Serialize, Deserialize)]
struct ApiToolDefinition {
    r#type: String,
    function: ApiToolFunction,
}

#[derive(Debug, Serialize, Deserialize)]
struct ApiToolFunction {
    name: String,
    description: String,
    parameters: serde_json::Value,
}

#[derive(Debug, Deserialize)]
struct ApiResponse {
    model: String,
    choices: Vec<ApiChoice>,
    usage: Option<ApiUsage>,
}

#[derive(Debug, Deserialize)]
struct ApiChoice {
    message: ApiMessage,
}

#[derive(Debug, Deserialize)]
struct ApiUsage {
    prompt_tokens: u32,
    completion_tokens: u32,
    total_tokens: u32,
}

impl From<ApiUsage> for Usage {
    fn from(u: ApiUsage) -> Self {
        Usage {
            prompt_tokens: u.prompt_tokens,
            completion_tokens: u.completion_tokens,
            total_tokens: u.total_tokens,
        }
    }
}

// --- Streaming SSE types ---

/// A single SSE `data: {...}` chunk from a streaming response.
#[derive(Debug, Deserialize)]
struct StreamResponse {
    #[serde(default)]
    choices: Vec<StreamChoice>,
    #[serde(default)]
    usage: Option<ApiUsage>,
}

#[derive(Debug, Deserialize)]
struct StreamChoice {
    delta: StreamDelta,
}

#[derive(Debug, Deserialize)]
struct StreamDelta {
    #[serde(default)]
    content: Option<String>,
    #[serde(default)]
    tool_calls: Option<Vec<StreamToolCallDelta>>,
}

/// A tool call delta; arrives incrementally across chunks.
#[derive(Debug, Deserialize)]
struct StreamToolCallDelta {
    index: u32,
    #[serde(default)]
    id: Option<String>,
    #[serde(default)]
    function: Option<StreamFunctionDelta>,
}

#[derive(Debug, Deserialize)]
struct StreamFunctionDelta {
    #[serde(default)]
    name: Option<String>,
    #[serde(default)]
    arguments: Option<String>,
}

/// Accumulates incremental tool call deltas into a complete tool call.
#[derive(Debug, Default)]
struct ToolCallAccumulator {
    id: String,
    name: String,
    arguments: String,
}

impl ToolCallAccumulator {
    fn into_tool_call(self) -> ToolCallRequest {
        ToolCallRequest::from_json_arguments(self.id, self.name, &self.arguments)
    }
}
