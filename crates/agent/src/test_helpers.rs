//! Shared test helpers: scripted responders, recording executors, advisors.

use std::sync::Mutex;

use async_trait::async_trait;
use forgeloop_core::error::{ResponderError, ToolError};
use forgeloop_core::responder::{ChunkReceiver, ResponseBlock, Responder, StreamChunk, ToolCallRequest};
use forgeloop_core::tool::ToolExecutor;
use forgeloop_core::transcript::Transcript;
use serde_json::{Map, Value};
use tokio_util::sync::CancellationToken;

use crate::advisor::{ProgressAdvisor, ProgressVerdict};

/// A responder that returns a sequence of scripted responses.
///
/// Once the script runs out the last entry repeats. With a chunk size set,
/// `invoke_streaming` delivers the text in fragments of that many chars.
pub struct ScriptedResponder {
    responses: Vec<Result<ResponseBlock, ResponderError>>,
    chunk_size: Option<usize>,
    stream_error: Option<ResponderError>,
    cancel_on_call: Option<CancellationToken>,
    call_count: Mutex<usize>,
    transcript_lens: Mutex<Vec<usize>>,
}

impl ScriptedResponder {
    pub fn new(responses: Vec<ResponseBlock>) -> Self {
        Self::with_results(responses.into_iter().map(Ok).collect())
    }

    pub fn with_results(responses: Vec<Result<ResponseBlock, ResponderError>>) -> Self {
        assert!(!responses.is_empty(), "ScriptedResponder needs at least one response");
        Self {
            responses,
            chunk_size: None,
            stream_error: None,
            cancel_on_call: None,
            call_count: Mutex::new(0),
            transcript_lens: Mutex::new(Vec::new()),
        }
    }

    /// Always answer with one tool call.
    pub fn always_tool(name: &str, args: Value) -> Self {
        Self::new(vec![ResponseBlock::with_tool_calls(
            "",
            vec![make_tool_call("call_1", name, args)],
        )])
    }

    pub fn streaming(mut self, chunk_size: usize) -> Self {
        self.chunk_size = Some(chunk_size.max(1));
        self
    }

    /// End every stream with `error` after the text fragments, instead of
    /// the final done chunk.
    pub fn failing_stream(mut self, error: ResponderError) -> Self {
        self.stream_error = Some(error);
        self
    }

    /// Cancel `token` from inside every call.
    pub fn cancelling(mut self, token: CancellationToken) -> Self {
        self.cancel_on_call = Some(token);
        self
    }

    pub fn call_count(&self) -> usize {
        *self.call_count.lock().unwrap()
    }

    /// Transcript length seen by the most recent call.
    pub fn last_transcript_len(&self) -> usize {
        self.transcript_lens.lock().unwrap().last().copied().unwrap_or(0)
    }

    fn next(&self, transcript: &Transcript) -> Result<ResponseBlock, ResponderError> {
        let mut count = self.call_count.lock().unwrap();
        self.transcript_lens.lock().unwrap().push(transcript.len());
        if let Some(token) = &self.cancel_on_call {
            token.cancel();
        }
        let idx = (*count).min(self.responses.len() - 1);
        *count += 1;
        self.responses[idx].clone()
    }
}

#[async_trait]
impl Responder for ScriptedResponder {
    fn name(&self) -> &str {
        "scripted"
    }

    async fn invoke(&self, transcript: &Transcript) -> Result<ResponseBlock, ResponderError> {
        self.next(transcript)
    }

    async fn invoke_streaming(
        &self,
        transcript: &Transcript,
    ) -> Result<ChunkReceiver, ResponderError> {
        let block = self.next(transcript)?;
        let chars: Vec<char> = block.text.chars().collect();
        let size = self.chunk_size.unwrap_or(chars.len()).max(1);
        let pieces: Vec<String> = chars.chunks(size).map(|c| c.iter().collect()).collect();

        let (tx, rx) = tokio::sync::mpsc::channel(pieces.len() + 1);
        for piece in pieces {
            let _ = tx
                .send(Ok(StreamChunk {
                    content: Some(piece),
                    ..StreamChunk::default()
                }))
                .await;
        }
        let last = match &self.stream_error {
            Some(error) => Err(error.clone()),
            None => Ok(StreamChunk {
                tool_calls: block.tool_calls,
                done: true,
                usage: block.usage,
                ..StreamChunk::default()
            }),
        };
        let _ = tx.send(last).await;
        Ok(rx)
    }
}

/// A tool executor that records every call.
#[derive(Default)]
pub struct RecordingExecutor {
    calls: Mutex<Vec<(String, Map<String, Value>)>>,
    failing_tool: Option<String>,
    cancel_on_call: Option<CancellationToken>,
}

impl RecordingExecutor {
    pub fn new() -> Self {
        Self::default()
    }

    /// Every call to `name` fails with `ExecutionFailed`.
    pub fn failing(name: &str) -> Self {
        Self {
            failing_tool: Some(name.to_string()),
            ..Self::default()
        }
    }

    /// Cancel `token` from inside the first tool call.
    pub fn cancelling(token: CancellationToken) -> Self {
        Self {
            cancel_on_call: Some(token),
            ..Self::default()
        }
    }

    pub fn calls(&self) -> Vec<(String, Map<String, Value>)> {
        self.calls.lock().unwrap().clone()
    }

    pub fn call_count(&self) -> usize {
        self.calls.lock().unwrap().len()
    }
}

#[async_trait]
impl ToolExecutor for RecordingExecutor {
    async fn execute(&self, name: &str, arguments: &Map<String, Value>) -> Result<String, ToolError> {
        self.calls
            .lock()
            .unwrap()
            .push((name.to_string(), arguments.clone()));

        if let Some(token) = &self.cancel_on_call {
            token.cancel();
        }

        if self.failing_tool.as_deref() == Some(name) {
            return Err(ToolError::ExecutionFailed {
                tool_name: name.to_string(),
                reason: "exit status 1".into(),
            });
        }
        Ok(format!("ran {name}"))
    }
}

/// An advisor that returns scripted verdicts, repeating the last.
pub struct ScriptedAdvisor {
    verdicts: Vec<Result<ProgressVerdict, ResponderError>>,
    call_count: Mutex<usize>,
}

impl ScriptedAdvisor {
    pub fn new(verdicts: Vec<ProgressVerdict>) -> Self {
        Self::with_results(verdicts.into_iter().map(Ok).collect())
    }

    pub fn with_results(verdicts: Vec<Result<ProgressVerdict, ResponderError>>) -> Self {
        assert!(!verdicts.is_empty(), "ScriptedAdvisor needs at least one verdict");
        Self {
            verdicts,
            call_count: Mutex::new(0),
        }
    }

    pub fn call_count(&self) -> usize {
        *self.call_count.lock().unwrap()
    }
}

#[async_trait]
impl ProgressAdvisor for ScriptedAdvisor {
    async fn assess(
        &self,
        _transcript: &Transcript,
        _rounds_completed: usize,
        _max_rounds: usize,
    ) -> Result<ProgressVerdict, ResponderError> {
        let mut count = self.call_count.lock().unwrap();
        let idx = (*count).min(self.verdicts.len() - 1);
        *count += 1;
        self.verdicts[idx].clone()
    }
}

/// Helper to create a tool call.
pub fn make_tool_call(id: &str, name: &str, args: Value) -> ToolCallRequest {
    let arguments = match args {
        Value::Object(map) => map,
        _ => Map::new(),
    };
    ToolCallRequest::new(id, name, arguments)
}
