//! Transcript domain types.
//!
//! The Transcript is the single shared mutable state of a run: an ordered,
//! append-only list of role-tagged text blocks. Blocks are never rewritten
//! or removed, so replaying the same prefix always reproduces the same next
//! responder input.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

use crate::responder::ToolCallRequest;

/// Unique identifier for a run.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct RunId(pub String);

impl RunId {
    pub fn new() -> Self {
        Self(Uuid::new_v4().to_string())
    }
}

impl Default for RunId {
    fn default() -> Self {
        Self::new()
    }
}

impl std::fmt::Display for RunId {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.0)
    }
}

/// The role that produced a transcript block.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Role {
    /// System configuration and instructions
    System,
    /// The end user (and advisory notes injected on the user's behalf)
    User,
    /// The text-generating collaborator
    Responder,
    /// Output of a tool invocation
    ToolResult,
}

/// A single block of the transcript.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Block {
    /// Unique block ID
    pub id: String,

    /// Who produced this block
    pub role: Role,

    /// The text content
    pub content: String,

    /// Tool calls requested by the responder (if any)
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub tool_calls: Vec<ToolCallRequest>,

    /// For tool results: which tool call this answers
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub tool_call_id: Option<String>,

    /// For tool results: which tool produced it
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub tool_name: Option<String>,

    pub timestamp: DateTime<Utc>,
}

impl Block {
    fn with_role(role: Role, content: impl Into<String>) -> Self {
        Self {
            id: Uuid::new_v4().to_string(),
            role,
            content: content.into(),
            tool_calls: Vec::new(),
            tool_call_id: None,
            tool_name: None,
            timestamp: Utc::now(),
        }
    }

    pub fn system(content: impl Into<String>) -> Self {
        Self::with_role(Role::System, content)
    }

    pub fn user(content: impl Into<String>) -> Self {
        Self::with_role(Role::User, content)
    }

    /// A responder block, carrying every tool call the response requested.
    pub fn responder(content: impl Into<String>, tool_calls: Vec<ToolCallRequest>) -> Self {
        let mut block = Self::with_role(Role::Responder, content);
        block.tool_calls = tool_calls;
        block
    }

    /// A tool-result block answering `call`.
    pub fn tool_result(call: &ToolCallRequest, content: impl Into<String>) -> Self {
        let mut block = Self::with_role(Role::ToolResult, content);
        block.tool_call_id = Some(call.id.clone());
        block.tool_name = Some(call.name.clone());
        block
    }
}

/// Append-only record of everything exchanged in one run.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Transcript {
    pub id: RunId,
    blocks: Vec<Block>,
    pub created_at: DateTime<Utc>,
}

impl Transcript {
    pub fn new() -> Self {
        Self {
            id: RunId::new(),
            blocks: Vec::new(),
            created_at: Utc::now(),
        }
    }

    /// Append a block. The only way to change a transcript.
    pub fn append(&mut self, block: Block) {
        self.blocks.push(block);
    }

    pub fn blocks(&self) -> &[Block] {
        &self.blocks
    }

    pub fn len(&self) -> usize {
        self.blocks.len()
    }

    pub fn is_empty(&self) -> bool {
        self.blocks.is_empty()
    }

    pub fn last(&self) -> Option<&Block> {
        self.blocks.last()
    }

    /// The first `len` blocks, as they were when the transcript had that length.
    pub fn prefix(&self, len: usize) -> &[Block] {
        &self.blocks[..len.min(self.blocks.len())]
    }

    /// Rough token estimate (4 chars ≈ 1 token).
    pub fn estimated_tokens(&self) -> usize {
        self.blocks.iter().map(|b| b.content.len() / 4).sum()
    }
}

impl Default for Transcript {
    fn default() -> Self {
        Self::new()
    }
}
