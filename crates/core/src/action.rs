//! Typed actions extracted from responder output.

use serde::{Deserialize, Serialize};

/// Header of the single reserved wrapper (artifact) in a run.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct WrapperHeader {
    pub id: String,
    pub title: String,
}

impl WrapperHeader {
    pub fn new(id: impl Into<String>, title: impl Into<String>) -> Self {
        Self {
            id: id.into(),
            title: title.into(),
        }
    }
}

/// The closed set of things an action can ask for.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum ActionKind {
    /// Run a shell command.
    Shell { command: String },
    /// Write `content` to `path`.
    File { path: String, content: String },
    /// Show a message to the user.
    Message { text: String },
}

impl ActionKind {
    /// The wire `type` string of this kind.
    pub fn type_name(&self) -> &'static str {
        match self {
            Self::Shell { .. } => "shell",
            Self::File { .. } => "file",
            Self::Message { .. } => "message",
        }
    }
}

/// One immutable unit of work, tagged with the round that produced it.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Action {
    pub origin_round: usize,
    #[serde(flatten)]
    pub kind: ActionKind,
}

impl Action {
    pub fn new(origin_round: usize, kind: ActionKind) -> Self {
        Self { origin_round, kind }
    }
}

/// Which extraction grammar a stream is read with.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Grammar {
    /// One reserved wrapper tag; typed objects inside it are decoded downstream.
    #[default]
    PairedTag,
    /// Self-describing `{"type": ...}` objects anywhere in the stream.
    Balanced,
}
