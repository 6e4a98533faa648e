//! # forgeloop Core
//!
//! Domain types, traits, and error definitions shared by the extractor,
//! the orchestrator, and every adapter around them. This crate performs no
//! I/O of its own; it defines the model the other crates implement against.
//!
//! ## Design Philosophy
//!
//! Every external collaborator (responder, tool executor, sink) is a trait
//! here. Implementations live in their respective crates. This enables:
//! - Swapping a model adapter or tool set without touching the core loop
//! - Easy testing with scripted responders and mock executors
//! - Clean dependency graph (all crates depend inward on core)

pub mod action;
pub mod error;
pub mod event;
pub mod responder;
pub mod run;
pub mod tool;
pub mod transcript;

// Re-export key types at crate root for ergonomics
pub use action::{Action, ActionKind, Grammar, WrapperHeader};
pub use error::{Error, ResponderError, Result, ToolError};
pub use event::{DomainEvent, EventBus, RunNotice, Sink, SinkEvent, StructuralEvent, coalesce};
pub use responder::{ResponseBlock, Responder, StreamChunk, ToolCallRequest, Usage};
pub use run::{Round, RunState, StopReason};
pub use tool::{Tool, ToolDefinition, ToolExecutor, ToolOutput, ToolRegistry};
pub use transcript::{Block, Role, RunId, Transcript};
