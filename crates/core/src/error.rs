//! Error types for the forgeloop domain.
//!
//! One `thiserror` enum per collaborator, folded into [`Error`].
//!
//! Malformed fragments and unknown action types are deliberately absent:
//! the extractor and normalizer recover from those by discarding, so they
//! never become values.

use thiserror::Error;

/// The top-level error type for all forgeloop operations.
#[derive(Debug, Error)]
pub enum Error {
    // --- Responder errors (run-fatal) ---
    #[error("Responder error: {0}")]
    Responder(#[from] ResponderError),

    // --- Tool errors ---
    #[error("Tool error: {0}")]
    Tool(#[from] ToolError),

    // --- Configuration errors ---
    #[error("Configuration error: {message}")]
    Config { message: String },

    // --- Serialization ---
    #[error("Serialization error: {0}")]
    Serialization(#[from] serde_json::Error),

    #[error("Run cancelled")]
    Cancelled,

    // --- Generic ---
    #[error("Internal error: {0}")]
    Internal(String),
}

/// Result type alias using our Error.
pub type Result<T> = std::result::Result<T, Error>;

// --- Bounded context errors ---

/// Any failure invoking the responder. Fatal for the run that hit it.
#[derive(Debug, Clone, Error)]
pub enum ResponderError {
    #[error("API request failed: {message} (status: {status_code})")]
    ApiError { status_code: u16, message: String },

    #[error("Rate limited by responder, retry after {retry_after_secs}s")]
    RateLimited { retry_after_secs: u64 },

    #[error("Authentication failed: {0}")]
    AuthenticationFailed(String),

    #[error("Stream interrupted: {0}")]
    StreamInterrupted(String),

    #[error("Responder not configured: {0}")]
    NotConfigured(String),

    #[error("Request timed out: {0}")]
    Timeout(String),

    #[error("Network error: {0}")]
    Network(String),

    #[error("Invalid response: {0}")]
    InvalidResponse(String),
}

/// A failed tool execution. Every variant names the tool it came from.
#[derive(Debug, Clone, Error)]
pub enum ToolError {
    #[error("Tool not found: {0}")]
    NotFound(String),

    #[error("Tool execution failed: {tool_name}: {reason}")]
    ExecutionFailed { tool_name: String, reason: String },

    #[error("Tool timed out: {tool_name} after {timeout_secs}s")]
    Timeout { tool_name: String, timeout_secs: u64 },

    #[error("Permission denied: {tool_name}: {reason}")]
    PermissionDenied { tool_name: String, reason: String },

    #[error("Invalid arguments for {tool_name}: {reason}")]
    InvalidArguments { tool_name: String, reason: String },
}

impl ToolError {
    /// Name of the tool that failed.
    pub fn tool_name(&self) -> &str {
        match self {
            Self::NotFound(name) => name,
            Self::ExecutionFailed { tool_name, .. }
            | Self::Timeout { tool_name, .. }
            | Self::PermissionDenied { tool_name, .. }
            | Self::InvalidArguments { tool_name, .. } => tool_name,
        }
    }
}
