//! Tool error types

use std::time::Duration;

use thiserror::Error;

/// Errors from routing or invoking a tool
#[derive(Debug, Error)]
pub enum ToolError {
    #[error("Unknown tool: {name}")]
    UnknownTool { name: String },

    #[error("Unknown backend: {0}")]
    UnknownBackend(String),

    #[error("Tool {tool} failed: {message}")]
    Backend { tool: String, message: String },

    #[error("Transport error: {0}")]
    Transport(String),

    #[error("Tool {tool} timed out after {timeout:?}")]
    Timeout { tool: String, timeout: Duration },

    #[error("Invalid argument: {0}")]
    InvalidArgument(String),

    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    #[error("JSON error: {0}")]
    Json(#[from] serde_json::Error),
}

impl ToolError {
    /// Whether retrying the same call could succeed
    pub fn is_transient(&self) -> bool {
        matches!(self, ToolError::Transport(_) | ToolError::Timeout { .. } | ToolError::Io(_))
    }
}
