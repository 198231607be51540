//! Tool backends and routing
//!
//! A backend is an external collaborator exposing a catalog of tools (in
//! production an MCP server over stdio). A `ToolRouter` maps each tool name to
//! one backend for a single conversation, and owns the category index that
//! lets the model narrow its visible tool set.

mod backend;
pub mod category;
mod error;
pub mod mcp;
mod registry;
mod retry;
mod router;

pub use backend::{ToolBackend, ToolDescriptor, ToolOutput, error_payload};
pub use category::{CATEGORY_TOOL_NAME, CategoryError, ToolCategory};
pub use error::ToolError;
pub use mcp::McpBackend;
pub use registry::{BackendRegistry, GuardedBackend};
pub use retry::RetryPolicy;
pub use router::ToolRouter;

#[cfg(test)]
pub use backend::mock;
