//! Tool-calling conversation loop
//!
//! A worker step with tool access exchanges turns with the model until it
//! answers without requesting tools. The visible tool set starts small and
//! is swapped by the category-selection tool.

mod engine;
mod state;

use thiserror::Error;

use crate::llm::LlmError;

pub use engine::ConversationLoop;
pub use state::ConversationState;

/// Fatal conversation failures
///
/// Tool failures never appear here; they go back to the model as data.
#[derive(Debug, Error)]
pub enum ConversationError {
    #[error("Model exchange failed: {0}")]
    Channel(#[from] LlmError),
}
