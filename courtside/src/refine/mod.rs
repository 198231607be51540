//! Refinement loop
//!
//! A composite task is produced by a worker and judged by a critic, up to
//! `max_iterations` times. The critic ends the loop early only by calling
//! `exit_loop`; when the budget runs out the last candidate is accepted.

mod critic;
mod engine;
mod session;

use thiserror::Error;

use crate::conversation::ConversationError;
use crate::llm::LlmError;

pub use critic::{Critic, EXIT_TOOL_NAME, Verdict, exit_tool_definition};
pub use engine::{Acceptance, RefinementLoop, RefinementOutcome};
pub use session::{RefinementSession, RefinementState, instructions_for};

#[derive(Debug, Error)]
pub enum RefinementError {
    #[error("Worker failed on iteration {iteration}: {source}")]
    Worker {
        iteration: u32,
        #[source]
        source: ConversationError,
    },

    #[error("Critic failed on iteration {iteration}: {source}")]
    Critic {
        iteration: u32,
        #[source]
        source: LlmError,
    },

    #[error("Prompt error: {0}")]
    Prompt(String),

    #[error("Configuration error: {0}")]
    Configuration(String),
}

impl RefinementError {
    /// The model exchange itself failed
    pub fn is_channel_failure(&self) -> bool {
        matches!(self, RefinementError::Worker { .. } | RefinementError::Critic { .. })
    }
}
